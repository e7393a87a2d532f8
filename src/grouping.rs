use std::collections::HashMap;

use uuid::Uuid;

use crate::models::{Client, Project, TimeEntry};

pub const NO_PROJECT: &str = "No project";

#[derive(Debug, Clone, PartialEq)]
pub struct GroupTotal {
    pub key: Option<Uuid>,
    pub name: String,
    pub minutes: u32,
    pub amount: f64,
    pub entry_ids: Vec<Uuid>,
}

pub fn group_by_client<'a>(
    entries: impl IntoIterator<Item = &'a TimeEntry>,
    clients: &[Client],
) -> Vec<GroupTotal> {
    let names: HashMap<Option<Uuid>, String> = clients
        .iter()
        .map(|client| (Some(client.id), client.name.clone()))
        .collect();
    group_by(entries, |entry| Some(entry.client_id), &names, "Unknown client")
}

/// One group per project; entries without a project share the
/// [`NO_PROJECT`] group.
pub fn group_by_project<'a>(
    entries: impl IntoIterator<Item = &'a TimeEntry>,
    projects: &[Project],
) -> Vec<GroupTotal> {
    let mut names: HashMap<Option<Uuid>, String> = projects
        .iter()
        .map(|project| (Some(project.id), project.name.clone()))
        .collect();
    names.insert(None, NO_PROJECT.to_string());
    group_by(entries, |entry| entry.project_id, &names, "Unknown project")
}

fn group_by<'a>(
    entries: impl IntoIterator<Item = &'a TimeEntry>,
    key: impl Fn(&TimeEntry) -> Option<Uuid>,
    names: &HashMap<Option<Uuid>, String>,
    unknown: &str,
) -> Vec<GroupTotal> {
    let mut grouped: HashMap<Option<Uuid>, GroupTotal> = HashMap::new();
    for entry in entries {
        let group_key = key(entry);
        let group = grouped.entry(group_key).or_insert_with(|| GroupTotal {
            key: group_key,
            name: names
                .get(&group_key)
                .cloned()
                .unwrap_or_else(|| unknown.to_string()),
            minutes: 0,
            amount: 0.0,
            entry_ids: Vec::new(),
        });
        group.minutes += entry.duration_minutes;
        group.amount += entry.amount;
        group.entry_ids.push(entry.id);
    }

    let mut result: Vec<GroupTotal> = grouped.into_values().collect();
    result.sort_by(|a, b| b.amount.total_cmp(&a.amount).then_with(|| a.name.cmp(&b.name)));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn entry(client_id: Uuid, project_id: Option<Uuid>, minutes: u32, amount: f64) -> TimeEntry {
        let start = Utc.with_ymd_and_hms(2026, 2, 3, 9, 0, 0).unwrap();
        TimeEntry {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            client_id,
            project_id,
            start_time: start,
            end_time: start + Duration::minutes(i64::from(minutes)),
            duration_minutes: minutes,
            amount,
            notes: None,
            created_at: start,
        }
    }

    fn project(client_id: Uuid, name: &str) -> Project {
        Project {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            client_id,
            name: name.to_string(),
            status: Default::default(),
            budget: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn groups_entries_by_project_with_no_project_bucket() {
        let client_id = Uuid::new_v4();
        let kitchen = project(client_id, "Kitchen");
        let deck = project(client_id, "Deck");
        let entries = vec![
            entry(client_id, Some(kitchen.id), 60, 50.0),
            entry(client_id, Some(kitchen.id), 30, 25.0),
            entry(client_id, Some(deck.id), 120, 100.0),
            entry(client_id, None, 15, 12.5),
        ];

        let grouped = group_by_project(&entries, &[kitchen.clone(), deck]);
        assert_eq!(grouped.len(), 3);
        assert_eq!(grouped[0].name, "Deck");
        assert_eq!(grouped[1].name, "Kitchen");
        assert_eq!(grouped[1].minutes, 90);
        assert_eq!(grouped[1].entry_ids.len(), 2);
        assert_eq!(grouped[2].name, NO_PROJECT);
        assert_eq!(grouped[2].key, None);
    }

    #[test]
    fn groups_entries_by_client_sorted_by_amount() {
        let acme = Client {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            name: "Acme".to_string(),
            email: None,
            phone: None,
            hourly_rate: 50.0,
            created_at: Utc::now(),
        };
        let stranger = Uuid::new_v4();
        let entries = vec![entry(acme.id, None, 60, 50.0), entry(stranger, None, 60, 80.0)];

        let grouped = group_by_client(&entries, &[acme]);
        assert_eq!(grouped[0].name, "Unknown client");
        assert_eq!(grouped[1].name, "Acme");
    }
}
