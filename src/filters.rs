use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::dates::local_date;
use crate::error::{AppError, Result, ValidationError};
use crate::models::{Client, ReportFilter, TimeEntry};
use crate::store::Store;

/// Case-insensitive substring match; an empty query matches everything.
pub fn matches_text(haystack: &str, query: &str) -> bool {
    let query = query.trim();
    query.is_empty() || haystack.to_lowercase().contains(&query.to_lowercase())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billed: Option<bool>,
}

impl EntryFilter {
    pub fn matches(
        &self,
        entry: &TimeEntry,
        client_name: &str,
        billed_entries: &HashSet<Uuid>,
    ) -> bool {
        if let Some(query) = &self.client_query {
            if !matches_text(client_name, query) {
                return false;
            }
        }
        if self.project_id.is_some() && entry.project_id != self.project_id {
            return false;
        }
        let date = local_date(entry.start_time);
        if self.from.is_some_and(|from| date < from) || self.to.is_some_and(|to| date > to) {
            return false;
        }
        if let Some(billed) = self.billed {
            if billed_entries.contains(&entry.id) != billed {
                return false;
            }
        }
        true
    }

    /// Entries passing the filter, in input order.
    pub fn apply<'a>(
        &self,
        entries: &'a [TimeEntry],
        client_names: &HashMap<Uuid, String>,
        billed_entries: &HashSet<Uuid>,
    ) -> Vec<&'a TimeEntry> {
        entries
            .iter()
            .filter(|entry| {
                let name = client_names
                    .get(&entry.client_id)
                    .map(String::as_str)
                    .unwrap_or("");
                self.matches(entry, name, billed_entries)
            })
            .collect()
    }
}

pub fn client_names(clients: &[Client]) -> HashMap<Uuid, String> {
    clients
        .iter()
        .map(|client| (client.id, client.name.clone()))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    Date,
    Duration,
    Amount,
    Client,
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "date" => Ok(SortField::Date),
            "duration" => Ok(SortField::Duration),
            "amount" => Ok(SortField::Amount),
            "client" => Ok(SortField::Client),
            other => Err(format!(
                "Unknown sort field '{other}'. Use date, duration, amount or client."
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

pub fn sort_entries(
    entries: &mut [&TimeEntry],
    client_names: &HashMap<Uuid, String>,
    field: SortField,
    order: SortOrder,
) {
    let name = |entry: &TimeEntry| {
        client_names
            .get(&entry.client_id)
            .map(|name| name.to_lowercase())
            .unwrap_or_default()
    };
    entries.sort_by(|a, b| {
        let ordering = match field {
            SortField::Date => a.start_time.cmp(&b.start_time),
            SortField::Duration => a.duration_minutes.cmp(&b.duration_minutes),
            SortField::Amount => a.amount.partial_cmp(&b.amount).unwrap_or(Ordering::Equal),
            SortField::Client => name(a).cmp(&name(b)),
        }
        .then_with(|| a.start_time.cmp(&b.start_time));
        match order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
}

pub fn save_filter<S: Store>(store: &mut S, name: &str, filter: EntryFilter) -> Result<ReportFilter> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::MissingField("Filter name").into());
    }
    let existing = store
        .list::<ReportFilter>()?
        .into_iter()
        .find(|saved| saved.name.eq_ignore_ascii_case(name));

    let saved = match existing {
        Some(mut saved) => {
            saved.filter = filter;
            store.update(&saved)?;
            saved
        }
        None => {
            let saved = ReportFilter {
                id: Uuid::new_v4(),
                user_id: store.user_id(),
                name: name.to_string(),
                filter,
                created_at: Utc::now(),
            };
            store.insert(&saved)?;
            saved
        }
    };
    info!(name = %saved.name, "saved report filter");
    Ok(saved)
}

pub fn find_filter<S: Store>(store: &S, name: &str) -> Result<ReportFilter> {
    store
        .list::<ReportFilter>()?
        .into_iter()
        .find(|saved| saved.name.eq_ignore_ascii_case(name.trim()))
        .ok_or_else(|| AppError::not_found("Saved filter", name))
}

pub fn list_filters<S: Store>(store: &S) -> Result<Vec<ReportFilter>> {
    let mut filters = store.list::<ReportFilter>()?;
    filters.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    Ok(filters)
}

pub fn delete_filter<S: Store>(store: &mut S, name: &str) -> Result<()> {
    let saved = find_filter(store, name)?;
    store.delete::<ReportFilter>(saved.id)?;
    info!(name = %saved.name, "deleted report filter");
    Ok(())
}
