use std::collections::HashSet;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::billing::{BillableTime, amount_for, raw_minutes_from_seconds};
use crate::dates::local_to_utc;
use crate::error::{AppError, Result, ValidationError};
use crate::models::{Client, InvoiceLineItem, Project, TimeEntry};
use crate::rounding::RoundingOption;
use crate::store::Store;
use crate::timer::TimerCandidate;

/// Start of a manual entry that only states a duration.
pub const DEFAULT_DAY_START: (u32, u32) = (9, 0);

/// A worked interval and the raw minutes it bills, before rounding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub raw_minutes: u32,
}

impl Interval {
    /// Active time of a stopped timer; pauses are already excluded.
    pub fn from_candidate(candidate: &TimerCandidate) -> std::result::Result<Self, ValidationError> {
        if candidate.active_seconds <= 0 || candidate.end <= candidate.start {
            return Err(ValidationError::NonPositiveDuration);
        }
        Ok(Self {
            start: candidate.start,
            end: candidate.end,
            raw_minutes: raw_minutes_from_seconds(candidate.active_seconds),
        })
    }

    pub fn from_clock_times(
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    ) -> std::result::Result<Self, ValidationError> {
        if end <= start {
            return Err(ValidationError::EndNotAfterStart);
        }
        let start = local_to_utc(date, start);
        let end = local_to_utc(date, end);
        if end <= start {
            return Err(ValidationError::EndNotAfterStart);
        }
        Ok(Self {
            start,
            end,
            raw_minutes: raw_minutes_from_seconds((end - start).num_seconds()),
        })
    }

    pub fn from_duration(
        date: NaiveDate,
        hours: u32,
        minutes: u32,
        start: Option<NaiveTime>,
    ) -> std::result::Result<Self, ValidationError> {
        let total = hours
            .checked_mul(60)
            .and_then(|hours| hours.checked_add(minutes))
            .ok_or(ValidationError::Rejected("Duration is too long.".to_string()))?;
        if total == 0 {
            return Err(ValidationError::NonPositiveDuration);
        }
        let start = start
            .or_else(|| NaiveTime::from_hms_opt(DEFAULT_DAY_START.0, DEFAULT_DAY_START.1, 0))
            .unwrap_or(NaiveTime::MIN);
        let start = local_to_utc(date, start);
        Ok(Self {
            start,
            end: start + Duration::minutes(i64::from(total)),
            raw_minutes: total,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewEntry {
    pub client_id: Uuid,
    pub project_id: Option<Uuid>,
    pub interval: Interval,
    pub notes: Option<String>,
}

impl NewEntry {
    pub fn from_candidate(candidate: &TimerCandidate, notes: Option<String>) -> std::result::Result<Self, ValidationError> {
        Ok(Self {
            client_id: candidate.client_id,
            project_id: candidate.project_id,
            interval: Interval::from_candidate(candidate)?,
            notes,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct EntryChange {
    pub client_id: Option<Uuid>,
    /// `Some(None)` clears the project.
    pub project_id: Option<Option<Uuid>>,
    pub interval: Option<Interval>,
    pub notes: Option<String>,
}

/// Ids of entries already attached to an invoice line.
pub fn billed_entry_ids<S: Store>(store: &S) -> Result<HashSet<Uuid>> {
    Ok(store
        .list::<InvoiceLineItem>()?
        .into_iter()
        .flat_map(|line| line.time_entry_ids)
        .collect())
}

pub fn create_entry<S: Store>(store: &mut S, entry: NewEntry, rounding: RoundingOption) -> Result<TimeEntry> {
    let client = entry_client(store, entry.client_id)?;
    check_project(store, entry.project_id, client.id)?;
    if entry.interval.end <= entry.interval.start {
        return Err(ValidationError::EndNotAfterStart.into());
    }
    if entry.interval.raw_minutes == 0 {
        return Err(ValidationError::NonPositiveDuration.into());
    }

    let billable = BillableTime::from_raw_minutes(entry.interval.raw_minutes, rounding, client.hourly_rate);
    let row = TimeEntry {
        id: Uuid::new_v4(),
        user_id: store.user_id(),
        client_id: client.id,
        project_id: entry.project_id,
        start_time: entry.interval.start,
        end_time: entry.interval.end,
        duration_minutes: billable.billable_minutes,
        amount: billable.amount,
        notes: clean_notes(entry.notes),
        created_at: Utc::now(),
    };
    store.insert(&row)?;
    info!(
        client = %client.name,
        raw_minutes = billable.raw_minutes,
        billable_minutes = billable.billable_minutes,
        "recorded time entry"
    );
    Ok(row)
}

/// Rewrites an entry. The amount is always recomputed from the stored
/// duration and the (possibly new) client's current rate.
pub fn edit_entry<S: Store>(
    store: &mut S,
    id: Uuid,
    change: EntryChange,
    rounding: RoundingOption,
) -> Result<TimeEntry> {
    let mut entry = get_entry(store, id)?;
    ensure_unbilled(store, &entry)?;

    if let Some(client_id) = change.client_id {
        if client_id != entry.client_id && change.project_id.is_none() {
            entry.project_id = None;
        }
        entry.client_id = client_id;
    }
    if let Some(project_id) = change.project_id {
        entry.project_id = project_id;
    }
    let client = entry_client(store, entry.client_id)?;
    check_project(store, entry.project_id, client.id)?;

    if let Some(interval) = change.interval {
        if interval.end <= interval.start {
            return Err(ValidationError::EndNotAfterStart.into());
        }
        let billable = BillableTime::from_raw_minutes(interval.raw_minutes, rounding, client.hourly_rate);
        if billable.billable_minutes == 0 {
            return Err(ValidationError::NonPositiveDuration.into());
        }
        entry.start_time = interval.start;
        entry.end_time = interval.end;
        entry.duration_minutes = billable.billable_minutes;
    }
    entry.amount = amount_for(entry.duration_minutes, client.hourly_rate);
    if change.notes.is_some() {
        entry.notes = clean_notes(change.notes);
    }

    store.update(&entry)?;
    info!(entry = %entry.id, "updated time entry");
    Ok(entry)
}

pub fn delete_entry<S: Store>(store: &mut S, id: Uuid) -> Result<()> {
    let entry = get_entry(store, id)?;
    ensure_unbilled(store, &entry)?;
    store.delete::<TimeEntry>(id)?;
    info!(entry = %id, "deleted time entry");
    Ok(())
}

/// Deletes entries one by one, stopping at the first failure. Entries deleted
/// before the failure stay deleted.
pub fn bulk_delete<S: Store>(store: &mut S, ids: &[Uuid]) -> Result<usize> {
    for (completed, id) in ids.iter().enumerate() {
        delete_entry(store, *id).map_err(|err| AppError::partial(completed, ids.len(), err))?;
    }
    Ok(ids.len())
}

/// Reassigns entries to another client/project one by one, with the same
/// stop-at-first-failure behaviour as [`bulk_delete`].
pub fn bulk_move<S: Store>(
    store: &mut S,
    ids: &[Uuid],
    client_id: Option<Uuid>,
    project_id: Option<Option<Uuid>>,
    rounding: RoundingOption,
) -> Result<usize> {
    for (completed, id) in ids.iter().enumerate() {
        let change = EntryChange {
            client_id,
            project_id,
            ..EntryChange::default()
        };
        edit_entry(store, *id, change, rounding)
            .map_err(|err| AppError::partial(completed, ids.len(), err))?;
    }
    Ok(ids.len())
}

pub fn get_entry<S: Store>(store: &S, id: Uuid) -> Result<TimeEntry> {
    store
        .get::<TimeEntry>(id)?
        .ok_or_else(|| AppError::not_found("Time entry", id))
}

/// Resolves a full id or a unique id prefix as shown in listings.
pub fn find_entry<S: Store>(store: &S, reference: &str) -> Result<TimeEntry> {
    let reference = reference.trim().to_lowercase();
    if reference.is_empty() {
        return Err(ValidationError::MissingField("Entry id").into());
    }
    let mut matches: Vec<TimeEntry> = store
        .list::<TimeEntry>()?
        .into_iter()
        .filter(|entry| entry.id.to_string().starts_with(&reference))
        .collect();
    match matches.len() {
        0 => Err(AppError::not_found("Time entry", reference)),
        1 => Ok(matches.remove(0)),
        _ => Err(ValidationError::Rejected(format!("Entry id '{reference}' is ambiguous.")).into()),
    }
}

fn entry_client<S: Store>(store: &S, client_id: Uuid) -> Result<Client> {
    store
        .get::<Client>(client_id)?
        .ok_or_else(|| AppError::not_found("Client", client_id))
}

fn check_project<S: Store>(store: &S, project_id: Option<Uuid>, client_id: Uuid) -> Result<()> {
    let Some(project_id) = project_id else {
        return Ok(());
    };
    let project: Project = store
        .get(project_id)?
        .ok_or_else(|| AppError::not_found("Project", project_id))?;
    if project.client_id != client_id {
        return Err(ValidationError::Rejected(format!(
            "Project {} belongs to a different client.",
            project.name
        ))
        .into());
    }
    Ok(())
}

fn ensure_unbilled<S: Store>(store: &S, entry: &TimeEntry) -> Result<()> {
    if billed_entry_ids(store)?.contains(&entry.id) {
        return Err(ValidationError::Rejected(
            "This entry is on an invoice; delete the invoice first.".to_string(),
        )
        .into());
    }
    Ok(())
}

fn clean_notes(notes: Option<String>) -> Option<String> {
    notes
        .map(|notes| notes.trim().to_string())
        .filter(|notes| !notes.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{ClientInput, create_client};
    use crate::projects::create_project;
    use crate::store::MemoryStore;
    use crate::store::testing::FlakyStore;
    use chrono::TimeZone;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 3).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn setup(rate: f64) -> (MemoryStore, Client) {
        let mut store = MemoryStore::new(Uuid::new_v4());
        let client = create_client(
            &mut store,
            ClientInput {
                name: "Acme".to_string(),
                hourly_rate: rate,
                ..ClientInput::default()
            },
        )
        .unwrap();
        (store, client)
    }

    fn manual(client: &Client, start: NaiveTime, end: NaiveTime) -> NewEntry {
        NewEntry {
            client_id: client.id,
            project_id: None,
            interval: Interval::from_clock_times(day(), start, end).unwrap(),
            notes: None,
        }
    }

    #[test]
    fn clock_times_must_be_ordered() {
        assert_eq!(
            Interval::from_clock_times(day(), time(10, 0), time(9, 0)),
            Err(ValidationError::EndNotAfterStart)
        );
        assert_eq!(
            Interval::from_clock_times(day(), time(10, 0), time(10, 0)),
            Err(ValidationError::EndNotAfterStart)
        );
        let interval = Interval::from_clock_times(day(), time(8, 15), time(9, 45)).unwrap();
        assert_eq!(interval.raw_minutes, 90);
    }

    #[test]
    fn explicit_duration_must_be_positive() {
        assert_eq!(
            Interval::from_duration(day(), 0, 0, None),
            Err(ValidationError::NonPositiveDuration)
        );
        let interval = Interval::from_duration(day(), 2, 30, None).unwrap();
        assert_eq!(interval.raw_minutes, 150);
        assert_eq!((interval.end - interval.start).num_minutes(), 150);
        assert_eq!(interval.start, local_to_utc(day(), time(9, 0)));
    }

    #[test]
    fn manual_entry_is_rounded_and_priced() {
        let (mut store, client) = setup(40.0);
        let entry = create_entry(
            &mut store,
            manual(&client, time(9, 0), time(9, 46)),
            RoundingOption::FifteenMinutes,
        )
        .unwrap();
        assert_eq!(entry.duration_minutes, 60);
        assert!((entry.amount - 40.0).abs() < 0.001);
    }

    #[test]
    fn timer_and_manual_paths_share_pipeline() {
        let (mut store, client) = setup(40.0);
        let start = Utc.with_ymd_and_hms(2026, 2, 3, 9, 0, 0).unwrap();
        let candidate = TimerCandidate {
            client_id: client.id,
            project_id: None,
            start,
            end: start + Duration::minutes(100),
            active_seconds: 90 * 60,
        };
        let from_timer = create_entry(
            &mut store,
            NewEntry::from_candidate(&candidate, Some(" fixed sink ".to_string())).unwrap(),
            RoundingOption::None,
        )
        .unwrap();
        assert_eq!(from_timer.duration_minutes, 90);
        assert!((from_timer.amount - 60.0).abs() < 0.001);
        assert_eq!(from_timer.notes.as_deref(), Some("fixed sink"));

        let from_duration = create_entry(
            &mut store,
            NewEntry {
                client_id: client.id,
                project_id: None,
                interval: Interval::from_duration(day(), 1, 30, None).unwrap(),
                notes: None,
            },
            RoundingOption::None,
        )
        .unwrap();
        assert_eq!(from_duration.duration_minutes, from_timer.duration_minutes);
        assert_eq!(from_duration.amount, from_timer.amount);
    }

    #[test]
    fn project_must_belong_to_client() {
        let (mut store, client) = setup(40.0);
        let other = create_client(
            &mut store,
            ClientInput {
                name: "Bolt".to_string(),
                hourly_rate: 60.0,
                ..ClientInput::default()
            },
        )
        .unwrap();
        let project = create_project(&mut store, other.id, "Panel", None).unwrap();
        let mut entry = manual(&client, time(9, 0), time(10, 0));
        entry.project_id = Some(project.id);
        assert!(matches!(
            create_entry(&mut store, entry, RoundingOption::None),
            Err(AppError::Validation(ValidationError::Rejected(_)))
        ));
    }

    #[test]
    fn edit_recomputes_amount_with_new_client_rate() {
        let (mut store, client) = setup(40.0);
        let other = create_client(
            &mut store,
            ClientInput {
                name: "Bolt".to_string(),
                hourly_rate: 100.0,
                ..ClientInput::default()
            },
        )
        .unwrap();
        let entry = create_entry(&mut store, manual(&client, time(9, 0), time(10, 30)), RoundingOption::None)
            .unwrap();

        let change = EntryChange {
            client_id: Some(other.id),
            ..EntryChange::default()
        };
        let edited = edit_entry(&mut store, entry.id, change, RoundingOption::None).unwrap();
        assert_eq!(edited.duration_minutes, 90);
        assert!((edited.amount - 150.0).abs() < 0.001);
    }

    #[test]
    fn edit_interval_reapplies_rounding() {
        let (mut store, client) = setup(60.0);
        let entry = create_entry(&mut store, manual(&client, time(9, 0), time(10, 0)), RoundingOption::None)
            .unwrap();
        let change = EntryChange {
            interval: Some(Interval::from_clock_times(day(), time(9, 0), time(9, 10)).unwrap()),
            notes: Some("short visit".to_string()),
            ..EntryChange::default()
        };
        let edited = edit_entry(&mut store, entry.id, change, RoundingOption::ThirtyMinutes).unwrap();
        assert_eq!(edited.duration_minutes, 30);
        assert!((edited.amount - 30.0).abs() < 0.001);
        assert_eq!(edited.notes.as_deref(), Some("short visit"));
    }

    #[test]
    fn billed_entries_cannot_change() {
        let (mut store, client) = setup(40.0);
        let entry = create_entry(&mut store, manual(&client, time(9, 0), time(10, 0)), RoundingOption::None)
            .unwrap();
        let line = InvoiceLineItem {
            id: Uuid::new_v4(),
            user_id: store.user_id(),
            invoice_id: Uuid::new_v4(),
            description: "Work".to_string(),
            time_entry_ids: vec![entry.id],
            minutes: 60,
            rate: 40.0,
            amount: 40.0,
        };
        store.insert(&line).unwrap();

        assert!(delete_entry(&mut store, entry.id).is_err());
        assert!(edit_entry(&mut store, entry.id, EntryChange::default(), RoundingOption::None).is_err());
    }

    #[test]
    fn bulk_delete_reports_partial_progress() {
        let (mut memory, client) = setup(40.0);
        let mut ids = Vec::new();
        for hour in 8..11 {
            let entry = create_entry(
                &mut memory,
                manual(&client, time(hour, 0), time(hour, 30)),
                RoundingOption::None,
            )
            .unwrap();
            ids.push(entry.id);
        }

        let mut store = FlakyStore::new(memory, 2);
        let err = bulk_delete(&mut store, &ids).unwrap_err();
        assert!(matches!(
            err,
            AppError::Partial {
                completed: 2,
                requested: 3,
                ..
            }
        ));
        assert_eq!(store.list::<TimeEntry>().unwrap().len(), 1);
    }

    #[test]
    fn bulk_move_reassigns_all() {
        let (mut store, client) = setup(40.0);
        let project = create_project(&mut store, client.id, "Roof", None).unwrap();
        let first = create_entry(&mut store, manual(&client, time(8, 0), time(9, 0)), RoundingOption::None)
            .unwrap();
        let second = create_entry(&mut store, manual(&client, time(10, 0), time(11, 0)), RoundingOption::None)
            .unwrap();

        let moved = bulk_move(
            &mut store,
            &[first.id, second.id],
            None,
            Some(Some(project.id)),
            RoundingOption::None,
        )
        .unwrap();
        assert_eq!(moved, 2);
        assert!(store
            .list::<TimeEntry>()
            .unwrap()
            .iter()
            .all(|entry| entry.project_id == Some(project.id)));
    }

    #[test]
    fn find_entry_by_prefix() {
        let (mut store, client) = setup(40.0);
        let entry = create_entry(&mut store, manual(&client, time(8, 0), time(9, 0)), RoundingOption::None)
            .unwrap();
        let prefix = &entry.id.to_string()[..8];
        assert_eq!(find_entry(&store, prefix).unwrap().id, entry.id);
        assert!(find_entry(&store, "").is_err());
    }
}
