use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::billing::validate_hourly_rate;
use crate::error::{AppError, Result, ValidationError};
use crate::filters::matches_text;
use crate::models::{Client, Invoice, Project, TimeEntry};
use crate::store::Store;

#[derive(Debug, Clone, Default)]
pub struct ClientInput {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub hourly_rate: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ClientChange {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub hourly_rate: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientDeletion {
    pub entries: usize,
    pub projects: usize,
}

pub fn create_client<S: Store>(store: &mut S, input: ClientInput) -> Result<Client> {
    let client = Client {
        id: Uuid::new_v4(),
        user_id: store.user_id(),
        name: required_text(&input.name, "Client name")?,
        email: optional_email(input.email)?,
        phone: optional_text(input.phone),
        hourly_rate: validate_hourly_rate(input.hourly_rate)?,
        created_at: Utc::now(),
    };
    store.insert(&client)?;
    info!(client = %client.name, "created client");
    Ok(client)
}

/// Applies the given fields. Existing time entries keep the amount they were
/// written with; a new rate only affects later writes.
pub fn update_client<S: Store>(store: &mut S, id: Uuid, change: ClientChange) -> Result<Client> {
    let mut client: Client = store
        .get(id)?
        .ok_or_else(|| AppError::not_found("Client", id))?;
    if let Some(name) = change.name {
        client.name = required_text(&name, "Client name")?;
    }
    if change.email.is_some() {
        client.email = optional_email(change.email)?;
    }
    if change.phone.is_some() {
        client.phone = optional_text(change.phone);
    }
    if let Some(rate) = change.hourly_rate {
        client.hourly_rate = validate_hourly_rate(rate)?;
    }
    store.update(&client)?;
    info!(client = %client.name, "updated client");
    Ok(client)
}

/// Clients whose name or email contains `query`, sorted by name.
pub fn search_clients<S: Store>(store: &S, query: &str) -> Result<Vec<Client>> {
    let mut clients: Vec<Client> = store
        .list::<Client>()?
        .into_iter()
        .filter(|client| {
            matches_text(&client.name, query)
                || client
                    .email
                    .as_deref()
                    .is_some_and(|email| matches_text(email, query))
        })
        .collect();
    clients.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    Ok(clients)
}

pub fn find_client<S: Store>(store: &S, reference: &str) -> Result<Client> {
    let clients = store.list::<Client>()?;
    resolve_reference(clients, reference, "Client", |client| (client.id, &client.name))
}

/// Removes a client together with its projects and time entries.
///
/// Refused while invoices exist for the client. Rows are deleted one at a
/// time (entries, then projects, then the client) and nothing is restored if
/// a later step fails.
pub fn delete_client<S: Store>(store: &mut S, id: Uuid) -> Result<ClientDeletion> {
    let client: Client = store
        .get(id)?
        .ok_or_else(|| AppError::not_found("Client", id))?;

    let invoices = store
        .list::<Invoice>()?
        .into_iter()
        .filter(|invoice| invoice.client_id == id)
        .count();
    if invoices > 0 {
        return Err(ValidationError::Rejected(format!(
            "{} has {invoices} invoice(s); delete them first.",
            client.name
        ))
        .into());
    }

    let entries: Vec<Uuid> = store
        .list::<TimeEntry>()?
        .into_iter()
        .filter(|entry| entry.client_id == id)
        .map(|entry| entry.id)
        .collect();
    let projects: Vec<Uuid> = store
        .list::<Project>()?
        .into_iter()
        .filter(|project| project.client_id == id)
        .map(|project| project.id)
        .collect();

    let requested = entries.len() + projects.len() + 1;
    let mut completed = 0;
    for entry_id in &entries {
        store
            .delete::<TimeEntry>(*entry_id)
            .map_err(|err| AppError::partial(completed, requested, err))?;
        completed += 1;
    }
    for project_id in &projects {
        store
            .delete::<Project>(*project_id)
            .map_err(|err| AppError::partial(completed, requested, err))?;
        completed += 1;
    }
    store
        .delete::<Client>(id)
        .map_err(|err| AppError::partial(completed, requested, err))?;

    info!(client = %client.name, entries = entries.len(), projects = projects.len(), "deleted client");
    Ok(ClientDeletion {
        entries: entries.len(),
        projects: projects.len(),
    })
}

/// Finds one row by id, exact name (case-insensitive) or a unique name substring.
pub(crate) fn resolve_reference<T>(
    mut rows: Vec<T>,
    reference: &str,
    kind: &'static str,
    key: impl Fn(&T) -> (Uuid, &String),
) -> Result<T> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(ValidationError::MissingField(kind).into());
    }
    if let Ok(id) = Uuid::parse_str(reference) {
        return rows
            .into_iter()
            .find(|row| key(row).0 == id)
            .ok_or_else(|| AppError::not_found(kind, reference));
    }

    let exact = rows
        .iter()
        .position(|row| key(row).1.eq_ignore_ascii_case(reference));
    let mut matches: Vec<T> = match exact {
        Some(index) => vec![rows.swap_remove(index)],
        None => rows
            .into_iter()
            .filter(|row| matches_text(key(row).1, reference))
            .collect(),
    };

    match matches.len() {
        0 => Err(AppError::not_found(kind, reference)),
        1 => Ok(matches.remove(0)),
        count => Err(ValidationError::Rejected(format!(
            "'{reference}' matches {count} {}s; be more specific.",
            kind.to_lowercase()
        ))
        .into()),
    }
}

pub(crate) fn required_text(value: &str, field: &'static str) -> std::result::Result<String, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(value.to_string())
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn optional_email(value: Option<String>) -> std::result::Result<Option<String>, ValidationError> {
    match optional_text(value) {
        Some(email) if !email.contains('@') => Err(ValidationError::InvalidEmail(email)),
        other => Ok(other),
    }
}
