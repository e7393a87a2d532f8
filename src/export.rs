use std::collections::HashMap;
use std::fmt::Write;

use chrono::Local;
use uuid::Uuid;

use crate::invoices::InvoiceDetails;
use crate::models::{Project, TimeEntry};

pub fn entries_csv(entries: &[&TimeEntry], client_names: &HashMap<Uuid, String>, projects: &[Project]) -> String {
    let project_names: HashMap<Uuid, &str> = projects
        .iter()
        .map(|project| (project.id, project.name.as_str()))
        .collect();

    let mut csv = String::new();
    let _ = writeln!(csv, "date,client,project,start,end,minutes,amount,notes");
    for entry in entries {
        let start = entry.start_time.with_timezone(&Local);
        let end = entry.end_time.with_timezone(&Local);
        let client = client_names
            .get(&entry.client_id)
            .map(String::as_str)
            .unwrap_or("");
        let project = entry
            .project_id
            .and_then(|id| project_names.get(&id).copied())
            .unwrap_or("");
        let _ = writeln!(
            csv,
            "{},{},{},{},{},{},{:.2},{}",
            start.format("%Y-%m-%d"),
            csv_escape(client),
            csv_escape(project),
            start.format("%H:%M"),
            end.format("%H:%M"),
            entry.duration_minutes,
            entry.amount,
            csv_escape(entry.notes.as_deref().unwrap_or("")),
        );
    }
    csv
}

/// Invoice header fields, a blank line, then one row per line item.
pub fn invoice_csv(details: &InvoiceDetails, currency: &str) -> String {
    let invoice = &details.invoice;
    let client = details
        .client
        .as_ref()
        .map(|client| client.name.as_str())
        .unwrap_or("");
    let date = |value: Option<chrono::NaiveDate>| {
        value
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_default()
    };

    let mut csv = String::new();
    let _ = writeln!(csv, "invoice_number,client,issue_date,due_date,payment_date,currency,total");
    let _ = writeln!(
        csv,
        "{},{},{},{},{},{},{:.2}",
        csv_escape(&invoice.invoice_number),
        csv_escape(client),
        invoice.issue_date.format("%Y-%m-%d"),
        date(invoice.due_date),
        date(invoice.payment_date),
        currency,
        invoice.total_amount,
    );
    let _ = writeln!(csv);
    let _ = writeln!(csv, "description,entries,minutes,rate,amount");
    for line in &details.lines {
        let _ = writeln!(
            csv,
            "{},{},{},{:.2},{:.2}",
            csv_escape(&line.description),
            line.time_entry_ids.len(),
            line.minutes,
            line.rate,
            line.amount,
        );
    }
    csv
}

fn csv_escape(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
