use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::dates::{DateRange, local_date};
use crate::entries::billed_entry_ids;
use crate::error::{AppError, Result, ValidationError};
use crate::filters::{SortOrder, matches_text};
use crate::grouping::group_by_project;
use crate::models::{Client, Invoice, InvoiceLineItem, Project, TimeEntry};
use crate::store::Store;

const NUMBER_PREFIX: &str = "INV-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Paid,
    Unpaid,
    Overdue,
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Unpaid => "unpaid",
            InvoiceStatus::Overdue => "overdue",
        };
        f.write_str(label)
    }
}

impl FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "paid" => Ok(InvoiceStatus::Paid),
            "unpaid" => Ok(InvoiceStatus::Unpaid),
            "overdue" => Ok(InvoiceStatus::Overdue),
            other => Err(format!(
                "Unknown invoice status '{other}'. Use paid, unpaid or overdue."
            )),
        }
    }
}

/// Paid once a payment date exists, overdue only when the due date is
/// strictly before `today`.
pub fn derive_status(
    payment_date: Option<NaiveDate>,
    due_date: Option<NaiveDate>,
    today: NaiveDate,
) -> InvoiceStatus {
    if payment_date.is_some() {
        return InvoiceStatus::Paid;
    }
    match due_date {
        Some(due) if due < today => InvoiceStatus::Overdue,
        _ => InvoiceStatus::Unpaid,
    }
}

impl Invoice {
    pub fn status(&self, today: NaiveDate) -> InvoiceStatus {
        derive_status(self.payment_date, self.due_date, today)
    }
}

#[derive(Debug, Clone)]
pub struct InvoiceRequest {
    pub client_id: Uuid,
    pub range: DateRange,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InvoiceDetails {
    pub invoice: Invoice,
    pub client: Option<Client>,
    pub lines: Vec<InvoiceLineItem>,
}

/// Highest `INV-NNNN` number in use plus one.
pub fn next_invoice_number(invoices: &[Invoice]) -> String {
    let highest = invoices
        .iter()
        .filter_map(|invoice| number_value(&invoice.invoice_number))
        .max()
        .unwrap_or(0);
    format!("{NUMBER_PREFIX}{:04}", highest + 1)
}

fn number_value(invoice_number: &str) -> Option<u32> {
    invoice_number.strip_prefix(NUMBER_PREFIX)?.parse().ok()
}

/// Bills every unbilled entry of the client within the range, one line per
/// project. Line amounts are sums of the entries' stored amounts.
pub fn generate_invoice<S: Store>(store: &mut S, request: InvoiceRequest) -> Result<InvoiceDetails> {
    let client: Client = store
        .get(request.client_id)?
        .ok_or_else(|| AppError::not_found("Client", request.client_id))?;
    if request
        .due_date
        .is_some_and(|due| due < request.issue_date)
    {
        return Err(ValidationError::Rejected("Due date cannot be before the issue date.".to_string()).into());
    }

    let billed = billed_entry_ids(store)?;
    let entries: Vec<TimeEntry> = store
        .list::<TimeEntry>()?
        .into_iter()
        .filter(|entry| entry.client_id == client.id)
        .filter(|entry| request.range.contains(local_date(entry.start_time)))
        .filter(|entry| !billed.contains(&entry.id))
        .collect();
    if entries.is_empty() {
        return Err(ValidationError::Rejected(format!(
            "No unbilled time for {} in {}.",
            client.name,
            request.range.label()
        ))
        .into());
    }

    let projects = store.list::<Project>()?;
    let invoice_id = Uuid::new_v4();
    let user_id = store.user_id();
    let lines: Vec<InvoiceLineItem> = group_by_project(&entries, &projects)
        .into_iter()
        .map(|group| InvoiceLineItem {
            id: Uuid::new_v4(),
            user_id,
            invoice_id,
            description: group.name,
            time_entry_ids: group.entry_ids,
            minutes: group.minutes,
            rate: client.hourly_rate,
            amount: group.amount,
        })
        .collect();

    let invoice = Invoice {
        id: invoice_id,
        user_id,
        client_id: client.id,
        invoice_number: next_invoice_number(&store.list::<Invoice>()?),
        issue_date: request.issue_date,
        due_date: request.due_date,
        total_amount: lines.iter().map(|line| line.amount).sum(),
        payment_date: None,
        payment_method: None,
        notes: request
            .notes
            .map(|notes| notes.trim().to_string())
            .filter(|notes| !notes.is_empty()),
        created_at: Utc::now(),
    };

    let requested = lines.len() + 1;
    store.insert(&invoice)?;
    for (index, line) in lines.iter().enumerate() {
        store
            .insert(line)
            .map_err(|err| AppError::partial(index + 1, requested, err))?;
    }
    info!(
        invoice = %invoice.invoice_number,
        client = %client.name,
        entries = entries.len(),
        "generated invoice"
    );
    Ok(InvoiceDetails {
        invoice,
        client: Some(client),
        lines,
    })
}

pub fn mark_paid<S: Store>(
    store: &mut S,
    id: Uuid,
    payment_date: NaiveDate,
    method: Option<String>,
) -> Result<Invoice> {
    let mut invoice = get_invoice(store, id)?;
    if payment_date < invoice.issue_date {
        return Err(ValidationError::Rejected("Payment date cannot be before the issue date.".to_string()).into());
    }
    invoice.payment_date = Some(payment_date);
    invoice.payment_method = method
        .map(|method| method.trim().to_string())
        .filter(|method| !method.is_empty());
    store.update(&invoice)?;
    info!(invoice = %invoice.invoice_number, "marked invoice paid");
    Ok(invoice)
}

pub fn mark_unpaid<S: Store>(store: &mut S, id: Uuid) -> Result<Invoice> {
    let mut invoice = get_invoice(store, id)?;
    invoice.payment_date = None;
    invoice.payment_method = None;
    store.update(&invoice)?;
    info!(invoice = %invoice.invoice_number, "marked invoice unpaid");
    Ok(invoice)
}

/// Deletes the line items one at a time and then the invoice. A failure part
/// way leaves the earlier deletions in place; the entries of deleted lines
/// become billable again.
pub fn delete_invoice<S: Store>(store: &mut S, id: Uuid) -> Result<usize> {
    let invoice = get_invoice(store, id)?;
    let lines = invoice_lines(store, id)?;
    let requested = lines.len() + 1;
    for (completed, line) in lines.iter().enumerate() {
        store
            .delete::<InvoiceLineItem>(line.id)
            .map_err(|err| AppError::partial(completed, requested, err))?;
    }
    store
        .delete::<Invoice>(id)
        .map_err(|err| AppError::partial(lines.len(), requested, err))?;
    info!(invoice = %invoice.invoice_number, lines = lines.len(), "deleted invoice");
    Ok(lines.len())
}

pub fn get_invoice<S: Store>(store: &S, id: Uuid) -> Result<Invoice> {
    store
        .get::<Invoice>(id)?
        .ok_or_else(|| AppError::not_found("Invoice", id))
}

/// Looks an invoice up by id or by number (`INV-0007`, `inv-7` and `7` all work).
pub fn find_invoice<S: Store>(store: &S, reference: &str) -> Result<Invoice> {
    let reference = reference.trim();
    if let Ok(id) = Uuid::parse_str(reference) {
        return get_invoice(store, id);
    }
    let upper = reference.to_ascii_uppercase();
    let wanted = upper
        .strip_prefix(NUMBER_PREFIX)
        .unwrap_or(&upper)
        .parse::<u32>()
        .ok();
    store
        .list::<Invoice>()?
        .into_iter()
        .find(|invoice| {
            invoice.invoice_number.eq_ignore_ascii_case(reference)
                || wanted.is_some_and(|number| {
                    invoice
                        .invoice_number
                        .strip_prefix(NUMBER_PREFIX)
                        .and_then(|digits| digits.parse::<u32>().ok())
                        == Some(number)
                })
        })
        .ok_or_else(|| AppError::not_found("Invoice", reference))
}

pub fn invoice_lines<S: Store>(store: &S, invoice_id: Uuid) -> Result<Vec<InvoiceLineItem>> {
    Ok(store
        .list::<InvoiceLineItem>()?
        .into_iter()
        .filter(|line| line.invoice_id == invoice_id)
        .collect())
}

pub fn invoice_details<S: Store>(store: &S, invoice: Invoice) -> Result<InvoiceDetails> {
    let client = store.get::<Client>(invoice.client_id)?;
    let lines = invoice_lines(store, invoice.id)?;
    Ok(InvoiceDetails {
        invoice,
        client,
        lines,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvoiceSort {
    #[default]
    Number,
    DueDate,
    Total,
}

impl FromStr for InvoiceSort {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "number" => Ok(InvoiceSort::Number),
            "due" | "due-date" => Ok(InvoiceSort::DueDate),
            "total" => Ok(InvoiceSort::Total),
            other => Err(format!("Unknown sort field '{other}'. Use number, due or total.")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InvoiceQuery {
    pub status: Option<InvoiceStatus>,
    pub client_query: Option<String>,
    pub sort: InvoiceSort,
    pub order: SortOrder,
}

#[derive(Debug, Clone)]
pub struct InvoiceRow {
    pub invoice: Invoice,
    pub client_name: String,
    pub status: InvoiceStatus,
}

pub fn list_invoices<S: Store>(store: &S, query: &InvoiceQuery, today: NaiveDate) -> Result<Vec<InvoiceRow>> {
    let clients = store.list::<Client>()?;
    let mut rows: Vec<InvoiceRow> = store
        .list::<Invoice>()?
        .into_iter()
        .map(|invoice| {
            let client_name = clients
                .iter()
                .find(|client| client.id == invoice.client_id)
                .map(|client| client.name.clone())
                .unwrap_or_default();
            let status = invoice.status(today);
            InvoiceRow {
                invoice,
                client_name,
                status,
            }
        })
        .filter(|row| query.status.is_none_or(|status| row.status == status))
        .filter(|row| {
            query
                .client_query
                .as_deref()
                .is_none_or(|text| matches_text(&row.client_name, text))
        })
        .collect();

    rows.sort_by(|a, b| {
        let ordering = match query.sort {
            InvoiceSort::Number => number_value(&a.invoice.invoice_number)
                .cmp(&number_value(&b.invoice.invoice_number))
                .then_with(|| a.invoice.invoice_number.cmp(&b.invoice.invoice_number)),
            // Invoices without a due date sort last in ascending order.
            InvoiceSort::DueDate => match (a.invoice.due_date, b.invoice.due_date) {
                (Some(left), Some(right)) => left.cmp(&right),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            },
            InvoiceSort::Total => a.invoice.total_amount.total_cmp(&b.invoice.total_amount),
        };
        match query.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
    Ok(rows)
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InvoiceSummary {
    pub outstanding: f64,
    pub overdue: f64,
    pub paid: f64,
    pub overdue_count: usize,
}

pub fn summarize_invoices(invoices: &[Invoice], today: NaiveDate) -> InvoiceSummary {
    invoices
        .iter()
        .fold(InvoiceSummary::default(), |mut summary, invoice| {
            match invoice.status(today) {
                InvoiceStatus::Paid => summary.paid += invoice.total_amount,
                InvoiceStatus::Unpaid => summary.outstanding += invoice.total_amount,
                InvoiceStatus::Overdue => {
                    summary.outstanding += invoice.total_amount;
                    summary.overdue += invoice.total_amount;
                    summary.overdue_count += 1;
                }
            }
            summary
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{ClientInput, create_client};
    use crate::entries::{Interval, NewEntry, create_entry};
    use crate::projects::create_project;
    use crate::rounding::RoundingOption;
    use crate::store::MemoryStore;
    use crate::store::testing::FlakyStore;
    use chrono::NaiveTime;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    fn record(store: &mut MemoryStore, client: &Client, project_id: Option<Uuid>, day: u32, minutes: u32) {
        let entry = NewEntry {
            client_id: client.id,
            project_id,
            interval: Interval::from_duration(date(day), 0, minutes, NaiveTime::from_hms_opt(10, 0, 0)).unwrap(),
            notes: None,
        };
        create_entry(store, entry, RoundingOption::None).unwrap();
    }

    fn setup() -> (MemoryStore, Client) {
        let mut store = MemoryStore::new(Uuid::new_v4());
        let client = create_client(
            &mut store,
            ClientInput {
                name: "Acme".to_string(),
                hourly_rate: 60.0,
                ..ClientInput::default()
            },
        )
        .unwrap();
        (store, client)
    }

    fn request(client: &Client) -> InvoiceRequest {
        InvoiceRequest {
            client_id: client.id,
            range: DateRange::from_bounds(date(1), date(31)).unwrap(),
            issue_date: date(31),
            due_date: Some(date(31) + chrono::Duration::days(14)),
            notes: None,
        }
    }

    #[test]
    fn status_derivation() {
        let today = date(10);
        assert_eq!(derive_status(Some(date(1)), Some(date(2)), today), InvoiceStatus::Paid);
        assert_eq!(derive_status(None, Some(date(9)), today), InvoiceStatus::Overdue);
        assert_eq!(derive_status(None, Some(today), today), InvoiceStatus::Unpaid);
        assert_eq!(derive_status(None, Some(date(11)), today), InvoiceStatus::Unpaid);
        assert_eq!(derive_status(None, None, today), InvoiceStatus::Unpaid);
    }

    #[test]
    fn numbers_continue_from_highest() {
        let (mut store, client) = setup();
        record(&mut store, &client, None, 2, 60);
        let first = generate_invoice(&mut store, request(&client)).unwrap();
        assert_eq!(first.invoice.invoice_number, "INV-0001");

        let mut renamed = first.invoice.clone();
        renamed.invoice_number = "INV-0041".to_string();
        assert_eq!(next_invoice_number(&[renamed]), "INV-0042");
        assert_eq!(next_invoice_number(&[]), "INV-0001");
    }

    #[test]
    fn generate_groups_lines_per_project() {
        let (mut store, client) = setup();
        let roof = create_project(&mut store, client.id, "Roof", None).unwrap();
        record(&mut store, &client, Some(roof.id), 2, 90);
        record(&mut store, &client, Some(roof.id), 3, 30);
        record(&mut store, &client, None, 4, 45);

        let details = generate_invoice(&mut store, request(&client)).unwrap();
        assert_eq!(details.lines.len(), 2);
        assert_eq!(details.lines[0].description, "Roof");
        assert_eq!(details.lines[0].minutes, 120);
        assert!((details.lines[0].amount - 120.0).abs() < 0.001);
        assert_eq!(details.lines[1].description, "No project");
        assert!((details.invoice.total_amount - 165.0).abs() < 0.001);
        assert_eq!(store.list::<InvoiceLineItem>().unwrap().len(), 2);
    }

    #[test]
    fn billed_entries_are_not_invoiced_twice() {
        let (mut store, client) = setup();
        record(&mut store, &client, None, 2, 60);
        generate_invoice(&mut store, request(&client)).unwrap();
        assert!(matches!(
            generate_invoice(&mut store, request(&client)),
            Err(AppError::Validation(ValidationError::Rejected(_)))
        ));

        record(&mut store, &client, None, 5, 30);
        let second = generate_invoice(&mut store, request(&client)).unwrap();
        assert_eq!(second.invoice.invoice_number, "INV-0002");
        assert!((second.invoice.total_amount - 30.0).abs() < 0.001);
    }

    #[test]
    fn entries_outside_range_are_skipped() {
        let (mut store, client) = setup();
        record(&mut store, &client, None, 2, 60);
        let mut request = request(&client);
        request.range = DateRange::from_single(date(20));
        assert!(generate_invoice(&mut store, request).is_err());
    }

    #[test]
    fn pay_and_unpay_flip_derived_status() {
        let (mut store, client) = setup();
        record(&mut store, &client, None, 2, 60);
        let invoice = generate_invoice(&mut store, request(&client)).unwrap().invoice;
        let late = date(31) + chrono::Duration::days(30);
        assert_eq!(invoice.status(late), InvoiceStatus::Overdue);

        let paid = mark_paid(&mut store, invoice.id, late, Some("cheque".to_string())).unwrap();
        assert_eq!(paid.status(late), InvoiceStatus::Paid);
        assert!(mark_paid(&mut store, invoice.id, date(1), None).is_err());

        let unpaid = mark_unpaid(&mut store, invoice.id).unwrap();
        assert_eq!(unpaid.status(late), InvoiceStatus::Overdue);
        assert!(unpaid.payment_method.is_none());
    }

    #[test]
    fn delete_frees_entries_for_rebilling() {
        let (mut store, client) = setup();
        record(&mut store, &client, None, 2, 60);
        let invoice = generate_invoice(&mut store, request(&client)).unwrap().invoice;
        assert_eq!(delete_invoice(&mut store, invoice.id).unwrap(), 1);
        assert!(store.list::<Invoice>().unwrap().is_empty());
        assert!(generate_invoice(&mut store, request(&client)).is_ok());
    }

    #[test]
    fn delete_stops_part_way_without_rollback() {
        let (mut memory, client) = setup();
        let roof = create_project(&mut memory, client.id, "Roof", None).unwrap();
        record(&mut memory, &client, Some(roof.id), 2, 60);
        record(&mut memory, &client, None, 3, 60);
        let invoice = generate_invoice(&mut memory, request(&client)).unwrap().invoice;

        let mut store = FlakyStore::new(memory, 1);
        let err = delete_invoice(&mut store, invoice.id).unwrap_err();
        assert!(matches!(
            err,
            AppError::Partial {
                completed: 1,
                requested: 3,
                ..
            }
        ));
        assert_eq!(store.list::<InvoiceLineItem>().unwrap().len(), 1);
        assert_eq!(store.list::<Invoice>().unwrap().len(), 1);
    }

    #[test]
    fn find_by_number_variants() {
        let (mut store, client) = setup();
        record(&mut store, &client, None, 2, 60);
        let invoice = generate_invoice(&mut store, request(&client)).unwrap().invoice;
        for reference in ["INV-0001", "inv-0001", "1", invoice.id.to_string().as_str()] {
            assert_eq!(find_invoice(&store, reference).unwrap().id, invoice.id);
        }
        assert!(find_invoice(&store, "INV-0002").is_err());
    }

    #[test]
    fn number_sort_compares_numerically() {
        let (mut store, client) = setup();
        let mut numbered = Vec::new();
        for number in ["INV-10000", "INV-9999"] {
            record(&mut store, &client, None, 2, 60);
            let mut invoice = generate_invoice(&mut store, request(&client)).unwrap().invoice;
            invoice.invoice_number = number.to_string();
            store.update(&invoice).unwrap();
            numbered.push(invoice);
        }

        let rows = list_invoices(
            &store,
            &InvoiceQuery {
                sort: InvoiceSort::Number,
                order: SortOrder::Asc,
                ..InvoiceQuery::default()
            },
            date(31),
        )
        .unwrap();
        let numbers: Vec<&str> = rows.iter().map(|row| row.invoice.invoice_number.as_str()).collect();
        assert_eq!(numbers, ["INV-9999", "INV-10000"]);
        assert_eq!(next_invoice_number(&numbered), "INV-10001");
    }

    #[test]
    fn list_filters_and_summary() {
        let (mut store, client) = setup();
        let other = create_client(
            &mut store,
            ClientInput {
                name: "Bolt Electric".to_string(),
                hourly_rate: 100.0,
                ..ClientInput::default()
            },
        )
        .unwrap();
        record(&mut store, &client, None, 2, 60);
        record(&mut store, &other, None, 2, 60);
        let acme = generate_invoice(&mut store, request(&client)).unwrap().invoice;
        let mut bolt_request = request(&other);
        bolt_request.due_date = None;
        generate_invoice(&mut store, bolt_request).unwrap();

        let late = date(31) + chrono::Duration::days(30);
        let overdue = list_invoices(
            &store,
            &InvoiceQuery {
                status: Some(InvoiceStatus::Overdue),
                ..InvoiceQuery::default()
            },
            late,
        )
        .unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].invoice.id, acme.id);

        let bolt = list_invoices(
            &store,
            &InvoiceQuery {
                client_query: Some("ELEC".to_string()),
                ..InvoiceQuery::default()
            },
            late,
        )
        .unwrap();
        assert_eq!(bolt.len(), 1);
        assert_eq!(bolt[0].client_name, "Bolt Electric");

        let by_total = list_invoices(
            &store,
            &InvoiceQuery {
                sort: InvoiceSort::Total,
                order: SortOrder::Asc,
                ..InvoiceQuery::default()
            },
            late,
        )
        .unwrap();
        assert_eq!(by_total[0].invoice.id, acme.id);

        let summary = summarize_invoices(&store.list::<Invoice>().unwrap(), late);
        assert!((summary.outstanding - 160.0).abs() < 0.001);
        assert!((summary.overdue - 60.0).abs() < 0.001);
        assert_eq!(summary.overdue_count, 1);
    }
}
