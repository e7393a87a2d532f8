use std::collections::HashMap;
use std::fs;
use std::io::{self, BufRead, Write};
use std::time::Duration;

use chrono::{Local, NaiveDate, Utc};
use uuid::Uuid;

use crate::cli::{
    ClientCommand, Command, Confirm, EntryCommand, EntryTimeArgs, ExportCommand, FilterArgs,
    InvoiceCommand, PrefsCommand, ProjectCommand, RangeArgs, ReferralCommand, ReportCommand,
    SetupArgs, SortArgs, TimerCommand,
};
use crate::clients::{ClientChange, ClientInput, create_client, delete_client, find_client, search_clients, update_client};
use crate::dates::{DateRange, local_date, local_today, parse_clock_time, parse_date};
use crate::entries::{
    EntryChange, Interval, NewEntry, billed_entry_ids, bulk_delete, bulk_move, create_entry,
    delete_entry, edit_entry, find_entry,
};
use crate::error::{AppError, Result, ValidationError};
use crate::export::{entries_csv, invoice_csv};
use crate::filters::{
    EntryFilter, SortField, SortOrder, client_names, delete_filter, find_filter, list_filters,
    save_filter, sort_entries,
};
use crate::format::{format_elapsed, format_minutes, format_money, hours_from_minutes};
use crate::grouping::{GroupTotal, group_by_client, group_by_project};
use crate::invoices::{
    InvoiceDetails, InvoiceQuery, InvoiceRequest, delete_invoice, find_invoice, generate_invoice,
    invoice_details, list_invoices, mark_paid, mark_unpaid, summarize_invoices,
};
use crate::models::{Client, Invoice, Project, TimeEntry, UserSettings};
use crate::projects::{budget_usage, create_project, find_project, list_projects, set_project_budget, set_project_status};
use crate::referrals::{create_referral, find_referral, grant_reward, list_referrals, record_subscription, record_sign_up};
use crate::rollups::{GoalProgress, PeriodRollup, build_rollups};
use crate::settings::{SettingsChange, load_settings, update_settings};
use crate::storage::LocalStorage;
use crate::store::Store;
use crate::timer::TimerStatus;

pub const HELP_BANNER: &str = "Tip: `tradetimer timer start --client <name>` starts tracking; \
`tradetimer prefs dismiss-help` hides this message.";

type Prompt = Box<dyn Fn(&str) -> bool>;

pub struct App<S: Store> {
    store: S,
    storage: LocalStorage,
    prompt: Prompt,
}

impl<S: Store> App<S> {
    pub fn new(store: S, storage: LocalStorage) -> Self {
        App {
            store,
            storage,
            prompt: Box::new(prompt_stdin),
        }
    }

    pub fn with_prompt(mut self, prompt: impl Fn(&str) -> bool + 'static) -> Self {
        self.prompt = Box::new(prompt);
        self
    }

    pub fn help_banner(&self) -> Option<&'static str> {
        (!self.storage.read_preferences().help_banner_dismissed).then_some(HELP_BANNER)
    }

    pub fn run(&mut self, command: Command, out: &mut dyn Write) -> Result<()> {
        match command {
            Command::Setup(args) => self.setup(args, out),
            Command::Client(command) => self.client(command, out),
            Command::Project(command) => self.project(command, out),
            Command::Timer(command) => self.timer(command, out),
            Command::Entry(command) => self.entry(command, out),
            Command::Invoice(command) => self.invoice(command, out),
            Command::Referral(command) => self.referral(command, out),
            Command::Report(command) => self.report(command, out),
            Command::Export(command) => self.export(command, out),
            Command::Prefs(command) => self.prefs(command, out),
        }
    }

    fn setup(&mut self, args: SetupArgs, out: &mut dyn Write) -> Result<()> {
        let settings = update_settings(
            &mut self.store,
            SettingsChange {
                rounding: args.rounding,
                currency: args.currency,
                business_name: args.business_name,
            },
        )?;
        self.storage
            .update_preferences(|preferences| preferences.onboarding_completed = true)?;
        writeln!(out, "Rounding: {}", settings.rounding)?;
        writeln!(out, "Currency: {}", settings.currency)?;
        if let Some(name) = &settings.business_name {
            writeln!(out, "Business: {name}")?;
        }
        writeln!(out, "Setup complete.")?;
        Ok(())
    }

    fn client(&mut self, command: ClientCommand, out: &mut dyn Write) -> Result<()> {
        let currency = self.settings()?.currency;
        match command {
            ClientCommand::Add {
                name,
                rate,
                email,
                phone,
            } => {
                let client = create_client(
                    &mut self.store,
                    ClientInput {
                        name,
                        email,
                        phone,
                        hourly_rate: rate,
                    },
                )?;
                writeln!(out, "Added {} at {}/h.", client.name, format_money(client.hourly_rate, &currency))?;
            }
            ClientCommand::List { search } => {
                let clients = search_clients(&self.store, search.as_deref().unwrap_or(""))?;
                if clients.is_empty() {
                    writeln!(out, "No clients.")?;
                }
                for client in clients {
                    writeln!(
                        out,
                        "{:<24} {:>12}/h  {}  {}",
                        client.name,
                        format_money(client.hourly_rate, &currency),
                        client.email.as_deref().unwrap_or("-"),
                        client.phone.as_deref().unwrap_or("-"),
                    )?;
                }
            }
            ClientCommand::Edit {
                client,
                name,
                rate,
                email,
                phone,
            } => {
                let client = find_client(&self.store, &client)?;
                let client = update_client(
                    &mut self.store,
                    client.id,
                    ClientChange {
                        name,
                        email,
                        phone,
                        hourly_rate: rate,
                    },
                )?;
                writeln!(out, "Updated {}.", client.name)?;
            }
            ClientCommand::Delete { client, confirm } => {
                let client = find_client(&self.store, &client)?;
                self.confirm(
                    &confirm,
                    &format!("Delete {} with all of its projects and time entries?", client.name),
                    "client deletion",
                )?;
                let deleted = delete_client(&mut self.store, client.id)?;
                writeln!(
                    out,
                    "Deleted {} ({} entries, {} projects).",
                    client.name, deleted.entries, deleted.projects
                )?;
            }
        }
        Ok(())
    }

    fn project(&mut self, command: ProjectCommand, out: &mut dyn Write) -> Result<()> {
        let currency = self.settings()?.currency;
        match command {
            ProjectCommand::Add { name, client, budget } => {
                let client = find_client(&self.store, &client)?;
                let project = create_project(&mut self.store, client.id, &name, budget)?;
                writeln!(out, "Added project {} for {}.", project.name, client.name)?;
            }
            ProjectCommand::List { client, status } => {
                let client_id = self.client_id(client.as_deref())?;
                let names = client_names(&self.store.list::<Client>()?);
                let projects = list_projects(&self.store, client_id, status)?;
                if projects.is_empty() {
                    writeln!(out, "No projects.")?;
                }
                for project in projects {
                    let budget = project
                        .budget
                        .map(|budget| format_money(budget, &currency))
                        .unwrap_or_else(|| "-".to_string());
                    writeln!(
                        out,
                        "{:<24} {:<20} {:<10} {}",
                        project.name,
                        names.get(&project.client_id).map(String::as_str).unwrap_or(""),
                        project.status,
                        budget
                    )?;
                }
            }
            ProjectCommand::Status {
                project,
                status,
                client,
            } => {
                let client_id = self.client_id(client.as_deref())?;
                let project = find_project(&self.store, &project, client_id)?;
                let project = set_project_status(&mut self.store, project.id, status)?;
                writeln!(out, "{} is now {}.", project.name, project.status)?;
            }
            ProjectCommand::Budget {
                project,
                client,
                amount,
                clear,
            } => {
                let client_id = self.client_id(client.as_deref())?;
                let mut project = find_project(&self.store, &project, client_id)?;
                if amount.is_some() || clear {
                    project = set_project_budget(&mut self.store, project.id, amount)?;
                }
                let usage = budget_usage(&project, &self.store.list::<TimeEntry>()?);
                writeln!(out, "{}: {} spent", project.name, format_money(usage.spent, &currency))?;
                match (usage.budget, usage.remaining(), usage.percent_used()) {
                    (Some(budget), Some(remaining), Some(percent)) => {
                        writeln!(
                            out,
                            "Budget {} ({percent:.0}% used, {} {})",
                            format_money(budget, &currency),
                            format_money(remaining.abs(), &currency),
                            if usage.is_over_budget() { "over" } else { "left" }
                        )?;
                    }
                    _ => writeln!(out, "No budget set.")?,
                }
            }
        }
        Ok(())
    }

    fn timer(&mut self, command: TimerCommand, out: &mut dyn Write) -> Result<()> {
        let mut timer = self.storage.read_timer();
        let now = Utc::now();
        match command {
            TimerCommand::Start { client, project } => {
                let client = client
                    .as_deref()
                    .map(|reference| find_client(&self.store, reference))
                    .transpose()?;
                let project = match (&client, project.as_deref()) {
                    (Some(client), Some(reference)) => {
                        Some(find_project(&self.store, reference, Some(client.id))?)
                    }
                    _ => None,
                };
                timer.start(
                    client.as_ref().map(|client| client.id),
                    project.as_ref().map(|project| project.id),
                    now,
                )?;
                self.storage.write_timer(&timer)?;
                if let Some(client) = client {
                    writeln!(out, "Timer started for {}.", client.name)?;
                }
            }
            TimerCommand::Pause => {
                timer.pause(now)?;
                self.storage.write_timer(&timer)?;
                writeln!(out, "Paused at {}.", format_elapsed(timer.elapsed_seconds(now)))?;
            }
            TimerCommand::Resume => {
                timer.resume(now)?;
                self.storage.write_timer(&timer)?;
                writeln!(out, "Resumed.")?;
            }
            TimerCommand::Stop { notes } => {
                let candidate = timer.stop(now)?;
                let settings = self.settings()?;
                let entry = create_entry(
                    &mut self.store,
                    NewEntry::from_candidate(&candidate, notes)?,
                    settings.rounding,
                )?;
                self.storage.write_timer(&timer)?;
                writeln!(
                    out,
                    "Recorded {} ({}).",
                    format_minutes(entry.duration_minutes),
                    format_money(entry.amount, &settings.currency)
                )?;
            }
            TimerCommand::Status => self.timer_status(out)?,
            TimerCommand::Watch => loop {
                let timer = self.storage.read_timer();
                if timer.status != TimerStatus::Running {
                    self.timer_status(out)?;
                    break;
                }
                write!(out, "\r{}", format_elapsed(timer.elapsed_seconds(Utc::now())))?;
                out.flush()?;
                std::thread::sleep(Duration::from_secs(1));
            },
            TimerCommand::Cancel { confirm } => {
                if timer.status == TimerStatus::Idle {
                    writeln!(out, "No timer to cancel.")?;
                    return Ok(());
                }
                self.confirm(&confirm, "Discard the current timer session?", "timer cancel")?;
                timer.cancel();
                self.storage.write_timer(&timer)?;
                writeln!(out, "Timer discarded.")?;
            }
        }
        Ok(())
    }

    fn timer_status(&self, out: &mut dyn Write) -> Result<()> {
        let timer = self.storage.read_timer();
        let client = match timer.client_id {
            Some(id) => self.store.get::<Client>(id)?.map(|client| client.name),
            None => None,
        };
        let label = match timer.status {
            TimerStatus::Idle => "idle",
            TimerStatus::Running => "running",
            TimerStatus::Paused => "paused",
            TimerStatus::Stopped => "stopped",
        };
        write!(out, "Timer {label}")?;
        if timer.status != TimerStatus::Idle {
            write!(out, ": {}", format_elapsed(timer.elapsed_seconds(Utc::now())))?;
            if let Some(client) = client {
                write!(out, " for {client}")?;
            }
        }
        writeln!(out)?;
        Ok(())
    }

    fn entry(&mut self, command: EntryCommand, out: &mut dyn Write) -> Result<()> {
        let settings = self.settings()?;
        match command {
            EntryCommand::Add {
                client,
                project,
                time,
                notes,
            } => {
                let client = find_client(&self.store, &client)?;
                let project_id = self.project_id(project.as_deref(), Some(client.id))?;
                let date = optional_date(time.date.as_deref())?.unwrap_or_else(local_today);
                let interval = interval(&time, date)?.ok_or(ValidationError::Rejected(
                    "Give --start and --end, or --hours/--minutes.".to_string(),
                ))?;
                let entry = create_entry(
                    &mut self.store,
                    NewEntry {
                        client_id: client.id,
                        project_id,
                        interval,
                        notes,
                    },
                    settings.rounding,
                )?;
                writeln!(
                    out,
                    "Recorded {} for {} ({}).",
                    format_minutes(entry.duration_minutes),
                    client.name,
                    format_money(entry.amount, &settings.currency)
                )?;
            }
            EntryCommand::List { filter, sort } => {
                let filter = self.entry_filter(&filter)?;
                self.print_entries(&filter, &sort, &settings, out)?;
            }
            EntryCommand::Edit {
                entry,
                client,
                project,
                no_project,
                time,
                notes,
            } => {
                let entry = find_entry(&self.store, &entry)?;
                let client_id = self.client_id(client.as_deref())?;
                let project_id = if no_project {
                    Some(None)
                } else {
                    self.project_id(project.as_deref(), Some(client_id.unwrap_or(entry.client_id)))?
                        .map(Some)
                };
                let date = optional_date(time.date.as_deref())?.unwrap_or_else(|| local_date(entry.start_time));
                let change = EntryChange {
                    client_id,
                    project_id,
                    interval: interval(&time, date)?,
                    notes,
                };
                let entry = edit_entry(&mut self.store, entry.id, change, settings.rounding)?;
                writeln!(
                    out,
                    "Updated entry {}: {} ({}).",
                    short_id(entry.id),
                    format_minutes(entry.duration_minutes),
                    format_money(entry.amount, &settings.currency)
                )?;
            }
            EntryCommand::Delete { entry, confirm } => {
                let entry = find_entry(&self.store, &entry)?;
                self.confirm(
                    &confirm,
                    &format!("Delete entry {}?", short_id(entry.id)),
                    "entry deletion",
                )?;
                delete_entry(&mut self.store, entry.id)?;
                writeln!(out, "Deleted entry {}.", short_id(entry.id))?;
            }
            EntryCommand::BulkDelete { entries, confirm } => {
                let ids = self.entry_ids(&entries)?;
                self.confirm(&confirm, &format!("Delete {} entries?", ids.len()), "bulk deletion")?;
                let deleted = bulk_delete(&mut self.store, &ids)?;
                writeln!(out, "Deleted {deleted} entries.")?;
            }
            EntryCommand::BulkMove {
                entries,
                client,
                project,
                no_project,
            } => {
                let ids = self.entry_ids(&entries)?;
                let mut client_id = self.client_id(client.as_deref())?;
                let project_id = if no_project {
                    Some(None)
                } else if let Some(reference) = project.as_deref() {
                    let project = find_project(&self.store, reference, client_id)?;
                    client_id.get_or_insert(project.client_id);
                    Some(Some(project.id))
                } else {
                    None
                };
                if client_id.is_none() && project_id.is_none() {
                    return Err(ValidationError::Rejected(
                        "Give --client, --project or --no-project.".to_string(),
                    )
                    .into());
                }
                let moved = bulk_move(&mut self.store, &ids, client_id, project_id, settings.rounding)?;
                writeln!(out, "Moved {moved} entries.")?;
            }
        }
        Ok(())
    }

    fn print_entries(
        &self,
        filter: &EntryFilter,
        sort: &SortArgs,
        settings: &UserSettings,
        out: &mut dyn Write,
    ) -> Result<()> {
        let entries = self.store.list::<TimeEntry>()?;
        let names = client_names(&self.store.list::<Client>()?);
        let projects: HashMap<Uuid, String> = self
            .store
            .list::<Project>()?
            .into_iter()
            .map(|project| (project.id, project.name))
            .collect();
        let billed = billed_entry_ids(&self.store)?;

        let mut rows = filter.apply(&entries, &names, &billed);
        let order = if sort.asc { SortOrder::Asc } else { SortOrder::Desc };
        sort_entries(&mut rows, &names, sort.sort, order);
        if rows.is_empty() {
            writeln!(out, "No time entries.")?;
            return Ok(());
        }

        for entry in &rows {
            let start = entry.start_time.with_timezone(&Local);
            let end = entry.end_time.with_timezone(&Local);
            writeln!(
                out,
                "{}  {} {}-{}  {:<20} {:<16} {:>8} {:>12} {}{}",
                short_id(entry.id),
                start.format("%Y-%m-%d"),
                start.format("%H:%M"),
                end.format("%H:%M"),
                names.get(&entry.client_id).map(String::as_str).unwrap_or(""),
                entry
                    .project_id
                    .and_then(|id| projects.get(&id))
                    .map(String::as_str)
                    .unwrap_or("-"),
                format_minutes(entry.duration_minutes),
                format_money(entry.amount, &settings.currency),
                if billed.contains(&entry.id) { "billed " } else { "" },
                entry.notes.as_deref().unwrap_or(""),
            )?;
        }
        let minutes: u32 = rows.iter().map(|entry| entry.duration_minutes).sum();
        let amount: f64 = rows.iter().map(|entry| entry.amount).sum();
        writeln!(
            out,
            "{} entries, {}, {}",
            rows.len(),
            format_minutes(minutes),
            format_money(amount, &settings.currency)
        )?;
        Ok(())
    }

    fn invoice(&mut self, command: InvoiceCommand, out: &mut dyn Write) -> Result<()> {
        let currency = self.settings()?.currency;
        let today = local_today();
        match command {
            InvoiceCommand::Create {
                client,
                range,
                issue_date,
                due,
                due_in,
                notes,
            } => {
                let client = find_client(&self.store, &client)?;
                let issue_date = optional_date(issue_date.as_deref())?.unwrap_or(today);
                let range = if range_given(&range) {
                    self.range(&range)?
                } else {
                    let first = self
                        .store
                        .list::<TimeEntry>()?
                        .iter()
                        .filter(|entry| entry.client_id == client.id)
                        .map(|entry| local_date(entry.start_time))
                        .min()
                        .unwrap_or(issue_date);
                    DateRange::from_bounds(first.min(issue_date), issue_date)?
                };
                let due_date = match (optional_date(due.as_deref())?, due_in) {
                    (Some(date), _) => Some(date),
                    (None, Some(days)) => Some(issue_date + chrono::Duration::days(days)),
                    (None, None) => None,
                };
                let details = generate_invoice(
                    &mut self.store,
                    InvoiceRequest {
                        client_id: client.id,
                        range,
                        issue_date,
                        due_date,
                        notes,
                    },
                )?;
                write_invoice(&details, &currency, today, out)?;
            }
            InvoiceCommand::List {
                status,
                client,
                sort,
                asc,
            } => {
                let query = InvoiceQuery {
                    status,
                    client_query: client,
                    sort,
                    order: if asc { SortOrder::Asc } else { SortOrder::Desc },
                };
                let rows = list_invoices(&self.store, &query, today)?;
                if rows.is_empty() {
                    writeln!(out, "No invoices.")?;
                }
                for row in &rows {
                    let due = row
                        .invoice
                        .due_date
                        .map(|date| date.format("%Y-%m-%d").to_string())
                        .unwrap_or_else(|| "-".to_string());
                    writeln!(
                        out,
                        "{:<10} {:<20} {} due {:<10} {:>12} {}",
                        row.invoice.invoice_number,
                        row.client_name,
                        row.invoice.issue_date.format("%Y-%m-%d"),
                        due,
                        format_money(row.invoice.total_amount, &currency),
                        row.status
                    )?;
                }
                let summary = summarize_invoices(&self.store.list::<Invoice>()?, today);
                writeln!(
                    out,
                    "Outstanding {}, overdue {} ({} invoices)",
                    format_money(summary.outstanding, &currency),
                    format_money(summary.overdue, &currency),
                    summary.overdue_count
                )?;
            }
            InvoiceCommand::Show { invoice } => {
                let invoice = find_invoice(&self.store, &invoice)?;
                let details = invoice_details(&self.store, invoice)?;
                write_invoice(&details, &currency, today, out)?;
            }
            InvoiceCommand::Pay {
                invoice,
                date,
                method,
            } => {
                let invoice = find_invoice(&self.store, &invoice)?;
                let date = optional_date(date.as_deref())?.unwrap_or(today);
                let invoice = mark_paid(&mut self.store, invoice.id, date, method)?;
                writeln!(out, "{} marked paid on {}.", invoice.invoice_number, date.format("%Y-%m-%d"))?;
            }
            InvoiceCommand::Unpay { invoice } => {
                let invoice = find_invoice(&self.store, &invoice)?;
                let invoice = mark_unpaid(&mut self.store, invoice.id)?;
                writeln!(out, "{} is now {}.", invoice.invoice_number, invoice.status(today))?;
            }
            InvoiceCommand::Delete { invoice, confirm } => {
                let invoice = find_invoice(&self.store, &invoice)?;
                self.confirm(
                    &confirm,
                    &format!("Delete invoice {}?", invoice.invoice_number),
                    "invoice deletion",
                )?;
                delete_invoice(&mut self.store, invoice.id)?;
                writeln!(out, "Deleted {}; its entries can be billed again.", invoice.invoice_number)?;
            }
        }
        Ok(())
    }

    fn referral(&mut self, command: ReferralCommand, out: &mut dyn Write) -> Result<()> {
        let now = Utc::now();
        let referral = match command {
            ReferralCommand::Add { email } => create_referral(&mut self.store, &email, now)?,
            ReferralCommand::List => {
                let referrals = list_referrals(&self.store)?;
                if referrals.is_empty() {
                    writeln!(out, "No referrals.")?;
                }
                for referral in referrals {
                    writeln!(
                        out,
                        "{:<32} {:<11} {}",
                        referral.referred_email,
                        referral.status(),
                        if referral.reward_granted { "rewarded" } else { "" }
                    )?;
                }
                return Ok(());
            }
            ReferralCommand::SignedUp { referral } => {
                let referral = find_referral(&self.store, &referral)?;
                record_sign_up(&mut self.store, referral.id, now)?
            }
            ReferralCommand::Subscribed { referral } => {
                let referral = find_referral(&self.store, &referral)?;
                record_subscription(&mut self.store, referral.id, now)?
            }
            ReferralCommand::Reward { referral } => {
                let referral = find_referral(&self.store, &referral)?;
                grant_reward(&mut self.store, referral.id)?
            }
        };
        writeln!(
            out,
            "{}: {}{}",
            referral.referred_email,
            referral.status(),
            if referral.reward_granted { ", reward granted" } else { "" }
        )?;
        Ok(())
    }

    fn report(&mut self, command: ReportCommand, out: &mut dyn Write) -> Result<()> {
        let settings = self.settings()?;
        match command {
            ReportCommand::Summary { range } => {
                let range = self.range(&range)?;
                self.summary(&range, &settings, out)?;
            }
            ReportCommand::Rollups { range } => {
                let range = self.range(&range)?;
                let entries = self.store.list::<TimeEntry>()?;
                let week_start = self.storage.read_preferences().week_start;
                let rollups = build_rollups(&entries, &range, week_start);
                writeln!(out, "Daily")?;
                for day in &rollups.daily {
                    writeln!(
                        out,
                        "  {}  {:>8} {:>12}",
                        day.date.format("%a %Y-%m-%d"),
                        format_minutes(day.minutes),
                        format_money(day.amount, &settings.currency)
                    )?;
                }
                for (title, periods) in [
                    ("Weekly", &rollups.weekly),
                    ("Monthly", &rollups.monthly),
                    ("Yearly", &rollups.yearly),
                ] {
                    writeln!(out, "{title}")?;
                    write_periods(periods, &settings.currency, out)?;
                }
            }
            ReportCommand::FilterSave { name, filter } => {
                let filter = self.entry_filter(&filter)?;
                let saved = save_filter(&mut self.store, &name, filter)?;
                writeln!(out, "Saved filter {}.", saved.name)?;
            }
            ReportCommand::FilterList => {
                let filters = list_filters(&self.store)?;
                if filters.is_empty() {
                    writeln!(out, "No saved filters.")?;
                }
                for saved in filters {
                    writeln!(out, "{:<20} {}", saved.name, describe_filter(&saved.filter))?;
                }
            }
            ReportCommand::FilterDelete { name, confirm } => {
                let saved = find_filter(&self.store, &name)?;
                self.confirm(&confirm, &format!("Delete saved filter {}?", saved.name), "filter deletion")?;
                delete_filter(&mut self.store, &saved.name)?;
                writeln!(out, "Deleted filter {}.", saved.name)?;
            }
        }
        Ok(())
    }

    fn summary(&self, range: &DateRange, settings: &UserSettings, out: &mut dyn Write) -> Result<()> {
        let currency = settings.currency.as_str();
        let entries = self.store.list::<TimeEntry>()?;
        let in_range: Vec<&TimeEntry> = entries
            .iter()
            .filter(|entry| range.contains(local_date(entry.start_time)))
            .collect();
        let minutes: u32 = in_range.iter().map(|entry| entry.duration_minutes).sum();
        let amount: f64 = in_range.iter().map(|entry| entry.amount).sum();

        writeln!(out, "{}", range.label())?;
        writeln!(out, "Total {} {}", format_minutes(minutes), format_money(amount, currency))?;
        writeln!(out, "By client")?;
        write_groups(
            &group_by_client(in_range.iter().copied(), &self.store.list::<Client>()?),
            currency,
            out,
        )?;
        writeln!(out, "By project")?;
        write_groups(
            &group_by_project(in_range.iter().copied(), &self.store.list::<Project>()?),
            currency,
            out,
        )?;

        let preferences = self.storage.read_preferences();
        let today = local_today();
        if let Some(target) = preferences.goal_weekly_hours {
            let week = DateRange::week_of(today, preferences.week_start);
            let week_minutes: u32 = entries
                .iter()
                .filter(|entry| week.contains(local_date(entry.start_time)))
                .map(|entry| entry.duration_minutes)
                .sum();
            let progress = GoalProgress::new(hours_from_minutes(week_minutes), target);
            writeln!(
                out,
                "Weekly goal: {:.1}h of {:.1}h ({:.0}%, {:.1}h to go)",
                progress.actual,
                progress.target,
                progress.percent(),
                progress.remaining()
            )?;
        }
        if let Some(target) = preferences.goal_monthly_revenue {
            let month = DateRange::month_of(today);
            let revenue: f64 = entries
                .iter()
                .filter(|entry| month.contains(local_date(entry.start_time)))
                .map(|entry| entry.amount)
                .sum();
            let progress = GoalProgress::new(revenue, target);
            writeln!(
                out,
                "Monthly goal: {} of {} ({:.0}%)",
                format_money(progress.actual, currency),
                format_money(progress.target, currency),
                progress.percent()
            )?;
        }

        let invoices = summarize_invoices(&self.store.list::<Invoice>()?, today);
        writeln!(
            out,
            "Outstanding {}, overdue {}",
            format_money(invoices.outstanding, currency),
            format_money(invoices.overdue, currency)
        )?;
        Ok(())
    }

    fn export(&mut self, command: ExportCommand, out: &mut dyn Write) -> Result<()> {
        let (csv, output) = match command {
            ExportCommand::Entries { filter, output } => {
                let filter = self.entry_filter(&filter)?;
                let entries = self.store.list::<TimeEntry>()?;
                let names = client_names(&self.store.list::<Client>()?);
                let billed = billed_entry_ids(&self.store)?;
                let mut rows = filter.apply(&entries, &names, &billed);
                sort_entries(&mut rows, &names, SortField::Date, SortOrder::Asc);
                (entries_csv(&rows, &names, &self.store.list::<Project>()?), output)
            }
            ExportCommand::Invoice { invoice, output } => {
                let invoice = find_invoice(&self.store, &invoice)?;
                let details = invoice_details(&self.store, invoice)?;
                (invoice_csv(&details, &self.settings()?.currency), output)
            }
        };
        match output {
            Some(path) => {
                fs::write(&path, csv)?;
                writeln!(out, "Wrote {}.", path.display())?;
            }
            None => out.write_all(csv.as_bytes())?,
        }
        Ok(())
    }

    fn prefs(&mut self, command: PrefsCommand, out: &mut dyn Write) -> Result<()> {
        let preferences = match command {
            PrefsCommand::Show => self.storage.read_preferences(),
            PrefsCommand::Goal {
                weekly_hours,
                monthly_revenue,
            } => {
                for goal in [weekly_hours, monthly_revenue].into_iter().flatten() {
                    if !(goal.is_finite() && goal > 0.0) {
                        return Err(ValidationError::Rejected("Goals must be positive numbers.".to_string()).into());
                    }
                }
                self.storage.update_preferences(|preferences| {
                    if weekly_hours.is_some() {
                        preferences.goal_weekly_hours = weekly_hours;
                    }
                    if monthly_revenue.is_some() {
                        preferences.goal_monthly_revenue = monthly_revenue;
                    }
                })?
            }
            PrefsCommand::DismissHelp => self
                .storage
                .update_preferences(|preferences| preferences.help_banner_dismissed = true)?,
            PrefsCommand::WeekStart { day } => self
                .storage
                .update_preferences(|preferences| preferences.week_start = day)?,
        };
        let goal = |value: Option<f64>| value.map(|value| value.to_string()).unwrap_or_else(|| "-".to_string());
        writeln!(out, "Weekly hours goal:    {}", goal(preferences.goal_weekly_hours))?;
        writeln!(out, "Monthly revenue goal: {}", goal(preferences.goal_monthly_revenue))?;
        writeln!(out, "Week starts:          {:?}", preferences.week_start)?;
        writeln!(out, "Help banner:          {}", if preferences.help_banner_dismissed { "hidden" } else { "shown" })?;
        writeln!(out, "Onboarding:           {}", if preferences.onboarding_completed { "done" } else { "pending" })?;
        Ok(())
    }

    fn settings(&mut self) -> Result<UserSettings> {
        load_settings(&mut self.store)
    }

    fn confirm(&self, confirm: &Confirm, question: &str, action: &str) -> Result<()> {
        if confirm.yes || (self.prompt)(question) {
            Ok(())
        } else {
            Err(AppError::NotConfirmed(action.to_string()))
        }
    }

    fn client_id(&self, reference: Option<&str>) -> Result<Option<Uuid>> {
        reference
            .map(|reference| find_client(&self.store, reference).map(|client| client.id))
            .transpose()
    }

    fn project_id(&self, reference: Option<&str>, client_id: Option<Uuid>) -> Result<Option<Uuid>> {
        reference
            .map(|reference| find_project(&self.store, reference, client_id).map(|project| project.id))
            .transpose()
    }

    fn entry_ids(&self, references: &[String]) -> Result<Vec<Uuid>> {
        references
            .iter()
            .map(|reference| find_entry(&self.store, reference).map(|entry| entry.id))
            .collect()
    }

    fn entry_filter(&self, args: &FilterArgs) -> Result<EntryFilter> {
        let mut filter = match &args.saved {
            Some(name) => find_filter(&self.store, name)?.filter,
            None => EntryFilter::default(),
        };
        if args.client.is_some() {
            filter.client_query = args.client.clone();
        }
        if let Some(project) = self.project_id(args.project.as_deref(), None)? {
            filter.project_id = Some(project);
        }
        if let Some(from) = optional_date(args.from.as_deref())? {
            filter.from = Some(from);
        }
        if let Some(to) = optional_date(args.to.as_deref())? {
            filter.to = Some(to);
        }
        if args.billed {
            filter.billed = Some(true);
        } else if args.unbilled {
            filter.billed = Some(false);
        }
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            DateRange::from_bounds(from, to)?;
        }
        Ok(filter)
    }

    fn range(&self, args: &RangeArgs) -> Result<DateRange> {
        let today = local_today();
        if args.week {
            return Ok(DateRange::week_of(today, self.storage.read_preferences().week_start));
        }
        if args.month {
            return Ok(DateRange::month_of(today));
        }
        Ok(DateRange::from_options(
            optional_date(args.date.as_deref())?,
            optional_date(args.from.as_deref())?,
            optional_date(args.to.as_deref())?,
        )?)
    }
}

/// Asks on stderr and reads a y/N answer from stdin.
pub fn prompt_stdin(question: &str) -> bool {
    eprint!("{question} [y/N] ");
    let _ = io::stderr().flush();
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn optional_date(value: Option<&str>) -> Result<Option<NaiveDate>> {
    Ok(value.map(parse_date).transpose()?)
}

fn range_given(args: &RangeArgs) -> bool {
    args.date.is_some() || args.from.is_some() || args.to.is_some() || args.week || args.month
}

/// Clock times win over an explicit duration; `None` when neither is given.
fn interval(time: &EntryTimeArgs, date: NaiveDate) -> Result<Option<Interval>> {
    let start = time.start.as_deref().map(parse_clock_time).transpose()?;
    let end = time.end.as_deref().map(parse_clock_time).transpose()?;
    if let (Some(start), Some(end)) = (start, end) {
        return Ok(Some(Interval::from_clock_times(date, start, end)?));
    }
    if end.is_some() {
        return Err(ValidationError::MissingField("Start time").into());
    }
    if time.hours.is_some() || time.minutes.is_some() {
        return Ok(Some(Interval::from_duration(
            date,
            time.hours.unwrap_or(0),
            time.minutes.unwrap_or(0),
            start,
        )?));
    }
    if start.is_some() {
        return Err(ValidationError::MissingField("End time").into());
    }
    if time.date.is_some() {
        return Err(ValidationError::Rejected(
            "Give --start and --end, or --hours/--minutes, with --date.".to_string(),
        )
        .into());
    }
    Ok(None)
}

fn short_id(id: Uuid) -> String {
    id.to_string()[..8].to_string()
}

fn describe_filter(filter: &EntryFilter) -> String {
    let mut parts = Vec::new();
    if let Some(client) = &filter.client_query {
        parts.push(format!("client~{client}"));
    }
    if let Some(project) = filter.project_id {
        parts.push(format!("project={}", short_id(project)));
    }
    if let Some(from) = filter.from {
        parts.push(format!("from {}", from.format("%Y-%m-%d")));
    }
    if let Some(to) = filter.to {
        parts.push(format!("to {}", to.format("%Y-%m-%d")));
    }
    match filter.billed {
        Some(true) => parts.push("billed".to_string()),
        Some(false) => parts.push("unbilled".to_string()),
        None => {}
    }
    if parts.is_empty() {
        "all entries".to_string()
    } else {
        parts.join(", ")
    }
}

fn write_invoice(details: &InvoiceDetails, currency: &str, today: NaiveDate, out: &mut dyn Write) -> Result<()> {
    let invoice = &details.invoice;
    writeln!(
        out,
        "{}  {}  {}",
        invoice.invoice_number,
        details.client.as_ref().map(|client| client.name.as_str()).unwrap_or(""),
        invoice.status(today)
    )?;
    write!(out, "Issued {}", invoice.issue_date.format("%Y-%m-%d"))?;
    if let Some(due) = invoice.due_date {
        write!(out, ", due {}", due.format("%Y-%m-%d"))?;
    }
    if let Some(paid) = invoice.payment_date {
        write!(out, ", paid {}", paid.format("%Y-%m-%d"))?;
        if let Some(method) = &invoice.payment_method {
            write!(out, " by {method}")?;
        }
    }
    writeln!(out)?;
    for line in &details.lines {
        writeln!(
            out,
            "  {:<24} {:>8} @ {:>10}/h {:>12}",
            line.description,
            format_minutes(line.minutes),
            format_money(line.rate, currency),
            format_money(line.amount, currency)
        )?;
    }
    writeln!(out, "Total {}", format_money(invoice.total_amount, currency))?;
    if let Some(notes) = &invoice.notes {
        writeln!(out, "{notes}")?;
    }
    Ok(())
}

fn write_groups(groups: &[GroupTotal], currency: &str, out: &mut dyn Write) -> Result<()> {
    if groups.is_empty() {
        writeln!(out, "  (none)")?;
    }
    for group in groups {
        writeln!(
            out,
            "  {:<24} {:>8} {:>12}",
            group.name,
            format_minutes(group.minutes),
            format_money(group.amount, currency)
        )?;
    }
    Ok(())
}

fn write_periods(periods: &[PeriodRollup], currency: &str, out: &mut dyn Write) -> Result<()> {
    for period in periods {
        writeln!(
            out,
            "  {:<24} {:>8} {:>12}",
            period.label,
            format_minutes(period.minutes),
            format_money(period.amount, currency)
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::store::MemoryStore;
    use clap::Parser;
    use tempfile::TempDir;

    struct Harness {
        app: App<MemoryStore>,
        _dir: TempDir,
    }

    impl Harness {
        fn new(answer: bool) -> Self {
            let dir = TempDir::new().unwrap();
            let app = App::new(MemoryStore::new(Uuid::new_v4()), LocalStorage::new(dir.path()))
                .with_prompt(move |_| answer);
            Harness { app, _dir: dir }
        }

        fn run(&mut self, args: &[&str]) -> Result<String> {
            let cli = Cli::try_parse_from(std::iter::once("tradetimer").chain(args.iter().copied()))
                .unwrap();
            let mut out = Vec::new();
            self.app.run(cli.command, &mut out)?;
            Ok(String::from_utf8(out).unwrap())
        }
    }

    #[test]
    fn setup_marks_onboarding_done() {
        let mut harness = Harness::new(true);
        let output = harness
            .run(&["setup", "--rounding", "15min", "--currency", "eur"])
            .unwrap();
        assert!(output.contains("Rounding: 15min"));
        assert!(output.contains("Currency: EUR"));
        assert!(harness.app.storage.read_preferences().onboarding_completed);
    }

    #[test]
    fn manual_entries_and_invoice_flow() {
        let mut harness = Harness::new(true);
        harness.run(&["client", "add", "Acme", "--rate", "40"]).unwrap();
        harness
            .run(&["entry", "add", "--client", "acme", "--date", "2026-02-03", "--start", "09:00", "--end", "10:30"])
            .unwrap();
        let output = harness
            .run(&["entry", "add", "--client", "acme", "--date", "2026-02-04", "--hours", "1"])
            .unwrap();
        assert!(output.contains("$40.00"));

        let listing = harness.run(&["entry", "list", "--client", "ACM"]).unwrap();
        assert!(listing.contains("2 entries, 2h 30m, $100.00"));

        let invoice = harness
            .run(&["invoice", "create", "--client", "acme", "--from", "2026-02-01", "--to", "2026-02-28", "--issue-date", "2026-03-01", "--due-in", "14"])
            .unwrap();
        assert!(invoice.contains("INV-0001"));
        assert!(invoice.contains("Total $100.00"));

        let unbilled = harness.run(&["entry", "list", "--unbilled"]).unwrap();
        assert!(unbilled.contains("No time entries."));

        harness.run(&["invoice", "pay", "INV-0001", "--date", "2026-03-05"]).unwrap();
        let list = harness.run(&["invoice", "list", "--status", "paid"]).unwrap();
        assert!(list.contains("INV-0001"));
    }

    #[test]
    fn destructive_commands_need_confirmation() {
        let mut harness = Harness::new(false);
        harness.run(&["client", "add", "Acme", "--rate", "40"]).unwrap();
        assert!(matches!(
            harness.run(&["client", "delete", "acme"]),
            Err(AppError::NotConfirmed(_))
        ));
        harness.run(&["client", "delete", "acme", "--yes"]).unwrap();
        let listing = harness.run(&["client", "list"]).unwrap();
        assert!(listing.contains("No clients."));
    }

    #[test]
    fn timer_commands_persist_state() {
        let mut harness = Harness::new(true);
        harness.run(&["client", "add", "Acme", "--rate", "40"]).unwrap();
        assert!(matches!(
            harness.run(&["timer", "start"]),
            Err(AppError::Timer(crate::timer::TimerError::NoClientSelected))
        ));
        harness.run(&["timer", "start", "--client", "acme"]).unwrap();
        assert!(harness.run(&["timer", "status"]).unwrap().starts_with("Timer running"));
        harness.run(&["timer", "pause"]).unwrap();
        assert!(harness.run(&["timer", "pause"]).is_err());
        // Paused, so watch reports the status and returns straight away.
        assert!(harness.run(&["timer", "watch"]).unwrap().starts_with("Timer paused"));
        harness.run(&["timer", "cancel"]).unwrap();
        assert!(harness.run(&["timer", "status"]).unwrap().starts_with("Timer idle"));
    }

    #[test]
    fn saved_filters_round_trip_through_cli() {
        let mut harness = Harness::new(true);
        harness.run(&["client", "add", "Acme", "--rate", "40"]).unwrap();
        harness.run(&["report", "filter-save", "acme-unbilled", "--client", "acme", "--unbilled"]).unwrap();
        let listing = harness.run(&["report", "filter-list"]).unwrap();
        assert!(listing.contains("client~acme, unbilled"));
        harness.run(&["report", "filter-delete", "ACME-UNBILLED", "--yes"]).unwrap();
        assert!(harness.run(&["report", "filter-list"]).unwrap().contains("No saved filters."));
    }

    #[test]
    fn export_writes_csv_to_output() {
        let mut harness = Harness::new(true);
        harness.run(&["client", "add", "Acme, Inc", "--rate", "60"]).unwrap();
        harness
            .run(&["entry", "add", "--client", "acme", "--date", "2026-02-03", "--minutes", "30", "--notes", "gutter"])
            .unwrap();
        let csv = harness.run(&["export", "entries"]).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("2026-02-03,\"Acme, Inc\",,09:00,09:30,30,30.00,gutter"));
    }

    #[test]
    fn prefs_goals_feed_summary() {
        let mut harness = Harness::new(true);
        assert!(harness.app.help_banner().is_some());
        harness.run(&["prefs", "dismiss-help"]).unwrap();
        assert!(harness.app.help_banner().is_none());
        assert!(harness.run(&["prefs", "goal", "--weekly-hours", "-2"]).is_err());
        harness.run(&["prefs", "goal", "--weekly-hours", "30"]).unwrap();
        let summary = harness.run(&["report", "summary", "--week"]).unwrap();
        assert!(summary.contains("Weekly goal: 0.0h of 30.0h"));
    }

    #[test]
    fn entry_add_requires_times() {
        let mut harness = Harness::new(true);
        harness.run(&["client", "add", "Acme", "--rate", "40"]).unwrap();
        assert!(harness.run(&["entry", "add", "--client", "acme"]).is_err());
        assert!(matches!(
            harness.run(&["entry", "add", "--client", "acme", "--start", "10:00", "--end", "09:00"]),
            Err(AppError::Validation(ValidationError::EndNotAfterStart))
        ));
        assert!(matches!(
            harness.run(&["entry", "add", "--client", "acme", "--start", "9am", "--end", "10:00"]),
            Err(AppError::Validation(ValidationError::InvalidTime(_)))
        ));
    }
}
