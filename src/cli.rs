use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

use crate::filters::SortField;
use crate::invoices::{InvoiceSort, InvoiceStatus};
use crate::models::ProjectStatus;
use crate::rollups::WeekStart;
use crate::rounding::RoundingOption;

#[derive(Parser, Debug)]
#[command(name = "tradetimer", version)]
#[command(about = "Time tracking and invoicing for contractors and trades", long_about = None)]
pub struct Cli {
    /// JSON file holding clients, entries and invoices
    #[arg(long, global = true, env = "TRADETIMER_DATA")]
    pub data: Option<PathBuf>,
    /// Account id the data belongs to
    #[arg(long, global = true, env = "TRADETIMER_USER")]
    pub user: Option<Uuid>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// First-run setup: rounding, currency and business name
    Setup(SetupArgs),
    #[command(subcommand)]
    Client(ClientCommand),
    #[command(subcommand)]
    Project(ProjectCommand),
    #[command(subcommand)]
    Timer(TimerCommand),
    /// Time entries
    #[command(subcommand)]
    Entry(EntryCommand),
    #[command(subcommand)]
    Invoice(InvoiceCommand),
    #[command(subcommand)]
    Referral(ReferralCommand),
    #[command(subcommand)]
    Report(ReportCommand),
    /// Write CSV to stdout or a file
    #[command(subcommand)]
    Export(ExportCommand),
    /// Local preferences (goals, week start, help banner)
    #[command(subcommand)]
    Prefs(PrefsCommand),
}

#[derive(Args, Debug)]
pub struct SetupArgs {
    #[arg(long)]
    pub rounding: Option<RoundingOption>,
    #[arg(long)]
    pub currency: Option<String>,
    #[arg(long)]
    pub business_name: Option<String>,
}

#[derive(Args, Debug)]
pub struct Confirm {
    /// Skip the confirmation prompt
    #[arg(short, long, default_value_t = false)]
    pub yes: bool,
}

#[derive(Subcommand, Debug)]
pub enum ClientCommand {
    Add {
        name: String,
        #[arg(long)]
        rate: f64,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
    },
    List {
        /// Name or email contains this text
        #[arg(long)]
        search: Option<String>,
    },
    Edit {
        /// Client name, part of it, or id
        client: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        rate: Option<f64>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
    },
    /// Delete a client with its projects and time entries
    Delete {
        client: String,
        #[command(flatten)]
        confirm: Confirm,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    Add {
        name: String,
        #[arg(long)]
        client: String,
        #[arg(long)]
        budget: Option<f64>,
    },
    List {
        #[arg(long)]
        client: Option<String>,
        #[arg(long)]
        status: Option<ProjectStatus>,
    },
    Status {
        project: String,
        status: ProjectStatus,
        #[arg(long)]
        client: Option<String>,
    },
    /// Set or clear a budget and show how much of it is used
    Budget {
        project: String,
        #[arg(long)]
        client: Option<String>,
        #[arg(long, conflicts_with = "clear")]
        amount: Option<f64>,
        #[arg(long, default_value_t = false)]
        clear: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum TimerCommand {
    Start {
        #[arg(long)]
        client: Option<String>,
        /// Project of the client given with --client
        #[arg(long, requires = "client")]
        project: Option<String>,
    },
    Pause,
    Resume,
    /// Stop the timer and record the tracked time
    Stop {
        #[arg(long)]
        notes: Option<String>,
    },
    Status,
    /// Print elapsed time every second while the timer runs
    Watch,
    /// Discard the current session without recording it
    Cancel {
        #[command(flatten)]
        confirm: Confirm,
    },
}

#[derive(Args, Debug, Default)]
pub struct EntryTimeArgs {
    /// Day worked (YYYY-MM-DD), defaults to today
    #[arg(long)]
    pub date: Option<String>,
    /// Start time (HH:MM)
    #[arg(long)]
    pub start: Option<String>,
    /// End time (HH:MM)
    #[arg(long)]
    pub end: Option<String>,
    #[arg(long)]
    pub hours: Option<u32>,
    #[arg(long)]
    pub minutes: Option<u32>,
}

#[derive(Args, Debug, Default, Clone)]
pub struct FilterArgs {
    /// Client name contains this text
    #[arg(long)]
    pub client: Option<String>,
    #[arg(long)]
    pub project: Option<String>,
    #[arg(long)]
    pub from: Option<String>,
    #[arg(long)]
    pub to: Option<String>,
    #[arg(long, conflicts_with = "unbilled", default_value_t = false)]
    pub billed: bool,
    #[arg(long, default_value_t = false)]
    pub unbilled: bool,
    /// Start from a saved filter; other flags narrow it further
    #[arg(long)]
    pub saved: Option<String>,
}

#[derive(Args, Debug)]
pub struct SortArgs {
    #[arg(long, default_value = "date")]
    pub sort: SortField,
    #[arg(long, default_value_t = false)]
    pub asc: bool,
}

#[derive(Subcommand, Debug)]
pub enum EntryCommand {
    /// Record time by start/end clock times or by hours and minutes
    Add {
        #[arg(long)]
        client: String,
        #[arg(long)]
        project: Option<String>,
        #[command(flatten)]
        time: EntryTimeArgs,
        #[arg(long)]
        notes: Option<String>,
    },
    List {
        #[command(flatten)]
        filter: FilterArgs,
        #[command(flatten)]
        sort: SortArgs,
    },
    Edit {
        /// Entry id or the first characters of it
        entry: String,
        #[arg(long)]
        client: Option<String>,
        #[arg(long, conflicts_with = "no_project")]
        project: Option<String>,
        #[arg(long, default_value_t = false)]
        no_project: bool,
        #[command(flatten)]
        time: EntryTimeArgs,
        #[arg(long)]
        notes: Option<String>,
    },
    Delete {
        entry: String,
        #[command(flatten)]
        confirm: Confirm,
    },
    BulkDelete {
        #[arg(required = true)]
        entries: Vec<String>,
        #[command(flatten)]
        confirm: Confirm,
    },
    /// Move entries to another client and/or project
    BulkMove {
        #[arg(required = true)]
        entries: Vec<String>,
        #[arg(long)]
        client: Option<String>,
        #[arg(long, conflicts_with = "no_project")]
        project: Option<String>,
        #[arg(long, default_value_t = false)]
        no_project: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum InvoiceCommand {
    /// Bill the client's unbilled time in a date range
    Create {
        #[arg(long)]
        client: String,
        #[command(flatten)]
        range: RangeArgs,
        /// Defaults to today
        #[arg(long)]
        issue_date: Option<String>,
        #[arg(long, conflicts_with = "due_in")]
        due: Option<String>,
        /// Days after the issue date
        #[arg(long)]
        due_in: Option<i64>,
        #[arg(long)]
        notes: Option<String>,
    },
    List {
        #[arg(long)]
        status: Option<InvoiceStatus>,
        #[arg(long)]
        client: Option<String>,
        #[arg(long, default_value = "number")]
        sort: InvoiceSort,
        #[arg(long, default_value_t = false)]
        asc: bool,
    },
    Show {
        invoice: String,
    },
    Pay {
        invoice: String,
        /// Defaults to today
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        method: Option<String>,
    },
    Unpay {
        invoice: String,
    },
    Delete {
        invoice: String,
        #[command(flatten)]
        confirm: Confirm,
    },
}

#[derive(Subcommand, Debug)]
pub enum ReferralCommand {
    Add { email: String },
    List,
    SignedUp { referral: String },
    Subscribed { referral: String },
    Reward { referral: String },
}

#[derive(Args, Debug, Default)]
pub struct RangeArgs {
    /// Single day (YYYY-MM-DD)
    #[arg(long, conflicts_with_all = ["from", "to", "week", "month"])]
    pub date: Option<String>,
    #[arg(long)]
    pub from: Option<String>,
    #[arg(long)]
    pub to: Option<String>,
    /// The current week
    #[arg(long, default_value_t = false, conflicts_with_all = ["from", "to", "month"])]
    pub week: bool,
    /// The current month
    #[arg(long, default_value_t = false, conflicts_with_all = ["from", "to"])]
    pub month: bool,
}

#[derive(Subcommand, Debug)]
pub enum ReportCommand {
    /// Totals per client and project, goals and invoice balances
    Summary {
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Daily, weekly, monthly and yearly totals
    Rollups {
        #[command(flatten)]
        range: RangeArgs,
    },
    FilterSave {
        name: String,
        #[command(flatten)]
        filter: FilterArgs,
    },
    FilterList,
    FilterDelete {
        name: String,
        #[command(flatten)]
        confirm: Confirm,
    },
}

#[derive(Subcommand, Debug)]
pub enum ExportCommand {
    Entries {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    Invoice {
        invoice: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum PrefsCommand {
    Show,
    Goal {
        #[arg(long)]
        weekly_hours: Option<f64>,
        #[arg(long)]
        monthly_revenue: Option<f64>,
    },
    DismissHelp,
    WeekStart { day: WeekStart },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_manual_entry() {
        let cli = Cli::try_parse_from([
            "tradetimer", "entry", "add", "--client", "acme", "--date", "2026-02-03", "--start", "09:00",
            "--end", "10:30",
        ])
        .unwrap();
        match cli.command {
            Command::Entry(EntryCommand::Add { client, time, .. }) => {
                assert_eq!(client, "acme");
                assert_eq!(time.start.as_deref(), Some("09:00"));
                assert_eq!(time.end.as_deref(), Some("10:30"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_value_enums_from_strings() {
        let cli = Cli::try_parse_from(["tradetimer", "setup", "--rounding", "15min"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Setup(SetupArgs {
                rounding: Some(RoundingOption::FifteenMinutes),
                ..
            })
        ));
        assert!(Cli::try_parse_from(["tradetimer", "setup", "--rounding", "7min"]).is_err());
        assert!(Cli::try_parse_from(["tradetimer", "invoice", "list", "--status", "overdue"]).is_ok());
    }

    #[test]
    fn timer_project_needs_a_client() {
        assert!(Cli::try_parse_from(["tradetimer", "timer", "start", "--project", "deck"]).is_err());
        let cli = Cli::try_parse_from([
            "tradetimer", "timer", "start", "--client", "acme", "--project", "deck",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Timer(TimerCommand::Start { client: Some(_), project: Some(_) })
        ));
    }

    #[test]
    fn billed_flags_conflict() {
        assert!(Cli::try_parse_from(["tradetimer", "entry", "list", "--billed", "--unbilled"]).is_err());
    }
}
