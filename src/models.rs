use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::filters::EntryFilter;
use crate::rounding::RoundingOption;
use crate::store::Record;

pub type UserId = Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: Uuid,
    pub user_id: UserId,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub hourly_rate: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    #[default]
    Active,
    Completed,
    Archived,
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProjectStatus::Active => "active",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Archived => "archived",
        };
        f.write_str(label)
    }
}

impl FromStr for ProjectStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(ProjectStatus::Active),
            "completed" => Ok(ProjectStatus::Completed),
            "archived" => Ok(ProjectStatus::Archived),
            other => Err(format!(
                "Unknown project status '{other}'. Use active, completed or archived."
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub user_id: UserId,
    pub client_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(default)]
    pub budget: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// A recorded block of billable work.
///
/// `duration_minutes` holds the billable (rounded) minutes and `amount` is
/// derived from it and the client's hourly rate at the time of the write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id: Uuid,
    pub user_id: UserId,
    pub client_id: Uuid,
    #[serde(default)]
    pub project_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: u32,
    pub amount: f64,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub user_id: UserId,
    pub client_id: Uuid,
    pub invoice_number: String,
    pub issue_date: NaiveDate,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    pub total_amount: f64,
    #[serde(default)]
    pub payment_date: Option<NaiveDate>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLineItem {
    pub id: Uuid,
    pub user_id: UserId,
    pub invoice_id: Uuid,
    pub description: String,
    pub time_entry_ids: Vec<Uuid>,
    pub minutes: u32,
    pub rate: f64,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Referral {
    pub id: Uuid,
    pub user_id: UserId,
    pub referred_email: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub signed_up_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub subscribed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reward_granted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    pub id: Uuid,
    pub user_id: UserId,
    #[serde(default)]
    pub rounding: RoundingOption,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub business_name: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportFilter {
    pub id: Uuid,
    pub user_id: UserId,
    pub name: String,
    pub filter: EntryFilter,
    pub created_at: DateTime<Utc>,
}

pub fn default_currency() -> String {
    "USD".to_string()
}

macro_rules! impl_record {
    ($($type:ty => $table:literal),* $(,)?) => {
        $(
            impl Record for $type {
                const TABLE: &'static str = $table;

                fn id(&self) -> Uuid {
                    self.id
                }

                fn owner(&self) -> UserId {
                    self.user_id
                }
            }
        )*
    };
}

impl_record! {
    Client => "clients",
    Project => "projects",
    TimeEntry => "time_entries",
    Invoice => "invoices",
    InvoiceLineItem => "invoice_line_items",
    Referral => "referrals",
    UserSettings => "user_settings",
    ReportFilter => "report_filters",
}
