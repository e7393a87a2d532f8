use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::dates::{DateRange, local_date};
use crate::models::TimeEntry;

#[derive(Debug, Clone, PartialEq)]
pub struct DailyTotal {
    pub date: NaiveDate,
    pub minutes: u32,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeriodRollup {
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: usize,
    pub minutes: u32,
    pub amount: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Rollups {
    pub daily: Vec<DailyTotal>,
    pub weekly: Vec<PeriodRollup>,
    pub monthly: Vec<PeriodRollup>,
    pub yearly: Vec<PeriodRollup>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WeekStart {
    #[default]
    Monday,
    Sunday,
}

impl std::str::FromStr for WeekStart {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "monday" | "mon" => Ok(WeekStart::Monday),
            "sunday" | "sun" => Ok(WeekStart::Sunday),
            other => Err(format!("Unknown week start '{other}'. Use monday or sunday.")),
        }
    }
}

/// Totals billable minutes and amounts per day, week, month and year.
///
/// Entries are bucketed by the local date they started on; days without
/// entries are kept so the series has no gaps.
pub fn build_rollups(entries: &[TimeEntry], range: &DateRange, week_start: WeekStart) -> Rollups {
    let mut totals: HashMap<NaiveDate, (u32, f64)> = HashMap::new();

    for entry in entries {
        let date = local_date(entry.start_time);
        if !range.contains(date) {
            continue;
        }
        let total = totals.entry(date).or_insert((0, 0.0));
        total.0 = total.0.saturating_add(entry.duration_minutes);
        total.1 += entry.amount;
    }

    let daily = build_daily_totals(&totals, range.start_date(), range.end_date());
    let weekly = build_period_rollups(
        &daily,
        |date| start_of_week(date, week_start),
        |start, end| {
            let week = start_of_week(start, week_start).iso_week();
            format!(
                "W{:02} {} ({} → {})",
                week.week(),
                week.year(),
                start.format("%Y-%m-%d"),
                end.format("%Y-%m-%d")
            )
        },
    );
    let monthly = build_period_rollups(
        &daily,
        |date| date.with_day(1).unwrap_or(date),
        |start, _| start.format("%b %Y").to_string(),
    );
    let yearly = build_period_rollups(
        &daily,
        |date| NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date),
        |start, _| start.year().to_string(),
    );

    Rollups {
        daily,
        weekly,
        monthly,
        yearly,
    }
}

fn build_daily_totals(
    totals: &HashMap<NaiveDate, (u32, f64)>,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<DailyTotal> {
    let mut daily = Vec::new();
    let mut current = start;
    while current <= end {
        let (minutes, amount) = totals.get(&current).copied().unwrap_or((0, 0.0));
        daily.push(DailyTotal {
            date: current,
            minutes,
            amount,
        });
        match current.succ_opt() {
            Some(next) => current = next,
            None => break,
        }
    }
    daily
}

fn build_period_rollups(
    daily: &[DailyTotal],
    period_key: impl Fn(NaiveDate) -> NaiveDate,
    label: impl Fn(NaiveDate, NaiveDate) -> String,
) -> Vec<PeriodRollup> {
    let mut rollups: Vec<PeriodRollup> = Vec::new();
    let mut current_key: Option<NaiveDate> = None;

    for day in daily {
        let key = period_key(day.date);
        if current_key != Some(key) {
            current_key = Some(key);
            rollups.push(PeriodRollup {
                label: String::new(),
                start: day.date,
                end: day.date,
                days: 0,
                minutes: 0,
                amount: 0.0,
            });
        }

        if let Some(rollup) = rollups.last_mut() {
            rollup.end = day.date;
            rollup.days += 1;
            rollup.minutes = rollup.minutes.saturating_add(day.minutes);
            rollup.amount += day.amount;
        }
    }

    for rollup in &mut rollups {
        rollup.label = label(rollup.start, rollup.end);
    }
    rollups
}

pub fn start_of_week(date: NaiveDate, week_start: WeekStart) -> NaiveDate {
    let offset = match week_start {
        WeekStart::Monday => date.weekday().num_days_from_monday() as i64,
        WeekStart::Sunday => date.weekday().num_days_from_sunday() as i64,
    };
    date - Duration::days(offset)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GoalProgress {
    pub actual: f64,
    pub target: f64,
}

impl GoalProgress {
    pub fn new(actual: f64, target: f64) -> Self {
        Self { actual, target }
    }

    pub fn percent(&self) -> f64 {
        if self.target <= 0.0 {
            return 0.0;
        }
        self.actual / self.target * 100.0
    }

    pub fn remaining(&self) -> f64 {
        (self.target - self.actual).max(0.0)
    }
}
