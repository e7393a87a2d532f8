use chrono::{
    DateTime, Datelike, Duration, Local, LocalResult, NaiveDate, NaiveTime, Offset, TimeZone, Utc,
};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::rollups::{WeekStart, start_of_week};

/// Inclusive range of local calendar days.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn today() -> Self {
        Self::from_single(Local::now().date_naive())
    }

    pub fn from_single(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    pub fn from_bounds(start: NaiveDate, end: NaiveDate) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::Rejected(
                "Start date cannot be after end date.".to_string(),
            ));
        }
        Ok(Self { start, end })
    }

    pub fn week_of(date: NaiveDate, week_start: WeekStart) -> Self {
        let start = start_of_week(date, week_start);
        Self {
            start,
            end: start + Duration::days(6),
        }
    }

    pub fn month_of(date: NaiveDate) -> Self {
        let start = date.with_day(1).unwrap_or(date);
        let next_month = if start.month() == 12 {
            NaiveDate::from_ymd_opt(start.year() + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(start.year(), start.month() + 1, 1)
        };
        let end = next_month
            .and_then(|day| day.pred_opt())
            .unwrap_or(start);
        Self { start, end }
    }

    /// Builds a range from optional CLI inputs: a single day wins, an open end
    /// means today, and nothing at all means today only.
    pub fn from_options(
        date: Option<NaiveDate>,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Self, ValidationError> {
        if let Some(date) = date {
            return Ok(Self::from_single(date));
        }

        match (start_date, end_date) {
            (Some(start), Some(end)) => Self::from_bounds(start, end),
            (Some(start), None) => Self::from_bounds(start, Local::now().date_naive()),
            (None, None) => Ok(Self::today()),
            (None, Some(_)) => Err(ValidationError::Rejected(
                "End date requires a start date.".to_string(),
            )),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn label(&self) -> String {
        if self.start == self.end {
            self.start.format("%Y-%m-%d").to_string()
        } else {
            format!(
                "{} → {}",
                self.start.format("%Y-%m-%d"),
                self.end.format("%Y-%m-%d")
            )
        }
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidDate(value.to_string()))
}

pub fn parse_clock_time(value: &str) -> Result<NaiveTime, ValidationError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| ValidationError::InvalidTime(value.to_string()))
}

/// Local wall-clock time on `date`, as a UTC instant.
pub fn local_to_utc(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    zone_to_utc(&Local, date, time)
}

/// Ambiguous times take the earlier instant. Times skipped by a
/// forward transition keep the offset in force before the gap.
fn zone_to_utc<Tz: TimeZone>(zone: &Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let naive = date.and_time(time);
    match zone.from_local_datetime(&naive) {
        LocalResult::Single(local) | LocalResult::Ambiguous(local, _) => local.with_timezone(&Utc),
        LocalResult::None => {
            let before = zone
                .offset_from_utc_datetime(&(naive - Duration::days(1)))
                .fix();
            Utc.from_utc_datetime(&(naive - Duration::seconds(i64::from(before.local_minus_utc()))))
        }
    }
}

/// Calendar day an instant falls on for the local user.
pub fn local_date(instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&Local).date_naive()
}

pub fn local_today() -> NaiveDate {
    Local::now().date_naive()
}
