use crate::error::ValidationError;
use crate::rounding::{RoundingOption, round_billable_minutes};

/// Money earned for `billable_minutes` at `hourly_rate`.
///
/// No currency rounding happens here; display formatting owns precision.
pub fn amount_for(billable_minutes: u32, hourly_rate: f64) -> f64 {
    f64::from(billable_minutes) / 60.0 * hourly_rate
}

/// Whole minutes covered by `active_seconds`, counting a started minute as a full one.
pub fn raw_minutes_from_seconds(active_seconds: i64) -> u32 {
    if active_seconds <= 0 {
        return 0;
    }
    let minutes = (active_seconds + 59) / 60;
    u32::try_from(minutes).unwrap_or(u32::MAX)
}

pub fn validate_hourly_rate(rate: f64) -> Result<f64, ValidationError> {
    if rate.is_finite() && rate > 0.0 {
        Ok(rate)
    } else {
        Err(ValidationError::NonPositiveRate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BillableTime {
    pub raw_minutes: u32,
    pub billable_minutes: u32,
    pub amount: f64,
}

impl BillableTime {
    pub fn from_raw_minutes(raw_minutes: u32, rounding: RoundingOption, hourly_rate: f64) -> Self {
        let billable_minutes = round_billable_minutes(raw_minutes, rounding);
        Self {
            raw_minutes,
            billable_minutes,
            amount: amount_for(billable_minutes, hourly_rate),
        }
    }
}
