use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Interval a raw duration is rounded up to before it is billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RoundingOption {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "15min")]
    FifteenMinutes,
    #[serde(rename = "30min")]
    ThirtyMinutes,
    #[serde(rename = "1hour")]
    OneHour,
}

impl RoundingOption {
    pub const ALL: [RoundingOption; 4] = [
        RoundingOption::None,
        RoundingOption::FifteenMinutes,
        RoundingOption::ThirtyMinutes,
        RoundingOption::OneHour,
    ];

    pub fn interval_minutes(self) -> u32 {
        match self {
            RoundingOption::None => 0,
            RoundingOption::FifteenMinutes => 15,
            RoundingOption::ThirtyMinutes => 30,
            RoundingOption::OneHour => 60,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RoundingOption::None => "none",
            RoundingOption::FifteenMinutes => "15min",
            RoundingOption::ThirtyMinutes => "30min",
            RoundingOption::OneHour => "1hour",
        }
    }
}

impl fmt::Display for RoundingOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoundingOption {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        RoundingOption::ALL
            .into_iter()
            .find(|option| option.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| format!("Unknown rounding option '{value}'. Use none, 15min, 30min or 1hour."))
    }
}

/// Rounds a raw duration up to the next multiple of the configured interval.
///
/// Partial intervals are always billed as full ones; the result is never
/// smaller than the input.
pub fn round_billable_minutes(raw_minutes: u32, option: RoundingOption) -> u32 {
    let increment = option.interval_minutes();
    if increment == 0 || raw_minutes == 0 {
        return raw_minutes;
    }

    if raw_minutes % increment == 0 {
        raw_minutes
    } else {
        (raw_minutes / increment)
            .saturating_add(1)
            .saturating_mul(increment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_returns_raw() {
        for raw in [0, 1, 14, 46, 61, 1439] {
            assert_eq!(round_billable_minutes(raw, RoundingOption::None), raw);
        }
    }

    #[test]
    fn fifteen_minutes_rounds_up() {
        assert_eq!(round_billable_minutes(46, RoundingOption::FifteenMinutes), 60);
        assert_eq!(round_billable_minutes(45, RoundingOption::FifteenMinutes), 45);
        assert_eq!(round_billable_minutes(1, RoundingOption::FifteenMinutes), 15);
    }

    #[test]
    fn zero_stays_zero() {
        assert_eq!(round_billable_minutes(0, RoundingOption::ThirtyMinutes), 0);
        assert_eq!(round_billable_minutes(0, RoundingOption::OneHour), 0);
    }

    #[test]
    fn hour_and_half_hour_intervals() {
        assert_eq!(round_billable_minutes(31, RoundingOption::ThirtyMinutes), 60);
        assert_eq!(round_billable_minutes(61, RoundingOption::OneHour), 120);
        assert_eq!(round_billable_minutes(120, RoundingOption::OneHour), 120);
    }

    #[test]
    fn rounding_never_decreases_and_lands_on_interval() {
        for option in RoundingOption::ALL {
            for raw in 0..=300 {
                let rounded = round_billable_minutes(raw, option);
                assert!(rounded >= raw, "{option} decreased {raw} to {rounded}");
                if option.interval_minutes() > 0 {
                    assert_eq!(rounded % option.interval_minutes(), 0);
                }
            }
        }
    }

    #[test]
    fn parses_setting_strings() {
        assert_eq!("15min".parse::<RoundingOption>(), Ok(RoundingOption::FifteenMinutes));
        assert_eq!("1HOUR".parse::<RoundingOption>(), Ok(RoundingOption::OneHour));
        assert!("nearest".parse::<RoundingOption>().is_err());
    }

    #[test]
    fn serializes_with_setting_names() {
        let json = serde_json::to_string(&RoundingOption::ThirtyMinutes).unwrap();
        assert_eq!(json, "\"30min\"");
        let parsed: RoundingOption = serde_json::from_str("\"none\"").unwrap();
        assert_eq!(parsed, RoundingOption::None);
    }
}
