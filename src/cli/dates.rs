use std::fmt::Display;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate};
use chrono_english::parse_date_string;
use clap::ValueEnum;

#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum DateStyle {
    #[default]
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

/// Parses a calendar day. Accepts `2024-03-15` as well as phrases like "yesterday" or
/// "3 days ago", relative to `now`.
pub fn parse_day(value: &str, style: DateStyle, now: DateTime<Local>) -> Result<NaiveDate> {
    if let Ok(day) = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d") {
        return Ok(day);
    }
    parse_date_string(value, now, style.into())
        .map(|v| v.date_naive())
        .with_context(|| format!("Can't understand date {value:?}"))
}

/// Parses `YYYY-MM` into the first day of that month.
pub fn parse_month(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(&format!("{}-01", value.trim()), "%Y-%m-%d")
        .with_context(|| format!("Expected a month like 2024-03, got {value:?}"))
}

#[cfg(test)]
mod tests {
    use chrono::{Local, NaiveDate, TimeZone};

    use super::{parse_day, parse_month, DateStyle};

    #[test]
    fn test_parse_day() {
        let now = Local.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
        let day = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();

        assert_eq!(parse_day("2024-02-29", DateStyle::Uk, now).unwrap(), day(2024, 2, 29));
        assert_eq!(parse_day("yesterday", DateStyle::Uk, now).unwrap(), day(2024, 3, 14));
        assert_eq!(parse_day("01/03/2024", DateStyle::Uk, now).unwrap(), day(2024, 3, 1));
        assert_eq!(parse_day("01/03/2024", DateStyle::Us, now).unwrap(), day(2024, 1, 3));
        assert!(parse_day("someday", DateStyle::Uk, now).is_err());
    }

    #[test]
    fn test_parse_month() {
        assert_eq!(parse_month("2024-03").unwrap(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert!(parse_month("2024-13").is_err());
        assert!(parse_month("March").is_err());
    }
}
