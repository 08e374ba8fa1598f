use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};

/// This is the standard way of converting a date to a string in activity-tracker.
pub fn date_to_record_name(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn parse_record_name(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

/// Name of the month a date belongs to, e.g. "March 2024".
pub fn month_name(date: NaiveDate) -> String {
    date.format("%B %Y").to_string()
}

/// True when `date` is the last day of its month.
pub fn is_last_day_of_month(date: NaiveDate) -> bool {
    date.succ_opt().map_or(true, |next| next.month() != date.month())
}

/// Returns the first moment strictly after `now` whose time of day is `time`.
pub fn next_time_of_day(now: NaiveDateTime, time: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(time);
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}
