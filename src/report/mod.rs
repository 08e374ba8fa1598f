//! Everything that leaves the machine or is meant for a human: spreadsheet rows, the
//! synchronization of a day's rows with the spreadsheet, and monthly charts.

pub mod chart;
pub mod sheets;
pub mod sync;

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::{
    daemon::storage::entities::{ActivityKey, ActivityStore, DailyLedger},
    utils::time::date_to_record_name,
};

/// First row of every monthly segment.
pub const SEGMENT_HEADER: [&str; 4] = ["Date", "Application/Tab", "Time (minutes)", "Time (formatted)"];

pub const DEFAULT_TOP_N: usize = 10;

/// Formats minutes as whole hours and minutes, e.g. 125.5 becomes "2h 5m".
pub fn format_minutes(minutes: f64) -> String {
    let minutes = minutes.max(0.);
    let hours = (minutes / 60.).floor() as u64;
    let mins = (minutes % 60.).floor() as u64;
    format!("{hours}h {mins}m")
}

fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.).round() / 100.
}

/// One spreadsheet row describing time spent on an activity during a day.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub date: NaiveDate,
    pub key: ActivityKey,
    pub minutes: f64,
    pub formatted: String,
}

impl ReportRow {
    pub fn new(date: NaiveDate, key: ActivityKey, minutes: f64) -> Self {
        Self {
            date,
            key,
            minutes: round_to_hundredths(minutes),
            formatted: format_minutes(minutes),
        }
    }

    pub fn date_cell(&self) -> String {
        date_to_record_name(self.date)
    }

    /// Cells in the same order as [SEGMENT_HEADER].
    pub fn to_values(&self) -> Vec<serde_json::Value> {
        vec![
            self.date_cell().into(),
            self.key.as_str().into(),
            self.minutes.into(),
            self.formatted.clone().into(),
        ]
    }
}

/// Rows for a day, longest activity first.
pub fn ledger_rows(day: NaiveDate, ledger: &DailyLedger) -> Vec<ReportRow> {
    ledger
        .sorted_by_duration()
        .into_iter()
        .map(|(key, minutes)| ReportRow::new(day, key, minutes))
        .collect()
}

/// Sums the minutes of every activity over the month `month` belongs to and keeps the `top_n`
/// largest. Whatever doesn't make the cut is dropped.
pub fn monthly_top(store: &ActivityStore, month: NaiveDate, top_n: usize) -> Vec<(ActivityKey, f64)> {
    let mut totals = BTreeMap::<ActivityKey, f64>::new();
    for (_, ledger) in store.month(month) {
        for (key, minutes) in ledger.iter() {
            *totals.entry(key.clone()).or_insert(0.) += minutes;
        }
    }

    let mut totals = totals.into_iter().collect::<Vec<_>>();
    totals.sort_by(|a, b| b.1.total_cmp(&a.1));
    totals.truncate(top_n);
    totals
}
