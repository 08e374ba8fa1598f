use std::{io::Write, time::Duration};

use ansi_term::Colour::{Green, Red};
use anyhow::Result;
use chrono::{DateTime, Local, NaiveDate, TimeDelta};
use clap::Args;
use tracing::{error, info};

use crate::{
    daemon::storage::entities::ActivityStore,
    report::sync::{ExternalStore, ReportSynchronizer},
};

use super::dates::{parse_day, DateStyle};

#[derive(Debug, Args)]
pub struct SyncCommand {
    #[arg(
        long,
        conflicts_with_all = ["yesterday", "all"],
        help = "Day to upload. Examples are \"2024-03-15\", \"2 days ago\", \"15/03/2024\""
    )]
    date: Option<String>,
    #[arg(long, conflicts_with = "all", help = "Upload yesterday")]
    yesterday: bool,
    #[arg(long, help = "Upload every known day, oldest first")]
    all: bool,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
}

impl SyncCommand {
    /// Days to upload, in upload order. Defaults to today.
    pub fn dates(&self, store: &ActivityStore, now: DateTime<Local>) -> Result<Vec<NaiveDate>> {
        let today = now.date_naive();
        Ok(if self.all {
            store.days().collect()
        } else if self.yesterday {
            vec![today - TimeDelta::days(1)]
        } else if let Some(date) = &self.date {
            vec![parse_day(date, self.date_style, now)?]
        } else {
            vec![today]
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResyncSummary {
    pub total: usize,
    pub failed: Vec<NaiveDate>,
}

impl ResyncSummary {
    pub fn succeeded(&self) -> usize {
        self.total - self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Uploads every day of `dates` one after another, pausing between them to stay clear of the
/// service's rate limits. A failed day doesn't stop the rest.
pub async fn resync<S: ExternalStore>(
    synchronizer: &mut ReportSynchronizer<S>,
    store: &ActivityStore,
    dates: &[NaiveDate],
    pause: Duration,
    out: &mut impl Write,
) -> Result<ResyncSummary> {
    let mut failed = vec![];
    for (index, day) in dates.iter().copied().enumerate() {
        if index > 0 && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }

        let Some(ledger) = store.ledger(day) else {
            writeln!(out, "{} {day}: no data", Red.paint("✗"))?;
            failed.push(day);
            continue;
        };

        match synchronizer.sync(day, ledger).await {
            Ok(report) => {
                info!("Uploaded {day}");
                writeln!(
                    out,
                    "{} {day}: {} entries uploaded to {}",
                    Green.paint("✓"),
                    report.inserted,
                    report.segment
                )?;
            }
            Err(e) => {
                error!("Failed to upload {day} {e:?}");
                writeln!(out, "{} {day}: {e}", Red.paint("✗"))?;
                failed.push(day);
            }
        }
    }

    let summary = ResyncSummary {
        total: dates.len(),
        failed,
    };
    writeln!(
        out,
        "Uploaded {} out of {} dates",
        summary.succeeded(),
        summary.total
    )?;
    if !summary.is_success() {
        let failed = summary
            .failed
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(out, "Failed dates: {failed}")?;
    }
    Ok(summary)
}
