use std::path::PathBuf;

use chrono::NaiveTime;
use clap::{Args, Parser};
use tracing::level_filters::LevelFilter;

use crate::config::{parse_time_of_day, Config};

/// Command line values that take precedence over `config.json`.
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct TrackerOverrides {
    /// Seconds between two samples of the foreground window.
    #[arg(long)]
    pub interval: Option<u64>,
    /// Local time of the daily report, e.g. 20:00.
    #[arg(long = "report-time", value_parser = parse_time_of_day)]
    pub report_time: Option<NaiveTime>,
}

impl TrackerOverrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(interval) = self.interval {
            config.sample_interval_secs = interval;
        }
        if let Some(report_time) = self.report_time {
            config.report_time = report_time;
        }
    }

    /// Turns the overrides back into arguments for a spawned tracker.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![];
        if let Some(interval) = self.interval {
            args.extend(["--interval".to_string(), interval.to_string()]);
        }
        if let Some(report_time) = self.report_time {
            args.extend([
                "--report-time".to_string(),
                report_time.format("%H:%M:%S").to_string(),
            ]);
        }
        args
    }
}

#[derive(Parser)]
pub struct DaemonArgs {
    /// Run in the foreground instead of detaching.
    #[arg(long)]
    pub force: bool,
    #[arg(long)]
    pub dir: Option<PathBuf>,
    /// This option is for debugging purposes only.
    #[arg(long = "log-console")]
    pub log_console: bool,
    #[arg(long = "log-filter")]
    pub log: Option<LevelFilter>,
    #[command(flatten)]
    pub overrides: TrackerOverrides,
}
