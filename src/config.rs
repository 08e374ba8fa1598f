use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::report::{sheets::SheetsSettings, DEFAULT_TOP_N};

pub const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetsConfig {
    pub spreadsheet_name: String,
    /// Skips looking the spreadsheet up by name.
    pub spreadsheet_id: Option<String>,
    /// Relative paths are resolved against the application directory.
    pub credentials: PathBuf,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            spreadsheet_name: "Activity Tracker".into(),
            spreadsheet_id: None,
            credentials: "credentials.json".into(),
        }
    }
}

/// Settings read from `config.json` in the application directory. Every field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sample_interval_secs: u64,
    #[serde(with = "time_of_day")]
    pub report_time: NaiveTime,
    pub top_n: usize,
    pub max_save_failures: u32,
    pub request_timeout_secs: u64,
    pub resync_pause_secs: u64,
    /// Defaults to `charts` in the application directory.
    pub chart_dir: Option<PathBuf>,
    pub sheets: SheetsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_interval_secs: 5,
            report_time: NaiveTime::from_hms_opt(20, 0, 0).unwrap_or_default(),
            top_n: DEFAULT_TOP_N,
            max_save_failures: 5,
            request_timeout_secs: 30,
            resync_pause_secs: 2,
            chart_dir: None,
            sheets: SheetsConfig::default(),
        }
    }
}

impl Config {
    /// Reads the config from `dir`. A missing file means defaults, a broken one is an error.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE_NAME);
        match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config {}", path.display())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No config at {path:?}, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to read config {}", path.display())),
        }
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_secs.max(1))
    }

    pub fn resync_pause(&self) -> Duration {
        Duration::from_secs(self.resync_pause_secs)
    }

    pub fn chart_dir(&self, app_dir: &Path) -> PathBuf {
        app_dir.join(self.chart_dir.clone().unwrap_or_else(|| "charts".into()))
    }

    pub fn sheets_settings(&self, app_dir: &Path) -> SheetsSettings {
        SheetsSettings {
            spreadsheet_name: self.sheets.spreadsheet_name.clone(),
            spreadsheet_id: self.sheets.spreadsheet_id.clone(),
            credentials: app_dir.join(&self.sheets.credentials),
            request_timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
        }
    }
}

/// Parses times of day such as "20:00" or "20:00:30".
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, chrono::ParseError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
}

mod time_of_day {
    use chrono::NaiveTime;
    use serde::{self, Deserialize, Deserializer, Serializer};

    use super::parse_time_of_day;

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_time_of_day(&s).map_err(serde::de::Error::custom)
    }
}
