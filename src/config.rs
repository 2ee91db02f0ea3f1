//! Pipeline configuration.
//!
//! Values come from an optional JSON file and are then overridden by
//! `HCPLUS_*` environment variables. Every field has a default so a missing
//! file or a partial file is fine.

use std::{env, fs, path::Path, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub org: String,
    pub bucket: String,
    /// Write precision passed to the endpoint; record timestamps are ms.
    pub precision: String,
    pub token: String,
    pub request_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8086".into(),
            org: "hcplus".into(),
            bucket: "hcplus".into(),
            precision: "ms".into(),
            token: String::new(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ScheduleConfig {
    pub ingestion_interval_secs: u64,
    pub steps_window_secs: u64,
    pub heart_window_secs: u64,
    pub upload_interval_secs: u64,
    pub upload_initial_delay_secs: u64,
    pub drain_interval_secs: u64,
    pub drain_initial_delay_secs: u64,
    pub classify_interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            ingestion_interval_secs: 20 * 60,
            steps_window_secs: 20 * 60,
            heart_window_secs: 15 * 60,
            upload_interval_secs: 15 * 60,
            upload_initial_delay_secs: 15 * 60,
            drain_interval_secs: 15 * 60,
            drain_initial_delay_secs: 15 * 60,
            classify_interval_secs: 5 * 60,
        }
    }
}

impl ScheduleConfig {
    /// Every interval and delay collapsed to one minute for bench testing.
    fn debug() -> Self {
        const MINUTE: u64 = 60;
        Self {
            ingestion_interval_secs: MINUTE,
            upload_interval_secs: MINUTE,
            upload_initial_delay_secs: MINUTE,
            drain_interval_secs: MINUTE,
            drain_initial_delay_secs: MINUTE,
            classify_interval_secs: MINUTE,
            ..Self::default()
        }
    }

    pub fn ingestion_interval(&self) -> Duration {
        Duration::from_secs(self.ingestion_interval_secs)
    }

    pub fn upload_interval(&self) -> Duration {
        Duration::from_secs(self.upload_interval_secs)
    }

    pub fn upload_initial_delay(&self) -> Duration {
        Duration::from_secs(self.upload_initial_delay_secs)
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_secs(self.drain_interval_secs)
    }

    pub fn drain_initial_delay(&self) -> Duration {
        Duration::from_secs(self.drain_initial_delay_secs)
    }

    pub fn classify_interval(&self) -> Duration {
        Duration::from_secs(self.classify_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SensorConfig {
    /// Case-insensitive substring a discovered device name must contain.
    pub device_name_pattern: String,
    pub sample_rate_hz: u32,
    pub classify_batch_size: usize,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            device_name_pattern: "Movesense".into(),
            sample_rate_hz: 13,
            classify_batch_size: 52,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    pub db_path: PathBuf,
    pub settings_path: PathBuf,
    pub model_path: Option<PathBuf>,
    pub remote: RemoteConfig,
    pub schedule: ScheduleConfig,
    pub sensor: SensorConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("hcplus.sqlite3"),
            settings_path: PathBuf::from("settings.json"),
            model_path: None,
            remote: RemoteConfig::default(),
            schedule: ScheduleConfig::default(),
            sensor: SensorConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Reads `path` when it exists, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config from {}", path.display()))?;
                serde_json::from_str(&contents)
                    .with_context(|| format!("Failed to parse config {}", path.display()))?
            }
            _ => PipelineConfig::default(),
        };

        config.apply_overrides(|key| env::var(key).ok());
        Ok(config)
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("HCPLUS_INFLUX_URL") {
            self.remote.base_url = url;
        }
        if let Some(org) = lookup("HCPLUS_INFLUX_ORG") {
            self.remote.org = org;
        }
        if let Some(bucket) = lookup("HCPLUS_INFLUX_BUCKET") {
            self.remote.bucket = bucket;
        }
        if let Some(token) = lookup("HCPLUS_INFLUX_TOKEN") {
            self.remote.token = token;
        }
        if let Some(path) = lookup("HCPLUS_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }

        let debug_mode = lookup("HCPLUS_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if debug_mode {
            self.schedule = ScheduleConfig {
                steps_window_secs: self.schedule.steps_window_secs,
                heart_window_secs: self.schedule.heart_window_secs,
                ..ScheduleConfig::debug()
            };
        }
    }
}
