use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::{db::RecordKind, health::HealthDataKind};

/// Name and hardware address of the last paired wearable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PairedDevice {
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub collect_steps: bool,
    pub collect_heart_rate: bool,
    pub send_steps: bool,
    pub send_heart_rate: bool,
    pub send_sensor: bool,
    pub classify_sensor: bool,
    pub paired_device: Option<PairedDevice>,
}

/// A fresh install collects both health kinds and sends nothing.
impl Default for Preferences {
    fn default() -> Self {
        Self {
            collect_steps: true,
            collect_heart_rate: true,
            send_steps: false,
            send_heart_rate: false,
            send_sensor: false,
            classify_sensor: false,
            paired_device: None,
        }
    }
}

impl Preferences {
    pub fn collect_enabled(&self, kind: HealthDataKind) -> bool {
        match kind {
            HealthDataKind::Steps => self.collect_steps,
            HealthDataKind::HeartRate => self.collect_heart_rate,
        }
    }

    pub fn send_enabled(&self, kind: RecordKind) -> bool {
        match kind {
            RecordKind::Sensor => self.send_sensor,
            RecordKind::Steps => self.send_steps,
            RecordKind::HeartRate => self.send_heart_rate,
        }
    }
}

/// JSON-file backed user preferences.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Preferences>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            Preferences::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn preferences(&self) -> Preferences {
        self.read().clone()
    }

    pub fn paired_device(&self) -> Option<PairedDevice> {
        self.read().paired_device.clone()
    }

    pub fn set_paired_device(&self, device: Option<PairedDevice>) -> Result<()> {
        self.update(|prefs| prefs.paired_device = device)
    }

    pub fn set_send_enabled(&self, kind: RecordKind, enabled: bool) -> Result<()> {
        self.update(|prefs| match kind {
            RecordKind::Sensor => prefs.send_sensor = enabled,
            RecordKind::Steps => prefs.send_steps = enabled,
            RecordKind::HeartRate => prefs.send_heart_rate = enabled,
        })
    }

    pub fn set_collect_enabled(&self, kind: HealthDataKind, enabled: bool) -> Result<()> {
        self.update(|prefs| match kind {
            HealthDataKind::Steps => prefs.collect_steps = enabled,
            HealthDataKind::HeartRate => prefs.collect_heart_rate = enabled,
        })
    }

    pub fn set_classify_sensor(&self, enabled: bool) -> Result<()> {
        self.update(|prefs| prefs.classify_sensor = enabled)
    }

    fn update<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut Preferences),
    {
        let mut guard = self.write();
        apply(&mut guard);
        self.persist(&guard)
    }

    fn read(&self) -> RwLockReadGuard<'_, Preferences> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Preferences> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, data: &Preferences) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
