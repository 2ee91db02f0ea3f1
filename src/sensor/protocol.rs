//! Device resource paths, command bodies and logbook payload parsing.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::db::{Axis3, SensorRecord};

pub const LOGGER_STATE_STOPPED: u8 = 2;
pub const LOGGER_STATE_RUNNING: u8 = 3;

/// Entry read when the logbook directory cannot be listed.
pub const DEFAULT_LOG_ENTRY_ID: u32 = 1;

const NANOS_PER_SECOND: i64 = 1_000_000_000;
const NANOS_PER_MILLI: i64 = 1_000_000;

pub fn logbook_entries_uri(serial: &str) -> String {
    format!("suunto://{serial}/Mem/Logbook/Entries/")
}

pub fn time_uri(serial: &str) -> String {
    format!("suunto://{serial}/Time")
}

pub fn logger_config_uri(serial: &str) -> String {
    format!("suunto://{serial}/Mem/DataLogger/Config/")
}

pub fn logger_state_uri(serial: &str) -> String {
    format!("suunto://{serial}/Mem/DataLogger/State")
}

pub fn log_entry_data_uri(serial: &str, entry_id: u32) -> String {
    format!("suunto://MDS/Logbook/{serial}/byId/{entry_id}/Data")
}

/// Device clock is set in microseconds since epoch.
pub fn time_body(now: DateTime<Utc>) -> String {
    json!({ "value": now.timestamp_micros() }).to_string()
}

/// Single logged channel: 9-axis IMU at `sample_rate_hz`.
pub fn logger_config_body(sample_rate_hz: u32) -> String {
    json!({
        "config": {
            "dataEntries": {
                "dataEntry": [
                    { "path": format!("/Meas/IMU9/{sample_rate_hz}") }
                ]
            }
        }
    })
    .to_string()
}

pub fn logger_state_body(running: bool) -> String {
    let state = if running {
        LOGGER_STATE_RUNNING
    } else {
        LOGGER_STATE_STOPPED
    };
    json!({ "newState": state }).to_string()
}

/// Unexpected structure in a device reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    Malformed(String),
    MissingChannel { sample: usize, channel: &'static str },
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadError::Malformed(msg) => write!(f, "malformed device payload: {}", msg),
            PayloadError::MissingChannel { sample, channel } => {
                write!(f, "sample {} has no {} reading", sample, channel)
            }
        }
    }
}

impl std::error::Error for PayloadError {}

#[derive(Debug, Deserialize)]
struct LogEntries {
    #[serde(default)]
    elements: Vec<LogEntry>,
}

#[derive(Debug, Deserialize)]
struct LogEntry {
    #[serde(rename = "Id")]
    id: u32,
}

/// Ids listed in the logbook directory, in device order.
pub fn parse_log_entries(body: &str) -> Result<Vec<u32>, PayloadError> {
    let entries: LogEntries =
        serde_json::from_str(body).map_err(|err| PayloadError::Malformed(err.to_string()))?;
    Ok(entries.elements.into_iter().map(|entry| entry.id).collect())
}

#[derive(Debug, Deserialize)]
struct LogData {
    #[serde(rename = "Meas")]
    meas: Measurements,
}

#[derive(Debug, Deserialize)]
struct Measurements {
    #[serde(rename = "IMU9")]
    imu9: Vec<Imu9Entry>,
}

#[derive(Debug, Deserialize)]
struct Imu9Entry {
    #[serde(rename = "ArrayAcc", default)]
    acc: Vec<Axis3>,
    #[serde(rename = "ArrayGyro", default)]
    gyro: Vec<Axis3>,
    #[serde(rename = "ArrayMagn", default)]
    magn: Vec<Axis3>,
}

/// One 9-axis reading parsed from a logbook entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Imu9Sample {
    pub acc: Axis3,
    pub gyro: Axis3,
    pub magn: Axis3,
}

fn first_reading(
    readings: &[Axis3],
    sample: usize,
    channel: &'static str,
) -> Result<Axis3, PayloadError> {
    readings
        .first()
        .copied()
        .ok_or(PayloadError::MissingChannel { sample, channel })
}

/// Parses `Meas.IMU9[]`, taking the first reading of each channel array.
pub fn parse_imu9_samples(body: &str) -> Result<Vec<Imu9Sample>, PayloadError> {
    let data: LogData =
        serde_json::from_str(body).map_err(|err| PayloadError::Malformed(err.to_string()))?;

    data.meas
        .imu9
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            Ok(Imu9Sample {
                acc: first_reading(&entry.acc, index, "ArrayAcc")?,
                gyro: first_reading(&entry.gyro, index, "ArrayGyro")?,
                magn: first_reading(&entry.magn, index, "ArrayMagn")?,
            })
        })
        .collect()
}

/// Assigns synthetic timestamps and returns records oldest first.
///
/// The last sample is stamped `now_ms`; each earlier one sits one sample
/// period (`1 / sample_rate_hz` s) before its successor.
pub fn samples_to_records(
    samples: &[Imu9Sample],
    now_ms: i64,
    sample_rate_hz: u32,
) -> Vec<SensorRecord> {
    let period_nanos = NANOS_PER_SECOND / i64::from(sample_rate_hz.max(1));

    let mut records: Vec<SensorRecord> = samples
        .iter()
        .rev()
        .enumerate()
        .map(|(steps_back, sample)| {
            let offset_ms = (steps_back as i64 * period_nanos) / NANOS_PER_MILLI;
            SensorRecord::new(now_ms - offset_ms, sample.acc, sample.gyro, sample.magn)
        })
        .collect();

    records.reverse();
    records
}
