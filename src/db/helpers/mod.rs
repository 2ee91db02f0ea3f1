use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};

use crate::db::models::RecordKind;

pub fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

pub fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn flag_to_sql(value: bool) -> i64 {
    i64::from(value)
}

pub fn flag_from_sql(value: i64) -> bool {
    value != 0
}

/// Table backing each syncable record kind.
pub fn table_for(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Sensor => "sensor_records",
        RecordKind::Steps => "step_records",
        RecordKind::HeartRate => "heart_records",
    }
}

