//! Platform health-data ingestion.
//!
//! The host exposes its health store through [`HealthSource`]; the
//! ingestion task copies a trailing window of records into the local store.

pub mod ingest;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::HeartSample;

pub use ingest::{IngestReport, IngestionTask};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum HealthDataKind {
    Steps,
    HeartRate,
}

impl HealthDataKind {
    pub fn as_str(self) -> &'static str {
        match self {
            HealthDataKind::Steps => "steps",
            HealthDataKind::HeartRate => "heart_rate",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HealthPayload {
    Steps(u64),
    HeartRate(Vec<HeartSample>),
}

impl HealthPayload {
    pub fn kind(&self) -> HealthDataKind {
        match self {
            HealthPayload::Steps(_) => HealthDataKind::Steps,
            HealthPayload::HeartRate(_) => HealthDataKind::HeartRate,
        }
    }
}

/// One typed record returned by the platform health API.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthRecord {
    /// Platform metadata id; stable across reads of the same record.
    pub metadata_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub payload: HealthPayload,
}

/// Read access to the platform health store.
#[async_trait]
pub trait HealthSource: Send + Sync {
    /// All records of `kind` whose interval falls within `[start, end]`.
    async fn read_records(
        &self,
        kind: HealthDataKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HealthRecord>>;
}
