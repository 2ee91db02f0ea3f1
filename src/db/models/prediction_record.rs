use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classifier output for one window of sensor samples.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRecord {
    pub id: Option<i64>,
    pub prediction: String,
    /// Timestamp of the first sample in the window.
    pub start: i64,
    /// Timestamp of the last sample in the window.
    pub end: i64,
    pub created_at: DateTime<Utc>,
}
