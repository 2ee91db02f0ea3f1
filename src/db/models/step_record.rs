use serde::{Deserialize, Serialize};

/// Step count over one interval, as reported by the platform health store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    /// Surrogate key; `None` until the row is inserted.
    pub id: Option<i64>,
    /// Health store metadata id, unique across the table.
    pub record_id: String,
    pub count: u64,
    pub start_time: i64,
    pub end_time: i64,
    pub is_synced: bool,
}

impl StepRecord {
    pub fn new(record_id: impl Into<String>, count: u64, start_time: i64, end_time: i64) -> Self {
        Self {
            id: None,
            record_id: record_id.into(),
            count,
            start_time,
            end_time,
            is_synced: false,
        }
    }

    pub fn synced(&self) -> Self {
        Self {
            is_synced: true,
            ..self.clone()
        }
    }
}
