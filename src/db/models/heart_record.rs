use serde::{Deserialize, Serialize};

/// One beats-per-minute reading inside a heart-rate series.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HeartSample {
    pub time: i64,
    pub bpm: u32,
}

/// Heart-rate series over one interval, as reported by the platform health store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HeartRecord {
    pub id: Option<i64>,
    pub record_id: String,
    pub samples: Vec<HeartSample>,
    pub start_time: i64,
    pub end_time: i64,
    pub is_synced: bool,
}

impl HeartRecord {
    pub fn new(
        record_id: impl Into<String>,
        samples: Vec<HeartSample>,
        start_time: i64,
        end_time: i64,
    ) -> Self {
        Self {
            id: None,
            record_id: record_id.into(),
            samples,
            start_time,
            end_time,
            is_synced: false,
        }
    }

    /// Arithmetic mean of the series; `None` for an empty series.
    pub fn mean_bpm(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let total: f64 = self.samples.iter().map(|s| f64::from(s.bpm)).sum();
        Some(total / self.samples.len() as f64)
    }

    pub fn synced(&self) -> Self {
        Self {
            is_synced: true,
            ..self.clone()
        }
    }
}
