use serde::{Deserialize, Serialize};

/// Record kinds that flow through the upload queue.
///
/// The numeric selector is the small keyed input a scheduled upload task
/// receives (`1` sensor, `2` steps, `3` heart rate).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum RecordKind {
    Sensor,
    Steps,
    HeartRate,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] = [RecordKind::Sensor, RecordKind::Steps, RecordKind::HeartRate];

    pub fn selector(self) -> i64 {
        match self {
            RecordKind::Sensor => 1,
            RecordKind::Steps => 2,
            RecordKind::HeartRate => 3,
        }
    }

    /// Unknown selectors map to `None`; callers treat that as a no-op.
    pub fn from_selector(selector: i64) -> Option<Self> {
        match selector {
            1 => Some(RecordKind::Sensor),
            2 => Some(RecordKind::Steps),
            3 => Some(RecordKind::HeartRate),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Sensor => "sensor",
            RecordKind::Steps => "steps",
            RecordKind::HeartRate => "heart_rate",
        }
    }
}
