use serde::{Deserialize, Serialize};

/// Three-axis reading.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Axis3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Axis3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean norm, computed in double precision.
    pub fn magnitude(&self) -> f64 {
        let (x, y, z) = (f64::from(self.x), f64::from(self.y), f64::from(self.z));
        (x * x + y * y + z * z).sqrt()
    }
}

/// One 9-axis sample drained from the wearable's logger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SensorRecord {
    pub id: Option<i64>,
    /// Reconstructed sample time, ms since epoch.
    pub timestamp: i64,
    pub acc: Axis3,
    pub gyro: Axis3,
    pub magn: Axis3,
    pub is_synced: bool,
    pub is_processed: bool,
}

impl SensorRecord {
    pub fn new(timestamp: i64, acc: Axis3, gyro: Axis3, magn: Axis3) -> Self {
        Self {
            id: None,
            timestamp,
            acc,
            gyro,
            magn,
            is_synced: false,
            is_processed: false,
        }
    }

    pub fn synced(&self) -> Self {
        Self {
            is_synced: true,
            ..self.clone()
        }
    }

    pub fn processed(&self) -> Self {
        Self {
            is_processed: true,
            ..self.clone()
        }
    }
}
