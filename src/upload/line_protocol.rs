//! Line-protocol rendering of stored records.
//!
//! `<measurement> <field>=<value>[,<field>=<value>...] <timestamp>` with
//! timestamps in milliseconds. Measurement names and field types match the
//! series the mobile app already writes, so both can share a bucket.

use crate::db::{Axis3, HeartRecord, SensorRecord, StepRecord};

pub trait ToLine {
    fn to_line(&self) -> String;
}

impl ToLine for StepRecord {
    fn to_line(&self) -> String {
        format!("step_records count={} {}", self.count, self.start_time)
    }
}

impl ToLine for HeartRecord {
    fn to_line(&self) -> String {
        let samples = self.samples.len();
        match self.mean_bpm() {
            Some(mean) => format!(
                "heart_records bpm={},samples={}i {}",
                mean, samples, self.start_time
            ),
            None => format!("heart_records samples={}i {}", samples, self.start_time),
        }
    }
}

fn axis_fields(axis: &Axis3, suffix: &str) -> String {
    format!(
        "x_{suffix}={},y_{suffix}={},z_{suffix}={}",
        axis.x, axis.y, axis.z
    )
}

impl ToLine for SensorRecord {
    fn to_line(&self) -> String {
        format!(
            "movesense_record {},{},{} {}",
            axis_fields(&self.acc, "acc"),
            axis_fields(&self.gyro, "gyro"),
            axis_fields(&self.magn, "magn"),
            self.timestamp
        )
    }
}
