//! Shared fixtures and in-memory fakes for the collaborator traits.

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use tempfile::{tempdir, TempDir};
use tokio::sync::Notify;

use crate::{
    classify::{ActivityModel, FeatureVector},
    config::SensorConfig,
    db::{Axis3, Database, SensorRecord},
    health::{HealthDataKind, HealthRecord, HealthSource},
    sensor::{DeviceClient, DeviceError, DiscoveredDevice, SensorController, SensorLink},
    settings::SettingsStore,
    upload::{RemoteWriter, WriteError},
};

pub const DEVICE_NAME: &str = "Movesense 174630000192";
pub const DEVICE_ADDRESS: &str = "0C:8C:DC:3F:B2:CD";

pub fn temp_database() -> (TempDir, Database) {
    let dir = tempdir().unwrap();
    let db = Database::new(dir.path().join("hcplus.sqlite3")).unwrap();
    (dir, db)
}

/// Sample with fixed readings, so a batch of them has zero spread.
pub fn sample_record(timestamp: i64) -> SensorRecord {
    SensorRecord::new(
        timestamp,
        Axis3::new(0.3, -0.2, 9.8),
        Axis3::new(1.5, 0.5, -0.5),
        Axis3::new(22.0, -4.0, 40.0),
    )
}

/// Logbook payload with `count` IMU9 samples. Sample `i` reads `acc.x = i`;
/// each channel carries a second reading that must be ignored.
pub fn imu9_payload(count: usize) -> String {
    let samples: Vec<_> = (0..count)
        .map(|i| {
            json!({
                "Timestamp": 1000 + i,
                "ArrayAcc": [{"x": i as f32, "y": 0.0, "z": 9.0}, {"x": 99.0, "y": 99.0, "z": 99.0}],
                "ArrayGyro": [{"x": 0.0, "y": 1.0, "z": 0.0}, {"x": 99.0, "y": 99.0, "z": 99.0}],
                "ArrayMagn": [{"x": 20.0, "y": 0.0, "z": 40.0}, {"x": 99.0, "y": 99.0, "z": 99.0}],
            })
        })
        .collect();
    json!({ "Meas": { "IMU9": samples } }).to_string()
}

type HealthQuery = (HealthDataKind, DateTime<Utc>, DateTime<Utc>);

/// Returns the same records for every query and remembers each query.
pub struct FakeHealthSource {
    records: Vec<HealthRecord>,
    fail: bool,
    queries: Mutex<Vec<HealthQuery>>,
}

impl FakeHealthSource {
    pub fn with_records(records: Vec<HealthRecord>) -> Self {
        Self {
            records,
            fail: false,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::with_records(Vec::new())
        }
    }

    pub fn queries(&self) -> Vec<HealthQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl HealthSource for FakeHealthSource {
    async fn read_records(
        &self,
        kind: HealthDataKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HealthRecord>> {
        self.queries.lock().unwrap().push((kind, start, end));
        if self.fail {
            return Err(anyhow!("health permission revoked"));
        }
        Ok(self.records.clone())
    }
}

#[derive(Default)]
pub struct FakeSensorLink {
    calls: Mutex<Vec<String>>,
    fail_connect: Mutex<bool>,
}

impl FakeSensorLink {
    pub fn fail_connect(&self) {
        *self.fail_connect.lock().unwrap() = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl SensorLink for FakeSensorLink {
    async fn start_discovery(&self) -> Result<(), DeviceError> {
        self.record("start_discovery".into());
        Ok(())
    }

    async fn stop_discovery(&self) -> Result<(), DeviceError> {
        self.record("stop_discovery".into());
        Ok(())
    }

    async fn connect(&self, address: &str) -> Result<(), DeviceError> {
        self.record(format!("connect:{address}"));
        if *self.fail_connect.lock().unwrap() {
            return Err(DeviceError::Transport("gatt timeout".into()));
        }
        Ok(())
    }

    async fn disconnect(&self, address: &str) -> Result<(), DeviceError> {
        self.record(format!("disconnect:{address}"));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCall {
    pub method: &'static str,
    pub uri: String,
    pub body: Option<String>,
}

type HeldCommand = (&'static str, String, Arc<Notify>);

/// Scripted device. Unscripted reads return `{}`; every call is logged,
/// failed ones included.
#[derive(Default)]
pub struct FakeDeviceClient {
    responses: Mutex<Vec<(String, String)>>,
    failures: Mutex<Vec<(&'static str, String)>>,
    held: Mutex<Vec<HeldCommand>>,
    calls: Mutex<Vec<DeviceCall>>,
}

impl FakeDeviceClient {
    pub fn respond(&self, uri: &str, body: &str) {
        self.responses
            .lock()
            .unwrap()
            .push((uri.to_string(), body.to_string()));
    }

    /// Fails every `method` call whose URI contains `fragment`.
    pub fn fail_on(&self, method: &'static str, fragment: &str) {
        self.failures
            .lock()
            .unwrap()
            .push((method, fragment.to_string()));
    }

    /// Parks every `method` call whose URI contains `fragment` until the
    /// returned gate is notified.
    pub fn hold_on(&self, method: &'static str, fragment: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.held
            .lock()
            .unwrap()
            .push((method, fragment.to_string(), Arc::clone(&gate)));
        gate
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.calls.lock().unwrap().clone()
    }

    async fn wait_if_held(&self, method: &'static str, uri: &str) {
        let gate = self
            .held
            .lock()
            .unwrap()
            .iter()
            .find(|(m, fragment, _)| *m == method && uri.contains(fragment.as_str()))
            .map(|(_, _, gate)| Arc::clone(gate));
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }

    fn handle(&self, method: &'static str, uri: &str, body: Option<&str>) -> Result<String, DeviceError> {
        self.calls.lock().unwrap().push(DeviceCall {
            method,
            uri: uri.to_string(),
            body: body.map(str::to_string),
        });

        let fails = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .any(|(m, fragment)| *m == method && uri.contains(fragment.as_str()));
        if fails {
            return Err(DeviceError::Rejected {
                status: 503,
                message: "busy".into(),
            });
        }

        let response = self
            .responses
            .lock()
            .unwrap()
            .iter()
            .find(|(u, _)| u == uri)
            .map(|(_, body)| body.clone());
        Ok(response.unwrap_or_else(|| "{}".to_string()))
    }
}

#[async_trait]
impl DeviceClient for FakeDeviceClient {
    async fn get(&self, uri: &str) -> Result<String, DeviceError> {
        self.wait_if_held("get", uri).await;
        self.handle("get", uri, None)
    }

    async fn put(&self, uri: &str, body: &str) -> Result<String, DeviceError> {
        self.wait_if_held("put", uri).await;
        self.handle("put", uri, Some(body))
    }

    async fn delete(&self, uri: &str) -> Result<String, DeviceError> {
        self.wait_if_held("delete", uri).await;
        self.handle("delete", uri, None)
    }
}

pub fn test_controller() -> (
    TempDir,
    SensorController,
    Arc<FakeSensorLink>,
    Arc<FakeDeviceClient>,
) {
    let dir = tempdir().unwrap();
    let settings = Arc::new(SettingsStore::new(dir.path().join("settings.json")).unwrap());
    let link = Arc::new(FakeSensorLink::default());
    let client = Arc::new(FakeDeviceClient::default());
    let controller = SensorController::new(
        link.clone(),
        client.clone(),
        settings,
        SensorConfig::default(),
    );
    (dir, controller, link, client)
}

/// Controller already paired with [`DEVICE_NAME`] and idle.
pub async fn connected_controller() -> (
    TempDir,
    SensorController,
    Arc<FakeSensorLink>,
    Arc<FakeDeviceClient>,
) {
    let (dir, controller, link, client) = test_controller();
    controller.start_scan().await.unwrap();
    controller
        .on_device_discovered(DiscoveredDevice::new(DEVICE_NAME, DEVICE_ADDRESS))
        .await;
    controller.connect(DEVICE_ADDRESS).await.unwrap();
    (dir, controller, link, client)
}

/// Counts writes; optionally fails the `n`th one (1-based).
#[derive(Default)]
pub struct FakeWriter {
    fail_at: Option<usize>,
    lines: Mutex<Vec<String>>,
}

impl FakeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_at(call: usize) -> Self {
        Self {
            fail_at: Some(call),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.lines.lock().unwrap().len()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteWriter for FakeWriter {
    async fn write_line(&self, line: &str) -> Result<(), WriteError> {
        let mut lines = self.lines.lock().unwrap();
        lines.push(line.to_string());
        if Some(lines.len()) == self.fail_at {
            return Err(WriteError::Status(500));
        }
        Ok(())
    }
}

/// Returns fixed scores and remembers its input.
pub struct FixedModel {
    scores: Vec<f32>,
    seen: Mutex<Vec<FeatureVector>>,
}

impl FixedModel {
    pub fn new(scores: Vec<f32>) -> Self {
        Self {
            scores,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn last_features(&self) -> Option<FeatureVector> {
        self.seen.lock().unwrap().last().copied()
    }
}

impl ActivityModel for FixedModel {
    fn predict(&self, features: &FeatureVector) -> Result<Vec<f32>> {
        self.seen.lock().unwrap().push(*features);
        Ok(self.scores.clone())
    }
}
