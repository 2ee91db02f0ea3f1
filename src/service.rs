//! Host-facing façade that wires the collaborators, the store and the
//! scheduler together.

use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use serde::Serialize;

use crate::{
    classify::{ActivityModel, ClassificationTask, DenseModel},
    config::PipelineConfig,
    db::{Database, RecordKind},
    health::{HealthDataKind, HealthSource, IngestionTask},
    scheduler::{ExistingPolicy, TaskScheduler},
    sensor::{
        DeviceClient, DrainTask, LoggerTask, SensorController, SensorLink, SensorSession,
        SessionState,
    },
    settings::SettingsStore,
    upload::{InfluxWriter, RemoteWriter, UploadTask},
};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

pub const READ_STEPS_TASK: &str = "read_steps";
pub const READ_HEART_RATE_TASK: &str = "read_heart_rate";
pub const SENSOR_DRAIN_TASK: &str = "sensor_drain";
pub const SENSOR_DRAIN_TAG: &str = "sensor_drain";
pub const CONFIGURE_LOGGER_TASK: &str = "configure_logger";
pub const CLASSIFY_TASK: &str = "classify_sensor";

pub fn ingestion_task_name(kind: HealthDataKind) -> &'static str {
    match kind {
        HealthDataKind::Steps => READ_STEPS_TASK,
        HealthDataKind::HeartRate => READ_HEART_RATE_TASK,
    }
}

pub fn upload_task_name(kind: RecordKind) -> String {
    format!("upload_{}", kind.as_str())
}

pub fn upload_tag(kind: RecordKind) -> String {
    format!("upload:{}", kind.as_str())
}

/// Platform collaborators supplied by the host.
///
/// `writer` and `model` fall back to the InfluxDB client and the JSON model
/// named in the configuration.
pub struct Collaborators {
    pub health: Arc<dyn HealthSource>,
    pub link: Arc<dyn SensorLink>,
    pub device: Arc<dyn DeviceClient>,
    pub writer: Option<Arc<dyn RemoteWriter>>,
    pub model: Option<Arc<dyn ActivityModel>>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UnsyncedCounts {
    pub sensor: u64,
    pub steps: u64,
    pub heart_rate: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub sensor_state: SessionState,
    pub session: Option<SensorSession>,
    pub unsynced: UnsyncedCounts,
    pub scheduled: Vec<String>,
}

pub struct CollectionService {
    config: PipelineConfig,
    db: Database,
    settings: Arc<SettingsStore>,
    scheduler: TaskScheduler,
    controller: SensorController,
    health: Arc<dyn HealthSource>,
    writer: Arc<dyn RemoteWriter>,
    model: Option<Arc<dyn ActivityModel>>,
}

impl CollectionService {
    pub fn new(config: PipelineConfig, parts: Collaborators) -> Result<Self> {
        let db = Database::new(config.db_path.clone())?;
        let settings = Arc::new(SettingsStore::new(config.settings_path.clone())?);

        let writer: Arc<dyn RemoteWriter> = match parts.writer {
            Some(writer) => writer,
            None => Arc::new(
                InfluxWriter::new(config.remote.clone()).context("Failed to build HTTP client")?,
            ),
        };

        let model: Option<Arc<dyn ActivityModel>> = match (parts.model, &config.model_path) {
            (Some(model), _) => Some(model),
            (None, Some(path)) => {
                let model: Arc<dyn ActivityModel> = Arc::new(DenseModel::load(path)?);
                Some(model)
            }
            (None, None) => None,
        };

        let controller = SensorController::new(
            parts.link,
            parts.device,
            Arc::clone(&settings),
            config.sensor.clone(),
        );

        if let Some(device) = controller.restorable_device() {
            log_info!("last paired sensor {} ({})", device.name, device.address);
        }

        Ok(Self {
            config,
            db,
            settings,
            scheduler: TaskScheduler::new(),
            controller,
            health: parts.health,
            writer,
            model,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn controller(&self) -> &SensorController {
        &self.controller
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    /// Starts periodic ingestion of the health kinds the user collects and
    /// restores the upload and classification schedules they had enabled.
    pub fn start(&self) -> Result<()> {
        let prefs = self.settings.preferences();
        for kind in [HealthDataKind::Steps, HealthDataKind::HeartRate] {
            if prefs.collect_enabled(kind) {
                self.schedule_ingestion(kind);
            }
        }
        for kind in RecordKind::ALL {
            if prefs.send_enabled(kind) {
                self.schedule_upload(kind);
            }
        }
        if prefs.classify_sensor {
            if let Err(err) = self.schedule_classification() {
                log_warn!("classification not restored: {:#}", err);
            }
        }

        log_info!("collection started");
        Ok(())
    }

    /// Cancels ingestion and the sensor drain. Persisted toggles are kept
    /// for the next [`start`](Self::start).
    pub fn stop(&self) -> Result<()> {
        self.scheduler.cancel_by_name(READ_STEPS_TASK);
        self.scheduler.cancel_by_name(READ_HEART_RATE_TASK);
        self.scheduler.cancel_by_tag(SENSOR_DRAIN_TAG);
        log_info!("collection stopped");
        Ok(())
    }

    pub fn set_collect_enabled(&self, kind: HealthDataKind, enabled: bool) -> Result<()> {
        self.settings.set_collect_enabled(kind, enabled)?;
        if enabled {
            self.schedule_ingestion(kind);
        } else {
            self.scheduler.cancel_by_name(ingestion_task_name(kind));
        }
        Ok(())
    }

    pub fn set_send_enabled(&self, kind: RecordKind, enabled: bool) -> Result<()> {
        self.settings.set_send_enabled(kind, enabled)?;
        if enabled {
            self.schedule_upload(kind);
        } else {
            self.scheduler.cancel_by_tag(&upload_tag(kind));
        }
        Ok(())
    }

    /// Uploads everything unsynced of `kind` now.
    pub fn flush(&self, kind: RecordKind) -> String {
        let tag = upload_tag(kind);
        self.scheduler.enqueue_one_shot(
            &upload_task_name(kind),
            Some(tag.as_str()),
            Arc::new(UploadTask::for_kind(
                self.db.clone(),
                Arc::clone(&self.writer),
                kind,
            )),
        )
    }

    /// Configures the logger and starts the periodic drain.
    pub fn start_logging(&self) {
        let schedule = &self.config.schedule;
        self.scheduler.enqueue_one_shot(
            CONFIGURE_LOGGER_TASK,
            None,
            Arc::new(LoggerTask::new(self.controller.clone(), true)),
        );
        self.scheduler.enqueue_unique_periodic(
            SENSOR_DRAIN_TASK,
            Some(SENSOR_DRAIN_TAG),
            schedule.drain_interval(),
            schedule.drain_initial_delay(),
            ExistingPolicy::Keep,
            self.drain_task(),
        );
    }

    pub fn stop_logging(&self) {
        self.scheduler.cancel_by_tag(SENSOR_DRAIN_TAG);
        self.scheduler.enqueue_one_shot(
            CONFIGURE_LOGGER_TASK,
            None,
            Arc::new(LoggerTask::new(self.controller.clone(), false)),
        );
    }

    /// Drains the device logbook now.
    pub fn flush_sensor(&self) -> String {
        self.scheduler
            .enqueue_one_shot(SENSOR_DRAIN_TASK, Some(SENSOR_DRAIN_TAG), self.drain_task())
    }

    pub async fn disconnect(&self) -> Result<SessionState> {
        self.scheduler.cancel_by_tag(SENSOR_DRAIN_TAG);
        self.controller.disconnect().await
    }

    pub fn set_classification_enabled(&self, enabled: bool) -> Result<()> {
        if enabled {
            self.schedule_classification()?;
        } else {
            self.scheduler.cancel_by_name(CLASSIFY_TASK);
        }
        self.settings.set_classify_sensor(enabled)
    }

    pub async fn status(&self) -> Result<ServiceStatus> {
        let snapshot = self.controller.snapshot().await;
        let unsynced = UnsyncedCounts {
            sensor: self.db.count_unsynced(RecordKind::Sensor).await?,
            steps: self.db.count_unsynced(RecordKind::Steps).await?,
            heart_rate: self.db.count_unsynced(RecordKind::HeartRate).await?,
        };

        Ok(ServiceStatus {
            sensor_state: snapshot.state,
            session: snapshot.session,
            unsynced,
            scheduled: self.scheduler.scheduled_names(),
        })
    }

    /// Cancels every scheduled task.
    pub fn shutdown(&self) {
        let cancelled = self.scheduler.cancel_all();
        log_info!("shutdown cancelled {} tasks", cancelled);
    }

    fn schedule_ingestion(&self, kind: HealthDataKind) {
        let schedule = &self.config.schedule;
        let window = match kind {
            HealthDataKind::Steps => schedule.steps_window_secs,
            HealthDataKind::HeartRate => schedule.heart_window_secs,
        };
        self.scheduler.enqueue_unique_periodic(
            ingestion_task_name(kind),
            None,
            schedule.ingestion_interval(),
            Duration::ZERO,
            ExistingPolicy::Keep,
            Arc::new(IngestionTask::new(
                Arc::clone(&self.health),
                self.db.clone(),
                kind,
                Duration::from_secs(window),
            )),
        );
    }

    fn schedule_upload(&self, kind: RecordKind) {
        let schedule = &self.config.schedule;
        let tag = upload_tag(kind);
        self.scheduler.enqueue_unique_periodic(
            &upload_task_name(kind),
            Some(tag.as_str()),
            schedule.upload_interval(),
            schedule.upload_initial_delay(),
            ExistingPolicy::Keep,
            Arc::new(UploadTask::for_kind(
                self.db.clone(),
                Arc::clone(&self.writer),
                kind,
            )),
        );
    }

    fn schedule_classification(&self) -> Result<()> {
        let model = self
            .model
            .clone()
            .ok_or_else(|| anyhow!("no classification model configured"))?;

        self.scheduler.enqueue_unique_periodic(
            CLASSIFY_TASK,
            None,
            self.config.schedule.classify_interval(),
            self.config.schedule.classify_interval(),
            ExistingPolicy::Keep,
            Arc::new(ClassificationTask::new(
                self.db.clone(),
                model,
                self.config.sensor.classify_batch_size,
            )),
        );
        Ok(())
    }

    fn drain_task(&self) -> Arc<DrainTask> {
        Arc::new(DrainTask::new(
            self.controller.clone(),
            self.db.clone(),
            self.config.sensor.sample_rate_hz,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StepRecord;
    use crate::sensor::DiscoveredDevice;
    use crate::testing::{
        FakeDeviceClient, FakeHealthSource, FakeSensorLink, FakeWriter, FixedModel,
        DEVICE_ADDRESS, DEVICE_NAME,
    };
    use tempfile::{tempdir, TempDir};
    use tokio::time::sleep;

    struct Harness {
        _dir: TempDir,
        service: CollectionService,
        health: Arc<FakeHealthSource>,
        device: Arc<FakeDeviceClient>,
        writer: Arc<FakeWriter>,
    }

    fn harness(model: Option<Arc<dyn ActivityModel>>) -> Harness {
        let dir = tempdir().unwrap();
        let config = PipelineConfig {
            db_path: dir.path().join("hcplus.sqlite3"),
            settings_path: dir.path().join("settings.json"),
            ..PipelineConfig::default()
        };
        let health = Arc::new(FakeHealthSource::with_records(Vec::new()));
        let device = Arc::new(FakeDeviceClient::default());
        let writer = Arc::new(FakeWriter::new());

        let service = CollectionService::new(
            config,
            Collaborators {
                health: health.clone(),
                link: Arc::new(FakeSensorLink::default()),
                device: device.clone(),
                writer: Some(writer.clone()),
                model,
            },
        )
        .unwrap();

        Harness {
            _dir: dir,
            service,
            health,
            device,
            writer,
        }
    }

    async fn pair(service: &CollectionService) {
        let controller = service.controller();
        controller.start_scan().await.unwrap();
        controller
            .on_device_discovered(DiscoveredDevice::new(DEVICE_NAME, DEVICE_ADDRESS))
            .await;
        controller.connect(DEVICE_ADDRESS).await.unwrap();
    }

    #[tokio::test]
    async fn start_runs_both_ingestions_once_per_name() {
        let h = harness(None);

        h.service.start().unwrap();
        h.service.start().unwrap();
        sleep(Duration::from_millis(50)).await;

        let kinds: Vec<HealthDataKind> = h.health.queries().into_iter().map(|q| q.0).collect();
        assert_eq!(kinds.len(), 2);
        assert!(kinds.contains(&HealthDataKind::Steps));
        assert!(kinds.contains(&HealthDataKind::HeartRate));

        h.service.stop().unwrap();
        assert!(!h.service.scheduler().is_scheduled(READ_STEPS_TASK));
        assert!(!h.service.scheduler().is_scheduled(READ_HEART_RATE_TASK));
        assert!(h.service.settings().preferences().collect_steps);
    }

    #[tokio::test]
    async fn disabling_heart_rate_cancels_only_its_ingestion() {
        let h = harness(None);
        h.service.start().unwrap();

        h.service
            .set_collect_enabled(HealthDataKind::HeartRate, false)
            .unwrap();
        assert!(h.service.scheduler().is_scheduled(READ_STEPS_TASK));
        assert!(!h.service.scheduler().is_scheduled(READ_HEART_RATE_TASK));

        h.service.stop().unwrap();
        h.service.start().unwrap();
        assert!(h.service.scheduler().is_scheduled(READ_STEPS_TASK));
        assert!(!h.service.scheduler().is_scheduled(READ_HEART_RATE_TASK));

        h.service
            .set_collect_enabled(HealthDataKind::HeartRate, true)
            .unwrap();
        assert!(h.service.scheduler().is_scheduled(READ_HEART_RATE_TASK));
        h.service.shutdown();
    }

    #[tokio::test]
    async fn send_toggle_schedules_and_cancels_upload() {
        let h = harness(None);
        let name = upload_task_name(RecordKind::Steps);

        h.service.set_send_enabled(RecordKind::Steps, true).unwrap();
        assert!(h.service.scheduler().is_scheduled(&name));
        assert!(h.service.settings().preferences().send_steps);

        h.service.set_send_enabled(RecordKind::Steps, false).unwrap();
        assert!(!h.service.scheduler().is_scheduled(&name));
        assert!(!h.service.settings().preferences().send_steps);
    }

    #[tokio::test]
    async fn flush_uploads_immediately() {
        let h = harness(None);
        h.service
            .database()
            .insert_step_record(&StepRecord::new("a", 12, 0, 1))
            .await
            .unwrap();

        h.service.flush(RecordKind::Steps);
        sleep(Duration::from_millis(50)).await;

        assert_eq!(h.writer.calls(), 1);
        let status = h.service.status().await.unwrap();
        assert_eq!(status.unsynced, UnsyncedCounts::default());
    }

    #[tokio::test]
    async fn logging_lifecycle_drives_the_device() {
        let h = harness(None);
        pair(&h.service).await;

        h.service.start_logging();
        sleep(Duration::from_millis(50)).await;
        assert_eq!(
            h.service.controller().state().await,
            SessionState::ConnectedLogging
        );
        assert!(h.service.scheduler().is_scheduled(SENSOR_DRAIN_TASK));

        h.service.stop_logging();
        sleep(Duration::from_millis(50)).await;
        assert_eq!(
            h.service.controller().state().await,
            SessionState::ConnectedIdle
        );
        assert!(!h.service.scheduler().is_scheduled(SENSOR_DRAIN_TASK));

        assert_eq!(h.service.disconnect().await.unwrap(), SessionState::Disconnected);
        assert!(h.device.calls().iter().any(|c| c.body.as_deref() == Some(r#"{"newState":2}"#)));
    }

    #[tokio::test]
    async fn classification_needs_a_model() {
        let h = harness(None);
        assert!(h.service.set_classification_enabled(true).is_err());
        assert!(!h.service.settings().preferences().classify_sensor);

        let h = harness(Some(Arc::new(FixedModel::new(vec![1.0, 0.0, 0.0, 0.0, 0.0]))));
        h.service.set_classification_enabled(true).unwrap();
        assert!(h.service.scheduler().is_scheduled(CLASSIFY_TASK));
        h.service.set_classification_enabled(false).unwrap();
        assert!(!h.service.scheduler().is_scheduled(CLASSIFY_TASK));
    }
}
