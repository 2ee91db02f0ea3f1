use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{db::Database, scheduler::Job};

use super::{protocol, SensorController};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Copies the wearable's logbook into the store.
///
/// The logger is stopped, the newest log entry is read and parsed, the
/// samples are stored oldest first and logging is restarted with a full
/// reset. Device errors are logged and the sequence carries on; logging is
/// always resumed. A payload that does not have the expected shape is
/// reported as an error once logging has been resumed.
pub async fn drain_logger(
    controller: &SensorController,
    db: &Database,
    sample_rate_hz: u32,
    now: DateTime<Utc>,
) -> Result<usize> {
    let Some(session) = controller.session().await else {
        log_info!("no paired sensor, skipping drain");
        return Ok(0);
    };
    let serial = session.serial;
    let client = controller.client();

    if let Err(err) = controller.stop_logging().await {
        log_warn!("could not stop logging before drain: {:#}", err);
    }

    let entry_id = match client.get(&protocol::logbook_entries_uri(&serial)).await {
        Ok(body) => match protocol::parse_log_entries(&body) {
            Ok(ids) => ids
                .into_iter()
                .max()
                .unwrap_or(protocol::DEFAULT_LOG_ENTRY_ID),
            Err(err) => {
                log_warn!("unreadable log directory: {}", err);
                protocol::DEFAULT_LOG_ENTRY_ID
            }
        },
        Err(err) => {
            log_warn!("failed to list log entries: {}", err);
            protocol::DEFAULT_LOG_ENTRY_ID
        }
    };

    let outcome = match client
        .get(&protocol::log_entry_data_uri(&serial, entry_id))
        .await
    {
        Ok(body) => store_payload(db, &body, now, sample_rate_hz).await,
        Err(err) => {
            log_warn!("failed to read log entry {}: {}", entry_id, err);
            Ok(0)
        }
    };

    if let Err(err) = controller.start_logging().await {
        log_warn!("could not resume logging after drain: {:#}", err);
    }

    if let Ok(stored) = &outcome {
        log_info!("drained {} samples from entry {} of {}", stored, entry_id, serial);
    }
    outcome
}

async fn store_payload(
    db: &Database,
    body: &str,
    now: DateTime<Utc>,
    sample_rate_hz: u32,
) -> Result<usize> {
    let samples = protocol::parse_imu9_samples(body).context("Failed to parse logbook data")?;
    let records = protocol::samples_to_records(&samples, now.timestamp_millis(), sample_rate_hz);

    match db.insert_sensor_records(&records).await {
        Ok(stored) => Ok(stored),
        Err(err) => {
            log_warn!("failed to store {} samples: {:#}", records.len(), err);
            Ok(0)
        }
    }
}

/// Scheduled wrapper around [`drain_logger`].
pub struct DrainTask {
    controller: SensorController,
    db: Database,
    sample_rate_hz: u32,
}

impl DrainTask {
    pub fn new(controller: SensorController, db: Database, sample_rate_hz: u32) -> Self {
        Self {
            controller,
            db,
            sample_rate_hz,
        }
    }
}

#[async_trait]
impl Job for DrainTask {
    async fn run(&self) -> Result<()> {
        drain_logger(&self.controller, &self.db, self.sample_rate_hz, Utc::now())
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::SessionState;
    use crate::testing::{connected_controller, imu9_payload, temp_database, test_controller};
    use chrono::TimeZone;

    const SERIAL: &str = "174630000192";

    fn now() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_714_557_600_000).unwrap()
    }

    #[tokio::test]
    async fn drains_newest_entry_in_order() {
        let (_dir, controller, _link, client) = connected_controller().await;
        let (_db_dir, db) = temp_database();
        client.respond(
            &protocol::logbook_entries_uri(SERIAL),
            r#"{"elements":[{"Id":1},{"Id":4},{"Id":2}]}"#,
        );
        client.respond(&protocol::log_entry_data_uri(SERIAL, 4), &imu9_payload(13));

        let stored = drain_logger(&controller, &db, 13, now()).await.unwrap();
        assert_eq!(stored, 13);

        let rows = db.get_unsynced_sensor_records().await.unwrap();
        assert_eq!(rows.len(), 13);
        assert!(rows.windows(2).all(|pair| pair[0].timestamp < pair[1].timestamp));
        assert_eq!(rows[12].timestamp, now().timestamp_millis());
        let span = rows[12].timestamp - rows[0].timestamp;
        assert!((900..=1_000).contains(&span));

        assert_eq!(controller.state().await, SessionState::ConnectedLogging);
        let calls = client.calls();
        assert!(calls[0].uri.ends_with("DataLogger/State"));
        assert_eq!(calls[0].body.as_deref(), Some(r#"{"newState":2}"#));
        assert_eq!(
            calls.last().map(|c| c.body.as_deref()),
            Some(Some(r#"{"newState":3}"#))
        );
    }

    #[tokio::test]
    async fn device_errors_still_resume_logging() {
        let (_dir, controller, _link, client) = connected_controller().await;
        let (_db_dir, db) = temp_database();
        client.fail_on("get", "Logbook");

        let stored = drain_logger(&controller, &db, 13, now()).await.unwrap();
        assert_eq!(stored, 0);
        assert!(client
            .calls()
            .iter()
            .any(|c| c.uri == protocol::log_entry_data_uri(SERIAL, 1)));
        assert_eq!(controller.state().await, SessionState::ConnectedLogging);
    }

    #[tokio::test]
    async fn malformed_payload_fails_after_resume() {
        let (_dir, controller, _link, client) = connected_controller().await;
        let (_db_dir, db) = temp_database();
        client.respond(&protocol::log_entry_data_uri(SERIAL, 1), r#"{"Meas":[]}"#);

        assert!(drain_logger(&controller, &db, 13, now()).await.is_err());
        assert_eq!(controller.state().await, SessionState::ConnectedLogging);
        assert!(db.get_unsynced_sensor_records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn no_session_is_a_no_op() {
        let (_dir, controller, _link, client) = test_controller();
        let (_db_dir, db) = temp_database();

        let task = DrainTask::new(controller, db, 13);
        assert!(task.run().await.is_ok());
        assert!(client.calls().is_empty());
    }
}
