use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::{
    db::{Database, RecordKind},
    scheduler::Job,
};

use super::{RemoteWriter, ToLine};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Sends every unsynced record of `kind`, one line per request.
///
/// Stops at the first failed send and reports it; records sent before the
/// failure stay marked synced. Returns the number of records sent.
pub async fn upload_unsynced(
    db: &Database,
    writer: &dyn RemoteWriter,
    kind: RecordKind,
) -> Result<usize> {
    let sent = match kind {
        RecordKind::Steps => {
            let records = db.get_unsynced_step_records().await?;
            let mut sent = 0;
            for record in records {
                send(writer, kind, &record.to_line()).await?;
                db.update_step_record(&record.synced()).await?;
                sent += 1;
            }
            sent
        }
        RecordKind::HeartRate => {
            let records = db.get_unsynced_heart_records().await?;
            let mut sent = 0;
            for record in records {
                send(writer, kind, &record.to_line()).await?;
                db.update_heart_record(&record.synced()).await?;
                sent += 1;
            }
            sent
        }
        RecordKind::Sensor => {
            let records = db.get_unsynced_sensor_records().await?;
            let mut sent = 0;
            for record in records {
                send(writer, kind, &record.to_line()).await?;
                db.update_sensor_record(&record.synced()).await?;
                sent += 1;
            }
            sent
        }
    };

    if sent > 0 {
        log_info!("uploaded {} {} records", sent, kind.as_str());
    } else {
        log_debug!("no unsynced {} records", kind.as_str());
    }
    Ok(sent)
}

async fn send(writer: &dyn RemoteWriter, kind: RecordKind, line: &str) -> Result<()> {
    if let Err(err) = writer.write_line(line).await {
        log_warn!("{} upload aborted: {}", kind.as_str(), err);
        return Err(anyhow::Error::new(err))
            .with_context(|| format!("Failed to upload {} record", kind.as_str()));
    }
    Ok(())
}

/// Scheduled upload keyed by a record-kind selector.
pub struct UploadTask {
    db: Database,
    writer: Arc<dyn RemoteWriter>,
    selector: i64,
}

impl UploadTask {
    pub fn new(db: Database, writer: Arc<dyn RemoteWriter>, selector: i64) -> Self {
        Self {
            db,
            writer,
            selector,
        }
    }

    pub fn for_kind(db: Database, writer: Arc<dyn RemoteWriter>, kind: RecordKind) -> Self {
        Self::new(db, writer, kind.selector())
    }
}

#[async_trait]
impl Job for UploadTask {
    async fn run(&self) -> Result<()> {
        let Some(kind) = RecordKind::from_selector(self.selector) else {
            log_debug!("ignoring upload for unknown selector {}", self.selector);
            return Ok(());
        };
        upload_unsynced(&self.db, self.writer.as_ref(), kind)
            .await
            .map(|_| ())
    }
}
