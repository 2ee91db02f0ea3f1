use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::{
    db::{Database, HeartRecord, StepRecord},
    scheduler::Job,
};

use super::{HealthDataKind, HealthPayload, HealthRecord, HealthSource};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub fetched: usize,
    pub inserted: usize,
}

/// Copies one kind of health record for a trailing window into the store.
///
/// The window is `[now - window, now]`. Consecutive runs overlap on purpose;
/// insert-or-ignore on the external id keeps the store free of duplicates,
/// so a failed run is repaired by the next one. Read and write failures are
/// logged and end the run early without reporting an error.
pub async fn ingest_window(
    source: &dyn HealthSource,
    db: &Database,
    kind: HealthDataKind,
    window: Duration,
    now: DateTime<Utc>,
) -> IngestReport {
    let start = now - window;
    let mut report = IngestReport::default();

    let records = match source.read_records(kind, start, now).await {
        Ok(records) => records,
        Err(err) => {
            log_warn!("health read for {} failed: {err:#}", kind.as_str());
            return report;
        }
    };
    report.fetched = records.len();

    for record in records {
        match store_record(db, kind, record).await {
            Ok(true) => report.inserted += 1,
            Ok(false) => {}
            Err(err) => {
                log_warn!("storing {} record failed: {err:#}", kind.as_str());
                return report;
            }
        }
    }

    log_info!(
        "{} ingestion: fetched {}, inserted {} ({} .. {})",
        kind.as_str(),
        report.fetched,
        report.inserted,
        start.to_rfc3339(),
        now.to_rfc3339()
    );
    report
}

async fn store_record(db: &Database, kind: HealthDataKind, record: HealthRecord) -> Result<bool> {
    let HealthRecord {
        metadata_id,
        start,
        end,
        payload,
    } = record;

    match payload {
        HealthPayload::Steps(count) if kind == HealthDataKind::Steps => {
            let row = StepRecord::new(
                metadata_id,
                count,
                start.timestamp_millis(),
                end.timestamp_millis(),
            );
            db.insert_step_record(&row).await
        }
        HealthPayload::HeartRate(samples) if kind == HealthDataKind::HeartRate => {
            let row = HeartRecord::new(
                metadata_id,
                samples,
                start.timestamp_millis(),
                end.timestamp_millis(),
            );
            db.insert_heart_record(&row).await
        }
        other => {
            log_debug!(
                "skipping {} record {} returned for a {} query",
                other.kind().as_str(),
                metadata_id,
                kind.as_str()
            );
            Ok(false)
        }
    }
}

/// Scheduled wrapper around [`ingest_window`].
pub struct IngestionTask {
    source: Arc<dyn HealthSource>,
    db: Database,
    kind: HealthDataKind,
    window: Duration,
}

impl IngestionTask {
    pub fn new(
        source: Arc<dyn HealthSource>,
        db: Database,
        kind: HealthDataKind,
        window: std::time::Duration,
    ) -> Self {
        Self {
            source,
            db,
            kind,
            window: Duration::from_std(window).unwrap_or_else(|_| Duration::minutes(15)),
        }
    }
}

#[async_trait]
impl Job for IngestionTask {
    async fn run(&self) -> Result<()> {
        ingest_window(self.source.as_ref(), &self.db, self.kind, self.window, Utc::now()).await;
        Ok(())
    }
}
