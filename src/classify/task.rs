use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::{
    db::{Database, PredictionRecord},
    scheduler::Job,
};

use super::{extract_features, predict_label, ActivityModel};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Classifies the oldest `batch_size` unprocessed sensor samples.
///
/// Returns the stored prediction, or `None` when there was nothing to
/// classify. The prediction and the processed flags of its input samples
/// are stored together.
pub async fn classify_batch(
    db: &Database,
    model: &dyn ActivityModel,
    batch_size: usize,
) -> Result<Option<PredictionRecord>> {
    let batch = match db.get_unprocessed_sensor_records(batch_size).await {
        Ok(batch) => batch,
        Err(err) => {
            log_warn!("failed to load unprocessed samples: {:#}", err);
            return Ok(None);
        }
    };

    let (Some(first), Some(last)) = (batch.first(), batch.last()) else {
        log_debug!("no unprocessed samples to classify");
        return Ok(None);
    };
    let (start, end) = (first.timestamp, last.timestamp);

    let Some(features) = extract_features(&batch) else {
        return Ok(None);
    };
    let label = predict_label(model, &features).context("Classification failed")?;

    let mut prediction = PredictionRecord {
        id: None,
        prediction: label.as_str().to_string(),
        start,
        end,
        created_at: Utc::now(),
    };
    let sample_ids: Vec<i64> = batch.iter().filter_map(|record| record.id).collect();
    prediction.id = Some(
        db.record_prediction(&prediction, &sample_ids)
            .await
            .context("Failed to store classification window")?,
    );

    log_info!(
        "classified {} samples as {} ({}..{})",
        batch.len(),
        prediction.prediction,
        start,
        end
    );
    Ok(Some(prediction))
}

pub struct ClassificationTask {
    db: Database,
    model: Arc<dyn ActivityModel>,
    batch_size: usize,
}

impl ClassificationTask {
    pub fn new(db: Database, model: Arc<dyn ActivityModel>, batch_size: usize) -> Self {
        Self {
            db,
            model,
            batch_size,
        }
    }
}

#[async_trait]
impl Job for ClassificationTask {
    async fn run(&self) -> Result<()> {
        classify_batch(&self.db, self.model.as_ref(), self.batch_size)
            .await
            .map(|_| ())
    }
}
