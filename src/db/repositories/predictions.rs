use anyhow::{bail, Context, Result};
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, to_i64},
    models::PredictionRecord,
};

fn row_to_prediction(row: &Row) -> Result<PredictionRecord> {
    let created_at: String = row.get("created_at")?;

    Ok(PredictionRecord {
        id: Some(row.get("id")?),
        prediction: row.get("prediction")?,
        start: row.get("start_time")?,
        end: row.get("end_time")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

impl Database {
    /// Stores `record` and marks every sample in `sample_ids` processed, in
    /// one transaction. A sample that no longer exists rolls back both.
    pub async fn record_prediction(
        &self,
        record: &PredictionRecord,
        sample_ids: &[i64],
    ) -> Result<i64> {
        let record = record.clone();
        let sample_ids = sample_ids.to_vec();
        self.execute(move |conn| {
            let tx = conn
                .transaction()
                .context("failed to open prediction transaction")?;
            tx.execute(
                "INSERT INTO prediction_records (prediction, start_time, end_time, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.prediction,
                    record.start,
                    record.end,
                    record.created_at.to_rfc3339(),
                ],
            )
            .context("failed to insert prediction")?;
            let id = tx.last_insert_rowid();

            {
                let mut stmt =
                    tx.prepare("UPDATE sensor_records SET is_processed = 1 WHERE id = ?1")?;
                for sample_id in &sample_ids {
                    if stmt.execute(params![sample_id])? == 0 {
                        bail!("sensor record {} disappeared before classification", sample_id);
                    }
                }
            }

            tx.commit().context("failed to commit prediction")?;
            Ok(id)
        })
        .await
    }

    /// Most recent predictions first.
    pub async fn get_predictions(&self, limit: usize) -> Result<Vec<PredictionRecord>> {
        let limit = to_i64(limit as u64)?;
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, prediction, start_time, end_time, created_at
                 FROM prediction_records
                 ORDER BY id DESC
                 LIMIT ?1",
            )?;

            let mut rows = stmt.query(params![limit])?;
            let mut predictions = Vec::new();
            while let Some(row) = rows.next()? {
                predictions.push(row_to_prediction(row)?);
            }
            Ok(predictions)
        })
        .await
    }
}
