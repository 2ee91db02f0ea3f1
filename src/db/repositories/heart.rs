use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Row};
use serde_json::{from_str, to_string};

use crate::db::{
    connection::Database,
    helpers::{flag_from_sql, flag_to_sql},
    models::{HeartRecord, HeartSample},
};

fn row_to_heart_record(row: &Row) -> Result<HeartRecord> {
    let samples_json: String = row.get("samples_json")?;
    let is_synced: i64 = row.get("is_synced")?;
    let samples: Vec<HeartSample> =
        from_str(&samples_json).context("failed to decode heart-rate samples")?;

    Ok(HeartRecord {
        id: Some(row.get("id")?),
        record_id: row.get("record_id")?,
        samples,
        start_time: row.get("start_time")?,
        end_time: row.get("end_time")?,
        is_synced: flag_from_sql(is_synced),
    })
}

impl Database {
    pub async fn insert_heart_record(&self, record: &HeartRecord) -> Result<bool> {
        let record = record.clone();
        self.execute(move |conn| {
            let samples_json =
                to_string(&record.samples).context("failed to encode heart-rate samples")?;
            let changed = conn
                .execute(
                    "INSERT OR IGNORE INTO heart_records (record_id, samples_json, start_time, end_time, is_synced)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        record.record_id,
                        samples_json,
                        record.start_time,
                        record.end_time,
                        flag_to_sql(record.is_synced),
                    ],
                )
                .with_context(|| format!("failed to insert heart record {}", record.record_id))?;
            Ok(changed > 0)
        })
        .await
    }

    pub async fn update_heart_record(&self, record: &HeartRecord) -> Result<()> {
        let record = record.clone();
        let id = record
            .id
            .ok_or_else(|| anyhow!("cannot update heart record {} without id", record.record_id))?;
        self.execute(move |conn| {
            let samples_json =
                to_string(&record.samples).context("failed to encode heart-rate samples")?;
            conn.execute(
                "UPDATE heart_records
                 SET record_id = ?1,
                     samples_json = ?2,
                     start_time = ?3,
                     end_time = ?4,
                     is_synced = MAX(is_synced, ?5)
                 WHERE id = ?6",
                params![
                    record.record_id,
                    samples_json,
                    record.start_time,
                    record.end_time,
                    flag_to_sql(record.is_synced),
                    id,
                ],
            )
            .context("failed to update heart record")?;
            Ok(())
        })
        .await
    }

    pub async fn get_unsynced_heart_records(&self) -> Result<Vec<HeartRecord>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, record_id, samples_json, start_time, end_time, is_synced
                 FROM heart_records
                 WHERE is_synced = 0
                 ORDER BY id ASC",
            )?;

            let mut rows = stmt.query([])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(row_to_heart_record(row)?);
            }
            Ok(records)
        })
        .await
    }

    pub async fn delete_heart_record(&self, id: i64) -> Result<()> {
        self.execute(move |conn| {
            conn.execute("DELETE FROM heart_records WHERE id = ?1", params![id])
                .context("failed to delete heart record")?;
            Ok(())
        })
        .await
    }
}
