use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{flag_from_sql, flag_to_sql, to_i64, to_u64},
    models::StepRecord,
};

fn row_to_step_record(row: &Row) -> Result<StepRecord> {
    let count: i64 = row.get("count")?;
    let is_synced: i64 = row.get("is_synced")?;

    Ok(StepRecord {
        id: Some(row.get("id")?),
        record_id: row.get("record_id")?,
        count: to_u64(count, "count")?,
        start_time: row.get("start_time")?,
        end_time: row.get("end_time")?,
        is_synced: flag_from_sql(is_synced),
    })
}

impl Database {
    /// Inserts unless a row with the same external `record_id` exists.
    /// Returns `true` when a new row was written.
    pub async fn insert_step_record(&self, record: &StepRecord) -> Result<bool> {
        let record = record.clone();
        self.execute(move |conn| {
            let changed = conn
                .execute(
                    "INSERT OR IGNORE INTO step_records (record_id, count, start_time, end_time, is_synced)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        record.record_id,
                        to_i64(record.count)?,
                        record.start_time,
                        record.end_time,
                        flag_to_sql(record.is_synced),
                    ],
                )
                .with_context(|| format!("failed to insert step record {}", record.record_id))?;
            Ok(changed > 0)
        })
        .await
    }

    /// Full replace of one row. `is_synced` can only be raised here.
    pub async fn update_step_record(&self, record: &StepRecord) -> Result<()> {
        let record = record.clone();
        let id = record
            .id
            .ok_or_else(|| anyhow!("cannot update step record {} without id", record.record_id))?;
        self.execute(move |conn| {
            conn.execute(
                "UPDATE step_records
                 SET record_id = ?1,
                     count = ?2,
                     start_time = ?3,
                     end_time = ?4,
                     is_synced = MAX(is_synced, ?5)
                 WHERE id = ?6",
                params![
                    record.record_id,
                    to_i64(record.count)?,
                    record.start_time,
                    record.end_time,
                    flag_to_sql(record.is_synced),
                    id,
                ],
            )
            .context("failed to update step record")?;
            Ok(())
        })
        .await
    }

    pub async fn get_unsynced_step_records(&self) -> Result<Vec<StepRecord>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, record_id, count, start_time, end_time, is_synced
                 FROM step_records
                 WHERE is_synced = 0
                 ORDER BY id ASC",
            )?;

            let mut rows = stmt.query([])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(row_to_step_record(row)?);
            }
            Ok(records)
        })
        .await
    }

    pub async fn delete_step_record(&self, id: i64) -> Result<()> {
        self.execute(move |conn| {
            conn.execute("DELETE FROM step_records WHERE id = ?1", params![id])
                .context("failed to delete step record")?;
            Ok(())
        })
        .await
    }
}
