use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, Row};

use crate::db::{
    connection::Database,
    helpers::{flag_from_sql, flag_to_sql, to_i64},
    models::{Axis3, SensorRecord},
};

const SENSOR_COLUMNS: &str = "id, timestamp, x_acc, y_acc, z_acc, x_gyro, y_gyro, z_gyro,
    x_magn, y_magn, z_magn, is_synced, is_processed";

fn read_axis(row: &Row, prefix: &str) -> rusqlite::Result<Axis3> {
    let x: f64 = row.get(format!("x_{prefix}").as_str())?;
    let y: f64 = row.get(format!("y_{prefix}").as_str())?;
    let z: f64 = row.get(format!("z_{prefix}").as_str())?;
    Ok(Axis3::new(x as f32, y as f32, z as f32))
}

fn row_to_sensor_record(row: &Row) -> Result<SensorRecord> {
    let is_synced: i64 = row.get("is_synced")?;
    let is_processed: i64 = row.get("is_processed")?;

    Ok(SensorRecord {
        id: Some(row.get("id")?),
        timestamp: row.get("timestamp")?,
        acc: read_axis(row, "acc")?,
        gyro: read_axis(row, "gyro")?,
        magn: read_axis(row, "magn")?,
        is_synced: flag_from_sql(is_synced),
        is_processed: flag_from_sql(is_processed),
    })
}

fn query_sensor_records(conn: &Connection, sql: &str, limit: i64) -> Result<Vec<SensorRecord>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params![limit])?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        records.push(row_to_sensor_record(row)?);
    }
    Ok(records)
}

impl Database {
    /// Inserts the batch in one transaction, preserving slice order.
    pub async fn insert_sensor_records(&self, records: &[SensorRecord]) -> Result<usize> {
        let records = records.to_vec();
        self.execute(move |conn| {
            let tx = conn
                .transaction()
                .context("failed to open sensor insert transaction")?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO sensor_records (
                        timestamp,
                        x_acc, y_acc, z_acc,
                        x_gyro, y_gyro, z_gyro,
                        x_magn, y_magn, z_magn,
                        is_synced, is_processed
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                )?;
                for record in &records {
                    stmt.execute(params![
                        record.timestamp,
                        f64::from(record.acc.x),
                        f64::from(record.acc.y),
                        f64::from(record.acc.z),
                        f64::from(record.gyro.x),
                        f64::from(record.gyro.y),
                        f64::from(record.gyro.z),
                        f64::from(record.magn.x),
                        f64::from(record.magn.y),
                        f64::from(record.magn.z),
                        flag_to_sql(record.is_synced),
                        flag_to_sql(record.is_processed),
                    ])?;
                }
            }
            tx.commit().context("failed to commit sensor records")?;
            Ok(records.len())
        })
        .await
    }

    /// Full replace of one row. Both lifecycle flags can only be raised.
    pub async fn update_sensor_record(&self, record: &SensorRecord) -> Result<()> {
        let record = record.clone();
        let id = record
            .id
            .ok_or_else(|| anyhow!("cannot update sensor record without id"))?;
        self.execute(move |conn| {
            conn.execute(
                "UPDATE sensor_records
                 SET timestamp = ?1,
                     x_acc = ?2, y_acc = ?3, z_acc = ?4,
                     x_gyro = ?5, y_gyro = ?6, z_gyro = ?7,
                     x_magn = ?8, y_magn = ?9, z_magn = ?10,
                     is_synced = MAX(is_synced, ?11),
                     is_processed = MAX(is_processed, ?12)
                 WHERE id = ?13",
                params![
                    record.timestamp,
                    f64::from(record.acc.x),
                    f64::from(record.acc.y),
                    f64::from(record.acc.z),
                    f64::from(record.gyro.x),
                    f64::from(record.gyro.y),
                    f64::from(record.gyro.z),
                    f64::from(record.magn.x),
                    f64::from(record.magn.y),
                    f64::from(record.magn.z),
                    flag_to_sql(record.is_synced),
                    flag_to_sql(record.is_processed),
                    id,
                ],
            )
            .context("failed to update sensor record")?;
            Ok(())
        })
        .await
    }

    pub async fn get_unsynced_sensor_records(&self) -> Result<Vec<SensorRecord>> {
        self.execute(|conn| {
            let sql = format!(
                "SELECT {SENSOR_COLUMNS} FROM sensor_records
                 WHERE is_synced = 0
                 ORDER BY id ASC
                 LIMIT ?1"
            );
            // SQLite treats a negative LIMIT as unbounded.
            query_sensor_records(conn, &sql, -1)
        })
        .await
    }

    /// Oldest unprocessed samples first, at most `limit` of them.
    pub async fn get_unprocessed_sensor_records(&self, limit: usize) -> Result<Vec<SensorRecord>> {
        let limit = to_i64(limit as u64)?;
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {SENSOR_COLUMNS} FROM sensor_records
                 WHERE is_processed = 0
                 ORDER BY id ASC
                 LIMIT ?1"
            );
            query_sensor_records(conn, &sql, limit)
        })
        .await
    }

    pub async fn delete_sensor_record(&self, id: i64) -> Result<()> {
        self.execute(move |conn| {
            conn.execute("DELETE FROM sensor_records WHERE id = ?1", params![id])
                .context("failed to delete sensor record")?;
            Ok(())
        })
        .await
    }
}
