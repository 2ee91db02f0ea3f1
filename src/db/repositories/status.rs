use anyhow::{Context, Result};

use crate::db::{connection::Database, helpers::table_for, models::RecordKind};

impl Database {
    pub async fn count_records(&self, kind: RecordKind) -> Result<u64> {
        self.execute(move |conn| {
            let sql = format!("SELECT COUNT(*) FROM {}", table_for(kind));
            let count: i64 = conn
                .query_row(&sql, [], |row| row.get(0))
                .with_context(|| format!("failed to count {} records", kind.as_str()))?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    pub async fn count_unsynced(&self, kind: RecordKind) -> Result<u64> {
        self.execute(move |conn| {
            let sql = format!("SELECT COUNT(*) FROM {} WHERE is_synced = 0", table_for(kind));
            let count: i64 = conn
                .query_row(&sql, [], |row| row.get(0))
                .with_context(|| format!("failed to count unsynced {} records", kind.as_str()))?;
            Ok(count.max(0) as u64)
        })
        .await
    }
}
