pub mod registry;

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;

/// One persisted counter observation. Ids are assigned by SQLite on insert
/// and are unique within a store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Sample {
    pub id: i64,
    pub channel: String,
    pub rx_bytes: i64,
    pub tx_bytes: i64,
    pub ts: i64,
}

/// A sample about to be inserted; the store assigns the id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewSample {
    pub channel: String,
    pub rx_bytes: i64,
    pub tx_bytes: i64,
    pub ts: i64,
}

/// Append-only sample table for one router, plus a data-version signal that
/// fires after every committed mutation so readers can re-derive live views.
#[derive(Clone)]
pub struct SampleStore {
    pool: SqlitePool,
    version: Arc<watch::Sender<u64>>,
}

impl SampleStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open sample store {}", path.display()))?;
        Self::from_pool(pool).await
    }

    /// In-memory store for tests; a single connection keeps every query on
    /// the same database.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str(":memory:")
            .context("failed to parse in-memory sqlite options")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("failed to open in-memory sample store")?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let (version, _) = watch::channel(0u64);
        let store = Self {
            pool,
            version: Arc::new(version),
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS interface_samples (
                id       INTEGER PRIMARY KEY AUTOINCREMENT,
                channel  TEXT NOT NULL,
                rx_bytes INTEGER NOT NULL,
                tx_bytes INTEGER NOT NULL,
                ts       INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create interface_samples table")?;
        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_interface_samples_identity
            ON interface_samples (channel, ts, rx_bytes, tx_bytes)
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create sample identity index")?;
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_interface_samples_channel_ts
            ON interface_samples (channel, ts)
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create sample range index")?;
        Ok(())
    }

    /// Appends a batch in one transaction. Rows identical to an already
    /// stored sample are ignored rather than errored; returns the number of
    /// rows that actually landed. An empty batch is a no-op.
    pub async fn insert_batch(&self, rows: &[NewSample]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;
        for row in rows {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO interface_samples (channel, rx_bytes, tx_bytes, ts)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(&row.channel)
            .bind(row.rx_bytes)
            .bind(row.tx_bytes)
            .bind(row.ts)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;
        if inserted > 0 {
            self.bump();
        }
        Ok(inserted)
    }

    /// Samples of one channel with `ts` in `[start_ms, end_ms]`, oldest
    /// first. Equal timestamps fall back to insertion order.
    pub async fn samples_in_range(
        &self,
        channel: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Sample>> {
        let rows = sqlx::query_as::<_, Sample>(
            r#"
            SELECT id, channel, rx_bytes, tx_bytes, ts
            FROM interface_samples
            WHERE channel = ?
              AND ts BETWEEN ? AND ?
            ORDER BY ts, id
            "#,
        )
        .bind(channel)
        .bind(start_ms)
        .bind(end_ms)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Deletes exactly the given rows in one statement; absent ids are
    /// no-ops. An empty id list is a no-op.
    pub async fn delete_by_ids(&self, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("DELETE FROM interface_samples WHERE id IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(*id);
        }
        let result = query.execute(&self.pool).await?;
        let deleted = result.rows_affected();
        if deleted > 0 {
            self.bump();
        }
        Ok(deleted)
    }

    pub async fn distinct_channels(&self) -> Result<Vec<String>> {
        let channels = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT channel
            FROM interface_samples
            ORDER BY channel
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(channels)
    }

    /// Full post-trim history of one channel, oldest first.
    pub async fn all_samples(&self, channel: &str) -> Result<Vec<Sample>> {
        let rows = sqlx::query_as::<_, Sample>(
            r#"
            SELECT id, channel, rx_bytes, tx_bytes, ts
            FROM interface_samples
            WHERE channel = ?
            ORDER BY ts, id
            "#,
        )
        .bind(channel)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Data-version receiver. The value increases after every committed
    /// insert or delete, in commit order; the content itself is re-read
    /// through the query methods.
    pub fn watch(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}
