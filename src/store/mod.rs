//! File-backed SQLite history of everything the poller observed.
//!
//! The store is append-only: rows are never updated or deleted.

mod estimates;
mod positions;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Row, Sqlite, Transaction};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use crate::model::{LineId, StopEstimate, VehiclePosition};
use estimates::insert_estimates;
use positions::insert_positions;

type Tx<'a> = Transaction<'a, Sqlite>;

/// Rows per multi-value `INSERT`, well under SQLite's bind-parameter limit.
const INSERT_CHUNK: usize = 1024;

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Opens (creating if needed) the database file at `path` and applies
    /// pending migrations.
    #[tracing::instrument(fields(path = %path.display()))]
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating database directory {}", dir.display()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("opening database {}", path.display()))?;

        info!("Database opened");
        Self::migrate(pool).await
    }

    /// A private in-memory database, used by tests and dry runs.
    pub async fn in_memory() -> Result<Self> {
        // Every connection to `:memory:` is its own database, so keep
        // exactly one alive for the pool's lifetime.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
            .await?;
        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("running database migrations")?;
        Ok(Self { pool })
    }

    /// Closes every pooled connection. Later reads and writes fail.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Appends one cycle's records for an endpoint in a single transaction.
    #[tracing::instrument(skip_all, err, fields(positions = positions.len(), estimates = estimates.len()))]
    pub async fn append(
        &self,
        positions: &[VehiclePosition],
        estimates: &[StopEstimate],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        insert_positions(positions, &mut tx).await?;
        insert_estimates(estimates, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Distinct lines present anywhere in the history.
    pub async fn known_lines(&self) -> Result<Vec<LineId>> {
        let lines = sqlx::query_scalar(
            "SELECT line_id FROM stop_estimates
            UNION
            SELECT line_id FROM vehicle_positions
            ORDER BY 1",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(lines)
    }

    /// Start of the most recent cycle that wrote anything.
    pub async fn last_observed_at(&self) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            "SELECT MAX(observed_at) FROM (
                SELECT MAX(observed_at) AS observed_at FROM stop_estimates
                UNION ALL
                SELECT MAX(observed_at) FROM vehicle_positions
            )",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get(0)?)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn test_empty_store() {
        let store = Store::in_memory().await.unwrap();
        assert!(store.known_lines().await.unwrap().is_empty());
        assert_eq!(store.last_observed_at().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_known_lines_and_last_observed() {
        let store = Store::in_memory().await.unwrap();
        store
            .append(
                &[position("L", "t1", "L01N", 100, 200)],
                &[estimate("G", "t2", "G22S", 150, 300)],
            )
            .await
            .unwrap();

        let lines = store.known_lines().await.unwrap();
        assert_eq!(lines, vec![LineId::from("G"), LineId::from("L")]);
        assert_eq!(store.last_observed_at().await.unwrap(), Some(at(300)));
    }

    #[tokio::test]
    async fn test_open_creates_file() {
        let dir = std::env::temp_dir().join("subway_tracker_test_open");
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("history.db");

        let store = Store::open(&path).await.unwrap();
        store
            .append(&[position("L", "t1", "L01N", 100, 200)], &[])
            .await
            .unwrap();
        drop(store);

        assert!(path.exists());
        let reopened = Store::open(&path).await.unwrap();
        assert_eq!(reopened.known_lines().await.unwrap(), vec![LineId::from("L")]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_closed_store_rejects_writes() {
        let store = Store::in_memory().await.unwrap();
        store.close().await;

        let result = store
            .append(&[position("L", "t1", "L01N", 100, 200)], &[])
            .await;
        assert!(result.is_err());
    }
}
