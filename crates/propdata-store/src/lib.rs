//! # Propdata Store
//!
//! DuckDB persistence for the property data gateway.
//!
//! The gateway treats persistence as an external collaborator with two narrow
//! tables. This crate owns their schema and the parameterized statements that
//! touch them; nothing else in the workspace writes SQL.
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `response_cache` | Normalized gateway envelopes keyed by request fingerprint |
//! | `feature_flags` | Rollout flags (`enabled`, `percentage`) read by the provider selector |
//! | `schema_migrations` | Applied migration versions |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use propdata_store::Store;
//! use serde_json::json;
//! use time::OffsetDateTime;
//!
//! fn main() -> Result<(), propdata_store::StoreError> {
//!     let store = Store::open_default()?;
//!     store.upsert_cache_row("ponsonby-auckland-house-all-12", &json!({"success": true}), OffsetDateTime::now_utc())?;
//!     let row = store.get_cache_row("ponsonby-auckland-house-all-12")?;
//!     assert!(row.is_some());
//!     Ok(())
//! }
//! ```

pub mod migrations;
pub mod pool;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::params;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;

pub use pool::{ConnectionPool, DbLocation, PooledConnection};

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (creating the data directory).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Stored payload could not be encoded or decoded as JSON.
    #[error("invalid cache payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// A row or argument violated a table constraint.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

/// Configuration for the store database.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root directory for propdata state.
    pub home: PathBuf,
    /// Where the `DuckDB` database lives.
    pub location: DbLocation,
    /// Maximum number of idle connections kept in the pool.
    pub max_pool_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let home = resolve_home();
        let db_path = home.join("store.duckdb");
        Self {
            home,
            location: DbLocation::File(db_path),
            max_pool_size: 4,
        }
    }
}

impl StoreConfig {
    /// Store rooted at an explicit database file.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let home = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(resolve_home);
        Self {
            home,
            location: DbLocation::File(path),
            max_pool_size: 4,
        }
    }

    /// Private in-memory store, mostly for tests and `--no-persist` runs.
    pub fn in_memory() -> Self {
        Self {
            home: resolve_home(),
            location: DbLocation::Memory,
            max_pool_size: 2,
        }
    }
}

/// A persisted gateway response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheRow {
    pub cache_key: String,
    pub data: Value,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A rollout flag row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlagRow {
    pub id: String,
    pub enabled: bool,
    pub percentage: u8,
}

/// The cache and flag store.
#[derive(Clone)]
pub struct Store {
    pool: ConnectionPool,
}

impl Store {
    /// Open the store with default configuration (`$PROPDATA_HOME/store.duckdb`).
    pub fn open_default() -> Result<Self, StoreError> {
        Self::open(StoreConfig::default())
    }

    /// Open a private in-memory store.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::open(StoreConfig::in_memory())
    }

    /// Open the store with the specified configuration and apply migrations.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        if let DbLocation::File(path) = &config.location {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
        }

        let pool = ConnectionPool::open(config.location, config.max_pool_size)?;
        let store = Self { pool };
        store.initialize()?;
        Ok(store)
    }

    /// Apply schema migrations.
    pub fn initialize(&self) -> Result<(), StoreError> {
        let connection = self.pool.acquire()?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    /// Path to the database file, `None` when in memory.
    pub fn db_path(&self) -> Option<&Path> {
        self.pool.db_path()
    }

    /// Read a cache row by exact key match. Age is not checked here.
    pub fn get_cache_row(&self, cache_key: &str) -> Result<Option<CacheRow>, StoreError> {
        let connection = self.pool.acquire()?;
        let mut statement = connection.prepare(
            "SELECT cache_key, data, epoch_ms(created_at) FROM response_cache WHERE cache_key = ?",
        )?;
        let mut rows = statement.query(params![cache_key])?;

        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        let cache_key: String = row.get(0)?;
        let data: String = row.get(1)?;
        let created_at_ms: i64 = row.get(2)?;

        Ok(Some(CacheRow {
            cache_key,
            data: serde_json::from_str(&data)?,
            created_at: from_epoch_ms(created_at_ms)?,
        }))
    }

    /// Insert or overwrite the row for `cache_key` (last write wins).
    pub fn upsert_cache_row(
        &self,
        cache_key: &str,
        data: &Value,
        created_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        if cache_key.trim().is_empty() {
            return Err(StoreError::InvalidData(String::from(
                "cache_key must not be empty",
            )));
        }

        let payload = serde_json::to_string(data)?;
        let connection = self.pool.acquire()?;
        connection.execute(
            "INSERT OR REPLACE INTO response_cache (cache_key, data, created_at) \
             VALUES (?, ?, epoch_ms(CAST(? AS BIGINT)))",
            params![cache_key, payload, to_epoch_ms(created_at)],
        )?;
        Ok(())
    }

    /// Number of cached rows, expired ones included.
    pub fn cache_row_count(&self) -> Result<usize, StoreError> {
        let connection = self.pool.acquire()?;
        let count: i64 =
            connection.query_row("SELECT COUNT(*) FROM response_cache", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Read a rollout flag.
    pub fn get_feature_flag(&self, id: &str) -> Result<Option<FeatureFlagRow>, StoreError> {
        let connection = self.pool.acquire()?;
        let mut statement =
            connection.prepare("SELECT id, enabled, percentage FROM feature_flags WHERE id = ?")?;
        let mut rows = statement.query(params![id])?;

        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        let id: String = row.get(0)?;
        let enabled: bool = row.get(1)?;
        let percentage: i32 = row.get(2)?;

        Ok(Some(FeatureFlagRow {
            id,
            enabled,
            percentage: u8::try_from(percentage.clamp(0, 100)).unwrap_or(0),
        }))
    }

    /// Insert or overwrite a rollout flag.
    pub fn upsert_feature_flag(&self, flag: &FeatureFlagRow) -> Result<(), StoreError> {
        if flag.id.trim().is_empty() {
            return Err(StoreError::InvalidData(String::from(
                "feature flag id must not be empty",
            )));
        }
        if flag.percentage > 100 {
            return Err(StoreError::InvalidData(format!(
                "percentage must be within 0..=100, got {}",
                flag.percentage
            )));
        }

        let connection = self.pool.acquire()?;
        connection.execute(
            "INSERT OR REPLACE INTO feature_flags (id, enabled, percentage, updated_at) \
             VALUES (?, ?, ?, CURRENT_TIMESTAMP)",
            params![flag.id, flag.enabled, i32::from(flag.percentage)],
        )?;
        Ok(())
    }
}

fn to_epoch_ms(value: OffsetDateTime) -> i64 {
    let millis = value.unix_timestamp_nanos() / 1_000_000;
    i64::try_from(millis).unwrap_or(i64::MAX)
}

fn from_epoch_ms(millis: i64) -> Result<OffsetDateTime, StoreError> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .map_err(|error| StoreError::InvalidData(format!("invalid created_at: {error}")))
}

fn resolve_home() -> PathBuf {
    if let Ok(path) = env::var("PROPDATA_HOME") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    if let Ok(home) = env::var("HOME") {
        return PathBuf::from(home).join(".propdata");
    }

    PathBuf::from(".propdata")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    #[test]
    fn cache_rows_round_trip_with_millisecond_timestamps() {
        let store = Store::open_in_memory().expect("store opens");
        let created_at = datetime!(2024-03-01 10:15:30.250 UTC);
        let payload = json!({"success": true, "data": {"medianPrice": 1_250_000}});

        store
            .upsert_cache_row("ponsonby-auckland-house-all-12", &payload, created_at)
            .expect("upsert succeeds");

        let row = store
            .get_cache_row("ponsonby-auckland-house-all-12")
            .expect("read succeeds")
            .expect("row exists");
        assert_eq!(row.data, payload);
        assert_eq!(row.created_at, created_at);
    }

    #[test]
    fn upsert_overwrites_existing_key() {
        let store = Store::open_in_memory().expect("store opens");
        let now = OffsetDateTime::now_utc();

        store
            .upsert_cache_row("key", &json!({"v": 1}), now)
            .expect("first write");
        store
            .upsert_cache_row("key", &json!({"v": 2}), now)
            .expect("second write");

        let row = store.get_cache_row("key").expect("read").expect("row exists");
        assert_eq!(row.data, json!({"v": 2}));
        assert_eq!(store.cache_row_count().expect("count"), 1);
    }

    #[test]
    fn missing_rows_are_none() {
        let store = Store::open_in_memory().expect("store opens");
        assert!(store.get_cache_row("absent").expect("read").is_none());
        assert!(store.get_feature_flag("absent").expect("read").is_none());
    }

    #[test]
    fn feature_flags_reject_out_of_range_percentage() {
        let store = Store::open_in_memory().expect("store opens");
        let error = store
            .upsert_feature_flag(&FeatureFlagRow {
                id: String::from("corelogic_real"),
                enabled: true,
                percentage: 101,
            })
            .expect_err("must be rejected");
        assert!(matches!(error, StoreError::InvalidData(_)));
    }

    #[test]
    fn file_backed_store_persists_flags_across_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("store.duckdb");

        {
            let store = Store::open(StoreConfig::with_db_path(&path)).expect("store opens");
            store
                .upsert_feature_flag(&FeatureFlagRow {
                    id: String::from("reinz_real"),
                    enabled: true,
                    percentage: 25,
                })
                .expect("flag written");
        }

        let store = Store::open(StoreConfig::with_db_path(&path)).expect("store reopens");
        let flag = store
            .get_feature_flag("reinz_real")
            .expect("read")
            .expect("flag exists");
        assert!(flag.enabled);
        assert_eq!(flag.percentage, 25);
        assert_eq!(store.db_path(), Some(path.as_path()));
    }
}
