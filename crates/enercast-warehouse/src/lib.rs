//! # Enercast Warehouse
//!
//! DuckDB-backed persistence for commodity reference data, daily price
//! observations and trained model artifacts.
//!
//! All values are bound as statement parameters; dates cross the boundary as
//! `YYYY-MM-DD` strings and are cast by DuckDB.
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `commodities` | Symbol, display name, unit |
//! | `price_observations` | One row per (symbol, source, date) |
//! | `model_artifacts` | Immutable artifacts with an `active` flag |
//! | `schema_migrations` | Applied migration versions |

pub mod duckdb;
pub mod migrations;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::{Connection, OptionalExt, ToSql};
use serde::Serialize;
use thiserror::Error;

pub use crate::duckdb::{DuckDbConnectionManager, PooledConnection};

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The request violates a storage invariant.
    #[error("request rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Root directory for enercast data.
    pub enercast_home: PathBuf,
    pub db_path: PathBuf,
    pub max_pool_size: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        let enercast_home = resolve_enercast_home();
        let db_path = enercast_home.join("warehouse.duckdb");
        Self {
            enercast_home,
            db_path,
            max_pool_size: 4,
        }
    }
}

impl WarehouseConfig {
    /// Configuration for a database file at an explicit path.
    pub fn at(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommodityRecord {
    pub symbol: String,
    pub name: String,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceRecord {
    pub symbol: String,
    pub source: String,
    /// `YYYY-MM-DD`.
    pub obs_date: String,
    pub price: f64,
    pub is_interpolated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactRecord {
    pub symbol: String,
    pub family: String,
    pub version: u32,
    pub trained_as_of: String,
    pub frequency: String,
    pub min_lookback: u32,
    pub max_horizon: u32,
    /// JSON document of family parameters.
    pub parameters: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactVersionRecord {
    pub version: u32,
    pub trained_as_of: String,
    pub active: bool,
}

#[derive(Clone)]
pub struct Warehouse {
    manager: DuckDbConnectionManager,
}

impl Warehouse {
    pub fn open_default() -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::default())
    }

    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let manager = DuckDbConnectionManager::open(config.db_path, config.max_pool_size)?;
        let warehouse = Self { manager };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire()?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        self.manager.db_path()
    }

    pub fn upsert_commodity(&self, record: &CommodityRecord) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire()?;
        let params: [&dyn ToSql; 3] = [&record.symbol, &record.name, &record.unit];
        connection.execute(
            "INSERT OR REPLACE INTO commodities (symbol, name, unit, updated_at) \
             VALUES (?, ?, ?, CURRENT_TIMESTAMP)",
            params.as_slice(),
        )?;
        Ok(())
    }

    pub fn commodity(&self, symbol: &str) -> Result<Option<CommodityRecord>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let record = connection
            .query_row(
                "SELECT symbol, name, unit FROM commodities WHERE symbol = ?",
                [symbol],
                |row| {
                    Ok(CommodityRecord {
                        symbol: row.get(0)?,
                        name: row.get(1)?,
                        unit: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Inserts or replaces observations in one transaction.
    pub fn ingest_prices(&self, rows: &[PriceRecord]) -> Result<usize, WarehouseError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let connection = self.manager.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<usize, WarehouseError> {
            for row in rows {
                if !row.price.is_finite() || row.price < 0.0 {
                    return Err(WarehouseError::Rejected(format!(
                        "price {} for {} on {} must be finite and non-negative",
                        row.price, row.symbol, row.obs_date
                    )));
                }
                let params: [&dyn ToSql; 5] = [
                    &row.symbol,
                    &row.source,
                    &row.obs_date,
                    &row.price,
                    &row.is_interpolated,
                ];
                connection.execute(
                    "INSERT OR REPLACE INTO price_observations \
                     (symbol, source, obs_date, price, is_interpolated, updated_at) \
                     VALUES (?, ?, CAST(? AS DATE), ?, ?, CURRENT_TIMESTAMP)",
                    params.as_slice(),
                )?;
            }
            Ok(rows.len())
        })();

        finalize_transaction(&connection, result)
    }

    /// One observation per date in `[start, end]`, oldest first.
    ///
    /// When several sources report the same date, a non-interpolated row wins,
    /// then the alphabetically first source.
    pub fn fetch_prices(
        &self,
        symbol: &str,
        start: &str,
        end: &str,
    ) -> Result<Vec<PriceRecord>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(
            "SELECT symbol, source, CAST(obs_date AS VARCHAR), price, is_interpolated \
             FROM price_observations \
             WHERE symbol = ? AND obs_date BETWEEN CAST(? AS DATE) AND CAST(? AS DATE) \
             QUALIFY ROW_NUMBER() OVER ( \
                 PARTITION BY obs_date ORDER BY is_interpolated ASC, source ASC \
             ) = 1 \
             ORDER BY obs_date",
        )?;
        let rows = statement.query_map([symbol, start, end], |row| {
            Ok(PriceRecord {
                symbol: row.get(0)?,
                source: row.get(1)?,
                obs_date: row.get(2)?,
                price: row.get(3)?,
                is_interpolated: row.get(4)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn latest_price_date(&self, symbol: &str) -> Result<Option<String>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let latest: Option<String> = connection.query_row(
            "SELECT CAST(MAX(obs_date) AS VARCHAR) FROM price_observations WHERE symbol = ?",
            [symbol],
            |row| row.get(0),
        )?;
        Ok(latest)
    }

    /// Stores a new artifact. Existing versions are never overwritten.
    pub fn insert_artifact(&self, record: &ArtifactRecord) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<(), WarehouseError> {
            let params: [&dyn ToSql; 3] = [&record.symbol, &record.family, &record.version];
            let existing: i64 = connection.query_row(
                "SELECT COUNT(*) FROM model_artifacts WHERE symbol = ? AND family = ? AND version = ?",
                params.as_slice(),
                |row| row.get(0),
            )?;
            if existing > 0 {
                return Err(WarehouseError::Rejected(format!(
                    "artifact {}/{}/v{} already exists",
                    record.symbol, record.family, record.version
                )));
            }

            let params: [&dyn ToSql; 9] = [
                &record.symbol,
                &record.family,
                &record.version,
                &record.trained_as_of,
                &record.frequency,
                &record.min_lookback,
                &record.max_horizon,
                &record.parameters,
                &record.active,
            ];
            connection.execute(
                "INSERT INTO model_artifacts \
                 (symbol, family, version, trained_as_of, frequency, min_lookback, max_horizon, parameters, active) \
                 VALUES (?, ?, ?, CAST(? AS DATE), ?, ?, ?, ?, ?)",
                params.as_slice(),
            )?;
            Ok(())
        })();

        finalize_transaction(&connection, result)
    }

    pub fn load_artifact(
        &self,
        symbol: &str,
        family: &str,
        version: u32,
    ) -> Result<Option<ArtifactRecord>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let params: [&dyn ToSql; 3] = [&symbol, &family, &version];
        let record = connection
            .query_row(
                "SELECT symbol, family, version, CAST(trained_as_of AS VARCHAR), frequency, \
                        min_lookback, max_horizon, parameters, active \
                 FROM model_artifacts WHERE symbol = ? AND family = ? AND version = ?",
                params.as_slice(),
                |row| {
                    Ok(ArtifactRecord {
                        symbol: row.get(0)?,
                        family: row.get(1)?,
                        version: row.get(2)?,
                        trained_as_of: row.get(3)?,
                        frequency: row.get(4)?,
                        min_lookback: row.get(5)?,
                        max_horizon: row.get(6)?,
                        parameters: row.get(7)?,
                        active: row.get(8)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    pub fn list_artifacts(
        &self,
        symbol: &str,
        family: &str,
    ) -> Result<Vec<ArtifactVersionRecord>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(
            "SELECT version, CAST(trained_as_of AS VARCHAR), active \
             FROM model_artifacts WHERE symbol = ? AND family = ? \
             ORDER BY trained_as_of DESC, version DESC",
        )?;
        let rows = statement.query_map([symbol, family], |row| {
            Ok(ArtifactVersionRecord {
                version: row.get(0)?,
                trained_as_of: row.get(1)?,
                active: row.get(2)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Flips the serving flag. Returns false when the artifact does not exist.
    pub fn set_artifact_active(
        &self,
        symbol: &str,
        family: &str,
        version: u32,
        active: bool,
    ) -> Result<bool, WarehouseError> {
        let connection = self.manager.acquire()?;
        let params: [&dyn ToSql; 4] = [&active, &symbol, &family, &version];
        let changed = connection.execute(
            "UPDATE model_artifacts SET active = ? WHERE symbol = ? AND family = ? AND version = ?",
            params.as_slice(),
        )?;
        Ok(changed > 0)
    }
}

fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

fn resolve_enercast_home() -> PathBuf {
    if let Some(path) = env::var_os("ENERCAST_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".enercast");
    }

    PathBuf::from(".enercast")
}
