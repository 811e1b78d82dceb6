//! # Enercast Core
//!
//! Model service and forecast/backtest engine for commodity energy prices.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`accessor`] | Time-series accessor contract and in-memory implementation |
//! | [`artifact`] | Artifact store contract and in-memory artifact arena |
//! | [`backtest`] | Walk-forward backtest engine |
//! | [`cache`] | Single-flight LRU model cache |
//! | [`config`] | Engine configuration (TOML) |
//! | [`domain`] | Validated domain types |
//! | [`forecast`] | Forecast generator |
//! | [`model`] | Uniform model interface and families |
//! | [`registry`] | Active version resolution |
//! | [`retry`] | Caller-side retry with backoff |
//! | [`scoring`] | Accuracy metrics |
//! | [`service`] | Engine facade and backtest jobs |
//! | [`store`] | DuckDB warehouse adapters |
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │  EnercastEngine  │
//! └───┬──────────┬───┘
//!     │          │
//!     ▼          ▼
//! ┌────────┐  ┌──────────────┐
//! │Registry│  │BacktestEngine│──────────┐
//! └───┬────┘  └──────┬───────┘          │
//!     ▼              ▼                  ▼
//! ┌──────────┐  ┌─────────────────┐  ┌─────────┐
//! │ModelCache│─▶│ForecastGenerator│  │ Scoring │
//! └───┬──────┘  └──────┬──────────┘  └─────────┘
//!     ▼                ▼
//! ┌─────────────┐  ┌──────────────────┐
//! │ArtifactStore│  │TimeSeriesAccessor│
//! └─────────────┘  └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use enercast_core::{EngineConfig, EnercastEngine, ForecastRequest, ModelFamily, Symbol};
//! use enercast_core::store::{WarehouseArtifactStore, WarehouseSeriesAccessor};
//! use enercast_warehouse::Warehouse;
//!
//! let warehouse = Warehouse::open_default()?;
//! let engine = EnercastEngine::new(
//!     Arc::new(WarehouseSeriesAccessor::new(warehouse.clone())),
//!     Arc::new(WarehouseArtifactStore::new(warehouse)),
//!     EngineConfig::default(),
//! )?;
//! let forecast = engine
//!     .forecast(ForecastRequest {
//!         commodity: Symbol::parse("WTI")?,
//!         family: ModelFamily::Naive,
//!         horizon: 7,
//!         as_of: None,
//!     })
//!     .await?;
//! ```

pub mod accessor;
pub mod artifact;
pub mod backtest;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod domain;
pub mod error;
pub mod forecast;
pub mod model;
pub mod registry;
pub mod retry;
pub mod scoring;
pub mod service;
pub mod store;

pub use accessor::{InMemorySeriesAccessor, TimeSeriesAccessor};
pub use artifact::{ArtifactStore, InMemoryArtifactStore};
pub use backtest::{
    BacktestEngine, BacktestReport, BacktestRequest, BacktestStatus, BacktestStep, RealizedPoint,
    StepOutcome,
};
pub use cache::{CacheStats, ModelCache};
pub use cancel::CancellationToken;
pub use config::{
    BacktestConfig, ConfigError, EngineConfig, ForecastConfig, ImputationPolicy, ModelCacheConfig,
};
pub use domain::{
    ArtifactId, ArtifactVersion, Commodity, Frequency, ModelArtifact, ModelFamily, ModelVersion,
    PricePoint, PriceSeries, Symbol, TradeDate,
};
pub use error::{EngineError, ValidationError};
pub use forecast::{ForecastGenerator, ForecastPoint, ForecastResult};
pub use model::{build_model, CurvePoint, ForecastModel, LoadedModel, ModelHandle};
pub use registry::{ModelRegistry, ResolvedModel, VersionListing};
pub use retry::{retry_async, Backoff, RetryConfig};
pub use scoring::{score, score_all, Metrics, PairedSeries};
pub use service::{EnercastEngine, ErrorBody, ForecastRequest, JobId, JobStatus, ModelInfo};
