//! Behavior-driven tests for the DuckDB-backed collaborators.
//!
//! These tests verify HOW the engine behaves when prices and artifacts come
//! from a real warehouse file instead of process memory.

use std::sync::Arc;

use enercast_core::domain::period_dates;
use enercast_core::store::{
    artifact_record, price_record, WarehouseArtifactStore, WarehouseSeriesAccessor,
};
use enercast_core::{
    ArtifactId, ArtifactStore, BacktestRequest, BacktestStatus, CancellationToken,
    EnercastEngine, EngineConfig, EngineError, ForecastRequest, Frequency, ModelArtifact,
    ModelFamily, ModelVersion, PricePoint, Symbol, TimeSeriesAccessor, TradeDate,
};
use enercast_warehouse::{Warehouse, WarehouseConfig};
use serde_json::json;
use tempfile::TempDir;

fn date(value: &str) -> TradeDate {
    TradeDate::parse(value).expect("valid date")
}

fn wti() -> Symbol {
    Symbol::parse("WTI").expect("valid symbol")
}

fn artifact(version: u32, trained_as_of: &str, parameters: serde_json::Value) -> ModelArtifact {
    ModelArtifact::new(
        ArtifactId::new(wti(), ModelFamily::ExponentialSmoothing, ModelVersion::new(version)),
        date(trained_as_of),
        Frequency::Daily,
        10,
        14,
        parameters,
    )
    .expect("valid artifact")
}

/// Warehouse seeded with daily WTI prices and two smoothing artifacts, v2 inactive.
fn seeded_warehouse() -> (TempDir, Warehouse) {
    let dir = TempDir::new().expect("temp dir");
    let warehouse =
        Warehouse::open(WarehouseConfig::at(dir.path().join("enercast.duckdb"))).expect("open");

    let rows: Vec<_> = period_dates(date("2023-12-01"), date("2024-03-30"), Frequency::Daily)
        .expect("valid range")
        .into_iter()
        .enumerate()
        .map(|(i, d)| {
            let point = PricePoint::new(d, 70.0 + (i % 7) as f64, "eia", false).expect("price");
            price_record(&wti(), &point)
        })
        .collect();
    warehouse.ingest_prices(&rows).expect("ingest");

    warehouse
        .insert_artifact(&artifact_record(
            &artifact(1, "2023-11-30", json!({ "alpha": 0.5 })),
            true,
        ))
        .expect("insert v1");
    warehouse
        .insert_artifact(&artifact_record(
            &artifact(2, "2024-02-15", json!({ "alpha": 0.8 })),
            false,
        ))
        .expect("insert v2");

    (dir, warehouse)
}

fn engine_over(warehouse: &Warehouse) -> EnercastEngine {
    EnercastEngine::new(
        Arc::new(WarehouseSeriesAccessor::new(warehouse.clone())),
        Arc::new(WarehouseArtifactStore::new(warehouse.clone())),
        EngineConfig::default(),
    )
    .expect("valid config")
}

// =============================================================================
// Warehouse: Forecasting
// =============================================================================

#[tokio::test]
async fn when_prices_live_in_the_warehouse_system_forecasts_from_them() {
    // Given: A seeded warehouse
    let (_dir, warehouse) = seeded_warehouse();
    let engine = engine_over(&warehouse);

    // When: A forecast is requested without an as-of date
    let forecast = engine
        .forecast(ForecastRequest {
            commodity: wti(),
            family: ModelFamily::ExponentialSmoothing,
            horizon: 5,
            as_of: None,
        })
        .await
        .expect("forecast succeeds");

    // Then: The latest stored date is the origin and v1 served it
    assert_eq!(forecast.as_of, date("2024-03-30"));
    assert_eq!(forecast.points.len(), 5);
    assert_eq!(forecast.points[0].date, date("2024-03-31"));
    assert_eq!(forecast.artifact_id.version, ModelVersion::new(1));
    assert!(!forecast.degraded);
}

#[tokio::test]
async fn when_a_version_is_activated_system_serves_it_next() {
    // Given: A seeded warehouse where v2 is inactive
    let (_dir, warehouse) = seeded_warehouse();
    let engine = engine_over(&warehouse);
    let before = engine
        .model_info(&wti(), ModelFamily::ExponentialSmoothing)
        .await
        .expect("model info");
    assert_eq!(before.version, ModelVersion::new(1));

    // When: v2 is activated in storage
    let changed = warehouse
        .set_artifact_active("WTI", "exponential_smoothing", 2, true)
        .expect("update");
    assert!(changed);

    // Then: The registry picks it up on the next lookup
    let after = engine
        .model_info(&wti(), ModelFamily::ExponentialSmoothing)
        .await
        .expect("model info");
    assert_eq!(after.version, ModelVersion::new(2));
    assert_eq!(after.trained_as_of, date("2024-02-15"));
    assert_eq!(after.max_horizon, 14);
}

#[tokio::test]
async fn when_versions_are_listed_system_returns_newest_first() {
    // Given: A seeded warehouse with two versions
    let (_dir, warehouse) = seeded_warehouse();
    let engine = engine_over(&warehouse);

    // When: Versions are listed
    let listing = engine
        .list_versions(&wti(), ModelFamily::ExponentialSmoothing)
        .await
        .expect("listing");

    // Then: Both appear, newest first, with their serving flags
    let versions: Vec<_> = listing.iter().map(|v| (v.version.get(), v.active)).collect();
    assert_eq!(versions, vec![(2, false), (1, true)]);

    // Then: A listing can be walked more than once
    assert_eq!(listing.iter().count(), listing.len());
}

// =============================================================================
// Warehouse: Storage Semantics
// =============================================================================

#[tokio::test]
async fn when_sources_overlap_system_prefers_observed_prices() {
    // Given: An interpolated vendor price on a date that also has an observed price
    let (_dir, warehouse) = seeded_warehouse();
    let vendor = PricePoint::new(date("2024-01-10"), 999.0, "vendor", true).expect("price");
    warehouse
        .ingest_prices(&[price_record(&wti(), &vendor)])
        .expect("ingest");
    let accessor = WarehouseSeriesAccessor::new(warehouse.clone());

    // When: The date is fetched
    let series = accessor
        .fetch(&wti(), date("2024-01-10"), date("2024-01-10"), Frequency::Daily)
        .await
        .expect("fetch");

    // Then: One point per date, taken from the observed row
    assert_eq!(series.points.len(), 1);
    assert!(!series.points[0].is_interpolated);
    assert_eq!(series.points[0].source, "eia");
    assert!(series.gaps.is_empty());
}

#[tokio::test]
async fn when_an_artifact_is_missing_system_returns_artifact_load_error() {
    // Given: A seeded warehouse
    let (_dir, warehouse) = seeded_warehouse();
    let store = WarehouseArtifactStore::new(warehouse);
    let id = ArtifactId::new(wti(), ModelFamily::Naive, ModelVersion::new(9));

    // When: An unknown artifact is loaded
    let err = store.load(&id).await.expect_err("must fail");

    // Then: The error names the artifact
    assert!(matches!(err, EngineError::ArtifactLoad { artifact, .. } if artifact == id));
}

#[tokio::test]
async fn when_a_version_is_registered_twice_system_rejects_the_duplicate() {
    // Given: A seeded warehouse that already holds v1
    let (_dir, warehouse) = seeded_warehouse();

    // When: v1 is inserted again
    let result = warehouse.insert_artifact(&artifact_record(
        &artifact(1, "2023-11-30", json!({ "alpha": 0.3 })),
        true,
    ));

    // Then: Artifacts stay immutable
    assert!(result.is_err());
}

// =============================================================================
// Warehouse: Backtesting
// =============================================================================

#[tokio::test]
async fn when_backtesting_over_the_warehouse_system_scores_every_step() {
    // Given: A seeded warehouse
    let (_dir, warehouse) = seeded_warehouse();
    let engine = engine_over(&warehouse);

    // When: A quarterly walk-forward backtest runs
    let report = engine
        .backtest(
            BacktestRequest {
                commodity: wti(),
                family: ModelFamily::ExponentialSmoothing,
                version: None,
                window_start: date("2024-01-01"),
                window_end: date("2024-03-30"),
                step_size: 7,
                horizon: 7,
            },
            &CancellationToken::new(),
        )
        .await
        .expect("well-formed request");

    // Then: All twelve steps were scored with v1
    assert_eq!(report.status, BacktestStatus::Completed);
    assert_eq!(report.steps.len(), 12);
    assert_eq!(report.failed_steps(), 0);
    assert!(report
        .steps
        .iter()
        .all(|step| step.version == Some(ModelVersion::new(1))));
    let metrics = report.metrics.expect("aggregate metrics");
    assert_eq!(metrics.samples, 84);
    assert!(metrics.mape.is_some());
}
