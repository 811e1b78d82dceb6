//! Behavior-driven tests for forecast generation.
//!
//! These tests verify WHAT a caller observes when forecasting: curve shape,
//! horizon bounds, gap tolerance and the absence of look-ahead.

use std::sync::Arc;

use enercast_core::domain::period_dates;
use enercast_core::{
    build_model, ArtifactId, EnercastEngine, EngineConfig, EngineError, ForecastConfig,
    ForecastGenerator, ForecastRequest, Frequency, ImputationPolicy, InMemoryArtifactStore,
    InMemorySeriesAccessor, ModelArtifact, ModelFamily, ModelHandle, ModelVersion, PricePoint,
    Symbol, TradeDate,
};
use serde_json::json;

fn date(value: &str) -> TradeDate {
    TradeDate::parse(value).expect("valid date")
}

fn wti() -> Symbol {
    Symbol::parse("WTI").expect("valid symbol")
}

/// Daily prices over `[start, end]`, skipping `missing`.
fn daily_prices(start: &str, end: &str, missing: &[&str], price: impl Fn(usize) -> f64) -> Vec<PricePoint> {
    let missing: Vec<TradeDate> = missing.iter().map(|d| date(d)).collect();
    period_dates(date(start), date(end), Frequency::Daily)
        .expect("valid range")
        .into_iter()
        .enumerate()
        .filter(|(_, d)| !missing.contains(d))
        .map(|(i, d)| PricePoint::new(d, price(i), "eia", false).expect("valid price"))
        .collect()
}

fn naive_artifact(lookback: u32, max_horizon: u32) -> ModelArtifact {
    ModelArtifact::new(
        ArtifactId::new(wti(), ModelFamily::Naive, ModelVersion::new(1)),
        date("2023-11-30"),
        Frequency::Daily,
        lookback,
        max_horizon,
        json!({}),
    )
    .expect("valid artifact")
}

fn handle(artifact: &ModelArtifact) -> ModelHandle {
    Arc::new(build_model(artifact).expect("model builds"))
}

fn generator(accessor: &InMemorySeriesAccessor) -> ForecastGenerator {
    ForecastGenerator::new(Arc::new(accessor.clone()), ForecastConfig::default())
}

// =============================================================================
// Forecast: Clean History
// =============================================================================

#[tokio::test]
async fn when_history_is_complete_system_returns_curve_starting_after_as_of() {
    // Given: 60 days of prices ending 2024-01-31 and a 30-period naive model
    let accessor = InMemorySeriesAccessor::new();
    accessor.insert(
        &wti(),
        daily_prices("2023-12-03", "2024-01-31", &[], |i| 70.0 + (i % 5) as f64),
    );
    let model = handle(&naive_artifact(30, 14));

    // When: A 7-period forecast is requested as of the last observation
    let forecast = generator(&accessor)
        .generate(&model, date("2024-01-31"), 7)
        .await
        .expect("forecast succeeds");

    // Then: Seven points cover 2024-02-01..=2024-02-07 and nothing was imputed
    assert_eq!(forecast.points.len(), 7);
    assert_eq!(forecast.points[0].date, date("2024-02-01"));
    assert_eq!(forecast.points[6].date, date("2024-02-07"));
    assert!(!forecast.degraded);
    assert!(forecast.imputed_periods.is_empty());

    // Then: Each band encloses its point estimate
    for point in &forecast.points {
        assert!(point.lower <= point.point && point.point <= point.upper);
        assert!(point.lower >= 0.0, "prices are never negative");
    }
}

#[tokio::test]
async fn when_horizon_exceeds_model_limit_system_rejects_before_fetching() {
    // Given: A model that forecasts at most 14 periods
    let accessor = InMemorySeriesAccessor::new();
    accessor.insert(&wti(), daily_prices("2023-12-03", "2024-01-31", &[], |_| 70.0));
    let model = handle(&naive_artifact(30, 14));

    // When: 15 periods are requested
    let err = generator(&accessor)
        .generate(&model, date("2024-01-31"), 15)
        .await
        .expect_err("horizon must be rejected");

    // Then: The error names both limits and no history was read
    assert_eq!(err, EngineError::HorizonExceeded { requested: 15, max: 14 });
    assert_eq!(accessor.fetch_count(), 0);
}

#[tokio::test]
async fn when_horizon_is_zero_system_returns_validation_error() {
    // Given: A valid model
    let accessor = InMemorySeriesAccessor::new();
    let model = handle(&naive_artifact(30, 14));

    // When: A zero-length horizon is requested
    let err = generator(&accessor)
        .generate(&model, date("2024-01-31"), 0)
        .await
        .expect_err("zero horizon must be rejected");

    // Then: It is a request validation error
    assert!(matches!(err, EngineError::Validation(_)));
    assert_eq!(accessor.fetch_count(), 0);
}

// =============================================================================
// Forecast: Gap Tolerance
// =============================================================================

const SIX_GAPS: [&str; 6] = [
    "2024-01-05",
    "2024-01-09",
    "2024-01-12",
    "2024-01-18",
    "2024-01-22",
    "2024-01-27",
];

#[tokio::test]
async fn when_gaps_are_at_the_tolerance_system_imputes_and_flags_degraded() {
    // Given: A 30-period window (2024-01-02..=2024-01-31) missing 6 dates, 20% exactly
    let accessor = InMemorySeriesAccessor::new();
    accessor.insert(
        &wti(),
        daily_prices("2023-12-03", "2024-01-31", &SIX_GAPS, |_| 70.0),
    );
    let model = handle(&naive_artifact(30, 14));

    // When: A forecast is generated
    let forecast = generator(&accessor)
        .generate(&model, date("2024-01-31"), 7)
        .await
        .expect("gaps at the limit are tolerated");

    // Then: The result is marked degraded and lists every imputed date
    assert!(forecast.degraded);
    let imputed: Vec<String> = forecast.imputed_periods.iter().map(ToString::to_string).collect();
    assert_eq!(imputed, SIX_GAPS);
}

#[tokio::test]
async fn when_gaps_exceed_the_tolerance_system_returns_insufficient_history() {
    // Given: The same window missing 7 of 30 dates
    let mut seven_gaps = SIX_GAPS.to_vec();
    seven_gaps.push("2024-01-30");
    let accessor = InMemorySeriesAccessor::new();
    accessor.insert(
        &wti(),
        daily_prices("2023-12-03", "2024-01-31", &seven_gaps, |_| 70.0),
    );
    let model = handle(&naive_artifact(30, 14));

    // When: A forecast is generated
    let err = generator(&accessor)
        .generate(&model, date("2024-01-31"), 7)
        .await
        .expect_err("too many gaps");

    // Then: The caller is told history is insufficient
    assert!(matches!(err, EngineError::InsufficientHistory { .. }));
    assert!(!err.retryable());
}

#[tokio::test]
async fn when_linear_imputation_is_configured_system_bridges_gaps() {
    // Given: A rising series with one interior gap and linear imputation
    let accessor = InMemorySeriesAccessor::new();
    accessor.insert(
        &wti(),
        daily_prices("2024-01-01", "2024-01-10", &["2024-01-05"], |i| 10.0 + i as f64),
    );
    let model = handle(&naive_artifact(10, 5));
    let generator = ForecastGenerator::new(
        Arc::new(accessor.clone()),
        ForecastConfig {
            imputation: ImputationPolicy::Linear,
            max_gap_fraction: 0.2,
        },
    );

    // When: A forecast is generated
    let forecast = generator
        .generate(&model, date("2024-01-10"), 3)
        .await
        .expect("one gap is tolerated");

    // Then: The naive curve repeats the last observed price
    assert!(forecast.degraded);
    assert_eq!(forecast.imputed_periods, vec![date("2024-01-05")]);
    assert!((forecast.points[0].point - 19.0).abs() < 1e-9);
}

// =============================================================================
// Forecast: No Look-Ahead
// =============================================================================

#[tokio::test]
async fn when_future_prices_exist_system_ignores_them() {
    // Given: History through 2024-01-31 followed by an extreme future price
    let accessor = InMemorySeriesAccessor::new();
    accessor.insert(&wti(), daily_prices("2023-12-03", "2024-01-31", &[], |_| 70.0));
    accessor.insert(&wti(), daily_prices("2024-02-01", "2024-02-10", &[], |_| 10_000.0));
    let model = handle(&naive_artifact(30, 14));
    let as_of = date("2024-01-31");

    // When: A forecast is generated as of 2024-01-31
    let forecast = generator(&accessor)
        .generate(&model, as_of, 7)
        .await
        .expect("forecast succeeds");

    // Then: Only data on or before the as-of date was requested or used
    assert!(accessor.fetch_log().iter().all(|fetch| fetch.end <= as_of));
    for point in &forecast.points {
        assert!((point.point - 70.0).abs() < 1e-9, "future price leaked into forecast");
        assert!(point.upper < 10_000.0);
    }
}

// =============================================================================
// Forecast: Engine Facade
// =============================================================================

#[tokio::test]
async fn when_as_of_is_omitted_system_forecasts_from_latest_observation() {
    // Given: An engine with one active model and prices ending 2024-01-31
    let accessor = InMemorySeriesAccessor::new();
    accessor.insert(&wti(), daily_prices("2023-12-03", "2024-01-31", &[], |_| 70.0));
    let store = InMemoryArtifactStore::new();
    store.insert(naive_artifact(30, 14), true);
    let engine = EnercastEngine::new(Arc::new(accessor), Arc::new(store), EngineConfig::default())
        .expect("valid config");

    // When: A forecast is requested without an as-of date
    let forecast = engine
        .forecast(ForecastRequest {
            commodity: wti(),
            family: ModelFamily::Naive,
            horizon: 3,
            as_of: None,
        })
        .await
        .expect("forecast succeeds");

    // Then: The latest observation is used as the origin
    assert_eq!(forecast.as_of, date("2024-01-31"));
    assert_eq!(forecast.artifact_id.version, ModelVersion::new(1));
}

#[tokio::test]
async fn when_no_model_is_active_system_returns_model_not_found() {
    // Given: An engine whose only artifact is inactive
    let accessor = InMemorySeriesAccessor::new();
    let store = InMemoryArtifactStore::new();
    store.insert(naive_artifact(30, 14), false);
    let engine = EnercastEngine::new(Arc::new(accessor), Arc::new(store), EngineConfig::default())
        .expect("valid config");

    // When: A forecast is requested
    let err = engine
        .forecast(ForecastRequest {
            commodity: wti(),
            family: ModelFamily::Naive,
            horizon: 3,
            as_of: Some(date("2024-01-31")),
        })
        .await
        .expect_err("no active model");

    // Then: The error is typed and not retryable
    assert_eq!(err.code(), "engine.model_not_found");
    assert!(!err.retryable());
}
