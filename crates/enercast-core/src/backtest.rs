//! Walk-forward backtesting.
//!
//! A run plans one step per `step_size` periods from `window_start`, stopping
//! once `as_of + horizon` would pass `window_end` or the latest available
//! price. Steps run concurrently and independently; the report lists them
//! oldest first. A failing step is recorded and excluded from aggregate
//! scoring, it never aborts the run.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::accessor::TimeSeriesAccessor;
use crate::cache::ModelCache;
use crate::cancel::CancellationToken;
use crate::config::BacktestConfig;
use crate::domain::{
    ArtifactId, Frequency, ModelFamily, ModelVersion, Symbol, TradeDate,
};
use crate::forecast::{ForecastGenerator, ForecastResult};
use crate::model::ModelHandle;
use crate::registry::ModelRegistry;
use crate::scoring::{score, score_all, Metrics, PairedSeries};
use crate::{EngineError, ValidationError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacktestRequest {
    pub commodity: Symbol,
    pub family: ModelFamily,
    /// Pin one version; `None` replays the newest version known at each step.
    pub version: Option<ModelVersion>,
    pub window_start: TradeDate,
    pub window_end: TradeDate,
    /// Periods between consecutive as-of dates.
    pub step_size: u32,
    pub horizon: u32,
}

impl BacktestRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.step_size == 0 {
            return Err(ValidationError::ZeroValue { field: "step_size" });
        }
        if self.horizon == 0 {
            return Err(ValidationError::ZeroValue { field: "horizon" });
        }
        if self.window_end < self.window_start {
            return Err(ValidationError::InvertedRange {
                start: self.window_start.to_string(),
                end: self.window_end.to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BacktestStatus {
    Completed,
    /// Stopped early by the caller; the report holds the steps that ran.
    Cancelled,
    /// Every step failed, or nothing could be planned.
    Failed,
}

/// Realized price for a forecast date; `actual: None` marks a missing actual.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RealizedPoint {
    pub date: TradeDate,
    pub actual: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Scored {
        forecast: ForecastResult,
        /// Realized price on the as-of date, if observed.
        anchor: Option<f64>,
        realized: Vec<RealizedPoint>,
        metrics: Option<Metrics>,
    },
    Failed {
        code: String,
        reason: String,
    },
}

impl StepOutcome {
    fn failed(err: &EngineError) -> Self {
        Self::Failed {
            code: err.code().to_owned(),
            reason: err.to_string(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Scorable pairs of a successful step.
    pub fn paired(&self) -> Option<PairedSeries> {
        match self {
            Self::Scored {
                forecast,
                anchor,
                realized,
                ..
            } => Some(PairedSeries::from_rows(
                *anchor,
                forecast
                    .points
                    .iter()
                    .zip(realized)
                    .map(|(point, realized)| (point.point, realized.actual)),
            )),
            Self::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestStep {
    pub index: usize,
    pub as_of: TradeDate,
    pub version: Option<ModelVersion>,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub commodity: Symbol,
    pub family: ModelFamily,
    pub requested_version: Option<ModelVersion>,
    pub window_start: TradeDate,
    pub window_end: TradeDate,
    pub step_size: u32,
    pub horizon: u32,
    pub status: BacktestStatus,
    pub planned_steps: usize,
    pub steps: Vec<BacktestStep>,
    pub metrics: Option<Metrics>,
    pub metrics_note: Option<String>,
    pub warnings: Vec<String>,
}

impl BacktestReport {
    pub fn failed_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.outcome.is_failed()).count()
    }
}

/// How each step obtains its model.
#[derive(Clone)]
enum StepModel {
    Pinned(Result<ModelHandle, EngineError>),
    AsOf,
}

#[derive(Clone)]
pub struct BacktestEngine {
    registry: ModelRegistry,
    cache: ModelCache,
    generator: ForecastGenerator,
    accessor: Arc<dyn TimeSeriesAccessor>,
    config: BacktestConfig,
}

impl BacktestEngine {
    pub fn new(
        registry: ModelRegistry,
        cache: ModelCache,
        generator: ForecastGenerator,
        accessor: Arc<dyn TimeSeriesAccessor>,
        config: BacktestConfig,
    ) -> Self {
        Self {
            registry,
            cache,
            generator,
            accessor,
            config,
        }
    }

    /// Runs a backtest. Only a malformed request returns `Err`.
    pub async fn run(
        &self,
        request: BacktestRequest,
        cancel: &CancellationToken,
    ) -> Result<BacktestReport, EngineError> {
        request.validate()?;
        tracing::info!(
            commodity = %request.commodity,
            family = %request.family,
            start = %request.window_start,
            end = %request.window_end,
            "backtest started"
        );

        let mut warnings = Vec::new();
        let (step_model, frequency) = self.reference_model(&request, &mut warnings).await;

        let latest = match self.accessor.latest_date(&request.commodity).await {
            Ok(latest) => latest,
            Err(err) => {
                warnings.push(format!("price availability unknown: {err}"));
                return Ok(empty_report(request, BacktestStatus::Failed, warnings));
            }
        };
        let Some(latest) = latest else {
            warnings.push(format!("no price data for {}", request.commodity));
            return Ok(empty_report(request, BacktestStatus::Completed, warnings));
        };

        let plan = plan_steps(&request, frequency, request.window_end.min(latest))?;
        let planned_steps = plan.len();

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_steps.max(1)));
        let mut tasks = JoinSet::new();
        let mut launched = Vec::with_capacity(planned_steps);
        let mut cancelled = false;

        for (index, as_of) in plan.into_iter().enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                cancelled = true;
                break;
            };
            // Waiting for a permit can take a whole step; look again.
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            launched.push((index, as_of));
            let engine = self.clone();
            let request = request.clone();
            let step_model = step_model.clone();
            tasks.spawn(async move {
                let step = engine.run_step(&request, index, as_of, step_model).await;
                drop(permit);
                step
            });
        }

        let mut finished: BTreeMap<usize, BacktestStep> = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(step) => {
                    finished.insert(step.index, step);
                }
                Err(err) => tracing::warn!(error = %err, "backtest step task aborted"),
            }
        }

        let mut steps = Vec::with_capacity(launched.len());
        for (index, as_of) in launched {
            match finished.remove(&index) {
                Some(step) => steps.push(step),
                None => steps.push(BacktestStep {
                    index,
                    as_of,
                    version: None,
                    outcome: StepOutcome::Failed {
                        code: String::from("engine.step_aborted"),
                        reason: String::from("step task panicked or was aborted"),
                    },
                }),
            }
        }

        let paired: Vec<PairedSeries> = steps.iter().filter_map(|s| s.outcome.paired()).collect();
        let (metrics, metrics_note) = match score_all(&paired) {
            Ok(metrics) => (Some(metrics), None),
            Err(err) => (None, Some(err.to_string())),
        };

        let failed = steps.iter().filter(|s| s.outcome.is_failed()).count();
        let status = if cancelled {
            BacktestStatus::Cancelled
        } else if !steps.is_empty() && failed == steps.len() {
            BacktestStatus::Failed
        } else {
            BacktestStatus::Completed
        };

        tracing::info!(
            commodity = %request.commodity,
            ?status,
            planned = planned_steps,
            ran = steps.len(),
            failed,
            "backtest finished"
        );

        Ok(BacktestReport {
            commodity: request.commodity,
            family: request.family,
            requested_version: request.version,
            window_start: request.window_start,
            window_end: request.window_end,
            step_size: request.step_size,
            horizon: request.horizon,
            status,
            planned_steps,
            steps,
            metrics,
            metrics_note,
            warnings,
        })
    }

    /// Picks the per-step model source and the frequency steps are counted in.
    async fn reference_model(
        &self,
        request: &BacktestRequest,
        warnings: &mut Vec<String>,
    ) -> (StepModel, Frequency) {
        match request.version {
            Some(version) => {
                let id = ArtifactId::new(request.commodity.clone(), request.family, version);
                let loaded = self.cache.get_or_load(&id).await;
                let frequency = match &loaded {
                    Ok(handle) => handle.frequency,
                    Err(err) => {
                        warnings.push(format!("pinned model {id} unavailable: {err}"));
                        Frequency::default()
                    }
                };
                (StepModel::Pinned(loaded), frequency)
            }
            None => {
                let frequency = match self.registry.resolve(&request.commodity, request.family).await {
                    Ok(resolved) => match self.cache.get_or_load(&resolved.artifact_id).await {
                        Ok(handle) => handle.frequency,
                        Err(err) => {
                            warnings.push(format!(
                                "reference model {} unavailable, counting steps in {} periods: {err}",
                                resolved.artifact_id,
                                Frequency::default()
                            ));
                            Frequency::default()
                        }
                    },
                    Err(err) => {
                        warnings.push(err.to_string());
                        Frequency::default()
                    }
                };
                (StepModel::AsOf, frequency)
            }
        }
    }

    async fn run_step(
        &self,
        request: &BacktestRequest,
        index: usize,
        as_of: TradeDate,
        step_model: StepModel,
    ) -> BacktestStep {
        let handle = match step_model {
            StepModel::Pinned(loaded) => loaded,
            StepModel::AsOf => {
                match self
                    .registry
                    .resolve_as_of(&request.commodity, request.family, as_of)
                    .await
                {
                    Ok(resolved) => self.cache.get_or_load(&resolved.artifact_id).await,
                    Err(err) => Err(err),
                }
            }
        };

        let handle = match handle {
            Ok(handle) => handle,
            Err(err) => return failed_step(index, as_of, None, &err),
        };
        let version = Some(handle.id.version);

        // A model trained after the as-of date has seen the prices it would score against.
        if handle.trained_as_of > as_of {
            let err = EngineError::ModelNotYetTrained {
                artifact: handle.id.clone(),
                trained_as_of: handle.trained_as_of,
                as_of,
            };
            return failed_step(index, as_of, version, &err);
        }

        match self.score_step(&handle, as_of, request.horizon).await {
            Ok(outcome) => BacktestStep {
                index,
                as_of,
                version,
                outcome,
            },
            Err(err) => failed_step(index, as_of, version, &err),
        }
    }

    async fn score_step(
        &self,
        handle: &ModelHandle,
        as_of: TradeDate,
        horizon: u32,
    ) -> Result<StepOutcome, EngineError> {
        let forecast = self.generator.generate(handle, as_of, horizon).await?;

        let last_date = forecast.points.last().map(|p| p.date).unwrap_or(as_of);
        let realized_series = self
            .accessor
            .fetch(&forecast.commodity, as_of, last_date, forecast.frequency)
            .await?;

        let anchor = realized_series.point_on(as_of).map(|p| p.price);
        let realized: Vec<RealizedPoint> = forecast
            .points
            .iter()
            .map(|point| RealizedPoint {
                date: point.date,
                actual: realized_series.point_on(point.date).map(|p| p.price),
            })
            .collect();

        let paired = PairedSeries::from_rows(
            anchor,
            forecast
                .points
                .iter()
                .zip(&realized)
                .map(|(point, realized)| (point.point, realized.actual)),
        );
        let metrics = score(&paired).ok();

        Ok(StepOutcome::Scored {
            forecast,
            anchor,
            realized,
            metrics,
        })
    }
}

fn failed_step(
    index: usize,
    as_of: TradeDate,
    version: Option<ModelVersion>,
    err: &EngineError,
) -> BacktestStep {
    tracing::warn!(index, %as_of, code = err.code(), error = %err, "backtest step failed");
    BacktestStep {
        index,
        as_of,
        version,
        outcome: StepOutcome::failed(err),
    }
}

/// As-of dates `window_start + k * step_size` whose horizon ends by `limit`.
pub fn plan_steps(
    request: &BacktestRequest,
    frequency: Frequency,
    limit: TradeDate,
) -> Result<Vec<TradeDate>, ValidationError> {
    let mut plan = Vec::new();
    let mut as_of = request.window_start;
    loop {
        let horizon_end = as_of.checked_add_periods(frequency, i64::from(request.horizon))?;
        if horizon_end > limit {
            break;
        }
        plan.push(as_of);
        as_of = as_of.checked_add_periods(frequency, i64::from(request.step_size))?;
    }
    Ok(plan)
}

fn empty_report(
    request: BacktestRequest,
    status: BacktestStatus,
    warnings: Vec<String>,
) -> BacktestReport {
    BacktestReport {
        commodity: request.commodity,
        family: request.family,
        requested_version: request.version,
        window_start: request.window_start,
        window_end: request.window_end,
        step_size: request.step_size,
        horizon: request.horizon,
        status,
        planned_steps: 0,
        steps: Vec::new(),
        metrics: None,
        metrics_note: Some(EngineError::NoData.to_string()),
        warnings,
    }
}
