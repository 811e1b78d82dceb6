//! Engine facade consumed by the transport layer and the CLI.
//!
//! [`EnercastEngine`] wires the registry, cache, generator and backtest
//! engine around injected collaborators. Nothing here is global; tests build
//! isolated engines over in-memory collaborators.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use crate::accessor::TimeSeriesAccessor;
use crate::artifact::ArtifactStore;
use crate::backtest::{BacktestEngine, BacktestReport, BacktestRequest};
use crate::cache::{CacheStats, ModelCache};
use crate::cancel::CancellationToken;
use crate::config::EngineConfig;
use crate::domain::{ArtifactId, Frequency, ModelFamily, ModelVersion, Symbol, TradeDate};
use crate::forecast::{ForecastGenerator, ForecastResult};
use crate::registry::{ModelRegistry, VersionListing};
use crate::{EngineError, ValidationError};

/// Structured error surfaced to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl From<&EngineError> for ErrorBody {
    fn from(err: &EngineError) -> Self {
        Self {
            code: err.code().to_owned(),
            message: err.to_string(),
            retryable: err.retryable(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastRequest {
    pub commodity: Symbol,
    pub family: ModelFamily,
    pub horizon: u32,
    /// Defaults to the latest date with an observation.
    pub as_of: Option<TradeDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub artifact_id: ArtifactId,
    pub version: ModelVersion,
    pub trained_as_of: TradeDate,
    pub frequency: Frequency,
    pub min_lookback: u32,
    pub max_horizon: u32,
}

/// Identifier of a submitted backtest job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value).map(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Finished { report: Box<BacktestReport> },
    Rejected { error: ErrorBody },
}

impl JobStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

struct JobEntry {
    /// Submission order, used to drop the oldest settled jobs first.
    seq: u64,
    token: CancellationToken,
    status: watch::Receiver<JobStatus>,
}

impl JobEntry {
    /// Current status. A running job whose task is gone reports as aborted.
    fn observed(&self, id: JobId) -> JobStatus {
        // Read closure first so a final status sent just before closing is seen.
        let closed = self.status.has_changed().is_err();
        let status = self.status.borrow().clone();
        if status.is_running() && closed {
            return aborted(id);
        }
        status
    }
}

#[derive(Default)]
struct JobTable {
    next_seq: u64,
    entries: HashMap<JobId, JobEntry>,
}

impl JobTable {
    /// Keeps at most `retain` settled jobs. Running jobs are never dropped.
    fn prune_settled(&mut self, retain: usize) {
        let mut settled: Vec<(u64, JobId)> = self
            .entries
            .iter()
            .filter(|(id, entry)| !entry.observed(**id).is_running())
            .map(|(id, entry)| (entry.seq, *id))
            .collect();
        if settled.len() <= retain {
            return;
        }
        settled.sort_unstable_by_key(|(seq, _)| *seq);
        let excess = settled.len() - retain;
        for (_, id) in settled.into_iter().take(excess) {
            self.entries.remove(&id);
        }
    }
}

fn aborted(id: JobId) -> JobStatus {
    JobStatus::Rejected {
        error: ErrorBody::from(&EngineError::JobAborted {
            job: id.to_string(),
        }),
    }
}

#[derive(Clone)]
pub struct EnercastEngine {
    accessor: Arc<dyn TimeSeriesAccessor>,
    registry: ModelRegistry,
    cache: ModelCache,
    generator: ForecastGenerator,
    backtests: BacktestEngine,
    retained_jobs: usize,
    jobs: Arc<Mutex<JobTable>>,
}

impl EnercastEngine {
    pub fn new(
        accessor: Arc<dyn TimeSeriesAccessor>,
        store: Arc<dyn ArtifactStore>,
        config: EngineConfig,
    ) -> Result<Self, ValidationError> {
        config.validate()?;

        let registry = ModelRegistry::new(Arc::clone(&store));
        let cache = ModelCache::new(store, config.cache);
        let generator = ForecastGenerator::new(Arc::clone(&accessor), config.forecast);
        let backtests = BacktestEngine::new(
            registry.clone(),
            cache.clone(),
            generator.clone(),
            Arc::clone(&accessor),
            config.backtest,
        );

        Ok(Self {
            accessor,
            registry,
            cache,
            generator,
            backtests,
            retained_jobs: config.backtest.retained_jobs,
            jobs: Arc::new(Mutex::new(JobTable::default())),
        })
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Forecasts with the active model of the requested family.
    pub async fn forecast(&self, request: ForecastRequest) -> Result<ForecastResult, EngineError> {
        let resolved = self
            .registry
            .resolve(&request.commodity, request.family)
            .await?;
        let handle = self.cache.get_or_load(&resolved.artifact_id).await?;

        let as_of = match request.as_of {
            Some(as_of) => as_of,
            None => self
                .accessor
                .latest_date(&request.commodity)
                .await?
                .ok_or_else(|| {
                    EngineError::insufficient_history(format!(
                        "no price data for {}",
                        request.commodity
                    ))
                })?,
        };

        self.generator.generate(&handle, as_of, request.horizon).await
    }

    pub async fn model_info(
        &self,
        commodity: &Symbol,
        family: ModelFamily,
    ) -> Result<ModelInfo, EngineError> {
        let resolved = self.registry.resolve(commodity, family).await?;
        let handle = self.cache.get_or_load(&resolved.artifact_id).await?;
        Ok(ModelInfo {
            artifact_id: resolved.artifact_id,
            version: resolved.version,
            trained_as_of: handle.trained_as_of,
            frequency: handle.frequency,
            min_lookback: handle.min_lookback(),
            max_horizon: handle.max_horizon(),
        })
    }

    pub async fn list_versions(
        &self,
        commodity: &Symbol,
        family: ModelFamily,
    ) -> Result<VersionListing, EngineError> {
        self.registry.list_versions(commodity, family).await
    }

    /// Runs a backtest to completion on the calling task.
    pub async fn backtest(
        &self,
        request: BacktestRequest,
        cancel: &CancellationToken,
    ) -> Result<BacktestReport, EngineError> {
        self.backtests.run(request, cancel).await
    }

    /// Starts a backtest in the background. Malformed requests are rejected
    /// immediately instead of becoming jobs.
    ///
    /// Only the most recent `retained_jobs` settled jobs stay queryable; use
    /// [`take_job`](Self::take_job) to collect a result and release it early.
    pub fn submit_backtest(&self, request: BacktestRequest) -> Result<JobId, EngineError> {
        request.validate()?;

        let id = JobId::new();
        let token = CancellationToken::new();
        let (sender, receiver) = watch::channel(JobStatus::Running);
        {
            let mut jobs = self.lock_jobs();
            jobs.prune_settled(self.retained_jobs);
            let seq = jobs.next_seq;
            jobs.next_seq += 1;
            jobs.entries.insert(
                id,
                JobEntry {
                    seq,
                    token: token.clone(),
                    status: receiver,
                },
            );
        }

        let backtests = self.backtests.clone();
        tokio::spawn(async move {
            let status = match backtests.run(request, &token).await {
                Ok(report) => JobStatus::Finished {
                    report: Box::new(report),
                },
                Err(err) => JobStatus::Rejected {
                    error: ErrorBody::from(&err),
                },
            };
            let _ = sender.send(status);
        });

        tracing::info!(job = %id, "backtest job submitted");
        Ok(id)
    }

    pub fn job_status(&self, id: JobId) -> Option<JobStatus> {
        self.lock_jobs()
            .entries
            .get(&id)
            .map(|entry| entry.observed(id))
    }

    /// Returns the job's status and forgets the job once it has settled.
    /// A running job is left in place.
    pub fn take_job(&self, id: JobId) -> Option<JobStatus> {
        let mut jobs = self.lock_jobs();
        let status = jobs.entries.get(&id)?.observed(id);
        if !status.is_running() {
            jobs.entries.remove(&id);
        }
        Some(status)
    }

    /// Signals cancellation; returns false for unknown jobs.
    pub fn cancel_job(&self, id: JobId) -> bool {
        match self.lock_jobs().entries.get(&id) {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Waits until the job leaves the running state.
    pub async fn wait_for_job(&self, id: JobId) -> Option<JobStatus> {
        let mut receiver = self.lock_jobs().entries.get(&id)?.status.clone();
        let settled = receiver
            .wait_for(|status| !status.is_running())
            .await
            .map(|status| status.clone());
        match settled {
            Ok(status) => Some(status),
            Err(_) => {
                tracing::warn!(job = %id, "backtest job ended without a result");
                Some(aborted(id))
            }
        }
    }

    fn lock_jobs(&self) -> MutexGuard<'_, JobTable> {
        self.jobs.lock().expect("job table lock is not poisoned")
    }
}
