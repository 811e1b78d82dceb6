use thiserror::Error;

use crate::domain::{ArtifactId, ModelFamily, Symbol, TradeDate};

/// Validation and contract errors exposed by `enercast-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter: '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },
    #[error("symbol separators must sit between letters or digits: '{value}'")]
    SymbolMisplacedSeparator { value: String },

    #[error("invalid frequency '{value}', expected one of daily, weekly")]
    InvalidFrequency { value: String },
    #[error(
        "invalid model family '{value}', expected one of naive, moving_average, exponential_smoothing"
    )]
    InvalidModelFamily { value: String },
    #[error("date must be formatted as YYYY-MM-DD: '{value}'")]
    InvalidDate { value: String },
    #[error("date arithmetic left the supported calendar range")]
    DateOutOfRange,

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },
    #[error("field '{field}' must be greater than zero")]
    ZeroValue { field: &'static str },

    #[error("series points must be strictly increasing by date; {date} is out of order")]
    UnorderedSeries { date: String },
    #[error("series point {date} lies outside [{start}, {end}]")]
    PointOutsideRange {
        date: String,
        start: String,
        end: String,
    },
    #[error("range end {end} precedes start {start}")]
    InvertedRange { start: String, end: String },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

/// Failure taxonomy of the forecast/backtest engine.
///
/// Cloneable so a single load failure can be delivered to every caller
/// waiting on the same cache key.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("no active {family} model for {commodity}")]
    ModelNotFound {
        commodity: Symbol,
        family: ModelFamily,
    },
    #[error("failed to load artifact {artifact}: {reason}")]
    ArtifactLoad { artifact: ArtifactId, reason: String },
    #[error("horizon {requested} exceeds the model maximum of {max}")]
    HorizonExceeded { requested: u32, max: u32 },
    #[error("insufficient history: {reason}")]
    InsufficientHistory { reason: String },
    #[error("no data to score")]
    NoData,
    #[error("{artifact} was trained on {trained_as_of}, after the as-of date {as_of}")]
    ModelNotYetTrained {
        artifact: ArtifactId,
        trained_as_of: TradeDate,
        as_of: TradeDate,
    },
    #[error("backtest job {job} stopped without reporting a result")]
    JobAborted { job: String },
    #[error("time-series accessor failed: {reason}")]
    Accessor { reason: String },
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl EngineError {
    /// Stable machine-readable code surfaced to callers.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ModelNotFound { .. } => "engine.model_not_found",
            Self::ArtifactLoad { .. } => "engine.artifact_load",
            Self::HorizonExceeded { .. } => "engine.horizon_exceeded",
            Self::InsufficientHistory { .. } => "engine.insufficient_history",
            Self::NoData => "engine.no_data",
            Self::ModelNotYetTrained { .. } => "engine.model_not_yet_trained",
            Self::JobAborted { .. } => "engine.job_aborted",
            Self::Accessor { .. } => "engine.accessor",
            Self::Validation(_) => "engine.validation",
        }
    }

    /// Whether the caller may retry with backoff. The engine itself never does.
    pub const fn retryable(&self) -> bool {
        matches!(self, Self::ArtifactLoad { .. } | Self::Accessor { .. })
    }

    pub fn accessor(reason: impl Into<String>) -> Self {
        Self::Accessor {
            reason: reason.into(),
        }
    }

    pub fn insufficient_history(reason: impl Into<String>) -> Self {
        Self::InsufficientHistory {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_load_and_accessor_failures_are_retryable() {
        let artifact = ArtifactId::new(
            Symbol::parse("WTI").expect("symbol"),
            ModelFamily::Naive,
            crate::domain::ModelVersion::new(1),
        );
        let load = EngineError::ArtifactLoad {
            artifact,
            reason: String::from("missing"),
        };
        assert!(load.retryable());
        assert!(EngineError::accessor("down").retryable());
        assert!(!EngineError::HorizonExceeded { requested: 9, max: 7 }.retryable());
        assert!(!EngineError::NoData.retryable());
        assert_eq!(load.code(), "engine.artifact_load");
    }

    #[test]
    fn backtest_only_failures_are_final() {
        let artifact = ArtifactId::new(
            Symbol::parse("BRENT").expect("symbol"),
            ModelFamily::Naive,
            crate::domain::ModelVersion::new(2),
        );
        let early = EngineError::ModelNotYetTrained {
            artifact,
            trained_as_of: TradeDate::parse("2024-03-01").expect("date"),
            as_of: TradeDate::parse("2024-01-08").expect("date"),
        };
        assert_eq!(early.code(), "engine.model_not_yet_trained");
        assert!(!early.retryable());
        assert!(early.to_string().contains("2024-03-01"));

        let aborted = EngineError::JobAborted {
            job: String::from("job-1"),
        };
        assert_eq!(aborted.code(), "engine.job_aborted");
        assert!(!aborted.retryable());
    }
}
