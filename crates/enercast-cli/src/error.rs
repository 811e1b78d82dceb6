use enercast_core::{ConfigError, EngineError, ErrorBody, ValidationError};
use enercast_warehouse::WarehouseError;
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error("invalid input file: {0}")]
    Input(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) | Self::Input(_) => 2,
            Self::Engine(EngineError::Validation(_)) => 2,
            Self::Engine(_) | Self::NotFound(_) => 3,
            Self::Serialization(_) => 4,
            Self::Config(_) => 5,
            Self::Warehouse(_) => 6,
            Self::Io(_) => 10,
        }
    }

    pub const fn code(&self) -> &'static str {
        match self {
            Self::Engine(err) => err.code(),
            Self::Validation(_) => "cli.validation",
            Self::NotFound(_) => "cli.not_found",
            Self::Config(_) => "cli.config",
            Self::Warehouse(_) => "cli.warehouse",
            Self::Input(_) => "cli.input",
            Self::Serialization(_) => "cli.serialization",
            Self::Io(_) => "cli.io",
        }
    }

    /// Structured body printed on stdout.
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code().to_owned(),
            message: self.to_string(),
            retryable: matches!(self, Self::Engine(err) if err.retryable()),
        }
    }
}
