use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::{Frequency, Symbol, TradeDate};
use crate::ValidationError;

/// Forecasting model family served through the uniform model interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    Naive,
    MovingAverage,
    ExponentialSmoothing,
}

impl ModelFamily {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Naive => "naive",
            Self::MovingAverage => "moving_average",
            Self::ExponentialSmoothing => "exponential_smoothing",
        }
    }
}

impl Display for ModelFamily {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelFamily {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "naive" => Ok(Self::Naive),
            "moving_average" | "ma" => Ok(Self::MovingAverage),
            "exponential_smoothing" | "ses" => Ok(Self::ExponentialSmoothing),
            other => Err(ValidationError::InvalidModelFamily {
                value: other.to_owned(),
            }),
        }
    }
}

/// Monotonic artifact version number within a (commodity, family) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelVersion(u32);

impl ModelVersion {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl Display for ModelVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Arena key of an immutable model artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactId {
    pub commodity: Symbol,
    pub family: ModelFamily,
    pub version: ModelVersion,
}

impl ArtifactId {
    pub fn new(commodity: Symbol, family: ModelFamily, version: ModelVersion) -> Self {
        Self {
            commodity,
            family,
            version,
        }
    }
}

impl Display for ArtifactId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.commodity, self.family, self.version)
    }
}

/// Trained model as produced by the offline training process. Read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub id: ArtifactId,
    pub trained_as_of: TradeDate,
    pub frequency: Frequency,
    pub min_lookback: u32,
    pub max_horizon: u32,
    /// Family-specific parameters, opaque to everything but the model builder.
    pub parameters: serde_json::Value,
}

impl ModelArtifact {
    pub fn new(
        id: ArtifactId,
        trained_as_of: TradeDate,
        frequency: Frequency,
        min_lookback: u32,
        max_horizon: u32,
        parameters: serde_json::Value,
    ) -> Result<Self, ValidationError> {
        if min_lookback == 0 {
            return Err(ValidationError::ZeroValue {
                field: "min_lookback",
            });
        }
        if max_horizon == 0 {
            return Err(ValidationError::ZeroValue {
                field: "max_horizon",
            });
        }

        Ok(Self {
            id,
            trained_as_of,
            frequency,
            min_lookback,
            max_horizon,
            parameters,
        })
    }
}

/// Listing entry returned by the artifact store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactVersion {
    pub version: ModelVersion,
    pub trained_as_of: TradeDate,
    pub active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_family_aliases() {
        assert_eq!(
            ModelFamily::from_str("Moving-Average").expect("must parse"),
            ModelFamily::MovingAverage
        );
        let err = ModelFamily::from_str("arima").expect_err("must fail");
        assert!(matches!(err, ValidationError::InvalidModelFamily { .. }));
    }

    #[test]
    fn artifact_id_display_is_stable() {
        let id = ArtifactId::new(
            Symbol::parse("wti").expect("symbol"),
            ModelFamily::ExponentialSmoothing,
            ModelVersion::new(3),
        );
        assert_eq!(id.to_string(), "WTI/exponential_smoothing/v3");
    }

    #[test]
    fn rejects_zero_lookback() {
        let id = ArtifactId::new(
            Symbol::parse("WTI").expect("symbol"),
            ModelFamily::Naive,
            ModelVersion::new(1),
        );
        let err = ModelArtifact::new(
            id,
            TradeDate::parse("2024-01-01").expect("date"),
            Frequency::Daily,
            0,
            7,
            serde_json::json!({}),
        )
        .expect_err("must fail");
        assert!(matches!(err, ValidationError::ZeroValue { .. }));
    }
}
