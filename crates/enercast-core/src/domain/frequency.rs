use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Native sampling frequency of a price series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    #[default]
    Daily,
    Weekly,
}

impl Frequency {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
        }
    }

    /// Calendar days in one period.
    pub const fn period_days(self) -> i64 {
        match self {
            Self::Daily => 1,
            Self::Weekly => 7,
        }
    }
}

impl Display for Frequency {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "daily" | "1d" => Ok(Self::Daily),
            "weekly" | "1w" => Ok(Self::Weekly),
            other => Err(ValidationError::InvalidFrequency {
                value: other.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_frequency() {
        let frequency = Frequency::from_str("Weekly").expect("must parse");
        assert_eq!(frequency, Frequency::Weekly);
        assert_eq!(frequency.period_days(), 7);
    }

    #[test]
    fn rejects_invalid_frequency() {
        let err = Frequency::from_str("hourly").expect_err("must fail");
        assert!(matches!(err, ValidationError::InvalidFrequency { .. }));
    }
}
