//! Uniform model interface and the built-in model families.
//!
//! Every family exposes the same capability surface ([`ForecastModel`]) and is
//! built from the opaque `parameters` of a [`ModelArtifact`]. The engine never
//! inspects family internals.

use std::fmt::Debug;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::domain::{ArtifactId, Frequency, ModelArtifact, ModelFamily, TradeDate};
use crate::EngineError;

const DEFAULT_Z: f64 = 1.96;

/// One forecast period: point estimate plus uncertainty band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub point: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Capability interface shared by all model families.
pub trait ForecastModel: Send + Sync + Debug {
    fn family(&self) -> ModelFamily;

    /// Periods of history required as input.
    fn min_lookback(&self) -> u32;

    /// Longest horizon the model may forecast.
    fn max_horizon(&self) -> u32;

    /// Forecasts `horizon` periods after the last value of `history`.
    ///
    /// `history` is gap-free, oldest first, and at least `min_lookback` long.
    fn predict(&self, history: &[f64], horizon: u32) -> Vec<CurvePoint>;
}

/// Deserialized model instance owned by the cache.
#[derive(Debug)]
pub struct LoadedModel {
    pub id: ArtifactId,
    pub trained_as_of: TradeDate,
    pub frequency: Frequency,
    pub model: Box<dyn ForecastModel>,
}

impl LoadedModel {
    pub fn min_lookback(&self) -> u32 {
        self.model.min_lookback()
    }

    pub fn max_horizon(&self) -> u32 {
        self.model.max_horizon()
    }
}

/// Reference-counted handle; eviction only drops the cache's reference.
pub type ModelHandle = Arc<LoadedModel>;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
struct NaiveParams {
    #[serde(default = "default_z")]
    z: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
struct MovingAverageParams {
    window: u32,
    #[serde(default = "default_z")]
    z: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExponentialSmoothingParams {
    alpha: f64,
    #[serde(default = "default_z")]
    z: f64,
}

fn default_z() -> f64 {
    DEFAULT_Z
}

/// Deserializes an artifact into a ready-to-serve model.
pub fn build_model(artifact: &ModelArtifact) -> Result<LoadedModel, EngineError> {
    let limits = Limits {
        min_lookback: artifact.min_lookback,
        max_horizon: artifact.max_horizon,
    };

    let model: Box<dyn ForecastModel> = match artifact.id.family {
        ModelFamily::Naive => {
            let params: NaiveParams = parse_params(artifact)?;
            check_z(artifact, params.z)?;
            Box::new(NaiveModel {
                limits,
                z: params.z,
            })
        }
        ModelFamily::MovingAverage => {
            let params: MovingAverageParams = parse_params(artifact)?;
            check_z(artifact, params.z)?;
            if params.window == 0 || params.window > artifact.min_lookback {
                return Err(load_error(
                    artifact,
                    format!(
                        "window {} must be within 1..={}",
                        params.window, artifact.min_lookback
                    ),
                ));
            }
            Box::new(MovingAverageModel {
                limits,
                window: params.window as usize,
                z: params.z,
            })
        }
        ModelFamily::ExponentialSmoothing => {
            let params: ExponentialSmoothingParams = parse_params(artifact)?;
            check_z(artifact, params.z)?;
            if !(params.alpha > 0.0 && params.alpha <= 1.0) {
                return Err(load_error(
                    artifact,
                    format!("alpha {} must be within (0, 1]", params.alpha),
                ));
            }
            Box::new(ExponentialSmoothingModel {
                limits,
                alpha: params.alpha,
                z: params.z,
            })
        }
    };

    Ok(LoadedModel {
        id: artifact.id.clone(),
        trained_as_of: artifact.trained_as_of,
        frequency: artifact.frequency,
        model,
    })
}

fn parse_params<T: DeserializeOwned>(artifact: &ModelArtifact) -> Result<T, EngineError> {
    serde_json::from_value(artifact.parameters.clone())
        .map_err(|err| load_error(artifact, format!("invalid parameters: {err}")))
}

fn check_z(artifact: &ModelArtifact, z: f64) -> Result<(), EngineError> {
    if z.is_finite() && z > 0.0 {
        Ok(())
    } else {
        Err(load_error(artifact, format!("z {z} must be positive")))
    }
}

fn load_error(artifact: &ModelArtifact, reason: String) -> EngineError {
    EngineError::ArtifactLoad {
        artifact: artifact.id.clone(),
        reason,
    }
}

#[derive(Debug, Clone, Copy)]
struct Limits {
    min_lookback: u32,
    max_horizon: u32,
}

/// Repeats the last observation.
#[derive(Debug)]
pub struct NaiveModel {
    limits: Limits,
    z: f64,
}

impl ForecastModel for NaiveModel {
    fn family(&self) -> ModelFamily {
        ModelFamily::Naive
    }

    fn min_lookback(&self) -> u32 {
        self.limits.min_lookback
    }

    fn max_horizon(&self) -> u32 {
        self.limits.max_horizon
    }

    fn predict(&self, history: &[f64], horizon: u32) -> Vec<CurvePoint> {
        let Some(&last) = history.last() else {
            return Vec::new();
        };
        let residuals = history.windows(2).map(|w| w[1] - w[0]);
        flat_curve(last, residual_sigma(residuals), self.z, horizon)
    }
}

/// Mean of the trailing `window` observations.
#[derive(Debug)]
pub struct MovingAverageModel {
    limits: Limits,
    window: usize,
    z: f64,
}

impl ForecastModel for MovingAverageModel {
    fn family(&self) -> ModelFamily {
        ModelFamily::MovingAverage
    }

    fn min_lookback(&self) -> u32 {
        self.limits.min_lookback
    }

    fn max_horizon(&self) -> u32 {
        self.limits.max_horizon
    }

    fn predict(&self, history: &[f64], horizon: u32) -> Vec<CurvePoint> {
        if history.is_empty() {
            return Vec::new();
        }
        let window = self.window.min(history.len());
        let point = mean(&history[history.len() - window..]);

        let residuals = (window..history.len()).map(|t| history[t] - mean(&history[t - window..t]));
        flat_curve(point, residual_sigma(residuals), self.z, horizon)
    }
}

/// Simple exponential smoothing seeded with the first observation.
#[derive(Debug)]
pub struct ExponentialSmoothingModel {
    limits: Limits,
    alpha: f64,
    z: f64,
}

impl ForecastModel for ExponentialSmoothingModel {
    fn family(&self) -> ModelFamily {
        ModelFamily::ExponentialSmoothing
    }

    fn min_lookback(&self) -> u32 {
        self.limits.min_lookback
    }

    fn max_horizon(&self) -> u32 {
        self.limits.max_horizon
    }

    fn predict(&self, history: &[f64], horizon: u32) -> Vec<CurvePoint> {
        let Some((&first, rest)) = history.split_first() else {
            return Vec::new();
        };

        let mut level = first;
        let mut residuals = Vec::with_capacity(rest.len());
        for &value in rest {
            residuals.push(value - level);
            level = self.alpha * value + (1.0 - self.alpha) * level;
        }

        flat_curve(level, residual_sigma(residuals), self.z, horizon)
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Root-mean-square of one-step residuals; zero when there are none.
fn residual_sigma(residuals: impl IntoIterator<Item = f64>) -> f64 {
    let (sum_sq, count) = residuals
        .into_iter()
        .fold((0.0, 0usize), |(sum, n), r| (sum + r * r, n + 1));
    if count == 0 {
        0.0
    } else {
        (sum_sq / count as f64).sqrt()
    }
}

/// Constant point path with a band widening as `z * sigma * sqrt(h)`.
fn flat_curve(point: f64, sigma: f64, z: f64, horizon: u32) -> Vec<CurvePoint> {
    (1..=horizon)
        .map(|h| {
            let spread = z * sigma * f64::from(h).sqrt();
            CurvePoint {
                point,
                lower: (point - spread).max(0.0),
                upper: point + spread,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ModelVersion, Symbol};

    fn artifact(family: ModelFamily, parameters: serde_json::Value) -> ModelArtifact {
        ModelArtifact::new(
            ArtifactId::new(Symbol::parse("WTI").expect("symbol"), family, ModelVersion::new(1)),
            TradeDate::parse("2023-12-31").expect("date"),
            Frequency::Daily,
            5,
            10,
            parameters,
        )
        .expect("artifact")
    }

    #[test]
    fn naive_repeats_last_value_with_widening_band() {
        let loaded = build_model(&artifact(ModelFamily::Naive, serde_json::json!({})))
            .expect("model");
        let curve = loaded.model.predict(&[10.0, 11.0, 10.0, 11.0, 10.0], 4);

        assert_eq!(curve.len(), 4);
        assert!(curve.iter().all(|p| (p.point - 10.0).abs() < 1e-12));
        assert!((curve[0].upper - (10.0 + 1.96)).abs() < 1e-9);
        assert!((curve[3].upper - (10.0 + 1.96 * 2.0)).abs() < 1e-9);
        assert!(curve[1].upper - curve[1].lower > curve[0].upper - curve[0].lower);
    }

    #[test]
    fn moving_average_uses_trailing_window() {
        let loaded = build_model(&artifact(
            ModelFamily::MovingAverage,
            serde_json::json!({ "window": 3 }),
        ))
        .expect("model");
        let curve = loaded.model.predict(&[1.0, 2.0, 3.0, 4.0, 5.0], 1);
        assert!((curve[0].point - 4.0).abs() < 1e-12);
    }

    #[test]
    fn exponential_smoothing_tracks_level() {
        let loaded = build_model(&artifact(
            ModelFamily::ExponentialSmoothing,
            serde_json::json!({ "alpha": 0.5 }),
        ))
        .expect("model");
        // level: 10 -> 15 -> 17.5
        let curve = loaded.model.predict(&[10.0, 20.0, 20.0], 2);
        assert!((curve[0].point - 17.5).abs() < 1e-12);
    }

    #[test]
    fn constant_history_has_zero_width_band() {
        let loaded = build_model(&artifact(ModelFamily::Naive, serde_json::json!({ "z": 2.0 })))
            .expect("model");
        let curve = loaded.model.predict(&[5.0; 5], 3);
        assert!(curve.iter().all(|p| p.lower == p.point && p.upper == p.point));
    }

    #[test]
    fn invalid_parameters_are_load_errors() {
        let too_wide = build_model(&artifact(
            ModelFamily::MovingAverage,
            serde_json::json!({ "window": 6 }),
        ))
        .expect_err("window beyond lookback");
        assert!(matches!(too_wide, EngineError::ArtifactLoad { .. }));

        let bad_alpha = build_model(&artifact(
            ModelFamily::ExponentialSmoothing,
            serde_json::json!({ "alpha": 1.5 }),
        ))
        .expect_err("alpha out of range");
        assert!(matches!(bad_alpha, EngineError::ArtifactLoad { .. }));

        let unknown = build_model(&artifact(ModelFamily::Naive, serde_json::json!({ "beta": 1 })))
            .expect_err("unknown field");
        assert_eq!(unknown.code(), "engine.artifact_load");
    }
}
