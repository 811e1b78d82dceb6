//! Forecast generation over a bounded, as-of-truncated lookback window.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::accessor::TimeSeriesAccessor;
use crate::config::{ForecastConfig, ImputationPolicy};
use crate::domain::{period_dates, ArtifactId, Frequency, Symbol, TradeDate};
use crate::model::ModelHandle;
use crate::{EngineError, ValidationError};

const GAP_EPSILON: f64 = 1e-9;

/// One future period of a forecast curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: TradeDate,
    pub point: f64,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub commodity: Symbol,
    pub artifact_id: ArtifactId,
    pub as_of: TradeDate,
    pub horizon: u32,
    pub frequency: Frequency,
    /// True when any lookback period had to be imputed.
    pub degraded: bool,
    pub imputed_periods: Vec<TradeDate>,
    pub points: Vec<ForecastPoint>,
}

/// Produces forecasts using only history dated on or before the as-of date.
#[derive(Clone)]
pub struct ForecastGenerator {
    accessor: Arc<dyn TimeSeriesAccessor>,
    config: ForecastConfig,
}

impl ForecastGenerator {
    pub fn new(accessor: Arc<dyn TimeSeriesAccessor>, config: ForecastConfig) -> Self {
        Self { accessor, config }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    pub async fn generate(
        &self,
        model: &ModelHandle,
        as_of: TradeDate,
        horizon: u32,
    ) -> Result<ForecastResult, EngineError> {
        // Request shape is checked before touching the accessor.
        if horizon == 0 {
            return Err(ValidationError::ZeroValue { field: "horizon" }.into());
        }
        let max_horizon = model.max_horizon();
        if horizon > max_horizon {
            return Err(EngineError::HorizonExceeded {
                requested: horizon,
                max: max_horizon,
            });
        }

        let commodity = &model.id.commodity;
        let frequency = model.frequency;
        let lookback = model.min_lookback();
        let window_start = as_of.checked_add_periods(frequency, -(i64::from(lookback) - 1))?;

        let series = self
            .accessor
            .fetch(commodity, window_start, as_of, frequency)
            .await?
            .truncate_after(as_of);

        let window = period_dates(window_start, as_of, frequency)?;
        let observed: Vec<Option<f64>> = window
            .iter()
            .map(|date| series.point_on(*date).map(|p| p.price))
            .collect();

        let gaps = observed.iter().filter(|value| value.is_none()).count();
        if gaps == observed.len() {
            return Err(EngineError::insufficient_history(format!(
                "no observations for {commodity} in [{window_start}, {as_of}]"
            )));
        }
        let allowed = allowed_gaps(self.config.max_gap_fraction, lookback);
        if gaps > allowed {
            return Err(EngineError::insufficient_history(format!(
                "{gaps} of {lookback} lookback periods missing for {commodity}, at most {allowed} allowed"
            )));
        }

        let history = impute(&observed, self.config.imputation);
        let imputed_periods: Vec<TradeDate> = window
            .iter()
            .zip(&observed)
            .filter(|(_, value)| value.is_none())
            .map(|(date, _)| *date)
            .collect();
        let degraded = !imputed_periods.is_empty();
        if degraded {
            tracing::warn!(
                artifact = %model.id,
                %as_of,
                imputed = imputed_periods.len(),
                "lookback window imputed, forecast degraded"
            );
        }

        let curve = model.model.predict(&history, horizon);
        let mut points = Vec::with_capacity(curve.len());
        for (offset, value) in (1_i64..).zip(curve) {
            points.push(ForecastPoint {
                date: as_of.checked_add_periods(frequency, offset)?,
                point: value.point,
                lower: value.lower,
                upper: value.upper,
            });
        }

        Ok(ForecastResult {
            commodity: commodity.clone(),
            artifact_id: model.id.clone(),
            as_of,
            horizon,
            frequency,
            degraded,
            imputed_periods,
            points,
        })
    }
}

/// Largest tolerated gap count; a fraction exactly at the maximum is allowed.
pub fn allowed_gaps(max_gap_fraction: f64, lookback: u32) -> usize {
    (max_gap_fraction * f64::from(lookback) + GAP_EPSILON).floor() as usize
}

/// Fills `None` entries; the slice must contain at least one value.
fn impute(observed: &[Option<f64>], policy: ImputationPolicy) -> Vec<f64> {
    let first = observed.iter().flatten().next().copied().unwrap_or(0.0);
    match policy {
        ImputationPolicy::ForwardFill => {
            let mut last = first;
            observed
                .iter()
                .map(|value| {
                    if let Some(value) = value {
                        last = *value;
                    }
                    last
                })
                .collect()
        }
        ImputationPolicy::Linear => (0..observed.len())
            .map(|index| match observed[index] {
                Some(value) => value,
                None => {
                    let before = observed[..index]
                        .iter()
                        .enumerate()
                        .rev()
                        .find_map(|(i, v)| v.map(|v| (i, v)));
                    let after = observed[index + 1..]
                        .iter()
                        .enumerate()
                        .find_map(|(i, v)| v.map(|v| (index + 1 + i, v)));
                    match (before, after) {
                        (Some((i0, v0)), Some((i1, v1))) => {
                            let t = (index - i0) as f64 / (i1 - i0) as f64;
                            v0 + (v1 - v0) * t
                        }
                        (Some((_, v)), None) | (None, Some((_, v))) => v,
                        (None, None) => first,
                    }
                }
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gap_allowance_is_inclusive_at_the_boundary() {
        assert_eq!(allowed_gaps(0.2, 30), 6);
        assert_eq!(allowed_gaps(0.1, 30), 3);
        assert_eq!(allowed_gaps(0.0, 30), 0);
        assert_eq!(allowed_gaps(1.0, 7), 7);
    }

    #[test]
    fn forward_fill_backfills_leading_gaps() {
        let filled = impute(
            &[None, Some(2.0), None, None, Some(5.0), None],
            ImputationPolicy::ForwardFill,
        );
        assert_eq!(filled, vec![2.0, 2.0, 2.0, 2.0, 5.0, 5.0]);
    }

    #[test]
    fn linear_interpolates_between_neighbours() {
        let filled = impute(
            &[None, Some(2.0), None, None, Some(5.0), None],
            ImputationPolicy::Linear,
        );
        let expected = [2.0, 2.0, 3.0, 4.0, 5.0, 5.0];
        assert!(filled
            .iter()
            .zip(expected)
            .all(|(got, want)| (got - want).abs() < 1e-12));
    }
}
