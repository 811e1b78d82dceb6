//! Accuracy metrics over paired (predicted, actual) series.

use serde::{Deserialize, Serialize};

use crate::EngineError;

const FLAT_CHANGE: f64 = 1e-12;

/// Scored pairs of one forecast, missing actuals already excluded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PairedSeries {
    /// Last realized price at the as-of date; gives the first pair a direction.
    pub anchor: Option<f64>,
    /// `(predicted, actual)` in date order.
    pub pairs: Vec<(f64, f64)>,
}

impl PairedSeries {
    pub fn new(anchor: Option<f64>, pairs: Vec<(f64, f64)>) -> Self {
        Self { anchor, pairs }
    }

    /// Builds from forecast rows, dropping rows without an actual.
    pub fn from_rows(anchor: Option<f64>, rows: impl IntoIterator<Item = (f64, Option<f64>)>) -> Self {
        Self {
            anchor,
            pairs: rows
                .into_iter()
                .filter_map(|(predicted, actual)| actual.map(|actual| (predicted, actual)))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub samples: usize,
    pub mae: f64,
    pub rmse: f64,
    /// Percent; `None` when every actual was zero.
    pub mape: Option<f64>,
    pub mape_samples: usize,
    /// Fraction in `[0, 1]`; `None` without any direction sample.
    pub directional_accuracy: Option<f64>,
    pub direction_samples: usize,
}

#[derive(Debug, Default)]
struct Accumulator {
    samples: usize,
    abs_sum: f64,
    sq_sum: f64,
    pct_sum: f64,
    pct_samples: usize,
    direction_hits: usize,
    direction_samples: usize,
}

impl Accumulator {
    fn add(&mut self, series: &PairedSeries) {
        for &(predicted, actual) in &series.pairs {
            let error = predicted - actual;
            self.samples += 1;
            self.abs_sum += error.abs();
            self.sq_sum += error * error;
            if actual != 0.0 {
                self.pct_sum += (error / actual).abs();
                self.pct_samples += 1;
            }
        }

        let mut previous = series.anchor.map(|anchor| (anchor, anchor));
        for &(predicted, actual) in &series.pairs {
            if let Some((prev_predicted, prev_actual)) = previous {
                self.direction_samples += 1;
                if direction(predicted - prev_predicted) == direction(actual - prev_actual) {
                    self.direction_hits += 1;
                }
            }
            previous = Some((predicted, actual));
        }
    }

    fn finish(self) -> Result<Metrics, EngineError> {
        if self.samples == 0 {
            return Err(EngineError::NoData);
        }
        let n = self.samples as f64;
        Ok(Metrics {
            samples: self.samples,
            mae: self.abs_sum / n,
            rmse: (self.sq_sum / n).sqrt(),
            mape: (self.pct_samples > 0).then(|| self.pct_sum / self.pct_samples as f64 * 100.0),
            mape_samples: self.pct_samples,
            directional_accuracy: (self.direction_samples > 0)
                .then(|| self.direction_hits as f64 / self.direction_samples as f64),
            direction_samples: self.direction_samples,
        })
    }
}

fn direction(change: f64) -> i8 {
    if change > FLAT_CHANGE {
        1
    } else if change < -FLAT_CHANGE {
        -1
    } else {
        0
    }
}

/// Scores one paired series. Empty input is [`EngineError::NoData`].
pub fn score(series: &PairedSeries) -> Result<Metrics, EngineError> {
    let mut acc = Accumulator::default();
    acc.add(series);
    acc.finish()
}

/// Pools every pair of every series into one set of metrics.
pub fn score_all<'a>(
    series: impl IntoIterator<Item = &'a PairedSeries>,
) -> Result<Metrics, EngineError> {
    let mut acc = Accumulator::default();
    for item in series {
        acc.add(item);
    }
    acc.finish()
}
