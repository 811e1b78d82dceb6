use serde::{Deserialize, Serialize};

use crate::domain::{Frequency, Symbol, TradeDate};
use crate::ValidationError;

/// Commodity reference data owned by the persistence layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commodity {
    pub symbol: Symbol,
    pub name: String,
    pub unit: String,
}

impl Commodity {
    pub fn new(symbol: Symbol, name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            symbol,
            name: name.into(),
            unit: unit.into(),
        }
    }
}

/// One observed (or upstream-interpolated) price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: TradeDate,
    pub price: f64,
    pub source: String,
    pub is_interpolated: bool,
}

impl PricePoint {
    pub fn new(
        date: TradeDate,
        price: f64,
        source: impl Into<String>,
        is_interpolated: bool,
    ) -> Result<Self, ValidationError> {
        if !price.is_finite() {
            return Err(ValidationError::NonFiniteValue { field: "price" });
        }
        if price < 0.0 {
            return Err(ValidationError::NegativeValue { field: "price" });
        }

        Ok(Self {
            date,
            price,
            source: source.into(),
            is_interpolated,
        })
    }
}

/// Ordered price history for one commodity over `[start, end]`.
///
/// Every period date of the native frequency inside the range that has no
/// point is listed in `gaps`; missing dates are never silently skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub commodity: Symbol,
    pub frequency: Frequency,
    pub start: TradeDate,
    pub end: TradeDate,
    pub points: Vec<PricePoint>,
    pub gaps: Vec<TradeDate>,
}

impl PriceSeries {
    /// Validates ordering and range, then computes the gap annotation.
    pub fn annotate(
        commodity: Symbol,
        frequency: Frequency,
        start: TradeDate,
        end: TradeDate,
        points: Vec<PricePoint>,
    ) -> Result<Self, ValidationError> {
        if end < start {
            return Err(ValidationError::InvertedRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }

        for pair in points.windows(2) {
            if pair[1].date <= pair[0].date {
                return Err(ValidationError::UnorderedSeries {
                    date: pair[1].date.to_string(),
                });
            }
        }

        if let Some(outside) = points.iter().find(|p| p.date < start || p.date > end) {
            return Err(ValidationError::PointOutsideRange {
                date: outside.date.to_string(),
                start: start.to_string(),
                end: end.to_string(),
            });
        }

        let gaps = period_dates(start, end, frequency)?
            .into_iter()
            .filter(|date| points.binary_search_by_key(date, |p| p.date).is_err())
            .collect();

        Ok(Self {
            commodity,
            frequency,
            start,
            end,
            points,
            gaps,
        })
    }

    pub fn point_on(&self, date: TradeDate) -> Option<&PricePoint> {
        self.points
            .binary_search_by_key(&date, |p| p.date)
            .ok()
            .map(|index| &self.points[index])
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Drops everything dated after `as_of`.
    pub fn truncate_after(mut self, as_of: TradeDate) -> Self {
        self.points.retain(|p| p.date <= as_of);
        self.gaps.retain(|d| *d <= as_of);
        if self.end > as_of {
            self.end = as_of.max(self.start);
        }
        self
    }
}

/// Period dates `start, start + 1 period, ...` up to and including `end`.
pub fn period_dates(
    start: TradeDate,
    end: TradeDate,
    frequency: Frequency,
) -> Result<Vec<TradeDate>, ValidationError> {
    let mut dates = Vec::new();
    let mut current = start;
    while current <= end {
        dates.push(current);
        current = current.checked_add_periods(frequency, 1)?;
    }
    Ok(dates)
}
