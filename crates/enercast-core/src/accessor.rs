//! Time-series accessor contract and an in-memory implementation.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use crate::domain::{Frequency, PricePoint, PriceSeries, Symbol, TradeDate};
use crate::EngineError;

/// Boxed future returned by collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, EngineError>> + Send + 'a>>;

/// Read-only access to historical prices owned by the persistence layer.
pub trait TimeSeriesAccessor: Send + Sync {
    /// Fetches `[start, end]` as a gap-annotated series.
    ///
    /// Missing dates are reported in [`PriceSeries::gaps`], never as an error.
    fn fetch<'a>(
        &'a self,
        commodity: &'a Symbol,
        start: TradeDate,
        end: TradeDate,
        frequency: Frequency,
    ) -> BoxFuture<'a, PriceSeries>;

    /// Latest date with an observation, if any.
    fn latest_date<'a>(&'a self, commodity: &'a Symbol) -> BoxFuture<'a, Option<TradeDate>>;
}

/// A range requested through [`InMemorySeriesAccessor::fetch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRecord {
    pub start: TradeDate,
    pub end: TradeDate,
}

/// Accessor over prices held in process memory. Records every fetched range.
#[derive(Debug, Clone, Default)]
pub struct InMemorySeriesAccessor {
    inner: Arc<Mutex<InMemoryPrices>>,
}

#[derive(Debug, Default)]
struct InMemoryPrices {
    series: HashMap<Symbol, Vec<PricePoint>>,
    fetches: Vec<FetchRecord>,
}

impl InMemorySeriesAccessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces points, keeping one point per date ordered by date.
    pub fn insert(&self, commodity: &Symbol, points: impl IntoIterator<Item = PricePoint>) {
        let mut inner = self.lock();
        let stored = inner.series.entry(commodity.clone()).or_default();
        for point in points {
            match stored.binary_search_by_key(&point.date, |p| p.date) {
                Ok(index) => stored[index] = point,
                Err(index) => stored.insert(index, point),
            }
        }
    }

    pub fn fetch_log(&self) -> Vec<FetchRecord> {
        self.lock().fetches.clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.lock().fetches.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InMemoryPrices> {
        self.inner
            .lock()
            .expect("in-memory price lock is not poisoned")
    }
}

impl TimeSeriesAccessor for InMemorySeriesAccessor {
    fn fetch<'a>(
        &'a self,
        commodity: &'a Symbol,
        start: TradeDate,
        end: TradeDate,
        frequency: Frequency,
    ) -> BoxFuture<'a, PriceSeries> {
        Box::pin(async move {
            let points = {
                let mut inner = self.lock();
                inner.fetches.push(FetchRecord { start, end });
                inner
                    .series
                    .get(commodity)
                    .map(|points| {
                        points
                            .iter()
                            .filter(|p| p.date >= start && p.date <= end)
                            .cloned()
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default()
            };

            PriceSeries::annotate(commodity.clone(), frequency, start, end, points)
                .map_err(EngineError::from)
        })
    }

    fn latest_date<'a>(&'a self, commodity: &'a Symbol) -> BoxFuture<'a, Option<TradeDate>> {
        Box::pin(async move {
            Ok(self
                .lock()
                .series
                .get(commodity)
                .and_then(|points| points.last())
                .map(|p| p.date))
        })
    }
}
