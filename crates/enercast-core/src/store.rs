//! Warehouse-backed collaborators.
//!
//! DuckDB calls are blocking, so every call runs on the blocking pool. Store
//! failures surface as a single typed error and are never retried here.

use std::str::FromStr;

use enercast_warehouse::{
    ArtifactRecord, CommodityRecord, PriceRecord, Warehouse, WarehouseError,
};

use crate::accessor::{BoxFuture, TimeSeriesAccessor};
use crate::artifact::ArtifactStore;
use crate::domain::{
    ArtifactId, ArtifactVersion, Commodity, Frequency, ModelArtifact, ModelFamily, ModelVersion,
    PricePoint, PriceSeries, Symbol, TradeDate,
};
use crate::{EngineError, ValidationError};

async fn blocking<T, F>(warehouse: &Warehouse, job: F) -> Result<T, WarehouseError>
where
    T: Send + 'static,
    F: FnOnce(Warehouse) -> Result<T, WarehouseError> + Send + 'static,
{
    let warehouse = warehouse.clone();
    tokio::task::spawn_blocking(move || job(warehouse))
        .await
        .map_err(|err| WarehouseError::Rejected(format!("warehouse task failed: {err}")))?
}

/// [`TimeSeriesAccessor`] over the `price_observations` table.
#[derive(Clone)]
pub struct WarehouseSeriesAccessor {
    warehouse: Warehouse,
}

impl WarehouseSeriesAccessor {
    pub fn new(warehouse: Warehouse) -> Self {
        Self { warehouse }
    }
}

impl TimeSeriesAccessor for WarehouseSeriesAccessor {
    fn fetch<'a>(
        &'a self,
        commodity: &'a Symbol,
        start: TradeDate,
        end: TradeDate,
        frequency: Frequency,
    ) -> BoxFuture<'a, PriceSeries> {
        Box::pin(async move {
            let symbol = commodity.to_string();
            let (from, to) = (start.to_string(), end.to_string());
            let rows = blocking(&self.warehouse, move |w| w.fetch_prices(&symbol, &from, &to))
                .await
                .map_err(|err| EngineError::accessor(err.to_string()))?;

            let points = rows
                .into_iter()
                .map(price_point)
                .collect::<Result<Vec<_>, _>>()?;
            PriceSeries::annotate(commodity.clone(), frequency, start, end, points)
                .map_err(EngineError::from)
        })
    }

    fn latest_date<'a>(&'a self, commodity: &'a Symbol) -> BoxFuture<'a, Option<TradeDate>> {
        Box::pin(async move {
            let symbol = commodity.to_string();
            let latest = blocking(&self.warehouse, move |w| w.latest_price_date(&symbol))
                .await
                .map_err(|err| EngineError::accessor(err.to_string()))?;
            latest
                .map(|value| TradeDate::parse(&value))
                .transpose()
                .map_err(EngineError::from)
        })
    }
}

fn price_point(record: PriceRecord) -> Result<PricePoint, ValidationError> {
    PricePoint::new(
        TradeDate::parse(&record.obs_date)?,
        record.price,
        record.source,
        record.is_interpolated,
    )
}

/// [`ArtifactStore`] over the `model_artifacts` table.
#[derive(Clone)]
pub struct WarehouseArtifactStore {
    warehouse: Warehouse,
}

impl WarehouseArtifactStore {
    pub fn new(warehouse: Warehouse) -> Self {
        Self { warehouse }
    }
}

impl ArtifactStore for WarehouseArtifactStore {
    fn load<'a>(&'a self, id: &'a ArtifactId) -> BoxFuture<'a, ModelArtifact> {
        Box::pin(async move {
            let load_error = |reason: String| EngineError::ArtifactLoad {
                artifact: id.clone(),
                reason,
            };

            let (symbol, family, version) = (
                id.commodity.to_string(),
                id.family.as_str(),
                id.version.get(),
            );
            let record = blocking(&self.warehouse, move |w| {
                w.load_artifact(&symbol, family, version)
            })
            .await
            .map_err(|err| load_error(err.to_string()))?
            .ok_or_else(|| load_error(String::from("artifact not found in store")))?;

            model_artifact(id.clone(), &record).map_err(load_error)
        })
    }

    fn list<'a>(
        &'a self,
        commodity: &'a Symbol,
        family: ModelFamily,
    ) -> BoxFuture<'a, Vec<ArtifactVersion>> {
        Box::pin(async move {
            let symbol = commodity.to_string();
            let rows = blocking(&self.warehouse, move |w| {
                w.list_artifacts(&symbol, family.as_str())
            })
            .await
            .map_err(|err| EngineError::accessor(err.to_string()))?;

            rows.into_iter()
                .map(|row| {
                    Ok(ArtifactVersion {
                        version: ModelVersion::new(row.version),
                        trained_as_of: TradeDate::parse(&row.trained_as_of)?,
                        active: row.active,
                    })
                })
                .collect::<Result<Vec<_>, ValidationError>>()
                .map_err(EngineError::from)
        })
    }
}

fn model_artifact(id: ArtifactId, record: &ArtifactRecord) -> Result<ModelArtifact, String> {
    let trained_as_of = TradeDate::parse(&record.trained_as_of).map_err(|err| err.to_string())?;
    let frequency = Frequency::from_str(&record.frequency).map_err(|err| err.to_string())?;
    let parameters: serde_json::Value = serde_json::from_str(&record.parameters)
        .map_err(|err| format!("parameters are not valid JSON: {err}"))?;

    ModelArtifact::new(
        id,
        trained_as_of,
        frequency,
        record.min_lookback,
        record.max_horizon,
        parameters,
    )
    .map_err(|err| err.to_string())
}

/// Storage row for a new artifact.
pub fn artifact_record(artifact: &ModelArtifact, active: bool) -> ArtifactRecord {
    ArtifactRecord {
        symbol: artifact.id.commodity.to_string(),
        family: artifact.id.family.as_str().to_owned(),
        version: artifact.id.version.get(),
        trained_as_of: artifact.trained_as_of.to_string(),
        frequency: artifact.frequency.as_str().to_owned(),
        min_lookback: artifact.min_lookback,
        max_horizon: artifact.max_horizon,
        parameters: artifact.parameters.to_string(),
        active,
    }
}

pub fn commodity_record(commodity: &Commodity) -> CommodityRecord {
    CommodityRecord {
        symbol: commodity.symbol.to_string(),
        name: commodity.name.clone(),
        unit: commodity.unit.clone(),
    }
}

/// Storage row for one observation.
pub fn price_record(commodity: &Symbol, point: &PricePoint) -> PriceRecord {
    PriceRecord {
        symbol: commodity.to_string(),
        source: point.source.clone(),
        obs_date: point.date.to_string(),
        price: point.price,
        is_interpolated: point.is_interpolated,
    }
}
