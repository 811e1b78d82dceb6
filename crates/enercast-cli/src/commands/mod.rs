mod backtest;
mod forecast;
mod model_info;
mod models;
mod prices;

use std::str::FromStr;
use std::sync::Arc;

use enercast_core::store::{WarehouseArtifactStore, WarehouseSeriesAccessor};
use enercast_core::{EnercastEngine, EngineConfig, ModelFamily, Symbol, TradeDate};
use enercast_warehouse::{Warehouse, WarehouseConfig};
use serde_json::Value;

use crate::cli::{Cli, Command, ModelsCommand, PricesCommand};
use crate::error::CliError;

pub struct CommandResult {
    pub data: Value,
    pub warnings: Vec<String>,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }
}

/// Opened warehouse plus an engine wired on top of it.
pub struct Context {
    pub warehouse: Warehouse,
    pub engine: EnercastEngine,
}

impl Context {
    fn open(cli: &Cli) -> Result<Self, CliError> {
        let config = match &cli.config {
            Some(path) => EngineConfig::load(path)?,
            None => EngineConfig::default(),
        };
        let warehouse_config = match &cli.db {
            Some(path) => WarehouseConfig::at(path),
            None => WarehouseConfig::default(),
        };

        let warehouse = Warehouse::open(warehouse_config)?;
        tracing::debug!(db = %warehouse.db_path().display(), "warehouse opened");
        let engine = EnercastEngine::new(
            Arc::new(WarehouseSeriesAccessor::new(warehouse.clone())),
            Arc::new(WarehouseArtifactStore::new(warehouse.clone())),
            config,
        )?;

        Ok(Self { warehouse, engine })
    }
}

pub async fn run(cli: &Cli) -> Result<CommandResult, CliError> {
    let ctx = Context::open(cli)?;

    match &cli.command {
        Command::Forecast(args) => forecast::run(args, &ctx).await,
        Command::Backtest(args) => backtest::run(args, &ctx).await,
        Command::ModelInfo(args) => model_info::run(args, &ctx).await,
        Command::Models(args) => match &args.command {
            ModelsCommand::List(list) => models::list(list, &ctx).await,
            ModelsCommand::Register(register) => models::register(register, &ctx),
            ModelsCommand::Activate(activate) => models::activate(activate, &ctx),
        },
        Command::Prices(args) => match &args.command {
            PricesCommand::Import(import) => prices::import(import, &ctx),
        },
    }
}

pub(crate) fn parse_symbol(value: &str) -> Result<Symbol, CliError> {
    value.parse::<Symbol>().map_err(CliError::from)
}

pub(crate) fn parse_family(value: &str) -> Result<ModelFamily, CliError> {
    ModelFamily::from_str(value).map_err(CliError::from)
}

pub(crate) fn parse_date(value: &str) -> Result<TradeDate, CliError> {
    TradeDate::parse(value).map_err(CliError::from)
}
