//! CLI argument definitions for enercast.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `forecast` | Forecast with the active model |
//! | `backtest` | Walk-forward backtest over a historical window |
//! | `model-info` | Active version and declared limits |
//! | `models` | List, register and activate model artifacts |
//! | `prices` | Import price history |
//!
//! # Examples
//!
//! ```bash
//! enercast prices import WTI wti.csv --source eia
//! enercast models register wti-naive-v1.json
//! enercast forecast WTI --horizon 7 --pretty
//! enercast backtest WTI --start 2024-01-01 --end 2024-03-30 --step 7 --horizon 7
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "enercast",
    author,
    version,
    about = "Commodity energy price forecasting and backtesting"
)]
pub struct Cli {
    /// DuckDB warehouse file. Defaults to $ENERCAST_HOME/warehouse.duckdb.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Engine configuration file (TOML).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Pretty-print JSON output.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Debug logging on stderr unless ENERCAST_LOG or RUST_LOG is set.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Forecast a commodity with its active model.
    ///
    ///   enercast forecast WTI --horizon 7
    ///   enercast forecast HH --family exponential_smoothing --as-of 2024-01-31
    Forecast(ForecastArgs),

    /// Replay history through a model and score it against realized prices.
    ///
    ///   enercast backtest WTI --start 2024-01-01 --end 2024-03-30 --step 7 --horizon 7
    Backtest(BacktestArgs),

    /// Show the active model version and its declared limits.
    ModelInfo(ModelInfoArgs),

    /// Manage model artifacts.
    Models(ModelsArgs),

    /// Manage price history.
    Prices(PricesArgs),
}

#[derive(Debug, Args)]
pub struct ForecastArgs {
    pub symbol: String,

    /// Number of future periods.
    #[arg(long)]
    pub horizon: u32,

    #[arg(long, default_value = "naive")]
    pub family: String,

    /// Forecast origin (YYYY-MM-DD); defaults to the latest available price.
    #[arg(long)]
    pub as_of: Option<String>,
}

#[derive(Debug, Args)]
pub struct BacktestArgs {
    pub symbol: String,

    #[arg(long)]
    pub start: String,

    #[arg(long)]
    pub end: String,

    /// Periods between as-of dates.
    #[arg(long)]
    pub step: u32,

    #[arg(long)]
    pub horizon: u32,

    #[arg(long, default_value = "naive")]
    pub family: String,

    /// Pin a model version; by default each step uses the newest version
    /// trained by its as-of date.
    #[arg(long)]
    pub version: Option<u32>,
}

#[derive(Debug, Args)]
pub struct ModelInfoArgs {
    pub symbol: String,

    #[arg(long, default_value = "naive")]
    pub family: String,
}

#[derive(Debug, Args)]
pub struct ModelsArgs {
    #[command(subcommand)]
    pub command: ModelsCommand,
}

#[derive(Debug, Subcommand)]
pub enum ModelsCommand {
    /// List known versions, newest first.
    List(ModelListArgs),
    /// Register an artifact from a JSON file.
    Register(ModelRegisterArgs),
    /// Turn serving on or off for one version.
    Activate(ModelActivateArgs),
}

#[derive(Debug, Args)]
pub struct ModelListArgs {
    pub symbol: String,

    #[arg(long, default_value = "naive")]
    pub family: String,
}

#[derive(Debug, Args)]
pub struct ModelRegisterArgs {
    pub file: PathBuf,

    /// Store without marking it active.
    #[arg(long, default_value_t = false)]
    pub inactive: bool,
}

#[derive(Debug, Args)]
pub struct ModelActivateArgs {
    pub symbol: String,
    pub family: String,
    pub version: u32,

    /// Deactivate instead.
    #[arg(long, default_value_t = false)]
    pub off: bool,
}

#[derive(Debug, Args)]
pub struct PricesArgs {
    #[command(subcommand)]
    pub command: PricesCommand,
}

#[derive(Debug, Subcommand)]
pub enum PricesCommand {
    /// Import `date,price[,is_interpolated]` rows from a CSV file.
    Import(PriceImportArgs),
}

#[derive(Debug, Args)]
pub struct PriceImportArgs {
    pub symbol: String,
    pub file: PathBuf,

    /// Source-of-record label stored with each row.
    #[arg(long, default_value = "import")]
    pub source: String,

    /// Commodity display name; registers the commodity when given.
    #[arg(long)]
    pub name: Option<String>,

    #[arg(long, default_value = "USD/bbl")]
    pub unit: String,
}
