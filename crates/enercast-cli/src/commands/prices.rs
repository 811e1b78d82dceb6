use std::path::Path;

use enercast_core::store::{commodity_record, price_record};
use enercast_core::{Commodity, PricePoint, Symbol, TradeDate};
use enercast_warehouse::PriceRecord;
use serde::Deserialize;
use serde_json::json;

use crate::cli::PriceImportArgs;
use crate::error::CliError;

use super::{parse_symbol, CommandResult, Context};

#[derive(Debug, Deserialize)]
struct PriceRow {
    date: String,
    price: f64,
    #[serde(default)]
    is_interpolated: bool,
}

pub fn import(args: &PriceImportArgs, ctx: &Context) -> Result<CommandResult, CliError> {
    let commodity = parse_symbol(&args.symbol)?;
    let rows = read_price_csv(&args.file, &commodity, &args.source)?;

    if let Some(name) = &args.name {
        let reference = Commodity::new(commodity.clone(), name.as_str(), args.unit.as_str());
        ctx.warehouse.upsert_commodity(&commodity_record(&reference))?;
    }

    let written = ctx.warehouse.ingest_prices(&rows)?;
    tracing::info!(symbol = %commodity, rows = written, source = %args.source, "prices imported");

    Ok(CommandResult::ok(json!({
        "commodity": commodity,
        "source": args.source,
        "rows_written": written,
        "first_date": rows.first().map(|row| row.obs_date.as_str()),
        "last_date": rows.last().map(|row| row.obs_date.as_str()),
    })))
}

/// Reads `date,price[,is_interpolated]` rows. Any bad row rejects the file.
fn read_price_csv(
    path: &Path,
    commodity: &Symbol,
    source: &str,
) -> Result<Vec<PriceRecord>, CliError> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|err| CliError::Input(format!("{}: {err}", path.display())))?;

    let mut records = Vec::new();
    for (line, row) in reader.deserialize::<PriceRow>().enumerate() {
        let row = row.map_err(|err| CliError::Input(format!("row {}: {err}", line + 1)))?;
        let date = TradeDate::parse(&row.date)?;
        let point = PricePoint::new(date, row.price, source, row.is_interpolated)?;
        records.push(price_record(commodity, &point));
    }

    records.sort_by(|a, b| a.obs_date.cmp(&b.obs_date));
    Ok(records)
}
