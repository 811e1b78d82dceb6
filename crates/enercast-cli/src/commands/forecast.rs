use enercast_core::{retry_async, ForecastRequest, RetryConfig};

use crate::cli::ForecastArgs;
use crate::error::CliError;

use super::{parse_date, parse_family, parse_symbol, CommandResult, Context};

pub async fn run(args: &ForecastArgs, ctx: &Context) -> Result<CommandResult, CliError> {
    let request = ForecastRequest {
        commodity: parse_symbol(&args.symbol)?,
        family: parse_family(&args.family)?,
        horizon: args.horizon,
        as_of: args.as_of.as_deref().map(parse_date).transpose()?,
    };

    // Storage hiccups during artifact loads are retried here, not in the engine.
    let engine = &ctx.engine;
    let forecast = retry_async(RetryConfig::default(), move || {
        engine.forecast(request.clone())
    })
    .await?;

    let warnings = if forecast.degraded {
        vec![format!(
            "{} lookback period(s) imputed; forecast is degraded",
            forecast.imputed_periods.len()
        )]
    } else {
        Vec::new()
    };

    Ok(CommandResult::ok(serde_json::to_value(&forecast)?).with_warnings(warnings))
}
