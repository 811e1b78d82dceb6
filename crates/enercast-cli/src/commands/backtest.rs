use enercast_core::{BacktestRequest, CancellationToken, ModelVersion};

use crate::cli::BacktestArgs;
use crate::error::CliError;

use super::{parse_date, parse_family, parse_symbol, CommandResult, Context};

pub async fn run(args: &BacktestArgs, ctx: &Context) -> Result<CommandResult, CliError> {
    let request = BacktestRequest {
        commodity: parse_symbol(&args.symbol)?,
        family: parse_family(&args.family)?,
        version: args.version.map(ModelVersion::new),
        window_start: parse_date(&args.start)?,
        window_end: parse_date(&args.end)?,
        step_size: args.step,
        horizon: args.horizon,
    };

    // Ctrl-C stops launching new steps and yields a partial report.
    let token = CancellationToken::new();
    let interrupt = {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling backtest");
                token.cancel();
            }
        })
    };

    let report = ctx.engine.backtest(request, &token).await;
    interrupt.abort();
    let report = report?;

    let warnings = report.warnings.clone();
    Ok(CommandResult::ok(serde_json::to_value(&report)?).with_warnings(warnings))
}
