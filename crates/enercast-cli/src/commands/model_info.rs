use crate::cli::ModelInfoArgs;
use crate::error::CliError;

use super::{parse_family, parse_symbol, CommandResult, Context};

pub async fn run(args: &ModelInfoArgs, ctx: &Context) -> Result<CommandResult, CliError> {
    let commodity = parse_symbol(&args.symbol)?;
    let family = parse_family(&args.family)?;

    let info = ctx.engine.model_info(&commodity, family).await?;
    Ok(CommandResult::ok(serde_json::to_value(&info)?))
}
