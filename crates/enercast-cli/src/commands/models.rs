use std::fs;

use enercast_core::store::artifact_record;
use enercast_core::{build_model, ModelArtifact};
use serde_json::json;

use crate::cli::{ModelActivateArgs, ModelListArgs, ModelRegisterArgs};
use crate::error::CliError;

use super::{parse_family, parse_symbol, CommandResult, Context};

pub async fn list(args: &ModelListArgs, ctx: &Context) -> Result<CommandResult, CliError> {
    let commodity = parse_symbol(&args.symbol)?;
    let family = parse_family(&args.family)?;

    let listing = ctx.engine.list_versions(&commodity, family).await?;
    let versions: Vec<_> = listing.iter().collect();
    Ok(CommandResult::ok(json!({
        "commodity": commodity,
        "family": family,
        "versions": versions,
    })))
}

/// Stores an artifact after checking that it would load.
pub fn register(args: &ModelRegisterArgs, ctx: &Context) -> Result<CommandResult, CliError> {
    let raw = fs::read_to_string(&args.file)?;
    let parsed: ModelArtifact = serde_json::from_str(&raw)
        .map_err(|err| CliError::Input(format!("{}: {err}", args.file.display())))?;

    let artifact = ModelArtifact::new(
        parsed.id,
        parsed.trained_as_of,
        parsed.frequency,
        parsed.min_lookback,
        parsed.max_horizon,
        parsed.parameters,
    )?;
    build_model(&artifact)?;

    let active = !args.inactive;
    ctx.warehouse
        .insert_artifact(&artifact_record(&artifact, active))?;
    tracing::info!(artifact = %artifact.id, active, "artifact registered");

    Ok(CommandResult::ok(json!({
        "artifact_id": artifact.id,
        "trained_as_of": artifact.trained_as_of,
        "active": active,
    })))
}

pub fn activate(args: &ModelActivateArgs, ctx: &Context) -> Result<CommandResult, CliError> {
    let commodity = parse_symbol(&args.symbol)?;
    let family = parse_family(&args.family)?;
    let active = !args.off;

    let changed = ctx.warehouse.set_artifact_active(
        commodity.as_str(),
        family.as_str(),
        args.version,
        active,
    )?;
    if !changed {
        return Err(CliError::NotFound(format!(
            "{commodity}/{family}/v{}",
            args.version
        )));
    }

    Ok(CommandResult::ok(json!({
        "commodity": commodity,
        "family": family,
        "version": args.version,
        "active": active,
    })))
}
