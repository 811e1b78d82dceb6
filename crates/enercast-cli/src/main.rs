mod cli;
mod commands;
mod error;

use std::process::ExitCode;

use clap::Parser;
use serde_json::json;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::Cli;
use crate::error::CliError;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::debug!(code = error.code(), "command failed");
            let body = json!({ "error": error.body() });
            println!("{}", render(&body, cli.pretty).unwrap_or_else(|_| body.to_string()));
            ExitCode::from(error.exit_code())
        }
    }
}

async fn run(cli: &Cli) -> Result<(), CliError> {
    let result = commands::run(cli).await?;
    let output = json!({
        "data": result.data,
        "meta": { "warnings": result.warnings },
    });
    println!("{}", render(&output, cli.pretty)?);
    Ok(())
}

fn render(value: &serde_json::Value, pretty: bool) -> Result<String, CliError> {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(rendered)
}

/// Logs go to stderr; stdout carries JSON only.
fn init_tracing(verbose: bool) {
    let default = if verbose {
        "enercast=debug,enercast_core=debug,enercast_warehouse=debug"
    } else {
        "enercast=info,enercast_core=info,enercast_warehouse=warn"
    };
    let filter = EnvFilter::try_from_env("ENERCAST_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| default.into());

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}
