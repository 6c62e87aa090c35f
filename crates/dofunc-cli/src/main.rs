mod cli;
mod commands;
mod observability;
mod output;

use std::time::Duration;

use anyhow::{Result, anyhow};
use clap::Parser;
use dofunc_core::ProviderConfig;
use dofunc_core::config::loader;
use dofunc_provider::{OpContext, Reconciler, build_reconciler};
use tokio_util::sync::CancellationToken;

use cli::{Cli, Commands};
use output::print_error;

#[tokio::main]
async fn main() {
    observability::init_tracing_with_level("warn");
    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    if cli.verbose {
        observability::apply_logging_level("debug");
    }
    let format = cli.format.unwrap_or_default();

    match &cli.command {
        Commands::Validate => commands::plan::validate(&cli.manifest)?,
        Commands::Plan => commands::plan::plan(&cli.manifest, &cli.state, format)?,
        Commands::Show => commands::state::show(&cli.state, format)?,
        Commands::Apply(args) => {
            let (reconciler, ctx) = connect(&cli)?;
            commands::apply::apply(&reconciler, &ctx, &cli.manifest, &cli.state, args.refresh, format).await?;
        }
        Commands::Refresh => {
            let (reconciler, ctx) = connect(&cli)?;
            commands::state::refresh(&reconciler, &ctx, &cli.state, format).await?;
        }
        Commands::Destroy => {
            let (reconciler, ctx) = connect(&cli)?;
            commands::apply::destroy(&reconciler, &ctx, &cli.state, format).await?;
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<ProviderConfig> {
    let config = loader::load_config(cli.config.as_deref()).map_err(|e| anyhow!(e))?;
    if !cli.verbose {
        observability::apply_logging_level(&config.logging.level);
    }
    Ok(config)
}

/// Build the provider and an operation context that Ctrl-C cancels.
fn connect(cli: &Cli) -> Result<(Reconciler, OpContext)> {
    let config = load_config(cli)?;
    let reconciler = build_reconciler(&config)?;

    let token = CancellationToken::new();
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling in-flight operations");
            on_signal.cancel();
        }
    });

    let mut ctx = OpContext::new().with_cancellation(token);
    if let Some(secs) = cli.timeout {
        ctx = ctx.with_timeout(Duration::from_secs(secs));
    }
    Ok((reconciler, ctx))
}
