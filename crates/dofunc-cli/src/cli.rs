use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "dofunc")]
#[command(about = "Reconcile serverless functions and namespaces against a manifest")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Provider config file (defaults to ./dofunc.toml when present)
    #[arg(short, long, global = true, env = "DOFUNC_CONFIG")]
    pub config: Option<String>,

    /// Manifest declaring the desired resources
    #[arg(short, long, global = true, default_value = "dofunc.manifest.toml")]
    pub manifest: PathBuf,

    /// State file tracking applied resources
    #[arg(short, long, global = true, default_value = "dofunc.state.json")]
    pub state: PathBuf,

    /// Overall deadline for the command, in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,

    /// Log at debug level (RUST_LOG still takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check the manifest without contacting anything
    Validate,
    /// Show what apply would do
    Plan,
    /// Create, update, replace and delete resources to match the manifest
    Apply(ApplyArgs),
    /// Re-read tracked resources and record drift
    Refresh,
    /// Delete every tracked resource
    Destroy,
    /// Print the tracked state
    Show,
}

#[derive(clap::Args)]
pub struct ApplyArgs {
    /// Refresh tracked resources before planning
    #[arg(long)]
    pub refresh: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "dofunc",
            "apply",
            "--refresh",
            "--manifest",
            "infra/manifest.toml",
            "--timeout",
            "120",
            "--format",
            "json",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Apply(ApplyArgs { refresh: true })));
        assert_eq!(cli.manifest, PathBuf::from("infra/manifest.toml"));
        assert_eq!(cli.state, PathBuf::from("dofunc.state.json"));
        assert_eq!(cli.timeout, Some(120));
        assert!(matches!(cli.format, Some(OutputFormat::Json)));
    }
}
