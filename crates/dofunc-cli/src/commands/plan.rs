use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use dofunc_provider::reconcile::plan_changes;

use super::{load_manifest, load_state};
use crate::cli::OutputFormat;
use crate::output::{print_plan, print_success};

pub fn validate(manifest_path: &Path) -> Result<()> {
    let manifest = load_manifest(manifest_path)?;
    print_success(&format!(
        "{} is valid: {} namespace(s), {} function(s)",
        manifest_path.display().to_string().cyan(),
        manifest.namespaces.len(),
        manifest.functions.len()
    ));
    Ok(())
}

/// Planning only reads local files, so it needs no credentials.
pub fn plan(manifest_path: &Path, state_path: &Path, format: OutputFormat) -> Result<()> {
    let manifest = load_manifest(manifest_path)?;
    let state = load_state(state_path)?;
    print_plan(&plan_changes(&manifest, &state), format);
    Ok(())
}
