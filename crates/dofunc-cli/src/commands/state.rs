use std::path::Path;

use anyhow::{Result, bail};
use dofunc_provider::{OpContext, Reconciler};

use super::{load_state, saver};
use crate::cli::OutputFormat;
use crate::output::{print_refresh_report, print_state};

pub async fn refresh(reconciler: &Reconciler, ctx: &OpContext, state_path: &Path, format: OutputFormat) -> Result<()> {
    let mut state = load_state(state_path)?;
    let report = reconciler.refresh(ctx, &mut state, saver(state_path)).await?;
    print_refresh_report(&report, format);
    if !report.is_success() {
        bail!("{} resource(s) could not be refreshed", report.failures.len());
    }
    Ok(())
}

pub fn show(state_path: &Path, format: OutputFormat) -> Result<()> {
    let state = load_state(state_path)?;
    print_state(&state, format);
    Ok(())
}
