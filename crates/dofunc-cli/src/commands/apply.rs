use std::path::Path;

use anyhow::{Result, bail};
use dofunc_provider::{OpContext, Reconciler};

use super::{load_manifest, load_state, saver};
use crate::cli::OutputFormat;
use crate::output::{print_apply_report, print_refresh_report};

pub async fn apply(
    reconciler: &Reconciler,
    ctx: &OpContext,
    manifest_path: &Path,
    state_path: &Path,
    refresh_first: bool,
    format: OutputFormat,
) -> Result<()> {
    let manifest = load_manifest(manifest_path)?;
    let mut state = load_state(state_path)?;

    if refresh_first {
        let refreshed = reconciler.refresh(ctx, &mut state, saver(state_path)).await?;
        print_refresh_report(&refreshed, format);
        if !refreshed.is_success() {
            bail!("{} resource(s) could not be refreshed", refreshed.failures.len());
        }
    }

    let report = reconciler
        .apply(ctx, &manifest, &mut state, saver(state_path))
        .await?;
    print_apply_report(&report, format);
    if !report.is_success() {
        bail!("{} resource(s) failed to apply", report.failures.len());
    }
    Ok(())
}

pub async fn destroy(reconciler: &Reconciler, ctx: &OpContext, state_path: &Path, format: OutputFormat) -> Result<()> {
    let mut state = load_state(state_path)?;
    let report = reconciler.destroy(ctx, &mut state, saver(state_path)).await?;
    print_apply_report(&report, format);
    if !report.is_success() {
        bail!("{} resource(s) failed to delete", report.failures.len());
    }
    Ok(())
}
