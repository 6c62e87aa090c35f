//! Namespace lifecycle, driven entirely through the namespace tool.

use async_trait::async_trait;
use dofunc_core::{NamespaceResource, ProviderError, Resource, ResourceRecord, Result};
use serde::Deserialize;

use crate::context::OpContext;
use crate::lifecycle::{Lifecycle, ReadOutcome};
use crate::runner::DynCommandRunner;

/// One row of `serverless namespaces list --output json`.
#[derive(Debug, Clone, Deserialize)]
struct NamespaceListing {
    label: String,
}

pub struct NamespaceController {
    runner: DynCommandRunner,
    doctl: String,
    verify_on_read: bool,
}

impl NamespaceController {
    pub fn new(runner: DynCommandRunner) -> Self {
        Self {
            runner,
            doctl: "doctl".to_string(),
            verify_on_read: false,
        }
    }

    pub fn with_doctl(mut self, doctl: impl Into<String>) -> Self {
        self.doctl = doctl.into();
        self
    }

    /// Check remote existence on read instead of trusting local state.
    pub fn with_verify_on_read(mut self, verify: bool) -> Self {
        self.verify_on_read = verify;
        self
    }

    async fn create_remote(&self, ctx: &OpContext, label: &str, region: &str) -> Result<()> {
        let args = namespace_args(&["create", "--label", label, "--region", region]);
        let out = self.runner.run(ctx, &self.doctl, &args).await?;
        tracing::debug!(label, output = %out.output, "namespace create output");
        Ok(())
    }

    async fn delete_remote(&self, ctx: &OpContext, label: &str) -> Result<()> {
        let args = namespace_args(&["delete", label, "--force"]);
        let out = self.runner.run(ctx, &self.doctl, &args).await?;
        tracing::debug!(label, output = %out.output, "namespace delete output");
        Ok(())
    }

    async fn list_labels(&self, ctx: &OpContext) -> Result<Vec<String>> {
        let args = namespace_args(&["list", "--output", "json"]);
        let out = self.runner.run(ctx, &self.doctl, &args).await?;
        parse_listing(&out.output)
    }
}

fn namespace_args(rest: &[&str]) -> Vec<String> {
    ["serverless", "namespaces"]
        .iter()
        .chain(rest)
        .map(|s| s.to_string())
        .collect()
}

fn parse_listing(output: &str) -> Result<Vec<String>> {
    let trimmed = output.trim();
    // The tool prints nothing at all when there are no namespaces.
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Vec::new());
    }
    let rows: Vec<NamespaceListing> = serde_json::from_str(trimmed)
        .map_err(|e| ProviderError::decode("list namespaces", e))?;
    Ok(rows.into_iter().map(|row| row.label).collect())
}

#[async_trait]
impl Lifecycle<NamespaceResource> for NamespaceController {
    async fn create(&self, ctx: &OpContext, record: &mut ResourceRecord<NamespaceResource>) -> Result<()> {
        record.attrs.validate()?;
        let label = record.attrs.label.clone();
        tracing::info!(label = %label, region = %record.attrs.region, "creating namespace");
        self.create_remote(ctx, &label, &record.attrs.region).await?;
        record.set_id(label);
        Ok(())
    }

    async fn read(&self, ctx: &OpContext, record: &mut ResourceRecord<NamespaceResource>) -> Result<ReadOutcome> {
        let Some(id) = record.id().map(str::to_string) else {
            return Ok(ReadOutcome::Absent);
        };
        if !self.verify_on_read {
            // Local state is trusted as-is.
            return Ok(ReadOutcome::Unverified);
        }
        let labels = self.list_labels(ctx).await?;
        if labels.iter().any(|l| *l == id) {
            Ok(ReadOutcome::Present)
        } else {
            tracing::info!(label = %id, "namespace no longer exists remotely");
            record.clear_id();
            Ok(ReadOutcome::Absent)
        }
    }

    async fn update(
        &self,
        ctx: &OpContext,
        prior: &NamespaceResource,
        record: &mut ResourceRecord<NamespaceResource>,
    ) -> Result<()> {
        record.attrs.validate()?;
        if prior.label == record.attrs.label {
            if prior.region != record.attrs.region {
                tracing::warn!(
                    label = %prior.label,
                    from = %prior.region,
                    to = %record.attrs.region,
                    "region changes are not applied to an existing namespace"
                );
                // State keeps the region the namespace actually lives in.
                record.attrs.region = prior.region.clone();
            }
            return Ok(());
        }

        let old_label = record.id().unwrap_or(prior.label.as_str()).to_string();
        let new_label = record.attrs.label.clone();
        tracing::info!(from = %old_label, to = %new_label, "replacing namespace");

        // Forget the old namespace before touching it remotely.
        record.clear_id();
        self.delete_remote(ctx, &old_label).await?;
        // From here until create succeeds no namespace exists remotely.
        self.create_remote(ctx, &new_label, &record.attrs.region).await?;
        record.set_id(new_label);
        Ok(())
    }

    async fn delete(&self, ctx: &OpContext, record: &mut ResourceRecord<NamespaceResource>) -> Result<()> {
        let Some(id) = record.id().map(str::to_string) else {
            return Ok(());
        };
        tracing::info!(label = %id, "deleting namespace");
        self.delete_remote(ctx, &id).await?;
        record.clear_id();
        Ok(())
    }
}
