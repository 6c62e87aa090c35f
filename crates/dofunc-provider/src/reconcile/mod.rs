//! Reconciliation of declared resources against tracked state.
//!
//! Drives the lifecycle controllers for every address in a manifest:
//! - plans create / update / replace / delete per resource
//! - applies the plan sequentially, namespaces before functions
//! - writes each record back and checkpoints after every operation, so a
//!   failure part-way through leaves the state consistent with reality

mod manifest;
mod plan;
mod state;

use std::collections::BTreeMap;
use std::sync::Arc;

use dofunc_core::{
    FunctionResource, NamespaceResource, ProviderError, Resource, ResourceRecord, Result,
};

use crate::context::OpContext;
use crate::lifecycle::{Lifecycle, ReadOutcome};

pub use manifest::Manifest;
pub use plan::{Action, PlannedChange, plan, plan_changes, plan_kind};
pub use state::{STATE_VERSION, StateFile};

type Records<R> = BTreeMap<String, ResourceRecord<R>>;

/// A resource operation that failed.
#[derive(Debug)]
pub struct Failure {
    /// `<kind>.<address>`
    pub resource: String,
    pub action: Action,
    pub error: ProviderError,
}

/// Outcome of [`Reconciler::apply`] and [`Reconciler::destroy`].
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub replaced: Vec<String>,
    pub deleted: Vec<String>,
    pub unchanged: Vec<String>,
    pub failures: Vec<Failure>,
}

impl ApplyReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, action: Action, resource: String) {
        match action {
            Action::Create => self.created.push(resource),
            Action::Update => self.updated.push(resource),
            Action::Replace => self.replaced.push(resource),
            Action::Delete => self.deleted.push(resource),
            Action::NoOp => self.unchanged.push(resource),
        }
    }
}

/// Outcome of [`Reconciler::refresh`].
#[derive(Debug, Default)]
pub struct RefreshReport {
    pub present: Vec<String>,
    /// Tracked as present but gone remotely.
    pub drifted: Vec<String>,
    /// Not verifiable remotely; local state kept.
    pub unverified: Vec<String>,
    pub failures: Vec<Failure>,
}

impl RefreshReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

pub type DynFunctionLifecycle = Arc<dyn Lifecycle<FunctionResource>>;
pub type DynNamespaceLifecycle = Arc<dyn Lifecycle<NamespaceResource>>;

/// Dispatches planned actions to the per-kind lifecycle controllers.
pub struct Reconciler {
    functions: DynFunctionLifecycle,
    namespaces: DynNamespaceLifecycle,
}

impl Reconciler {
    pub fn new(functions: DynFunctionLifecycle, namespaces: DynNamespaceLifecycle) -> Self {
        Self { functions, namespaces }
    }

    pub fn plan(&self, manifest: &Manifest, state: &StateFile) -> Vec<PlannedChange> {
        plan_changes(manifest, state)
    }

    /// Bring the tracked state in line with `manifest`.
    ///
    /// Resource failures are collected in the report and do not stop other
    /// resources. `checkpoint` runs after every operation; an error from it
    /// aborts the run.
    pub async fn apply<C>(
        &self,
        ctx: &OpContext,
        manifest: &Manifest,
        state: &mut StateFile,
        mut checkpoint: C,
    ) -> Result<ApplyReport>
    where
        C: FnMut(&StateFile) -> Result<()>,
    {
        manifest.validate()?;
        let mut report = ApplyReport::default();

        apply_kind(
            ctx,
            self.namespaces.as_ref(),
            |s| &mut s.namespaces,
            &manifest.namespaces,
            state,
            &mut report,
            &mut checkpoint,
        )
        .await?;
        apply_kind(
            ctx,
            self.functions.as_ref(),
            |s| &mut s.functions,
            &manifest.functions,
            state,
            &mut report,
            &mut checkpoint,
        )
        .await?;

        tracing::info!(
            created = report.created.len(),
            updated = report.updated.len(),
            replaced = report.replaced.len(),
            deleted = report.deleted.len(),
            failed = report.failures.len(),
            "apply finished"
        );
        Ok(report)
    }

    /// Read every present record back from the remote side.
    pub async fn refresh<C>(&self, ctx: &OpContext, state: &mut StateFile, mut checkpoint: C) -> Result<RefreshReport>
    where
        C: FnMut(&StateFile) -> Result<()>,
    {
        let mut report = RefreshReport::default();
        refresh_kind(ctx, self.namespaces.as_ref(), |s| &mut s.namespaces, state, &mut report, &mut checkpoint)
            .await?;
        refresh_kind(ctx, self.functions.as_ref(), |s| &mut s.functions, state, &mut report, &mut checkpoint)
            .await?;

        tracing::info!(
            present = report.present.len(),
            drifted = report.drifted.len(),
            unverified = report.unverified.len(),
            failed = report.failures.len(),
            "refresh finished"
        );
        Ok(report)
    }

    /// Delete every tracked resource, functions before namespaces.
    pub async fn destroy<C>(&self, ctx: &OpContext, state: &mut StateFile, mut checkpoint: C) -> Result<ApplyReport>
    where
        C: FnMut(&StateFile) -> Result<()>,
    {
        let mut report = ApplyReport::default();
        apply_kind(
            ctx,
            self.functions.as_ref(),
            |s| &mut s.functions,
            &BTreeMap::new(),
            state,
            &mut report,
            &mut checkpoint,
        )
        .await?;
        apply_kind(
            ctx,
            self.namespaces.as_ref(),
            |s| &mut s.namespaces,
            &BTreeMap::new(),
            state,
            &mut report,
            &mut checkpoint,
        )
        .await?;

        tracing::info!(deleted = report.deleted.len(), failed = report.failures.len(), "destroy finished");
        Ok(report)
    }
}

async fn apply_kind<R, C>(
    ctx: &OpContext,
    lifecycle: &dyn Lifecycle<R>,
    select: fn(&mut StateFile) -> &mut Records<R>,
    desired: &BTreeMap<String, R>,
    state: &mut StateFile,
    report: &mut ApplyReport,
    checkpoint: &mut C,
) -> Result<()>
where
    R: Resource,
    C: FnMut(&StateFile) -> Result<()>,
{
    // Records that never came into existence and are no longer declared.
    select(state).retain(|address, record| record.is_present() || desired.contains_key(address));

    for (address, action) in plan_kind(desired, select(state)) {
        let resource = format!("{}.{address}", R::KIND);
        if !action.is_change() {
            report.record(action, resource);
            continue;
        }

        if let Some(attrs) = desired.get(&address)
            && let Some(owner) = tracked_elsewhere(select(state), &address, attrs.identifier())
        {
            let error = ProviderError::invalid_resource(format!(
                "{kind} '{id}' is still tracked as {kind}.{owner}",
                kind = R::KIND,
                id = attrs.identifier()
            ));
            fail(report, resource, action, error);
            continue;
        }

        tracing::info!(resource = %resource, action = %action, "applying");
        let prior = select(state).remove(&address);
        let (record, outcome) = execute(ctx, lifecycle, action, prior, desired.get(&address)).await;
        if let Some(record) = record {
            select(state).insert(address, record);
        }

        match outcome {
            Ok(()) => report.record(action, resource),
            Err(error) => fail(report, resource, action, error),
        }
        checkpoint(&*state)?;
    }
    Ok(())
}

/// Address of another present record holding `identifier`, if any.
fn tracked_elsewhere<'a, R: Resource>(records: &'a Records<R>, address: &str, identifier: &str) -> Option<&'a str> {
    records
        .iter()
        .find(|(other, record)| other.as_str() != address && record.id() == Some(identifier))
        .map(|(other, _)| other.as_str())
}

fn fail(report: &mut ApplyReport, resource: String, action: Action, error: ProviderError) {
    tracing::error!(
        resource = %resource,
        action = %action,
        kind = %error.kind(),
        error = %error,
        "operation failed"
    );
    report.failures.push(Failure { resource, action, error });
}

/// Run one planned action and return the record to keep (if any).
async fn execute<R: Resource>(
    ctx: &OpContext,
    lifecycle: &dyn Lifecycle<R>,
    action: Action,
    prior: Option<ResourceRecord<R>>,
    desired: Option<&R>,
) -> (Option<ResourceRecord<R>>, Result<()>) {
    match (action, prior, desired) {
        (Action::Create, _, Some(desired)) => {
            let mut record = ResourceRecord::absent(desired.clone());
            let outcome = lifecycle.create(ctx, &mut record).await;
            (Some(record), outcome)
        }
        (Action::Update, Some(mut record), Some(desired)) => {
            let previous = std::mem::replace(&mut record.attrs, desired.clone());
            let outcome = lifecycle.update(ctx, &previous, &mut record).await;
            if outcome.is_err() && record.is_present() {
                // Still the old object remotely; plan the update again next time.
                record.attrs = previous;
            }
            (Some(record), outcome)
        }
        (Action::Replace, Some(mut record), Some(desired)) => {
            if let Err(e) = lifecycle.delete(ctx, &mut record).await {
                return (Some(record), Err(e));
            }
            let mut fresh = ResourceRecord::absent(desired.clone());
            let outcome = lifecycle.create(ctx, &mut fresh).await;
            (Some(fresh), outcome)
        }
        (Action::Delete, Some(mut record), _) => match lifecycle.delete(ctx, &mut record).await {
            Ok(()) => (None, Ok(())),
            Err(e) => (Some(record), Err(e)),
        },
        (Action::NoOp, prior, _) => (prior, Ok(())),
        (action, prior, _) => (
            prior,
            Err(ProviderError::invalid_resource(format!(
                "cannot {action} a {} without the required records",
                R::KIND
            ))),
        ),
    }
}

async fn refresh_kind<R, C>(
    ctx: &OpContext,
    lifecycle: &dyn Lifecycle<R>,
    select: fn(&mut StateFile) -> &mut Records<R>,
    state: &mut StateFile,
    report: &mut RefreshReport,
    checkpoint: &mut C,
) -> Result<()>
where
    R: Resource,
    C: FnMut(&StateFile) -> Result<()>,
{
    let addresses: Vec<String> = select(state)
        .iter()
        .filter(|(_, record)| record.is_present())
        .map(|(address, _)| address.clone())
        .collect();

    for address in addresses {
        let resource = format!("{}.{address}", R::KIND);
        let Some(mut record) = select(state).remove(&address) else {
            continue;
        };
        let outcome = lifecycle.read(ctx, &mut record).await;
        select(state).insert(address, record);

        match outcome {
            Ok(ReadOutcome::Present) => report.present.push(resource),
            Ok(ReadOutcome::Absent) => {
                tracing::warn!(resource = %resource, "drift detected: resource is gone");
                report.drifted.push(resource);
            }
            Ok(ReadOutcome::Unverified) => report.unverified.push(resource),
            Err(error) => {
                tracing::error!(resource = %resource, error = %error, "refresh failed");
                report.failures.push(Failure {
                    resource,
                    action: Action::NoOp,
                    error,
                });
            }
        }
        checkpoint(&*state)?;
    }
    Ok(())
}
