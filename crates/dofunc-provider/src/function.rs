//! Function lifecycle: the fetch, unpack, deploy, register pipeline on
//! create and plain control-plane calls for everything else.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use dofunc_core::{
    FunctionResource, FunctionStage, ProviderError, Resource, ResourceRecord, Result,
};
use tempfile::TempDir;

use crate::archive::DynSourceArchive;
use crate::client::{CreateFunctionRequest, DeleteOutcome, DynFunctionApi, UpdateFunctionRequest};
use crate::context::OpContext;
use crate::lifecycle::{Lifecycle, ReadOutcome};
use crate::runner::DynCommandRunner;

/// Directory inside the per-call working directory the archive is unpacked to.
const PROJECT_DIR: &str = "project";

pub struct FunctionController {
    api: DynFunctionApi,
    source: DynSourceArchive,
    runner: DynCommandRunner,
    doctl: String,
    work_root: Option<PathBuf>,
    unpack_timeout: Duration,
}

impl FunctionController {
    pub fn new(api: DynFunctionApi, source: DynSourceArchive, runner: DynCommandRunner) -> Self {
        Self {
            api,
            source,
            runner,
            doctl: "doctl".to_string(),
            work_root: None,
            unpack_timeout: Duration::from_secs(300),
        }
    }

    pub fn with_doctl(mut self, doctl: impl Into<String>) -> Self {
        self.doctl = doctl.into();
        self
    }

    pub fn with_work_root(mut self, work_root: Option<PathBuf>) -> Self {
        self.work_root = work_root;
        self
    }

    pub fn with_unpack_timeout(mut self, timeout: Duration) -> Self {
        self.unpack_timeout = timeout;
        self
    }

    /// A fresh working directory, removed when the returned guard drops.
    fn working_dir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("dofunc-");
        let dir = match &self.work_root {
            Some(root) => {
                std::fs::create_dir_all(root).map_err(|e| {
                    ProviderError::io(format!("creating work root {}", root.display()), e)
                })?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        };
        dir.map_err(|e| ProviderError::io("creating working directory", e))
    }

    async fn deploy(&self, ctx: &OpContext, project: &Path) -> Result<()> {
        let args = vec![
            "serverless".to_string(),
            "deploy".to_string(),
            project.to_string_lossy().into_owned(),
        ];
        let out = self.runner.run(ctx, &self.doctl, &args).await?;
        tracing::debug!(output = %out.output, "deploy output");
        Ok(())
    }
}

fn update_request(attrs: &FunctionResource) -> UpdateFunctionRequest {
    UpdateFunctionRequest {
        runtime: attrs.runtime.clone(),
        code: attrs.code.clone().unwrap_or_default(),
    }
}

fn require_id(record: &ResourceRecord<FunctionResource>, operation: &str) -> Result<String> {
    record.id().map(str::to_string).ok_or_else(|| {
        ProviderError::invalid_resource(format!(
            "cannot {operation} function '{}': it has no identifier",
            record.attrs.name
        ))
    })
}

#[async_trait]
impl Lifecycle<FunctionResource> for FunctionController {
    async fn create(&self, ctx: &OpContext, record: &mut ResourceRecord<FunctionResource>) -> Result<()> {
        record.attrs.validate()?;
        let name = record.attrs.name.clone();
        let source_url = record.attrs.source_url.clone().ok_or_else(|| {
            ProviderError::invalid_resource(format!("function '{name}' needs a source_url to be created"))
        })?;

        // Removed on every exit path; nothing done remotely is rolled back.
        let work_dir = self.working_dir()?;
        tracing::info!(function = %name, work_dir = %work_dir.path().display(), "creating function");

        let archive = self
            .source
            .fetch(ctx, &source_url, work_dir.path())
            .await
            .map_err(|e| e.at_stage(FunctionStage::Fetch))?;
        tracing::info!(function = %name, stage = %FunctionStage::Fetch, "stage complete");

        let project = work_dir.path().join(PROJECT_DIR);
        let summary = ctx
            .bound("unpack archive", self.unpack_timeout, self.source.unpack(ctx, &archive, &project))
            .await
            .map_err(|e| e.at_stage(FunctionStage::Unpack))?;
        tracing::info!(
            function = %name,
            stage = %FunctionStage::Unpack,
            files = summary.files,
            directories = summary.directories,
            "stage complete"
        );

        self.deploy(ctx, &project)
            .await
            .map_err(|e| e.at_stage(FunctionStage::Deploy))?;
        tracing::info!(function = %name, stage = %FunctionStage::Deploy, "stage complete");

        let request = CreateFunctionRequest {
            name: name.clone(),
            runtime: record.attrs.runtime.clone(),
        };
        let created = self
            .api
            .create_function(ctx, &request)
            .await
            .map_err(|e| e.at_stage(FunctionStage::Register))?;
        tracing::info!(function = %name, stage = %FunctionStage::Register, "stage complete");

        record.computed.url = Some(created.url.unwrap_or_else(|| self.api.function_url(&name)));
        record.set_id(name);
        Ok(())
    }

    async fn read(&self, ctx: &OpContext, record: &mut ResourceRecord<FunctionResource>) -> Result<ReadOutcome> {
        let Some(id) = record.id().map(str::to_string) else {
            return Ok(ReadOutcome::Absent);
        };
        match self.api.get_function(ctx, &id).await? {
            Some(details) => {
                if let Some(url) = details.url {
                    record.computed.url = Some(url);
                }
                Ok(ReadOutcome::Present)
            }
            None => {
                tracing::info!(function = %id, "function no longer exists remotely");
                record.clear_id();
                Ok(ReadOutcome::Absent)
            }
        }
    }

    async fn update(
        &self,
        ctx: &OpContext,
        prior: &FunctionResource,
        record: &mut ResourceRecord<FunctionResource>,
    ) -> Result<()> {
        record.attrs.validate()?;
        let id = require_id(record, "update")?;
        if prior.name != record.attrs.name {
            return Err(ProviderError::invalid_resource(format!(
                "function name is immutable ('{}' -> '{}'); replace the resource instead",
                prior.name, record.attrs.name
            )));
        }
        tracing::info!(function = %id, runtime = %record.attrs.runtime, "updating function");
        self.api
            .update_function(ctx, &id, &update_request(&record.attrs))
            .await?;
        self.read(ctx, record).await?;
        Ok(())
    }

    async fn delete(&self, ctx: &OpContext, record: &mut ResourceRecord<FunctionResource>) -> Result<()> {
        let Some(id) = record.id().map(str::to_string) else {
            return Ok(());
        };
        match self.api.delete_function(ctx, &id).await? {
            DeleteOutcome::Deleted => tracing::info!(function = %id, "deleted function"),
            DeleteOutcome::AlreadyAbsent => {
                tracing::info!(function = %id, "function was already gone")
            }
        }
        record.clear_id();
        Ok(())
    }
}
