//! Hand-written collaborators for controller tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dofunc_core::{ProviderError, Result};
use dofunc_provider::{
    CommandOutput, CommandRunner, CreateFunctionRequest, DeleteOutcome, FunctionApi, FunctionDetails,
    OpContext, SourceArchive, UnpackSummary, UpdateFunctionRequest,
};

/// Records every invocation and replays queued results in order.
///
/// With nothing queued a call succeeds with empty output.
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<String>>,
    results: Mutex<VecDeque<Result<CommandOutput>>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ok(&self, output: &str) {
        self.results.lock().unwrap().push_back(Ok(CommandOutput {
            output: output.to_string(),
        }));
    }

    pub fn push_failure(&self, status: i32, output: &str) {
        self.results.lock().unwrap().push_back(Err(ProviderError::ToolExecution {
            command: "doctl".into(),
            status: Some(status),
            output: output.to_string(),
        }));
    }

    /// Invocations as `program arg arg ...`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, _ctx: &OpContext, program: &str, args: &[String]) -> Result<CommandOutput> {
        self.calls
            .lock()
            .unwrap()
            .push(dofunc_provider::runner::command_line(program, args));
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(CommandOutput { output: String::new() }))
    }
}

/// Source archive double that counts stage invocations.
#[derive(Default)]
pub struct MockSource {
    pub fetches: AtomicUsize,
    pub unpacks: AtomicUsize,
    pub fail_fetch: bool,
    pub fail_unpack: bool,
}

impl MockSource {
    pub fn failing_fetch() -> Self {
        Self {
            fail_fetch: true,
            ..Self::default()
        }
    }

    pub fn failing_unpack() -> Self {
        Self {
            fail_unpack: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl SourceArchive for MockSource {
    async fn fetch(&self, _ctx: &OpContext, url: &str, work_dir: &Path) -> Result<PathBuf> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch {
            return Err(ProviderError::protocol("fetch archive", 404, format!("no archive at {url}")));
        }
        Ok(work_dir.join(dofunc_provider::archive::ARCHIVE_FILE_NAME))
    }

    async fn unpack(&self, _ctx: &OpContext, archive: &Path, _dest_dir: &Path) -> Result<UnpackSummary> {
        self.unpacks.fetch_add(1, Ordering::SeqCst);
        if self.fail_unpack {
            return Err(ProviderError::extraction(
                archive.display().to_string(),
                "unexpected end of file",
            ));
        }
        Ok(UnpackSummary {
            files: 2,
            directories: 0,
        })
    }
}

/// In-memory control plane.
pub struct MockApi {
    pub creates: AtomicUsize,
    pub gets: AtomicUsize,
    pub updates: AtomicUsize,
    pub deletes: AtomicUsize,
    pub create_status: Mutex<Option<(u16, String)>>,
    pub update_status: Mutex<Option<(u16, String)>>,
    pub delete_status: Mutex<Option<(u16, String)>>,
    pub create_url: Mutex<Option<String>>,
    /// Functions that exist, with their url.
    pub existing: Mutex<Vec<(String, String)>>,
    pub last_update: Mutex<Option<UpdateFunctionRequest>>,
}

impl Default for MockApi {
    fn default() -> Self {
        Self {
            creates: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            create_status: Mutex::new(None),
            update_status: Mutex::new(None),
            delete_status: Mutex::new(None),
            create_url: Mutex::new(Some("https://faas.example/api/v1/web/fn-ns/default".to_string())),
            existing: Mutex::new(Vec::new()),
            last_update: Mutex::new(None),
        }
    }
}

impl MockApi {
    pub fn fail_create(&self, status: u16, body: &str) {
        *self.create_status.lock().unwrap() = Some((status, body.to_string()));
    }

    pub fn fail_update(&self, status: u16, body: &str) {
        *self.update_status.lock().unwrap() = Some((status, body.to_string()));
    }

    pub fn fail_delete(&self, status: u16, body: &str) {
        *self.delete_status.lock().unwrap() = Some((status, body.to_string()));
    }

    pub fn insert(&self, name: &str, url: &str) {
        self.existing.lock().unwrap().push((name.to_string(), url.to_string()));
    }

    pub fn remove(&self, name: &str) {
        self.existing.lock().unwrap().retain(|(n, _)| n != name);
    }

    pub fn exists(&self, name: &str) -> bool {
        self.existing.lock().unwrap().iter().any(|(n, _)| n == name)
    }
}

#[async_trait]
impl FunctionApi for MockApi {
    async fn create_function(&self, _ctx: &OpContext, request: &CreateFunctionRequest) -> Result<FunctionDetails> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if let Some((status, body)) = self.create_status.lock().unwrap().clone() {
            return Err(ProviderError::protocol("create function", status, body));
        }
        let url = self.create_url.lock().unwrap().clone();
        let stored = url.clone().unwrap_or_else(|| self.function_url(&request.name));
        self.insert(&request.name, &stored);
        Ok(FunctionDetails { url })
    }

    async fn get_function(&self, _ctx: &OpContext, name: &str) -> Result<Option<FunctionDetails>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .existing
            .lock()
            .unwrap()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, url)| FunctionDetails { url: Some(url.clone()) }))
    }

    async fn update_function(&self, _ctx: &OpContext, _name: &str, request: &UpdateFunctionRequest) -> Result<()> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        if let Some((status, body)) = self.update_status.lock().unwrap().clone() {
            return Err(ProviderError::protocol("update function", status, body));
        }
        *self.last_update.lock().unwrap() = Some(request.clone());
        Ok(())
    }

    async fn delete_function(&self, _ctx: &OpContext, name: &str) -> Result<DeleteOutcome> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if let Some((status, body)) = self.delete_status.lock().unwrap().clone() {
            return Err(ProviderError::protocol("delete function", status, body));
        }
        if self.exists(name) {
            self.remove(name);
            Ok(DeleteOutcome::Deleted)
        } else {
            Ok(DeleteOutcome::AlreadyAbsent)
        }
    }

    fn function_url(&self, name: &str) -> String {
        format!("https://api.example.com/v2/functions/{name}")
    }
}

pub fn count(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}
