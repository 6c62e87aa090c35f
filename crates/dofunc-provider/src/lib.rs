//! Lifecycle controllers and reconciliation for serverless functions and
//! namespaces.

pub mod archive;
pub mod client;
pub mod context;
pub mod function;
pub mod lifecycle;
pub mod namespace;
pub mod provider;
pub mod reconcile;
pub mod retry;
pub mod runner;

pub use archive::{DynSourceArchive, HttpSourceArchive, SourceArchive, UnpackSummary};
pub use client::{
    ApiClient, CreateFunctionRequest, DeleteOutcome, DynFunctionApi, FunctionApi, FunctionDetails,
    UpdateFunctionRequest,
};
pub use context::OpContext;
pub use function::FunctionController;
pub use lifecycle::{Lifecycle, ReadOutcome};
pub use namespace::NamespaceController;
pub use provider::build_reconciler;
pub use reconcile::{
    Action, ApplyReport, Failure, Manifest, PlannedChange, Reconciler, RefreshReport, StateFile,
};
pub use retry::RetryPolicy;
pub use runner::{CommandOutput, CommandRunner, DynCommandRunner, TokioCommandRunner};
