use async_trait::async_trait;
use dofunc_core::{Resource, ResourceRecord, Result};

use crate::context::OpContext;

/// What a read learned about the remote object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Confirmed to exist; computed attributes were refreshed.
    Present,
    /// Confirmed gone; the record's identifier has been cleared.
    Absent,
    /// Not checked remotely; the record was left as-is.
    Unverified,
}

/// Create / read / update / delete for one resource kind.
///
/// Every operation mutates the caller's record in place. On error the
/// record reflects whatever remote state is known to hold at that point.
#[async_trait]
pub trait Lifecycle<R: Resource>: Send + Sync {
    /// Provision `record.attrs` and set the identifier on success.
    async fn create(&self, ctx: &OpContext, record: &mut ResourceRecord<R>) -> Result<()>;

    async fn read(&self, ctx: &OpContext, record: &mut ResourceRecord<R>) -> Result<ReadOutcome>;

    /// Move the remote object from `prior` to `record.attrs`.
    async fn update(&self, ctx: &OpContext, prior: &R, record: &mut ResourceRecord<R>) -> Result<()>;

    /// Remove the remote object and clear the identifier.
    async fn delete(&self, ctx: &OpContext, record: &mut ResourceRecord<R>) -> Result<()>;
}
