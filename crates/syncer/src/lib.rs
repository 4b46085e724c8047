//! vmir syncer: the reconciliation engine, the syncer registry, and the
//! concrete volume-snapshot syncers.
//!
//! This is a library driven by a hosting framework: the host owns watches,
//! requeue/backoff, and garbage collection, and calls [`Syncer::sync_down`]
//! / [`Syncer::sync`] per delivered event. Each pass stages at most one
//! physical-side write.

#![forbid(unsafe_code)]

pub mod engine;
pub mod registry;
pub mod service;
pub mod snapshots;

use async_trait::async_trait;
use kube::core::{DynamicObject, GroupVersionKind};
use kube::Client;
use vmir_core::{SyncOutcome, SyncResult};
use vmir_translate::TranslateConfig;

pub use engine::{Action, KindStrategy, NamespacedEngine, Pair};
pub use registry::SyncerRegistry;
pub use service::PxServiceSyncer;
pub use snapshots::{SnapshotDataSyncer, SnapshotSyncer};

/// Startup context handed to each syncer exactly once, before any
/// reconciliation for its kind.
#[derive(Clone)]
pub struct RegisterContext {
    pub physical: Client,
    pub virt: Client,
    pub translate: TranslateConfig,
}

impl RegisterContext {
    pub fn sync_context(&self) -> SyncContext {
        SyncContext { physical: self.physical.clone(), virt: self.virt.clone() }
    }
}

/// Per-pass context. Clients are cheap clones; cancellation is the caller
/// dropping the future. Updates are staged as one full-object write, so a
/// cancelled pass is "not yet issued", never half-applied.
#[derive(Clone)]
pub struct SyncContext {
    pub physical: Client,
    pub virt: Client,
}

/// One managed kind, as driven by the host. The host guarantees at most one
/// concurrent call per (kind, namespace/name) key; implementations hold no
/// mutable cross-call state.
#[async_trait]
pub trait Syncer: Send + Sync {
    fn name(&self) -> &'static str;

    fn gvk(&self) -> GroupVersionKind;

    /// One-time initialization, e.g. schema provisioning. Failure is fatal
    /// to this kind's syncer and is not retried here.
    async fn init(&self, ctx: &RegisterContext) -> SyncResult<()>;

    /// Object exists only on the virtual side.
    async fn sync_down(&self, ctx: &SyncContext, vobj: &DynamicObject) -> SyncResult<SyncOutcome>;

    /// Object exists on both sides.
    async fn sync(
        &self,
        ctx: &SyncContext,
        pobj: &DynamicObject,
        vobj: &DynamicObject,
    ) -> SyncResult<SyncOutcome>;
}
