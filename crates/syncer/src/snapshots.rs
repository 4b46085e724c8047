//! Syncers for the two external-storage snapshot kinds. Both are thin
//! bindings over the generic engine; their spec equality is the default
//! deep JSON comparison.

use async_trait::async_trait;
use kube::core::{DynamicObject, GroupVersionKind};
use vmir_core::snapshot::{
    volume_snapshot_data_gvk, volume_snapshot_gvk, VOLUME_SNAPSHOT_DATA_PLURAL,
    VOLUME_SNAPSHOT_PLURAL,
};
use vmir_core::{SyncOutcome, SyncResult};
use vmir_crd::{ensure_crd_from_physical, SchemaDescriptor};

use crate::engine::{KindStrategy, NamespacedEngine, Pair};
use crate::{RegisterContext, SyncContext, Syncer};

pub struct SnapshotKind;

impl KindStrategy for SnapshotKind {
    fn name(&self) -> &'static str {
        "volumesnapshot"
    }
    fn gvk(&self) -> GroupVersionKind {
        volume_snapshot_gvk()
    }
    fn plural(&self) -> &'static str {
        VOLUME_SNAPSHOT_PLURAL
    }
}

pub struct SnapshotDataKind;

impl KindStrategy for SnapshotDataKind {
    fn name(&self) -> &'static str {
        "volumesnapshotdata"
    }
    fn gvk(&self) -> GroupVersionKind {
        volume_snapshot_data_gvk()
    }
    fn plural(&self) -> &'static str {
        VOLUME_SNAPSHOT_DATA_PLURAL
    }
}

/// Mirrors VolumeSnapshot objects from the virtual to the physical cluster.
pub struct SnapshotSyncer {
    engine: NamespacedEngine<SnapshotKind>,
}

impl SnapshotSyncer {
    pub fn new(ctx: &RegisterContext) -> Self {
        Self { engine: NamespacedEngine::new(SnapshotKind, ctx.translate.clone()) }
    }

    pub fn engine(&self) -> &NamespacedEngine<SnapshotKind> {
        &self.engine
    }
}

#[async_trait]
impl Syncer for SnapshotSyncer {
    fn name(&self) -> &'static str {
        self.engine.strategy().name()
    }

    fn gvk(&self) -> GroupVersionKind {
        self.engine.strategy().gvk()
    }

    async fn init(&self, ctx: &RegisterContext) -> SyncResult<()> {
        let desc = SchemaDescriptor::new(self.gvk(), VOLUME_SNAPSHOT_PLURAL);
        ensure_crd_from_physical(&ctx.physical, &ctx.virt, &desc).await
    }

    async fn sync_down(&self, ctx: &SyncContext, vobj: &DynamicObject) -> SyncResult<SyncOutcome> {
        self.engine.reconcile(ctx, Pair::VirtualOnly(vobj)).await
    }

    async fn sync(
        &self,
        ctx: &SyncContext,
        pobj: &DynamicObject,
        vobj: &DynamicObject,
    ) -> SyncResult<SyncOutcome> {
        self.engine
            .reconcile(ctx, Pair::BothExist { virtual_obj: vobj, physical_obj: pobj })
            .await
    }
}

/// Mirrors VolumeSnapshotData objects.
pub struct SnapshotDataSyncer {
    engine: NamespacedEngine<SnapshotDataKind>,
}

impl SnapshotDataSyncer {
    pub fn new(ctx: &RegisterContext) -> Self {
        Self { engine: NamespacedEngine::new(SnapshotDataKind, ctx.translate.clone()) }
    }

    pub fn engine(&self) -> &NamespacedEngine<SnapshotDataKind> {
        &self.engine
    }
}

#[async_trait]
impl Syncer for SnapshotDataSyncer {
    fn name(&self) -> &'static str {
        self.engine.strategy().name()
    }

    fn gvk(&self) -> GroupVersionKind {
        self.engine.strategy().gvk()
    }

    async fn init(&self, ctx: &RegisterContext) -> SyncResult<()> {
        let desc = SchemaDescriptor::new(self.gvk(), VOLUME_SNAPSHOT_DATA_PLURAL);
        ensure_crd_from_physical(&ctx.physical, &ctx.virt, &desc).await
    }

    async fn sync_down(&self, ctx: &SyncContext, vobj: &DynamicObject) -> SyncResult<SyncOutcome> {
        self.engine.reconcile(ctx, Pair::VirtualOnly(vobj)).await
    }

    async fn sync(
        &self,
        ctx: &SyncContext,
        pobj: &DynamicObject,
        vobj: &DynamicObject,
    ) -> SyncResult<SyncOutcome> {
        self.engine
            .reconcile(ctx, Pair::BothExist { virtual_obj: vobj, physical_obj: pobj })
            .await
    }
}
