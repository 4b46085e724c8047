//! Process-wide set of kind bindings, built once at startup and read-only
//! afterwards. The host iterates it to know which kinds to watch and which
//! syncer handles each.

use std::sync::Arc;

use tracing::{error, info};
use vmir_core::{gvk_key, SyncError, SyncResult};

use crate::{RegisterContext, Syncer};

#[derive(Default)]
pub struct SyncerRegistry {
    syncers: Vec<Arc<dyn Syncer>>,
}

impl SyncerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binding. No two bindings may claim the same kind.
    pub fn register(&mut self, syncer: Arc<dyn Syncer>) -> SyncResult<()> {
        if self.syncers.iter().any(|s| s.name() == syncer.name()) {
            return Err(SyncError::Internal(format!(
                "syncer {} registered twice",
                syncer.name()
            )));
        }
        self.syncers.push(syncer);
        Ok(())
    }

    pub fn syncers(&self) -> &[Arc<dyn Syncer>] {
        &self.syncers
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Syncer>> {
        self.syncers.iter().find(|s| s.name() == name)
    }

    pub fn len(&self) -> usize {
        self.syncers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.syncers.is_empty()
    }

    /// Run every syncer's one-time init, in registration order. A failure
    /// stops the sequence: a kind whose schema is missing must not start
    /// reconciling, and the log line tells a persistent provisioning
    /// failure apart from transient per-object errors.
    pub async fn init_all(&self, ctx: &RegisterContext) -> SyncResult<()> {
        for syncer in &self.syncers {
            info!(syncer = syncer.name(), gvk = %gvk_key(&syncer.gvk()), "initializing syncer");
            if let Err(e) = syncer.init(ctx).await {
                error!(syncer = syncer.name(), error = %e, "syncer initialization failed");
                return Err(e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kube::core::{DynamicObject, GroupVersionKind};
    use vmir_core::{SyncOutcome, SyncResult};

    struct Dummy(&'static str);

    #[async_trait]
    impl Syncer for Dummy {
        fn name(&self) -> &'static str {
            self.0
        }
        fn gvk(&self) -> GroupVersionKind {
            GroupVersionKind::gvk("example.io", "v1", "Dummy")
        }
        async fn init(&self, _ctx: &RegisterContext) -> SyncResult<()> {
            Ok(())
        }
        async fn sync_down(
            &self,
            _ctx: &crate::SyncContext,
            _vobj: &DynamicObject,
        ) -> SyncResult<SyncOutcome> {
            Ok(SyncOutcome::done())
        }
        async fn sync(
            &self,
            _ctx: &crate::SyncContext,
            _pobj: &DynamicObject,
            _vobj: &DynamicObject,
        ) -> SyncResult<SyncOutcome> {
            Ok(SyncOutcome::done())
        }
    }

    #[test]
    fn register_rejects_duplicate_kinds() {
        let mut reg = SyncerRegistry::new();
        reg.register(std::sync::Arc::new(Dummy("volumesnapshot"))).unwrap();
        reg.register(std::sync::Arc::new(Dummy("volumesnapshotdata"))).unwrap();
        assert_eq!(reg.len(), 2);

        let err = reg.register(std::sync::Arc::new(Dummy("volumesnapshot"))).unwrap_err();
        assert!(err.to_string().contains("registered twice"));
        assert_eq!(reg.len(), 2);
        assert!(reg.get("volumesnapshotdata").is_some());
        assert!(reg.get("missing").is_none());
    }
}
