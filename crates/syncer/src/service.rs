//! One-shot fix-up for the portworx-api Service on the virtual side: stamp
//! the selector label so tenant tooling can find the service. A single
//! idempotent read-modify-write, run at init.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use kube::{
    api::{Api, PostParams},
    core::{DynamicObject, GroupVersionKind},
    Client,
};
use std::collections::BTreeMap;
use tracing::{debug, info};
use vmir_core::{SyncError, SyncOutcome, SyncResult};

use crate::{RegisterContext, SyncContext, Syncer};

pub const PX_SERVICE_NAMESPACE: &str = "kube-system";
pub const PX_SERVICE_NAME: &str = "portworx-api";

const PX_LABEL_KEY: &str = "name";
const PX_LABEL_VALUE: &str = "portworx-api";

/// Returns true when the label map was changed and a write is needed.
fn stamp_selector_label(labels: &mut BTreeMap<String, String>) -> bool {
    if labels.get(PX_LABEL_KEY).map(String::as_str) == Some(PX_LABEL_VALUE) {
        return false;
    }
    labels.insert(PX_LABEL_KEY.into(), PX_LABEL_VALUE.into());
    true
}

/// Ensure `kube-system/portworx-api` carries the `name=portworx-api` label.
pub async fn ensure_api_service_label(client: &Client) -> SyncResult<()> {
    let api: Api<Service> = Api::namespaced(client.clone(), PX_SERVICE_NAMESPACE);
    let mut service = api
        .get(PX_SERVICE_NAME)
        .await
        .map_err(|e| SyncError::Internal(format!("get {} service: {}", PX_SERVICE_NAME, e)))?;

    // An absent label map is an empty one; additive updates must not fail.
    let labels = service.metadata.labels.get_or_insert_with(BTreeMap::new);
    if !stamp_selector_label(labels) {
        debug!(service = PX_SERVICE_NAME, "selector label already present");
        return Ok(());
    }

    api.replace(PX_SERVICE_NAME, &PostParams::default(), &service)
        .await
        .map_err(SyncError::classify)?;
    info!(service = PX_SERVICE_NAME, "stamped selector label");
    Ok(())
}

/// Registry wrapper: all the work happens in `init`; the per-object sync
/// paths are never driven for this binding.
pub struct PxServiceSyncer;

#[async_trait]
impl Syncer for PxServiceSyncer {
    fn name(&self) -> &'static str {
        "px-services-syncer"
    }

    fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::gvk("", "v1", "Service")
    }

    async fn init(&self, ctx: &RegisterContext) -> SyncResult<()> {
        ensure_api_service_label(&ctx.virt).await
    }

    async fn sync_down(&self, _ctx: &SyncContext, _vobj: &DynamicObject) -> SyncResult<SyncOutcome> {
        Ok(SyncOutcome::done())
    }

    async fn sync(
        &self,
        _ctx: &SyncContext,
        _pobj: &DynamicObject,
        _vobj: &DynamicObject,
    ) -> SyncResult<SyncOutcome> {
        Ok(SyncOutcome::done())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamp_is_idempotent() {
        let mut labels = BTreeMap::new();
        assert!(stamp_selector_label(&mut labels));
        assert_eq!(labels.get(PX_LABEL_KEY).map(String::as_str), Some(PX_LABEL_VALUE));
        // second stamp changes nothing
        assert!(!stamp_selector_label(&mut labels));
    }

    #[test]
    fn stamp_overwrites_wrong_value() {
        let mut labels: BTreeMap<String, String> =
            [(PX_LABEL_KEY.to_string(), "something-else".to_string())].into_iter().collect();
        assert!(stamp_selector_label(&mut labels));
        assert_eq!(labels.get(PX_LABEL_KEY).map(String::as_str), Some(PX_LABEL_VALUE));
    }
}
