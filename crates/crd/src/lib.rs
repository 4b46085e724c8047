//! vmir crd: ensure a custom-resource schema present on the physical cluster
//! also exists on the virtual cluster before instance sync starts.

#![forbid(unsafe_code)]

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1 as apiextv1;
use kube::{
    api::{Api, ListParams, PostParams},
    core::GroupVersionKind,
    Client,
};
use serde_json::Value as Json;
use tracing::{debug, info};
use vmir_core::{gvk_key, SyncError, SyncResult};

/// Identifies the schema to mirror: kind/group/version plus the plural used
/// to form the CRD's metadata.name.
#[derive(Debug, Clone)]
pub struct SchemaDescriptor {
    pub gvk: GroupVersionKind,
    pub plural: String,
}

impl SchemaDescriptor {
    pub fn new(gvk: GroupVersionKind, plural: impl Into<String>) -> Self {
        Self { gvk, plural: plural.into() }
    }

    /// CRD object name, `{plural}.{group}`.
    pub fn crd_name(&self) -> String {
        format!("{}.{}", self.plural, self.gvk.group)
    }
}

fn provision(context: &str, err: kube::Error) -> SyncError {
    SyncError::Provision(format!("{}: {}", context, err))
}

/// Mirror the CRD for `desc` from the physical API server onto the virtual
/// one. Idempotent: already present on the virtual side (or racing another
/// creator) is success. Any other failure is fatal to the caller's startup
/// and is not retried here; retry policy belongs to the hosting framework.
pub async fn ensure_crd_from_physical(
    physical: &Client,
    virt: &Client,
    desc: &SchemaDescriptor,
) -> SyncResult<()> {
    let name = desc.crd_name();
    let key = gvk_key(&desc.gvk);

    let vapi: Api<apiextv1::CustomResourceDefinition> = Api::all(virt.clone());
    if vapi
        .get_opt(&name)
        .await
        .map_err(|e| provision("reading virtual CRD", e))?
        .is_some()
    {
        debug!(gvk = %key, crd = %name, "schema already present on virtual cluster");
        return Ok(());
    }

    let papi: Api<apiextv1::CustomResourceDefinition> = Api::all(physical.clone());
    let found = match papi
        .get_opt(&name)
        .await
        .map_err(|e| provision("reading physical CRD", e))?
    {
        Some(crd) => Some(crd),
        // Fall back to a group+kind scan; some clusters serve the CRD under a
        // non-obvious plural.
        None => find_by_group_kind(&papi, &desc.gvk).await?,
    };
    let crd = found.ok_or_else(|| {
        SyncError::Provision(format!("CRD {} not found on physical cluster", key))
    })?;

    let raw = serde_json::to_value(&crd)
        .map_err(|e| SyncError::Provision(format!("encoding CRD {}: {}", name, e)))?;
    let clean: apiextv1::CustomResourceDefinition = serde_json::from_value(sanitize_crd(raw))
        .map_err(|e| SyncError::Provision(format!("decoding sanitized CRD {}: {}", name, e)))?;

    match vapi.create(&PostParams::default(), &clean).await {
        Ok(_) => {
            info!(gvk = %key, crd = %name, "schema mirrored onto virtual cluster");
            Ok(())
        }
        Err(e) => match SyncError::classify(e) {
            SyncError::Conflict(_) => {
                debug!(gvk = %key, crd = %name, "schema created concurrently");
                Ok(())
            }
            other => Err(SyncError::Provision(format!("creating virtual CRD {}: {}", name, other))),
        },
    }
}

async fn find_by_group_kind(
    api: &Api<apiextv1::CustomResourceDefinition>,
    gvk: &GroupVersionKind,
) -> SyncResult<Option<apiextv1::CustomResourceDefinition>> {
    let crds = api
        .list(&ListParams::default())
        .await
        .map_err(|e| provision("listing physical CRDs", e))?;
    for crd in crds {
        if crd.spec.group == gvk.group && crd.spec.names.kind == gvk.kind {
            return Ok(Some(crd));
        }
    }
    Ok(None)
}

/// Strip server-managed metadata and status so the definition can be created
/// verbatim on another API server.
pub fn sanitize_crd(mut v: Json) -> Json {
    if let Some(meta) = v.get_mut("metadata").and_then(|m| m.as_object_mut()) {
        for key in [
            "uid",
            "resourceVersion",
            "generation",
            "creationTimestamp",
            "managedFields",
            "selfLink",
            "ownerReferences",
            "finalizers",
        ] {
            meta.remove(key);
        }
    }
    if let Some(obj) = v.as_object_mut() {
        obj.remove("status");
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_forms_crd_name() {
        let d = SchemaDescriptor::new(
            GroupVersionKind::gvk("volumesnapshot.external-storage.k8s.io", "v1", "VolumeSnapshot"),
            "volumesnapshots",
        );
        assert_eq!(d.crd_name(), "volumesnapshots.volumesnapshot.external-storage.k8s.io");
    }

    #[test]
    fn sanitize_strips_server_managed_fields_only() {
        let v = serde_json::json!({
            "apiVersion": "apiextensions.k8s.io/v1",
            "kind": "CustomResourceDefinition",
            "metadata": {
                "name": "volumesnapshots.volumesnapshot.external-storage.k8s.io",
                "uid": "abc",
                "resourceVersion": "42",
                "generation": 3,
                "creationTimestamp": "2020-01-01T00:00:00Z",
                "managedFields": [{}],
                "labels": { "keep": "me" }
            },
            "spec": { "group": "volumesnapshot.external-storage.k8s.io" },
            "status": { "acceptedNames": {} }
        });
        let out = sanitize_crd(v);
        let meta = out["metadata"].as_object().unwrap();
        assert!(meta.contains_key("name"));
        assert!(meta.contains_key("labels"));
        for gone in ["uid", "resourceVersion", "generation", "creationTimestamp", "managedFields"] {
            assert!(!meta.contains_key(gone), "{} should be stripped", gone);
        }
        assert!(out.get("status").is_none());
        assert_eq!(out["spec"]["group"], "volumesnapshot.external-storage.k8s.io");
    }
}
