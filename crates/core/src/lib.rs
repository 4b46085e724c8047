//! vmir core types: error taxonomy, sync outcomes, GVK keys.

#![forbid(unsafe_code)]

use kube::core::GroupVersionKind;
use serde::{Deserialize, Serialize};

pub mod snapshot;

pub type SyncResult<T> = Result<T, SyncError>;

/// Errors surfaced to the host. The host owns backoff and requeue policy;
/// nothing here is retried internally.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Schema could not be read or created. Fatal to that kind's startup.
    #[error("provision: {0}")]
    Provision(String),
    /// Malformed source object; skip this pass, issue no write.
    #[error("translation: {0}")]
    Translation(String),
    /// Concurrent modification detected by the API server; retryable.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Expected counterpart vanished between read and write.
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl SyncError {
    /// Map a kube API error onto the taxonomy (409 conflict, 404 not found).
    pub fn classify(err: kube::Error) -> SyncError {
        match err {
            kube::Error::Api(ae) if ae.code == 409 => SyncError::Conflict(ae.message),
            kube::Error::Api(ae) if ae.code == 404 => SyncError::NotFound(ae.message),
            other => SyncError::Internal(other.to_string()),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, SyncError::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound(_))
    }
}

/// Result of one reconciliation pass, handed back to the host.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncOutcome {
    pub requeue: bool,
}

impl SyncOutcome {
    pub fn done() -> Self {
        Self { requeue: false }
    }

    pub fn requeue() -> Self {
        Self { requeue: true }
    }
}

/// Render a GVK as "v1/Kind" or "group/v1/Kind".
pub fn gvk_key(gvk: &GroupVersionKind) -> String {
    if gvk.group.is_empty() {
        format!("{}/{}", gvk.version, gvk.kind)
    } else {
        format!("{}/{}/{}", gvk.group, gvk.version, gvk.kind)
    }
}

pub fn parse_gvk_key(key: &str) -> SyncResult<GroupVersionKind> {
    let parts: Vec<_> = key.split('/').collect();
    match parts.as_slice() {
        [version, kind] => Ok(GroupVersionKind::gvk("", version, kind)),
        [group, version, kind] => Ok(GroupVersionKind::gvk(group, version, kind)),
        _ => Err(SyncError::Internal(format!(
            "invalid gvk key: {} (expect v1/Kind or group/v1/Kind)",
            key
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_err(code: u16, message: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".into(),
            message: message.into(),
            reason: String::new(),
            code,
        })
    }

    #[test]
    fn classify_maps_api_status_codes() {
        assert!(SyncError::classify(api_err(409, "rv mismatch")).is_conflict());
        assert!(SyncError::classify(api_err(404, "gone")).is_not_found());
        let other = SyncError::classify(api_err(500, "boom"));
        assert!(matches!(other, SyncError::Internal(_)));
    }

    #[test]
    fn gvk_key_roundtrip() {
        let gvk = GroupVersionKind::gvk("volumesnapshot.external-storage.k8s.io", "v1", "VolumeSnapshot");
        let key = gvk_key(&gvk);
        assert_eq!(key, "volumesnapshot.external-storage.k8s.io/v1/VolumeSnapshot");
        let back = parse_gvk_key(&key).unwrap();
        assert_eq!(back.kind, "VolumeSnapshot");

        let core = parse_gvk_key("v1/Service").unwrap();
        assert_eq!(core.group, "");
        assert_eq!(gvk_key(&core), "v1/Service");

        assert!(parse_gvk_key("Service").is_err());
    }
}
