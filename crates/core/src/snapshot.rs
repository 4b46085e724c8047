//! Typed payloads for the external-storage volume-snapshot kinds.
//!
//! Wire names match the published CRD schema; the engine itself diffs raw
//! JSON, these types exist for construction and for callers that want typed
//! access to spec/status.

use k8s_openapi::api::core::v1::{ObjectReference, PersistentVolumeSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::core::GroupVersionKind;
use serde::{Deserialize, Serialize};

pub const GROUP: &str = "volumesnapshot.external-storage.k8s.io";
pub const VERSION: &str = "v1";

pub const VOLUME_SNAPSHOT_KIND: &str = "VolumeSnapshot";
pub const VOLUME_SNAPSHOT_PLURAL: &str = "volumesnapshots";
pub const VOLUME_SNAPSHOT_DATA_KIND: &str = "VolumeSnapshotData";
pub const VOLUME_SNAPSHOT_DATA_PLURAL: &str = "volumesnapshotdatas";

/// Portworx CSI GA driver name (2.2+).
pub const PORTWORX_CSI_PROVISIONER: &str = "pxd.portworx.com";
/// Older deprecated Portworx driver name.
pub const PORTWORX_CSI_DEPRECATED_PROVISIONER: &str = "com.openstorage.pxd";

pub fn volume_snapshot_gvk() -> GroupVersionKind {
    GroupVersionKind::gvk(GROUP, VERSION, VOLUME_SNAPSHOT_KIND)
}

pub fn volume_snapshot_data_gvk() -> GroupVersionKind {
    GroupVersionKind::gvk(GROUP, VERSION, VOLUME_SNAPSHOT_DATA_KIND)
}

/// Desired state of a snapshot; owned by the virtual side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotSpec {
    /// Name of the PVC being snapshotted.
    #[serde(default)]
    pub persistent_volume_claim_name: String,
    /// Binds the VolumeSnapshot to its VolumeSnapshotData.
    #[serde(default)]
    pub snapshot_data_name: String,
}

/// Latest observed state of a snapshot; owned by the physical side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotStatus {
    #[serde(default)]
    pub creation_timestamp: Option<Time>,
    #[serde(default)]
    pub conditions: Vec<VolumeSnapshotCondition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeSnapshotConditionType {
    /// Snapshot is cut; upload/creation still in progress.
    Pending,
    /// Snapshot created and ready to use.
    Ready,
    /// Snapshot creation failed.
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotCondition {
    #[serde(rename = "type")]
    pub type_: VolumeSnapshotConditionType,
    /// One of True, False, Unknown.
    pub status: String,
    #[serde(default)]
    pub last_transition_time: Option<Time>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Spec of the on-disk snapshot object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotDataSpec {
    #[serde(flatten)]
    pub source: VolumeSnapshotDataSource,
    /// Bi-directional binding back to the VolumeSnapshot.
    #[serde(default)]
    pub volume_snapshot_ref: Option<ObjectReference>,
    /// PersistentVolume the snapshot was taken from.
    #[serde(default)]
    pub persistent_volume_ref: Option<ObjectReference>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotDataStatus {
    #[serde(default)]
    pub creation_timestamp: Option<Time>,
    #[serde(default)]
    pub conditions: Vec<VolumeSnapshotDataCondition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeSnapshotDataConditionType {
    Ready,
    Pending,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotDataCondition {
    #[serde(rename = "type")]
    pub type_: VolumeSnapshotDataConditionType,
    pub status: String,
    #[serde(default)]
    pub last_transition_time: Option<Time>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Location and type of the snapshot. At most one member is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeSnapshotDataSource {
    #[serde(default, rename = "hostPath", skip_serializing_if = "Option::is_none")]
    pub host_path: Option<HostPathVolumeSnapshotSource>,
    #[serde(default, rename = "glusterSnapshotVolume", skip_serializing_if = "Option::is_none")]
    pub gluster_snapshot_volume: Option<GlusterVolumeSnapshotSource>,
    #[serde(default, rename = "awsElasticBlockStore", skip_serializing_if = "Option::is_none")]
    pub aws_elastic_block_store: Option<AwsElasticBlockStoreVolumeSnapshotSource>,
    #[serde(default, rename = "gcePersistentDisk", skip_serializing_if = "Option::is_none")]
    pub gce_persistent_disk: Option<GcePersistentDiskSnapshotSource>,
    #[serde(default, rename = "cinderVolume", skip_serializing_if = "Option::is_none")]
    pub cinder_snapshot: Option<CinderVolumeSnapshotSource>,
    #[serde(default, rename = "portworxVolume", skip_serializing_if = "Option::is_none")]
    pub portworx_snapshot: Option<PortworxVolumeSnapshotSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostPathVolumeSnapshotSource {
    /// Tar file storing the HostPath volume source.
    #[serde(rename = "snapshot")]
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlusterVolumeSnapshotSource {
    pub snapshot_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsElasticBlockStoreVolumeSnapshotSource {
    pub snapshot_id: String,
    /// Filesystem of the original volume; restored volumes are pre-formatted
    /// with the same filesystem.
    #[serde(default)]
    pub fs_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GcePersistentDiskSnapshotSource {
    #[serde(rename = "snapshotId")]
    pub snapshot_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CinderVolumeSnapshotSource {
    pub snapshot_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortworxSnapshotType {
    Cloud,
    Local,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortworxVolumeSnapshotSource {
    pub snapshot_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_type: Option<PortworxSnapshotType>,
    /// Credentials ID used for cloud snaps.
    #[serde(default, rename = "snapshotCloudCredID", skip_serializing_if = "String::is_empty")]
    pub snapshot_cloud_cred_id: String,
    /// Name of the VolumeSnapshotData; populated only for group snapshots.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub snapshot_data: String,
    #[serde(default, rename = "snapshotTaskID", skip_serializing_if = "String::is_empty")]
    pub snapshot_task_id: String,
    /// In-tree or CSI driver name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub volume_provisioner: String,
}

/// Backend label for a PersistentVolume spec, if the volume type is one the
/// snapshot controller supports.
pub fn supported_volume_from_pv_spec(spec: &PersistentVolumeSpec) -> Option<&'static str> {
    if spec.host_path.is_some() {
        return Some("hostPath");
    }
    if spec.aws_elastic_block_store.is_some() {
        return Some("aws_ebs");
    }
    if spec.gce_persistent_disk.is_some() {
        return Some("gce-pd");
    }
    if spec.cinder.is_some() {
        return Some("cinder");
    }
    if spec.glusterfs.is_some() {
        return Some("glusterfs");
    }
    if let Some(csi) = &spec.csi {
        if csi.driver == PORTWORX_CSI_PROVISIONER || csi.driver == PORTWORX_CSI_DEPRECATED_PROVISIONER {
            return Some("pxd");
        }
    }
    if spec.portworx_volume.is_some() {
        return Some("pxd");
    }
    None
}

/// Backend label for a snapshot-data spec.
pub fn supported_volume_from_snapshot_data_spec(spec: &VolumeSnapshotDataSpec) -> Option<&'static str> {
    let src = &spec.source;
    if src.host_path.is_some() {
        return Some("hostPath");
    }
    if src.aws_elastic_block_store.is_some() {
        return Some("aws_ebs");
    }
    if src.gce_persistent_disk.is_some() {
        return Some("gce-pd");
    }
    if src.cinder_snapshot.is_some() {
        return Some("cinder");
    }
    if src.gluster_snapshot_volume.is_some() {
        return Some("glusterfs");
    }
    if src.portworx_snapshot.is_some() {
        return Some("pxd");
    }
    None
}
