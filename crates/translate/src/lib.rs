//! vmir translate: maps object identity and administrative metadata between
//! the virtual and physical naming domains, and detects metadata drift.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::DynamicObject;
use serde_json::Value as Json;
use tracing::trace;
use vmir_core::{SyncError, SyncResult};

/// Marker label stamped on every physical object this engine owns.
pub const LABEL_MANAGED_BY: &str = "vmir.io/managed-by";
/// Originating virtual namespace, as a label (selectable).
pub const LABEL_NAMESPACE: &str = "vmir.io/namespace";
/// Originating virtual name/namespace, as annotations.
pub const ANNOTATION_NAME: &str = "vmir.io/name";
pub const ANNOTATION_NAMESPACE: &str = "vmir.io/namespace";
/// Bookkeeping: newline-separated tenant keys copied on the last write.
/// Lets drift detection remove keys the tenant has since deleted without
/// touching keys added by physical-side controllers.
pub const ANNOTATION_MANAGED_LABELS: &str = "vmir.io/managed-labels";
pub const ANNOTATION_MANAGED_ANNOTATIONS: &str = "vmir.io/managed-annotations";

const RESERVED_PREFIX: &str = "vmir.io/";

// DNS-1123 label cap for object names.
const MAX_NAME_LEN: usize = 63;

/// Naming rule for the physical side. `suffix` distinguishes multiple
/// virtual control planes targeting one physical cluster.
#[derive(Debug, Clone)]
pub struct TranslateConfig {
    pub target_namespace: String,
    pub suffix: String,
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self { target_namespace: "vmir".into(), suffix: "vmir".into() }
    }
}

impl TranslateConfig {
    pub fn new(target_namespace: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self { target_namespace: target_namespace.into(), suffix: suffix.into() }
    }
}

fn fnv1a64(s: &str) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for b in s.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

/// Deterministic, collision-free physical name for a virtual (namespace, name)
/// pair: `{name}-x-{ns}-x-{suffix}`, truncated with a hash tail when the full
/// form would exceed the DNS label limit.
pub fn physical_name(cfg: &TranslateConfig, name: &str, namespace: &str) -> String {
    let full = format!("{}-x-{}-x-{}", name, namespace, cfg.suffix);
    if full.len() <= MAX_NAME_LEN {
        return full;
    }
    let digest = format!("{:016x}", fnv1a64(&full));
    let keep = MAX_NAME_LEN - digest.len() - 1;
    format!("{}-{}", &full[..keep], digest)
}

/// Merged metadata to apply when a previously-synced object has drifted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataDrift {
    pub changed: bool,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

fn reserved(key: &str) -> bool {
    key.starts_with(RESERVED_PREFIX)
}

fn joined_keys(map: &BTreeMap<String, String>) -> String {
    map.keys().cloned().collect::<Vec<_>>().join("\n")
}

fn owned_keys(annotations: &BTreeMap<String, String>, bookkeeping_key: &str) -> Vec<String> {
    annotations
        .get(bookkeeping_key)
        .map(|v| v.lines().filter(|l| !l.is_empty()).map(str::to_string).collect())
        .unwrap_or_default()
}

/// Build the object graph that should exist on the physical side for `vobj`:
/// translated name/namespace, tenant labels and annotations copied verbatim
/// (reserved keys skipped), marker and bookkeeping keys added, spec copied,
/// status absent. Nil tenant maps are treated as empty maps.
pub fn translate_metadata(cfg: &TranslateConfig, vobj: &DynamicObject) -> SyncResult<DynamicObject> {
    let name = vobj
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| SyncError::Translation("virtual object has no metadata.name".into()))?;
    let vns = vobj.metadata.namespace.clone().unwrap_or_default();

    let tenant_labels: BTreeMap<String, String> = vobj
        .metadata
        .labels
        .iter()
        .flatten()
        .filter(|(k, _)| !reserved(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let tenant_annotations: BTreeMap<String, String> = vobj
        .metadata
        .annotations
        .iter()
        .flatten()
        .filter(|(k, _)| !reserved(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let mut labels = tenant_labels.clone();
    labels.insert(LABEL_MANAGED_BY.into(), cfg.suffix.clone());
    labels.insert(LABEL_NAMESPACE.into(), vns.clone());

    let mut annotations = tenant_annotations.clone();
    annotations.insert(ANNOTATION_NAME.into(), name.to_string());
    annotations.insert(ANNOTATION_NAMESPACE.into(), vns.clone());
    annotations.insert(ANNOTATION_MANAGED_LABELS.into(), joined_keys(&tenant_labels));
    annotations.insert(ANNOTATION_MANAGED_ANNOTATIONS.into(), joined_keys(&tenant_annotations));

    let mut data = vobj.data.clone();
    match data {
        Json::Null => data = Json::Object(serde_json::Map::new()),
        Json::Object(ref mut map) => {
            // Status is physical-owned; never part of a virtual-driven graph.
            map.remove("status");
        }
        _ => {
            return Err(SyncError::Translation(format!(
                "virtual object {}/{} has a non-object body",
                vns, name
            )))
        }
    }

    let pname = physical_name(cfg, name, &vns);
    trace!(virtual_ns = %vns, virtual_name = %name, physical_name = %pname, "translated metadata");

    Ok(DynamicObject {
        types: vobj.types.clone(),
        metadata: ObjectMeta {
            name: Some(pname),
            namespace: Some(cfg.target_namespace.clone()),
            labels: Some(labels),
            annotations: Some(annotations),
            ..Default::default()
        },
        data,
    })
}

/// Compare translated virtual metadata against the physical object's current
/// metadata. The merge is a one-directional overlay: every virtual-owned key
/// is forced to its expected value, keys the tenant deleted since the last
/// write are removed, and physical-only keys are preserved untouched.
pub fn detect_drift(
    cfg: &TranslateConfig,
    vobj: &DynamicObject,
    pobj: &DynamicObject,
) -> SyncResult<MetadataDrift> {
    let expected = translate_metadata(cfg, vobj)?;
    let exp_labels = expected.metadata.labels.unwrap_or_default();
    let exp_annotations = expected.metadata.annotations.unwrap_or_default();

    let cur_labels = pobj.metadata.labels.clone().unwrap_or_default();
    let cur_annotations = pobj.metadata.annotations.clone().unwrap_or_default();

    let mut labels = cur_labels.clone();
    for key in owned_keys(&cur_annotations, ANNOTATION_MANAGED_LABELS) {
        if !exp_labels.contains_key(&key) {
            labels.remove(&key);
        }
    }
    labels.extend(exp_labels);

    let mut annotations = cur_annotations.clone();
    for key in owned_keys(&cur_annotations, ANNOTATION_MANAGED_ANNOTATIONS) {
        if !exp_annotations.contains_key(&key) {
            annotations.remove(&key);
        }
    }
    annotations.extend(exp_annotations);

    let changed = labels != cur_labels || annotations != cur_annotations;
    Ok(MetadataDrift { changed, labels, annotations })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::TypeMeta;

    fn cfg() -> TranslateConfig {
        TranslateConfig::new("vmir-host", "suffix")
    }

    fn vobj(
        name: &str,
        ns: &str,
        labels: Option<BTreeMap<String, String>>,
        annotations: Option<BTreeMap<String, String>>,
        data: Json,
    ) -> DynamicObject {
        DynamicObject {
            types: Some(TypeMeta {
                api_version: "volumesnapshot.external-storage.k8s.io/v1".into(),
                kind: "VolumeSnapshot".into(),
            }),
            metadata: ObjectMeta {
                name: Some(name.into()),
                namespace: Some(ns.into()),
                labels,
                annotations,
                ..Default::default()
            },
            data,
        }
    }

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn physical_name_is_deterministic_and_capped() {
        let c = cfg();
        let a = physical_name(&c, "snap-a", "ns1");
        assert_eq!(a, "snap-a-x-ns1-x-suffix");
        assert_eq!(a, physical_name(&c, "snap-a", "ns1"));

        let long = "s".repeat(80);
        let n1 = physical_name(&c, &long, "ns1");
        let n2 = physical_name(&c, &long, "ns2");
        assert_eq!(n1.len(), 63);
        assert_eq!(n1, physical_name(&c, &long, "ns1"));
        // same prefix, different namespace: hash tail must differ
        assert_ne!(n1, n2);
    }

    #[test]
    fn translate_copies_spec_and_strips_status() {
        let v = vobj(
            "snap-a",
            "ns1",
            None,
            None,
            serde_json::json!({
                "spec": { "persistentVolumeClaimName": "pvc1" },
                "status": { "conditions": [{"type": "Ready", "status": "True"}] }
            }),
        );
        let p = translate_metadata(&cfg(), &v).unwrap();
        assert_eq!(p.metadata.name.as_deref(), Some("snap-a-x-ns1-x-suffix"));
        assert_eq!(p.metadata.namespace.as_deref(), Some("vmir-host"));
        assert_eq!(p.data["spec"]["persistentVolumeClaimName"], "pvc1");
        assert!(p.data.get("status").is_none());
    }

    #[test]
    fn nil_maps_become_empty_maps() {
        let v = vobj("snap-a", "ns1", None, None, Json::Null);
        let p = translate_metadata(&cfg(), &v).unwrap();
        let labels = p.metadata.labels.unwrap();
        let annotations = p.metadata.annotations.unwrap();
        // maps are present; only engine-owned keys in them
        assert_eq!(labels.get(LABEL_MANAGED_BY).map(String::as_str), Some("suffix"));
        assert_eq!(annotations.get(ANNOTATION_NAME).map(String::as_str), Some("snap-a"));
        assert_eq!(annotations.get(ANNOTATION_MANAGED_LABELS).map(String::as_str), Some(""));
        assert!(p.data.is_object());
    }

    #[test]
    fn reserved_keys_are_never_copied_from_tenant() {
        let v = vobj(
            "snap-a",
            "ns1",
            Some(map(&[("team", "a"), ("vmir.io/managed-by", "spoofed")])),
            Some(map(&[("vmir.io/name", "spoofed")])),
            Json::Null,
        );
        let p = translate_metadata(&cfg(), &v).unwrap();
        let labels = p.metadata.labels.unwrap();
        assert_eq!(labels.get("team").map(String::as_str), Some("a"));
        assert_eq!(labels.get(LABEL_MANAGED_BY).map(String::as_str), Some("suffix"));
        let annotations = p.metadata.annotations.unwrap();
        assert_eq!(annotations.get(ANNOTATION_NAME).map(String::as_str), Some("snap-a"));
        // bookkeeping lists only the tenant keys actually copied
        assert_eq!(annotations.get(ANNOTATION_MANAGED_LABELS).map(String::as_str), Some("team"));
    }

    #[test]
    fn missing_name_is_a_translation_error() {
        let mut v = vobj("x", "ns1", None, None, Json::Null);
        v.metadata.name = None;
        let err = translate_metadata(&cfg(), &v).unwrap_err();
        assert!(matches!(err, SyncError::Translation(_)));
    }

    #[test]
    fn drift_overlays_virtual_keys_and_preserves_physical_ones() {
        let c = cfg();
        let v1 = vobj("snap-a", "ns1", None, Some(map(&[("team", "a")])), Json::Null);
        let mut p = translate_metadata(&c, &v1).unwrap();
        // a physical-side controller adds its own annotation
        p.metadata
            .annotations
            .as_mut()
            .unwrap()
            .insert("managed-by".into(), "physical-ctrl".into());

        // tenant edits team: a -> b
        let v2 = vobj("snap-a", "ns1", None, Some(map(&[("team", "b")])), Json::Null);
        let drift = detect_drift(&c, &v2, &p).unwrap();
        assert!(drift.changed);
        assert_eq!(drift.annotations.get("team").map(String::as_str), Some("b"));
        assert_eq!(drift.annotations.get("managed-by").map(String::as_str), Some("physical-ctrl"));
    }

    #[test]
    fn drift_removes_keys_the_tenant_deleted() {
        let c = cfg();
        let v1 = vobj("snap-a", "ns1", Some(map(&[("tier", "gold")])), Some(map(&[("team", "a")])), Json::Null);
        let p = translate_metadata(&c, &v1).unwrap();

        let v2 = vobj("snap-a", "ns1", None, None, Json::Null);
        let drift = detect_drift(&c, &v2, &p).unwrap();
        assert!(drift.changed);
        assert!(!drift.labels.contains_key("tier"));
        assert!(!drift.annotations.contains_key("team"));
        // marker keys stay
        assert_eq!(drift.labels.get(LABEL_MANAGED_BY).map(String::as_str), Some("suffix"));
    }

    #[test]
    fn identical_pair_reports_no_drift() {
        let c = cfg();
        let v = vobj("snap-a", "ns1", Some(map(&[("team", "a")])), Some(map(&[("note", "x")])), Json::Null);
        let p = translate_metadata(&c, &v).unwrap();
        let drift = detect_drift(&c, &v, &p).unwrap();
        assert!(!drift.changed);
        assert_eq!(drift.labels, p.metadata.labels.unwrap());
        assert_eq!(drift.annotations, p.metadata.annotations.unwrap());
    }
}
