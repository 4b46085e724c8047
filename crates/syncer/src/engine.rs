//! Generic per-kind reconciliation: classify a (virtual, physical) pair,
//! stage the minimal update, and issue at most one physical-side write.

use kube::{
    api::{Api, PostParams},
    core::{ApiResource, DynamicObject, GroupVersionKind},
};
use metrics::{counter, histogram};
use serde_json::Value as Json;
use tracing::{debug, info, warn};
use vmir_core::{SyncError, SyncOutcome, SyncResult};
use vmir_translate::{detect_drift, translate_metadata, TranslateConfig};

use crate::SyncContext;

/// Per-kind rules the engine is parameterized over: identity plus spec
/// equality. The default equality is deep JSON comparison, which is
/// recursive field-by-field; server-managed metadata never participates
/// because only `spec` is compared.
pub trait KindStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn gvk(&self) -> GroupVersionKind;

    fn plural(&self) -> &'static str;

    fn specs_equal(&self, virtual_spec: &Json, physical_spec: &Json) -> bool {
        virtual_spec == physical_spec
    }
}

/// Classification of one observed pair.
#[derive(Debug)]
pub enum Pair<'a> {
    VirtualOnly(&'a DynamicObject),
    BothExist { virtual_obj: &'a DynamicObject, physical_obj: &'a DynamicObject },
    PhysicalOnly(&'a DynamicObject),
}

impl<'a> Pair<'a> {
    /// None when neither side exists (nothing to reconcile).
    pub fn classify(
        vobj: Option<&'a DynamicObject>,
        pobj: Option<&'a DynamicObject>,
    ) -> Option<Pair<'a>> {
        match (vobj, pobj) {
            (Some(v), None) => Some(Pair::VirtualOnly(v)),
            (Some(v), Some(p)) => Some(Pair::BothExist { virtual_obj: v, physical_obj: p }),
            (None, Some(p)) => Some(Pair::PhysicalOnly(p)),
            (None, None) => None,
        }
    }
}

/// Action a pass resolves to. At most one write per pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SyncDownCreate,
    SyncDownUpdate,
    NoOp,
    /// Physical counterpart outlived its virtual owner; deletion is the
    /// hosting framework's garbage collector's job.
    SyncDownDelete,
}

/// Reconciliation engine for one namespaced kind. Stateless across calls:
/// every pass works only on the objects the host hands it.
pub struct NamespacedEngine<S: KindStrategy> {
    strategy: S,
    cfg: TranslateConfig,
}

impl<S: KindStrategy> NamespacedEngine<S> {
    pub fn new(strategy: S, cfg: TranslateConfig) -> Self {
        Self { strategy, cfg }
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    fn api_resource(&self) -> ApiResource {
        ApiResource::from_gvk_with_plural(&self.strategy.gvk(), self.strategy.plural())
    }

    fn physical_api(&self, ctx: &SyncContext) -> Api<DynamicObject> {
        Api::namespaced_with(ctx.physical.clone(), &self.cfg.target_namespace, &self.api_resource())
    }

    /// Physical object graph for a virtual object (identity translated,
    /// spec copied, status absent).
    pub fn translate(&self, vobj: &DynamicObject) -> SyncResult<DynamicObject> {
        translate_metadata(&self.cfg, vobj)
    }

    /// Resolve a pair to its action without touching either API server.
    pub fn plan(&self, pair: &Pair<'_>) -> SyncResult<Action> {
        match pair {
            Pair::VirtualOnly(_) => Ok(Action::SyncDownCreate),
            Pair::BothExist { virtual_obj, physical_obj } => {
                match self.stage_update(physical_obj, virtual_obj)? {
                    Some(_) => Ok(Action::SyncDownUpdate),
                    None => Ok(Action::NoOp),
                }
            }
            Pair::PhysicalOnly(_) => Ok(Action::SyncDownDelete),
        }
    }

    /// Stage the update for a BothExist pair, or None when nothing drifted.
    ///
    /// The staged object is always a full copy of the current physical
    /// object with only metadata and spec overwritten: status, finalizers
    /// and resourceVersion ride along untouched, so fields owned by the
    /// physical side are never clobbered and the API server can detect
    /// concurrent modification on write. Metadata drift is evaluated before
    /// the spec compare; both fold into the single staged write.
    pub fn stage_update(
        &self,
        pobj: &DynamicObject,
        vobj: &DynamicObject,
    ) -> SyncResult<Option<DynamicObject>> {
        let mut updated: Option<DynamicObject> = None;

        let drift = detect_drift(&self.cfg, vobj, pobj)?;
        if drift.changed {
            let u = updated.get_or_insert_with(|| pobj.clone());
            u.metadata.labels = Some(drift.labels);
            u.metadata.annotations = Some(drift.annotations);
        }

        let null = Json::Null;
        let vspec = vobj.data.get("spec").unwrap_or(&null);
        let pspec = pobj.data.get("spec").unwrap_or(&null);
        if !self.strategy.specs_equal(vspec, pspec) {
            let u = updated.get_or_insert_with(|| pobj.clone());
            let map = u.data.as_object_mut().ok_or_else(|| {
                SyncError::Translation(format!(
                    "physical {} has a non-object body",
                    self.strategy.name()
                ))
            })?;
            map.insert("spec".into(), vspec.clone());
        }

        Ok(updated)
    }

    /// Drive one pass for an already-classified pair.
    pub async fn reconcile(&self, ctx: &SyncContext, pair: Pair<'_>) -> SyncResult<SyncOutcome> {
        match pair {
            Pair::VirtualOnly(v) => self.sync_down_create(ctx, v).await,
            Pair::BothExist { virtual_obj, physical_obj } => {
                self.sync_down_update(ctx, physical_obj, virtual_obj).await
            }
            Pair::PhysicalOnly(p) => {
                debug!(
                    kind = self.strategy.name(),
                    name = p.metadata.name.as_deref().unwrap_or(""),
                    "virtual owner gone; delete delegated to host garbage collection"
                );
                Ok(SyncOutcome::done())
            }
        }
    }

    /// VirtualOnly: create the translated counterpart. Status is left for
    /// the physical-side controller and observed on a later pass.
    pub async fn sync_down_create(
        &self,
        ctx: &SyncContext,
        vobj: &DynamicObject,
    ) -> SyncResult<SyncOutcome> {
        counter!("sync_passes", 1u64);
        let pobj = self.translate(vobj)?;
        let name = pobj.metadata.name.clone().unwrap_or_default();

        let t0 = std::time::Instant::now();
        let api = self.physical_api(ctx);
        match api.create(&PostParams::default(), &pobj).await {
            Ok(_) => {
                histogram!("sync_write_latency_ms", t0.elapsed().as_secs_f64() * 1000.0);
                counter!("sync_creates", 1u64);
                info!(kind = self.strategy.name(), name = %name, "created physical object");
                Ok(SyncOutcome::done())
            }
            // Conflict covers AlreadyExists: the counterpart appeared since
            // classification. Retryable; the next pass sees BothExist.
            Err(e) => Err(SyncError::classify(e)),
        }
    }

    /// BothExist: stage metadata + spec drift into one replace, or no-op.
    pub async fn sync_down_update(
        &self,
        ctx: &SyncContext,
        pobj: &DynamicObject,
        vobj: &DynamicObject,
    ) -> SyncResult<SyncOutcome> {
        counter!("sync_passes", 1u64);
        let updated = match self.stage_update(pobj, vobj)? {
            Some(u) => u,
            None => {
                counter!("sync_noops", 1u64);
                debug!(
                    kind = self.strategy.name(),
                    name = pobj.metadata.name.as_deref().unwrap_or(""),
                    "no drift; zero writes"
                );
                return Ok(SyncOutcome::done());
            }
        };

        let name = updated
            .metadata
            .name
            .clone()
            .ok_or_else(|| SyncError::Internal("physical object has no metadata.name".into()))?;

        let t0 = std::time::Instant::now();
        let api = self.physical_api(ctx);
        match api.replace(&name, &PostParams::default(), &updated).await {
            Ok(_) => {
                histogram!("sync_write_latency_ms", t0.elapsed().as_secs_f64() * 1000.0);
                counter!("sync_updates", 1u64);
                info!(kind = self.strategy.name(), name = %name, "updated physical object");
                Ok(SyncOutcome::done())
            }
            Err(e) => match SyncError::classify(e) {
                SyncError::NotFound(msg) => {
                    // Counterpart vanished between read and write: a state
                    // transition, not a failure. Reclassified next pass.
                    warn!(kind = self.strategy.name(), name = %name, error = %msg, "physical object vanished mid-pass; requeue");
                    Ok(SyncOutcome::requeue())
                }
                other => Err(other),
            },
        }
    }
}
