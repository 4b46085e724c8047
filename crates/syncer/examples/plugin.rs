//! Demo host wiring: build clients, register the syncers, run one-time
//! initialization. A real host would then drive watch events into
//! `Syncer::sync_down` / `Syncer::sync`.

use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use vmir_syncer::{
    PxServiceSyncer, RegisterContext, SnapshotDataSyncer, SnapshotSyncer, SyncerRegistry,
};
use vmir_translate::TranslateConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let env = std::env::var("VMIR_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();

    // Both sides resolve to the current kubeconfig in this demo; a real host
    // hands the engine two distinct clients.
    let physical = kube::Client::try_default().await?;
    let virt = physical.clone();
    let ctx = RegisterContext { physical, virt, translate: TranslateConfig::default() };

    let mut registry = SyncerRegistry::new();
    registry.register(Arc::new(PxServiceSyncer))?;
    registry.register(Arc::new(SnapshotSyncer::new(&ctx)))?;
    registry.register(Arc::new(SnapshotDataSyncer::new(&ctx)))?;

    registry.init_all(&ctx).await?;

    for syncer in registry.syncers() {
        info!(syncer = syncer.name(), gvk = %vmir_core::gvk_key(&syncer.gvk()), "ready");
    }
    Ok(())
}
