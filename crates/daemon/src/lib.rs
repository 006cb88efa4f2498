#![forbid(unsafe_code)]

//! Itinerary daemon: keeps each vehicle's manifest and mirrors every accepted change into the
//! fleet engine.

pub mod auth;
pub mod config;
pub mod coordinator;
pub mod fleet;
pub mod http;
pub mod store;

use std::sync::Arc;

use anyhow::Context;
use itinerary_core::api::DeliveryConfig;
use tracing::{info, warn};

use crate::auth::{NoToken, StaticToken, TokenProvider};
use crate::config::DaemonConfig;
use crate::coordinator::ManifestCoordinator;
use crate::fleet::{FleetEngine, HttpFleetEngine, InMemoryFleetEngine};
use crate::store::{ManifestStore, MemoryStore, SurrealStore};

/// Wires the store and fleet engine selected by `config` into a coordinator, and loads the
/// start-up delivery configuration if one is given.
pub async fn build_coordinator(config: &DaemonConfig) -> anyhow::Result<Arc<ManifestCoordinator>> {
    let store: Arc<dyn ManifestStore> = match &config.db_dir {
        Some(dir) => Arc::new(SurrealStore::connect(dir).await?),
        None => Arc::new(MemoryStore::new()),
    };

    let fleet: Arc<dyn FleetEngine> = match &config.fleet_engine_url {
        Some(url) => {
            let tokens: Arc<dyn TokenProvider> = match &config.fleet_token {
                Some(token) => Arc::new(StaticToken::new(token.clone())),
                None => Arc::new(NoToken),
            };
            Arc::new(HttpFleetEngine::new(
                url.clone(),
                config.provider_id.clone(),
                tokens,
                config.request_timeout,
            )?)
        }
        None => {
            warn!("no fleet engine url configured; using the in-memory fleet engine");
            Arc::new(InMemoryFleetEngine::new())
        }
    };

    let coordinator = Arc::new(ManifestCoordinator::new(
        store,
        fleet,
        config.provider_id.clone(),
    ));

    if let Some(path) = &config.config_file {
        let raw = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let delivery: DeliveryConfig = serde_json::from_slice(&raw)
            .with_context(|| format!("parsing {}", path.display()))?;
        let loaded = coordinator.load_config(delivery).await?;
        info!(vehicles = ?loaded.vehicle_ids, "loaded delivery configuration");
    }
    Ok(coordinator)
}
