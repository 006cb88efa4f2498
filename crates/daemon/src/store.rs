//! Manifest persistence keyed by vehicle id. Last write wins; the coordinator serializes writers.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use itinerary_core::model::Manifest;
use serde::{Deserialize, Serialize};
use surrealdb::engine::local::{Db, SurrealKv};
use surrealdb::Surreal;
use tokio::sync::RwLock;

use crate::fleet::DeliveryVehicle;

const TABLE: &str = "manifest";

/// A manifest together with the fleet engine's last returned vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredManifest {
    pub manifest: Manifest,
    pub vehicle: DeliveryVehicle,
}

impl StoredManifest {
    pub fn vehicle_id(&self) -> &str {
        self.manifest.vehicle_id()
    }
}

#[async_trait]
pub trait ManifestStore: Send + Sync {
    async fn get(&self, vehicle_id: &str) -> Result<Option<StoredManifest>>;
    async fn put(&self, record: StoredManifest) -> Result<()>;
    async fn delete(&self, vehicle_id: &str) -> Result<()>;
    /// All records, ordered by vehicle id.
    async fn list(&self) -> Result<Vec<StoredManifest>>;
}

/// Non-durable store; the default when no database directory is configured.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<String, StoredManifest>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ManifestStore for MemoryStore {
    async fn get(&self, vehicle_id: &str) -> Result<Option<StoredManifest>> {
        Ok(self.records.read().await.get(vehicle_id).cloned())
    }

    async fn put(&self, record: StoredManifest) -> Result<()> {
        self.records
            .write()
            .await
            .insert(record.vehicle_id().to_string(), record);
        Ok(())
    }

    async fn delete(&self, vehicle_id: &str) -> Result<()> {
        self.records.write().await.remove(vehicle_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<StoredManifest>> {
        Ok(self.records.read().await.values().cloned().collect())
    }
}

/// Embedded SurrealDB on the SurrealKV engine.
#[derive(Clone)]
pub struct SurrealStore {
    inner: Surreal<Db>,
}

impl SurrealStore {
    pub async fn connect(db_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(db_dir)
            .with_context(|| format!("creating db_dir {}", db_dir.display()))?;
        let db_path = db_dir
            .to_str()
            .context("db_dir must be valid utf-8")?
            .to_string();

        let inner = Surreal::new::<SurrealKv>(db_path)
            .await
            .context("connecting to embedded SurrealKV")?;
        inner
            .use_ns("itinerary")
            .use_db("main")
            .await
            .context("selecting surreal namespace/db")?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl ManifestStore for SurrealStore {
    async fn get(&self, vehicle_id: &str) -> Result<Option<StoredManifest>> {
        let record: Option<StoredManifest> = self
            .inner
            .select((TABLE, vehicle_id))
            .await
            .with_context(|| format!("loading manifest {vehicle_id}"))?;
        Ok(record)
    }

    async fn put(&self, record: StoredManifest) -> Result<()> {
        let id = record.vehicle_id().to_string();
        let _: Option<StoredManifest> = self
            .inner
            .upsert((TABLE, id.as_str()))
            .content(record)
            .await
            .with_context(|| format!("storing manifest {id}"))?;
        Ok(())
    }

    async fn delete(&self, vehicle_id: &str) -> Result<()> {
        let _: Option<StoredManifest> = self
            .inner
            .delete((TABLE, vehicle_id))
            .await
            .with_context(|| format!("deleting manifest {vehicle_id}"))?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<StoredManifest>> {
        let mut records: Vec<StoredManifest> = self
            .inner
            .select(TABLE)
            .await
            .context("listing manifests")?;
        records.sort_by(|a, b| a.vehicle_id().cmp(b.vehicle_id()));
        Ok(records)
    }
}
