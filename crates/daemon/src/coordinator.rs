//! Manifest coordinator: validates itinerary updates against the stored manifest, forwards them to
//! the fleet engine and commits only what the fleet engine accepted.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use itinerary_core::api::{
    DeliveryConfig, LoadConfigResponse, ManifestUpdateRequest, TaskUpdateRequest,
    VehicleUpdateRequest,
};
use itinerary_core::model::{Manifest, StopState, Task};
use itinerary_core::validation::{
    check_stop_subset, classify_manifest_update, parse_fleet_stop_state, parse_task_update,
    ManifestUpdate,
};
use itinerary_core::ItineraryError;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use crate::fleet::{journey_for, DeliveryVehicle, FleetEngine, FleetTask};
use crate::store::{ManifestStore, StoredManifest};

type Result<T> = std::result::Result<T, ItineraryError>;

const NO_SUCH_VEHICLE: &str = "The vehicle ID matched no vehicles.";
const NO_SUCH_TASK: &str = "The task ID matched no tasks.";

fn internal(e: anyhow::Error) -> ItineraryError {
    ItineraryError::Internal(format!("{e:#}"))
}

/// Owns every manifest of one provider.
///
/// Each vehicle has its own async lock, held from load through the fleet-engine call to the
/// commit, so updates to one vehicle never interleave. Assignment also takes `assign_lock`
/// (always before a vehicle lock) so that two clients cannot claim the same vehicle.
pub struct ManifestCoordinator {
    store: Arc<dyn ManifestStore>,
    fleet: Arc<dyn FleetEngine>,
    provider_id: String,
    assign_lock: Mutex<()>,
    vehicle_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ManifestCoordinator {
    pub fn new(
        store: Arc<dyn ManifestStore>,
        fleet: Arc<dyn FleetEngine>,
        provider_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            fleet,
            provider_id: provider_id.into(),
            assign_lock: Mutex::new(()),
            vehicle_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_vehicle(&self, vehicle_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.vehicle_locks.lock().await;
            Arc::clone(locks.entry(vehicle_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    async fn load(&self, vehicle_id: &str, missing: &str) -> Result<StoredManifest> {
        self.store
            .get(vehicle_id)
            .await
            .map_err(internal)?
            .ok_or_else(|| ItineraryError::not_found(missing))
    }

    async fn commit(&self, record: &StoredManifest) -> Result<()> {
        self.store.put(record.clone()).await.map_err(internal)
    }

    /// Loads a delivery configuration: creates every vehicle and task in the fleet engine, pushes
    /// the initial journeys and stores the manifests. Nothing is stored unless every fleet call
    /// succeeded; then the manifests of vehicles absent from the new configuration are dropped.
    pub async fn load_config(&self, config: DeliveryConfig) -> Result<LoadConfigResponse> {
        let _assign = self.assign_lock.lock().await;

        let manifests: Vec<Manifest> = config
            .manifests
            .into_iter()
            .map(|m| m.into_manifest(&self.provider_id))
            .collect();

        let existing = self.store.list().await.map_err(internal)?;
        let loaded: HashSet<&str> = existing.iter().map(|r| r.vehicle_id()).collect();
        let mut vehicle_ids = HashSet::new();
        let mut task_ids = HashSet::new();
        for manifest in &manifests {
            manifest.validate()?;
            let vehicle_id = manifest.vehicle_id();
            if !vehicle_ids.insert(vehicle_id) {
                return Err(ItineraryError::invalid(format!(
                    "vehicle {vehicle_id} is configured twice"
                )));
            }
            if loaded.contains(vehicle_id) {
                return Err(ItineraryError::invalid(format!(
                    "vehicle {vehicle_id} is already loaded"
                )));
            }
            for task in &manifest.tasks {
                if !task_ids.insert(task.task_id.as_str()) {
                    return Err(ItineraryError::invalid(format!(
                        "task {} is configured for more than one vehicle",
                        task.task_id
                    )));
                }
            }
        }

        // Every fleet call runs before anything is committed, so a failure leaves the store as
        // it was. Resources a failed upload already created are reused on retry.
        let mut records = Vec::with_capacity(manifests.len());
        for mut manifest in manifests {
            let vehicle = self.register(&manifest).await?;
            manifest.current_stop_state = vehicle.current_stop_state().unwrap_or_default();
            records.push(StoredManifest { manifest, vehicle });
        }

        let mut response = LoadConfigResponse {
            vehicle_ids: Vec::with_capacity(records.len()),
        };
        for record in records {
            let vehicle_id = record.vehicle_id().to_string();
            let _guard = self.lock_vehicle(&vehicle_id).await;
            self.commit(&record).await?;
            info!(
                vehicle_id = %vehicle_id,
                stops = record.manifest.remaining_stop_id_list.len(),
                tasks = record.manifest.tasks.len(),
                "manifest loaded"
            );
            response.vehicle_ids.push(vehicle_id);
        }

        for stale in existing {
            let _guard = self.lock_vehicle(stale.vehicle_id()).await;
            info!(vehicle_id = %stale.vehicle_id(), "dropping manifest absent from configuration");
            self.store
                .delete(stale.vehicle_id())
                .await
                .map_err(internal)?;
        }
        Ok(response)
    }

    /// Creates the vehicle and its tasks in the fleet engine and pushes the initial journey.
    async fn register(&self, manifest: &Manifest) -> Result<DeliveryVehicle> {
        let vehicle_id = manifest.vehicle_id();
        let local = DeliveryVehicle::for_vehicle(&self.provider_id, &manifest.vehicle);
        let mut vehicle = match self.fleet.create_vehicle(vehicle_id, local.clone()).await {
            Ok(vehicle) => vehicle,
            Err(e) if e.is_conflict() => {
                info!(vehicle_id, "vehicle already exists in the fleet engine; reusing it");
                local
            }
            Err(e) => {
                warn!(vehicle_id, error = %e, "vehicle creation failed");
                return Err(e.into());
            }
        };

        for task in &manifest.tasks {
            let fleet_task = FleetTask::for_task(&self.provider_id, task);
            match self.fleet.create_task(&task.task_id, fleet_task).await {
                Ok(_) => {}
                Err(e) if e.is_conflict() => {
                    info!(task_id = %task.task_id, "task already exists in the fleet engine; reusing it")
                }
                Err(e) => {
                    warn!(task_id = %task.task_id, error = %e, "task creation failed");
                    return Err(e.into());
                }
            }
        }

        let journey = journey_for(manifest);
        if !journey.is_empty() {
            vehicle.remaining_vehicle_journey_segments = journey;
            vehicle = self.fleet.update_vehicle_journey(vehicle).await?;
        }
        Ok(vehicle)
    }

    /// Current manifest of a vehicle.
    pub async fn manifest(&self, vehicle_id: &str) -> Result<Manifest> {
        Ok(self
            .load(vehicle_id, "The requested manifest doesn't exist.")
            .await?
            .manifest)
    }

    async fn find_task_owner(&self, task_id: &str) -> Result<StoredManifest> {
        self.store
            .list()
            .await
            .map_err(internal)?
            .into_iter()
            .find(|r| r.manifest.task(task_id).is_some())
            .ok_or_else(|| ItineraryError::not_found(NO_SUCH_TASK))
    }

    /// A task as recorded in its vehicle's manifest.
    pub async fn task(&self, task_id: &str) -> Result<Task> {
        let record = self.find_task_owner(task_id).await?;
        record
            .manifest
            .task(task_id)
            .cloned()
            .ok_or_else(|| ItineraryError::not_found(NO_SUCH_TASK))
    }

    /// Tasks on the vehicle's remaining journey, in journey order.
    pub async fn vehicle_tasks(&self, vehicle_id: &str) -> Result<Vec<Task>> {
        let record = self
            .load(vehicle_id, "The requested vehicle doesn't exist.")
            .await?;
        Ok(record
            .vehicle
            .remaining_vehicle_journey_segments
            .iter()
            .flat_map(|segment| &segment.stop.tasks)
            .filter_map(|info| record.manifest.task(&info.task_id))
            .cloned()
            .collect())
    }

    /// Looks a task up by the tracking id shared with the consumer.
    pub async fn task_by_tracking_id(&self, tracking_id: &str) -> Result<Task> {
        self.store
            .list()
            .await
            .map_err(internal)?
            .into_iter()
            .flat_map(|r| r.manifest.tasks)
            .find(|t| t.tracking_id.as_deref() == Some(tracking_id))
            .ok_or_else(|| ItineraryError::not_found("The task with the tracking ID cannot be found."))
    }

    /// The vehicle as last returned by the fleet engine.
    pub async fn delivery_vehicle(&self, vehicle_id: &str) -> Result<DeliveryVehicle> {
        Ok(self
            .load(vehicle_id, "The requested vehicle doesn't exist.")
            .await?
            .vehicle)
    }

    /// Sets the state of the vehicle's first journey segment and returns the updated vehicle.
    pub async fn update_vehicle_stop_state(
        &self,
        vehicle_id: &str,
        req: &VehicleUpdateRequest,
    ) -> Result<DeliveryVehicle> {
        let _guard = self.lock_vehicle(vehicle_id).await;
        let record = self.load(vehicle_id, NO_SUCH_VEHICLE).await?;
        let name = req
            .stop_state
            .as_deref()
            .ok_or_else(|| ItineraryError::invalid("No stop state was specified."))?;
        let state = parse_fleet_stop_state(name)?;
        Ok(self.push_stop_state(record, state).await?.vehicle)
    }

    /// Handles a manifest-update body. Assignment is exclusive with every other update; a stop
    /// list update is applied before a stop state update and both run under one vehicle lock.
    pub async fn apply_update(
        &self,
        vehicle_id: Option<&str>,
        req: &ManifestUpdateRequest,
    ) -> Result<Manifest> {
        let vehicle_id = vehicle_id.filter(|v| !v.is_empty());
        match classify_manifest_update(req)? {
            ManifestUpdate::Assign { client_id } => {
                self.assign_vehicle(&client_id, vehicle_id).await
            }
            ManifestUpdate::Modify {
                stop_ids,
                stop_state,
            } => {
                let vehicle_id =
                    vehicle_id.ok_or_else(|| ItineraryError::not_found(NO_SUCH_VEHICLE))?;
                let _guard = self.lock_vehicle(vehicle_id).await;
                let mut record = self.load(vehicle_id, NO_SUCH_VEHICLE).await?;
                if let Some(ids) = stop_ids {
                    record = self.push_stop_list(record, &ids).await?;
                }
                if let Some(state) = stop_state {
                    record = self.push_stop_state(record, state).await?;
                }
                Ok(record.manifest)
            }
        }
    }

    /// Binds `client_id` to a vehicle: its existing one, the requested one if free, or any free
    /// vehicle when none is requested.
    pub async fn assign_vehicle(
        &self,
        client_id: &str,
        requested: Option<&str>,
    ) -> Result<Manifest> {
        if client_id.is_empty() {
            return Err(ItineraryError::invalid("The client ID is invalid."));
        }
        let requested = requested.filter(|v| !v.is_empty());
        let _assign = self.assign_lock.lock().await;

        let records = self.store.list().await.map_err(internal)?;
        let existing = records
            .iter()
            .find(|r| r.manifest.client_id.as_deref() == Some(client_id));

        let vehicle_id = match (existing, requested) {
            (Some(current), Some(req)) if current.vehicle_id() != req => {
                warn!(client_id, assigned = %current.vehicle_id(), requested = req, "client re-requested another vehicle");
                return Err(ItineraryError::forbidden(
                    "You cannot request different vehicles.",
                ));
            }
            (Some(current), _) => current.vehicle_id().to_string(),
            (None, None) => records
                .iter()
                .find(|r| r.manifest.client_id.is_none())
                .map(|r| r.vehicle_id().to_string())
                .ok_or_else(|| {
                    ItineraryError::not_found("There are no available vehicles for assignment.")
                })?,
            (None, Some(req)) => {
                let record = records
                    .iter()
                    .find(|r| r.vehicle_id() == req)
                    .ok_or_else(|| {
                        ItineraryError::not_found("The requested vehicle doesn't exist.")
                    })?;
                if record.manifest.client_id.is_some() {
                    return Err(ItineraryError::forbidden(
                        "The requested vehicle is currently assigned.",
                    ));
                }
                req.to_string()
            }
        };

        let _guard = self.lock_vehicle(&vehicle_id).await;
        let mut record = self
            .load(&vehicle_id, "The requested vehicle doesn't exist.")
            .await?;
        if record.manifest.client_id.as_deref() != Some(client_id) {
            record.manifest.client_id = Some(client_id.to_string());
            self.commit(&record).await?;
            info!(client_id, vehicle_id = %vehicle_id, "vehicle assigned");
        }
        Ok(record.manifest)
    }

    /// Replaces the remaining stops with `stop_ids`, which must be a subset of the current list.
    pub async fn update_remaining_stops(
        &self,
        vehicle_id: &str,
        stop_ids: &[String],
    ) -> Result<Manifest> {
        let _guard = self.lock_vehicle(vehicle_id).await;
        let record = self.load(vehicle_id, NO_SUCH_VEHICLE).await?;
        Ok(self.push_stop_list(record, stop_ids).await?.manifest)
    }

    /// Sets the state of the first remaining stop.
    pub async fn update_stop_state(&self, vehicle_id: &str, state_name: &str) -> Result<Manifest> {
        let state = parse_fleet_stop_state(state_name)?;
        let _guard = self.lock_vehicle(vehicle_id).await;
        let record = self.load(vehicle_id, NO_SUCH_VEHICLE).await?;
        Ok(self.push_stop_state(record, state).await?.manifest)
    }

    async fn push_stop_list(
        &self,
        mut record: StoredManifest,
        stop_ids: &[String],
    ) -> Result<StoredManifest> {
        let vehicle_id = record.vehicle_id().to_string();
        let positions = check_stop_subset(&record.manifest.remaining_stop_id_list, stop_ids)?;

        let segments = &record.vehicle.remaining_vehicle_journey_segments;
        let mut journey = Vec::with_capacity(positions.len());
        for (i, pos) in positions.into_iter().enumerate() {
            let mut segment = segments.get(pos).cloned().ok_or_else(|| {
                ItineraryError::Internal(format!(
                    "journey of vehicle {vehicle_id} is out of sync with its remaining stops"
                ))
            })?;
            // Only the first stop may be in progress.
            if i > 0 {
                segment.stop.state = StopState::New;
            }
            journey.push(segment);
        }

        let mut vehicle = record.vehicle.clone();
        vehicle.remaining_vehicle_journey_segments = journey;
        let vehicle = self
            .fleet
            .update_vehicle_journey(vehicle)
            .await
            .inspect_err(|e| warn!(vehicle_id = %vehicle_id, error = %e, "stop list update rejected by fleet engine"))?;

        record.manifest.remaining_stop_id_list = stop_ids.to_vec();
        record.manifest.current_stop_state = vehicle.current_stop_state().unwrap_or_default();
        record.vehicle = vehicle;
        self.commit(&record).await?;
        info!(vehicle_id = %vehicle_id, remaining = ?stop_ids, "remaining stops updated");
        Ok(record)
    }

    async fn push_stop_state(
        &self,
        mut record: StoredManifest,
        state: StopState,
    ) -> Result<StoredManifest> {
        let vehicle_id = record.vehicle_id().to_string();
        let mut vehicle = record.vehicle.clone();
        let first = vehicle
            .remaining_vehicle_journey_segments
            .first_mut()
            .ok_or_else(|| ItineraryError::not_found("The vehicle has no remaining stops."))?;
        first.stop.state = state;

        let vehicle = self
            .fleet
            .update_vehicle_journey(vehicle)
            .await
            .inspect_err(|e| warn!(vehicle_id = %vehicle_id, error = %e, "stop state update rejected by fleet engine"))?;

        record.manifest.current_stop_state = state;
        record.vehicle = vehicle;
        self.commit(&record).await?;
        info!(vehicle_id = %vehicle_id, state = %state, "stop state updated");
        Ok(record)
    }

    /// Records a task outcome. Outcomes are one-way: a task that already has one is rejected.
    /// A resolved task is removed from its stop's task list.
    pub async fn update_task_outcome(
        &self,
        task_id: &str,
        req: &TaskUpdateRequest,
    ) -> Result<Task> {
        let owner = self.find_task_owner(task_id).await?;
        let outcome = parse_task_update(req)?;

        let vehicle_id = owner.vehicle_id().to_string();
        let _guard = self.lock_vehicle(&vehicle_id).await;
        let mut record = self.load(&vehicle_id, NO_SUCH_TASK).await?;
        let task = record
            .manifest
            .task(task_id)
            .ok_or_else(|| ItineraryError::not_found(NO_SUCH_TASK))?;
        if task.task_outcome.is_resolved() {
            return Err(ItineraryError::invalid(format!(
                "Task {task_id} already has outcome {}.",
                task.task_outcome
            )));
        }

        let mut fleet_task = FleetTask::for_task(&self.provider_id, task);
        fleet_task.task_outcome = outcome;
        fleet_task.task_outcome_time = outcome.is_resolved().then(Utc::now);
        let updated = self
            .fleet
            .update_task_outcome(fleet_task)
            .await
            .inspect_err(|e| warn!(task_id, error = %e, "task outcome rejected by fleet engine"))?;

        let task = record
            .manifest
            .task_mut(task_id)
            .ok_or_else(|| ItineraryError::not_found(NO_SUCH_TASK))?;
        task.task_outcome = updated.task_outcome;
        task.task_outcome_time_ms = updated.outcome_time_ms();
        let task = task.clone();
        if task.task_outcome.is_resolved() {
            record.manifest.close_task(task_id);
        }
        self.commit(&record).await?;
        info!(task_id, vehicle_id = %vehicle_id, outcome = %task.task_outcome, "task outcome recorded");
        Ok(task)
    }
}
