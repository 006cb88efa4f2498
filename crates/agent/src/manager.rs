//! Per-session itinerary manager.
//!
//! Local state changes first and is then synced to the backend. Stop-state and reorder pushes
//! share one lock so only one of them is in flight; task outcomes are sent concurrently.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use itinerary_core::model::{StopState, Task, TaskOutcome};
use itinerary_core::now_ms;
use itinerary_core::state::{StopTransition, TransitionError};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::backend::{BackendError, DeliveryBackend};
use crate::debounce::Debouncer;
use crate::itinerary::{Itinerary, ItineraryStop};

/// Quiet period before a reorder is sent.
pub const REORDER_QUIET_PERIOD: Duration = Duration::from_millis(2000);

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("backend request failed: {0}")]
    Remote(#[from] BackendError),
    #[error("superseded by a newer reorder request")]
    Superseded,
    #[error("unknown stop {0}")]
    UnknownStop(String),
    #[error("stop {0} still has unresolved tasks")]
    UnresolvedTasks(String),
    #[error("stop {0} is not the first remaining stop on the server")]
    NotFirstRemaining(String),
}

/// `COMPLETED` is only reachable once every task at the stop is resolved.
fn target_state(stop: &ItineraryStop, transition: StopTransition) -> Result<StopState, ManagerError> {
    if transition == StopTransition::Complete && stop.has_unresolved_task() {
        return Err(ManagerError::UnresolvedTasks(stop.stop_id.clone()));
    }
    Ok(stop.state.apply(transition)?)
}

fn first_is(ids: &[String], stop_id: &str) -> bool {
    ids.first().is_some_and(|id| id == stop_id)
}

#[derive(Debug, Clone)]
pub struct ManagerOptions {
    pub reorder_quiet_period: Duration,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            reorder_quiet_period: REORDER_QUIET_PERIOD,
        }
    }
}

pub struct ItineraryManager {
    backend: Arc<dyn DeliveryBackend>,
    client_id: String,
    vehicle_id: String,
    itinerary: Mutex<Itinerary>,
    sync_lock: Mutex<()>,
    reorder: Debouncer,
}

impl ItineraryManager {
    /// Starts a delivery session: gets a vehicle assigned and loads its itinerary.
    pub async fn start(
        backend: Arc<dyn DeliveryBackend>,
        client_id: impl Into<String>,
        vehicle_id: Option<&str>,
        options: ManagerOptions,
    ) -> Result<Self, ManagerError> {
        let client_id = client_id.into();
        let manifest = backend.assign_vehicle(&client_id, vehicle_id).await?;
        let itinerary = Itinerary::from_manifest(&manifest);
        info!(
            client_id = %client_id,
            vehicle_id = %manifest.vehicle_id(),
            stops = itinerary.stops().len(),
            "delivery session started"
        );
        Ok(Self {
            backend,
            client_id,
            vehicle_id: manifest.vehicle_id().to_string(),
            itinerary: Mutex::new(itinerary),
            sync_lock: Mutex::new(()),
            reorder: Debouncer::new(options.reorder_quiet_period),
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn vehicle_id(&self) -> &str {
        &self.vehicle_id
    }

    pub async fn stops(&self) -> Vec<ItineraryStop> {
        self.itinerary.lock().await.stops().to_vec()
    }

    pub async fn active_stop(&self) -> Option<ItineraryStop> {
        self.itinerary.lock().await.active_stop().cloned()
    }

    pub async fn remaining_stop_ids(&self) -> Vec<String> {
        self.itinerary.lock().await.remaining_stop_ids().to_vec()
    }

    pub async fn task(&self, task_id: &str) -> Option<Task> {
        self.itinerary.lock().await.task(task_id).cloned()
    }

    /// Re-reads the manifest from the backend and reconciles the local view with it.
    pub async fn refresh(&self) -> Result<(), ManagerError> {
        let _sync = self.sync_lock.lock().await;
        let manifest = self.backend.fetch_manifest(&self.vehicle_id).await?;
        self.itinerary.lock().await.reconcile(&manifest);
        Ok(())
    }

    /// Applies `transition` to the active stop. Returns the updated stop, or `None` when there
    /// is no active stop.
    ///
    /// NEW, ENROUTE and ARRIVED are pushed to the backend. The server applies a stop state to the
    /// first stop of its remaining list, so if that is not the active stop the remaining list is
    /// synced first. If the state push fails the local state is kept and the error returned.
    pub async fn advance_stop(
        &self,
        transition: StopTransition,
    ) -> Result<Option<ItineraryStop>, ManagerError> {
        self.advance(None, transition).await
    }

    /// Like [`ItineraryManager::advance_stop`], but a no-op unless `stop_id` is the active stop.
    pub async fn advance_stop_at(
        &self,
        stop_id: &str,
        transition: StopTransition,
    ) -> Result<Option<ItineraryStop>, ManagerError> {
        self.advance(Some(stop_id), transition).await
    }

    async fn advance(
        &self,
        expected: Option<&str>,
        transition: StopTransition,
    ) -> Result<Option<ItineraryStop>, ManagerError> {
        let _sync = self.sync_lock.lock().await;

        let (stop_id, target) = {
            let itinerary = self.itinerary.lock().await;
            let Some(index) = itinerary.active_index() else {
                debug!("no active stop");
                return Ok(None);
            };
            let current = &itinerary.stops()[index];
            if expected.is_some_and(|id| id != current.stop_id) {
                debug!(stop_id = ?expected, active = %current.stop_id, "stop is not active");
                return Ok(None);
            }
            (current.stop_id.clone(), target_state(current, transition)?)
        };

        if target.is_pushable() {
            self.align_first_stop(&stop_id).await?;
        }

        let stop = {
            let mut itinerary = self.itinerary.lock().await;
            let index = itinerary
                .position(&stop_id)
                .ok_or_else(|| ManagerError::UnknownStop(stop_id.clone()))?;
            // Aligning may have reconciled the stop's state.
            let target = target_state(&itinerary.stops()[index], transition)?;
            itinerary.set_state(index, target);
            itinerary.stops()[index].clone()
        };
        info!(stop_id = %stop.stop_id, state = %stop.state, "stop state changed");

        if stop.state.is_pushable() {
            let manifest = self
                .backend
                .update_stop_state(&self.vehicle_id, stop.state)
                .await
                .inspect_err(|e| {
                    warn!(stop_id = %stop.stop_id, error = %e, "stop state push failed")
                })?;
            self.itinerary.lock().await.reconcile(&manifest);
        }
        Ok(Some(stop))
    }

    /// Makes `stop_id` the first stop of the server's remaining list by dropping the resolved
    /// stops ahead of it. Caller holds `sync_lock`.
    async fn align_first_stop(&self, stop_id: &str) -> Result<(), ManagerError> {
        let remaining = {
            let itinerary = self.itinerary.lock().await;
            if first_is(itinerary.remaining_stop_ids(), stop_id) {
                return Ok(());
            }
            itinerary.pending_order(itinerary.remaining_stop_ids())
        };
        if !first_is(&remaining, stop_id) {
            return Err(ManagerError::NotFirstRemaining(stop_id.to_string()));
        }

        info!(stop_id, remaining = ?remaining, "syncing remaining stops before stop state push");
        let manifest = self
            .backend
            .update_stop_id_list(&self.vehicle_id, &remaining)
            .await
            .inspect_err(|e| warn!(stop_id, error = %e, "stop list sync failed"))?;

        let mut itinerary = self.itinerary.lock().await;
        itinerary.reconcile(&manifest);
        if !first_is(itinerary.remaining_stop_ids(), stop_id) {
            return Err(ManagerError::NotFirstRemaining(stop_id.to_string()));
        }
        Ok(())
    }

    /// Sends one outcome update per task, concurrently. Each success is committed locally as it
    /// lands; the ids that failed are returned in input order.
    pub async fn record_task_outcomes(&self, task_ids: &[String], succeeded: bool) -> Vec<String> {
        let outcome = if succeeded {
            TaskOutcome::Succeeded
        } else {
            TaskOutcome::Failed
        };

        let mut unique = HashSet::new();
        let mut requests = JoinSet::new();
        {
            let itinerary = self.itinerary.lock().await;
            for task_id in task_ids {
                if !unique.insert(task_id.as_str()) {
                    continue;
                }
                if itinerary.task(task_id).is_none() {
                    warn!(task_id = %task_id, "outcome requested for unknown task");
                    continue;
                }
                let backend = Arc::clone(&self.backend);
                let task_id = task_id.clone();
                requests.spawn(async move {
                    let result = backend.update_task_outcome(&task_id, outcome).await;
                    (task_id, result)
                });
            }
        }

        let mut committed = HashSet::new();
        while let Some(joined) = requests.join_next().await {
            match joined {
                Ok((task_id, Ok(mut task))) => {
                    if task.task_outcome_time_ms.is_none() {
                        task.task_outcome_time_ms = Some(now_ms());
                    }
                    let state = self.itinerary.lock().await.record_outcome(&task);
                    debug!(task_id = %task_id, stop_state = ?state, "task outcome committed");
                    committed.insert(task_id);
                }
                Ok((task_id, Err(e))) => {
                    warn!(task_id = %task_id, error = %e, "task outcome update failed");
                }
                Err(e) => warn!(error = %e, "task outcome request aborted"),
            }
        }

        let mut reported = HashSet::new();
        task_ids
            .iter()
            .filter(|id| !committed.contains(*id) && reported.insert(id.as_str()))
            .cloned()
            .collect()
    }

    /// Debounced reorder. `order` lists stops in the desired visit order; stops left out, or
    /// whose tasks are all resolved, drop out of the remaining list. Only the last call of a
    /// burst reaches the backend, earlier ones return [`ManagerError::Superseded`]. Nothing is
    /// sent when the remaining list is unchanged. On failure the last accepted list stays.
    pub async fn reorder_or_complete_stops(
        &self,
        order: &[String],
    ) -> Result<Vec<String>, ManagerError> {
        {
            let itinerary = self.itinerary.lock().await;
            if let Some(unknown) = order.iter().find(|id| itinerary.position(id).is_none()) {
                return Err(ManagerError::UnknownStop(unknown.clone()));
            }
        }

        if !self.reorder.settle().await {
            debug!("reorder superseded");
            return Err(ManagerError::Superseded);
        }

        let _sync = self.sync_lock.lock().await;
        let remaining = {
            let itinerary = self.itinerary.lock().await;
            let remaining = itinerary.pending_order(order);
            if remaining == itinerary.remaining_stop_ids() {
                debug!("remaining stops unchanged");
                return Ok(remaining);
            }
            remaining
        };

        let manifest = self
            .backend
            .update_stop_id_list(&self.vehicle_id, &remaining)
            .await
            .inspect_err(|e| warn!(error = %e, "stop list push failed; keeping previous order"))?;

        let mut itinerary = self.itinerary.lock().await;
        itinerary.reconcile(&manifest);
        info!(remaining = ?itinerary.remaining_stop_ids(), "remaining stops synced");
        Ok(itinerary.remaining_stop_ids().to_vec())
    }

    /// State of the active stop, if any.
    pub async fn active_state(&self) -> Option<StopState> {
        self.itinerary.lock().await.active_stop().map(|s| s.state)
    }
}
