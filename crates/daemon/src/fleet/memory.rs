use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{resource_id, DeliveryVehicle, FleetEngine, FleetError, FleetTask, FleetTaskState};

/// Fleet engine kept in process memory. Used when no fleet-engine URL is configured, and as the
/// test double: failures can be injected and calls are counted.
#[derive(Default)]
pub struct InMemoryFleetEngine {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    vehicles: HashMap<String, DeliveryVehicle>,
    tasks: HashMap<String, FleetTask>,
    fail_next: u32,
    fail_skip: u32,
    calls: FleetCalls,
}

/// Number of calls made per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FleetCalls {
    pub create_vehicle: u32,
    pub create_task: u32,
    pub update_vehicle_journey: u32,
    pub update_task_outcome: u32,
}

impl InMemoryFleetEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` calls fail with [`FleetError::Unavailable`].
    pub async fn fail_next(&self, n: u32) {
        self.fail_after(0, n).await;
    }

    /// Lets `skip` calls through, then fails the following `n`.
    pub async fn fail_after(&self, skip: u32, n: u32) {
        let mut inner = self.inner.lock().await;
        inner.fail_skip = skip;
        inner.fail_next = n;
    }

    pub async fn calls(&self) -> FleetCalls {
        self.inner.lock().await.calls
    }

    pub async fn vehicle(&self, vehicle_id: &str) -> Option<DeliveryVehicle> {
        self.inner.lock().await.vehicles.get(vehicle_id).cloned()
    }

    pub async fn task(&self, task_id: &str) -> Option<FleetTask> {
        self.inner.lock().await.tasks.get(task_id).cloned()
    }
}

impl Inner {
    fn check_available(&mut self) -> Result<(), FleetError> {
        if self.fail_next == 0 {
            return Ok(());
        }
        if self.fail_skip > 0 {
            self.fail_skip -= 1;
        } else {
            self.fail_next -= 1;
            return Err(FleetError::Unavailable("injected failure".into()));
        }
        Ok(())
    }
}

fn not_found(name: &str) -> FleetError {
    FleetError::Status {
        status: 404,
        message: format!("{name} not found"),
    }
}

#[async_trait]
impl FleetEngine for InMemoryFleetEngine {
    async fn create_vehicle(
        &self,
        vehicle_id: &str,
        vehicle: DeliveryVehicle,
    ) -> Result<DeliveryVehicle, FleetError> {
        let mut inner = self.inner.lock().await;
        inner.calls.create_vehicle += 1;
        inner.check_available()?;
        if inner.vehicles.contains_key(vehicle_id) {
            return Err(FleetError::Status {
                status: 409,
                message: format!("vehicle {vehicle_id} already exists"),
            });
        }
        inner.vehicles.insert(vehicle_id.to_string(), vehicle.clone());
        Ok(vehicle)
    }

    async fn create_task(&self, task_id: &str, task: FleetTask) -> Result<FleetTask, FleetError> {
        let mut inner = self.inner.lock().await;
        inner.calls.create_task += 1;
        inner.check_available()?;
        if inner.tasks.contains_key(task_id) {
            return Err(FleetError::Status {
                status: 409,
                message: format!("task {task_id} already exists"),
            });
        }
        inner.tasks.insert(task_id.to_string(), task.clone());
        Ok(task)
    }

    async fn update_vehicle_journey(
        &self,
        vehicle: DeliveryVehicle,
    ) -> Result<DeliveryVehicle, FleetError> {
        let mut inner = self.inner.lock().await;
        inner.calls.update_vehicle_journey += 1;
        inner.check_available()?;
        let stored = inner
            .vehicles
            .get_mut(resource_id(&vehicle.name))
            .ok_or_else(|| not_found(&vehicle.name))?;
        stored.remaining_vehicle_journey_segments = vehicle.remaining_vehicle_journey_segments;
        Ok(stored.clone())
    }

    async fn update_task_outcome(&self, task: FleetTask) -> Result<FleetTask, FleetError> {
        let mut inner = self.inner.lock().await;
        inner.calls.update_task_outcome += 1;
        inner.check_available()?;
        let stored = inner
            .tasks
            .get_mut(task.task_id())
            .ok_or_else(|| not_found(&task.name))?;
        stored.task_outcome = task.task_outcome;
        stored.task_outcome_time = task.task_outcome_time;
        if task.task_outcome.is_resolved() {
            stored.state = FleetTaskState::Closed;
        }
        Ok(stored.clone())
    }
}
