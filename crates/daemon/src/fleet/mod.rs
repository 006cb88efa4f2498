//! Fleet engine seam: the external system of record for delivery vehicles and tasks.
//!
//! Resource shapes follow the fleet engine's REST surface (camelCase JSON, resource names of the
//! form `providers/{provider}/deliveryVehicles/{id}`).

pub mod http;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use itinerary_core::model::{Manifest, StopState, Task, TaskOutcome, TaskType, Vehicle, Waypoint};
use itinerary_core::ItineraryError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use http::HttpFleetEngine;
pub use memory::InMemoryFleetEngine;

/// Failure talking to the fleet engine.
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("fleet engine returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("could not obtain an access token: {0}")]
    Auth(String),
    #[error("fleet engine unavailable: {0}")]
    Unavailable(String),
}

impl FleetError {
    /// The resource already exists remotely.
    pub fn is_conflict(&self) -> bool {
        matches!(self, FleetError::Status { status: 409, .. })
    }
}

impl From<FleetError> for ItineraryError {
    fn from(e: FleetError) -> Self {
        ItineraryError::RemoteFailure(e.to_string())
    }
}

/// Operations the coordinator needs from the fleet engine. Every call returns the authoritative
/// resource as stored remotely.
#[async_trait]
pub trait FleetEngine: Send + Sync {
    async fn create_vehicle(
        &self,
        vehicle_id: &str,
        vehicle: DeliveryVehicle,
    ) -> Result<DeliveryVehicle, FleetError>;

    async fn create_task(&self, task_id: &str, task: FleetTask) -> Result<FleetTask, FleetError>;

    /// Replaces the vehicle's remaining journey segments.
    async fn update_vehicle_journey(
        &self,
        vehicle: DeliveryVehicle,
    ) -> Result<DeliveryVehicle, FleetError>;

    /// Sets the task's outcome and outcome time.
    async fn update_task_outcome(&self, task: FleetTask) -> Result<FleetTask, FleetError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationInfo {
    pub point: LatLng,
}

impl From<&Waypoint> for LocationInfo {
    fn from(w: &Waypoint) -> Self {
        LocationInfo {
            point: LatLng {
                latitude: w.lat,
                longitude: w.lng,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_duration: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleStop {
    pub planned_location: LocationInfo,
    #[serde(default)]
    pub tasks: Vec<TaskInfo>,
    #[serde(default)]
    pub state: StopState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleJourneySegment {
    pub stop: VehicleStop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryVehicle {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_location: Option<LatLng>,
    #[serde(default)]
    pub remaining_vehicle_journey_segments: Vec<VehicleJourneySegment>,
}

impl DeliveryVehicle {
    pub fn for_vehicle(provider_id: &str, vehicle: &Vehicle) -> Self {
        DeliveryVehicle {
            name: vehicle_name(provider_id, &vehicle.vehicle_id),
            last_location: vehicle.start_location.as_ref().map(|w| LocationInfo::from(w).point),
            remaining_vehicle_journey_segments: Vec::new(),
        }
    }

    /// State of the first remaining segment.
    pub fn current_stop_state(&self) -> Option<StopState> {
        self.remaining_vehicle_journey_segments
            .first()
            .map(|s| s.stop.state)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FleetTaskState {
    #[default]
    #[serde(rename = "STATE_UNSPECIFIED")]
    Unspecified,
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetTask {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    #[serde(default)]
    pub state: FleetTaskState,
    #[serde(default)]
    pub task_outcome: TaskOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_outcome_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planned_location: Option<LocationInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_duration: Option<String>,
}

impl FleetTask {
    pub fn for_task(provider_id: &str, task: &Task) -> Self {
        FleetTask {
            name: task_name(provider_id, &task.task_id),
            task_type: task.task_type,
            state: FleetTaskState::Open,
            task_outcome: task.task_outcome,
            task_outcome_time: None,
            tracking_id: task.tracking_id.clone(),
            planned_location: Some(LocationInfo::from(&task.planned_waypoint)),
            task_duration: Some(duration(task.duration_seconds)),
        }
    }

    pub fn task_id(&self) -> &str {
        resource_id(&self.name)
    }

    /// Outcome time as unix milliseconds.
    pub fn outcome_time_ms(&self) -> Option<i64> {
        self.task_outcome_time.map(|t| t.timestamp_millis())
    }
}

pub fn vehicle_name(provider_id: &str, vehicle_id: &str) -> String {
    format!("providers/{provider_id}/deliveryVehicles/{vehicle_id}")
}

pub fn task_name(provider_id: &str, task_id: &str) -> String {
    format!("providers/{provider_id}/tasks/{task_id}")
}

/// Last path segment of a resource name.
pub fn resource_id(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

fn duration(seconds: u64) -> String {
    format!("{seconds}s")
}

/// Journey segments for the manifest's remaining stops, in visit order, all in state NEW.
pub fn journey_for(manifest: &Manifest) -> Vec<VehicleJourneySegment> {
    manifest
        .remaining_stops()
        .map(|stop| VehicleJourneySegment {
            stop: VehicleStop {
                planned_location: LocationInfo::from(&stop.planned_waypoint),
                tasks: stop
                    .tasks
                    .iter()
                    .map(|task_id| TaskInfo {
                        task_id: task_id.clone(),
                        task_duration: manifest
                            .task(task_id)
                            .map(|t| duration(t.duration_seconds)),
                    })
                    .collect(),
                state: StopState::New,
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_names_round_trip_ids() {
        let name = vehicle_name("p1", "v1");
        assert_eq!(name, "providers/p1/deliveryVehicles/v1");
        assert_eq!(resource_id(&name), "v1");
        assert_eq!(resource_id(&task_name("p1", "t-9")), "t-9");
    }

    #[test]
    fn fleet_task_uses_rest_field_names() {
        let task = FleetTask {
            name: task_name("p1", "t1"),
            task_type: TaskType::Delivery,
            state: FleetTaskState::Open,
            task_outcome: TaskOutcome::Unspecified,
            task_outcome_time: None,
            tracking_id: None,
            planned_location: None,
            task_duration: Some(duration(30)),
        };
        let v = serde_json::to_value(&task).unwrap();
        assert_eq!(v["type"], "DELIVERY");
        assert_eq!(v["state"], "OPEN");
        assert_eq!(v["taskOutcome"], "TASK_OUTCOME_UNSPECIFIED");
        assert_eq!(v["taskDuration"], "30s");
    }
}
