//! Request and response bodies of the daemon's HTTP API.

use serde::{Deserialize, Serialize};

use crate::model::{Manifest, Stop, Task, Vehicle};

/// Body of `POST /manifest[/{vehicle_id}]`.
///
/// Enum-valued fields stay strings so that unknown names reach validation and come back as a
/// 400 instead of a decode failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestUpdateRequest {
    /// Assignment request; exclusive with the other keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// New remaining-stop list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_stop_id_list: Option<Vec<String>>,
    /// Stop state name for the first remaining stop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_stop_state: Option<String>,
}

impl ManifestUpdateRequest {
    /// Assignment body.
    pub fn assign(client_id: impl Into<String>) -> Self {
        Self {
            client_id: Some(client_id.into()),
            ..Default::default()
        }
    }

    /// Stop-state body.
    pub fn stop_state(state: impl Into<String>) -> Self {
        Self {
            current_stop_state: Some(state.into()),
            ..Default::default()
        }
    }

    /// Remaining-stop-list body.
    pub fn stop_ids(ids: Vec<String>) -> Self {
        Self {
            remaining_stop_id_list: Some(ids),
            ..Default::default()
        }
    }
}

/// Body of `POST /task/{task_id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskUpdateRequest {
    /// Outcome name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_outcome: Option<String>,
}

/// Body of `POST /delivery_vehicle/{vehicle_id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleUpdateRequest {
    /// Stop state name for the first journey segment.
    #[serde(default, rename = "stopState", skip_serializing_if = "Option::is_none")]
    pub stop_state: Option<String>,
}

/// Error body returned with every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable reason.
    pub message: String,
    /// HTTP status.
    pub code: u16,
}

/// Delivery configuration uploaded to `POST /backend_config`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Free-form label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// One entry per vehicle.
    #[serde(default)]
    pub manifests: Vec<ManifestConfig>,
}

/// One vehicle's itinerary inside a [`DeliveryConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestConfig {
    /// The vehicle.
    pub vehicle: Vehicle,
    /// Its tasks.
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// Its stops, in configured order.
    #[serde(default)]
    pub stops: Vec<Stop>,
    /// Visit order; defaults to the order of `stops`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_stop_id_list: Option<Vec<String>>,
    /// Client expected to drive this vehicle; pre-assigns it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl ManifestConfig {
    /// Builds the initial manifest. The provider id always comes from the daemon.
    pub fn into_manifest(self, provider_id: &str) -> Manifest {
        let remaining_stop_id_list = self
            .remaining_stop_id_list
            .unwrap_or_else(|| self.stops.iter().map(|s| s.stop_id.clone()).collect());
        let mut vehicle = self.vehicle;
        vehicle.provider_id = provider_id.to_string();
        Manifest {
            vehicle,
            tasks: self.tasks,
            stops: self.stops,
            client_id: self.client_id.filter(|c| !c.is_empty()),
            current_stop_state: Default::default(),
            remaining_stop_id_list,
        }
    }
}

/// Response of `POST /backend_config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadConfigResponse {
    /// Vehicles loaded, in configuration order.
    pub vehicle_ids: Vec<String>,
}
