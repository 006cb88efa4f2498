//! Itinerary data model shared by the daemon and the driver agent.
//!
//! The enums here are the single source of truth for wire names and fleet-engine codes; both
//! sides serialize through them instead of keeping their own lookup tables.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ItineraryError;

/// Error returned when a wire name or numeric code maps to no enum variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} `{value}`")]
pub struct UnknownVariant {
    /// Enum being parsed, e.g. `stop state`.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: impl fmt::Display) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// State of a stop in the itinerary.
///
/// `Completed` only exists locally on the driver side; the fleet engine never sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StopState {
    /// No state reported yet.
    #[default]
    #[serde(rename = "STATE_UNSPECIFIED", alias = "UNSPECIFIED")]
    Unspecified,
    /// Not started.
    #[serde(rename = "NEW")]
    New,
    /// The driver is navigating to the stop.
    #[serde(rename = "ENROUTE")]
    Enroute,
    /// The driver is at the stop.
    #[serde(rename = "ARRIVED")]
    Arrived,
    /// Every task at the stop is resolved.
    #[serde(rename = "COMPLETED")]
    Completed,
}

impl StopState {
    /// Every variant in code order.
    pub const ALL: [StopState; 5] = [
        StopState::Unspecified,
        StopState::New,
        StopState::Enroute,
        StopState::Arrived,
        StopState::Completed,
    ];

    /// Canonical wire name.
    pub fn wire_name(self) -> &'static str {
        match self {
            StopState::Unspecified => "STATE_UNSPECIFIED",
            StopState::New => "NEW",
            StopState::Enroute => "ENROUTE",
            StopState::Arrived => "ARRIVED",
            StopState::Completed => "COMPLETED",
        }
    }

    /// Numeric code; 0..=3 match the fleet engine, 4 is local-only.
    pub fn code(self) -> i32 {
        match self {
            StopState::Unspecified => 0,
            StopState::New => 1,
            StopState::Enroute => 2,
            StopState::Arrived => 3,
            StopState::Completed => 4,
        }
    }

    /// Inverse of [`StopState::code`].
    pub fn from_code(code: i32) -> Result<Self, UnknownVariant> {
        Self::ALL
            .into_iter()
            .find(|s| s.code() == code)
            .ok_or_else(|| UnknownVariant::new("stop state code", code))
    }
}

impl FromStr for StopState {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STATE_UNSPECIFIED" | "UNSPECIFIED" => Ok(StopState::Unspecified),
            "NEW" => Ok(StopState::New),
            "ENROUTE" => Ok(StopState::Enroute),
            "ARRIVED" => Ok(StopState::Arrived),
            "COMPLETED" => Ok(StopState::Completed),
            other => Err(UnknownVariant::new("stop state", other)),
        }
    }
}

impl fmt::Display for StopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Outcome of a task. Moves only from `Unspecified` to a resolved value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TaskOutcome {
    /// Not resolved yet.
    #[default]
    #[serde(rename = "TASK_OUTCOME_UNSPECIFIED", alias = "UNSPECIFIED")]
    Unspecified,
    /// The task was carried out.
    #[serde(rename = "SUCCEEDED")]
    Succeeded,
    /// The task could not be carried out.
    #[serde(rename = "FAILED")]
    Failed,
}

impl TaskOutcome {
    /// Every variant in code order.
    pub const ALL: [TaskOutcome; 3] = [
        TaskOutcome::Unspecified,
        TaskOutcome::Succeeded,
        TaskOutcome::Failed,
    ];

    /// Canonical wire name.
    pub fn wire_name(self) -> &'static str {
        match self {
            TaskOutcome::Unspecified => "TASK_OUTCOME_UNSPECIFIED",
            TaskOutcome::Succeeded => "SUCCEEDED",
            TaskOutcome::Failed => "FAILED",
        }
    }

    /// Fleet-engine numeric code.
    pub fn code(self) -> i32 {
        match self {
            TaskOutcome::Unspecified => 0,
            TaskOutcome::Succeeded => 1,
            TaskOutcome::Failed => 2,
        }
    }

    /// Inverse of [`TaskOutcome::code`].
    pub fn from_code(code: i32) -> Result<Self, UnknownVariant> {
        Self::ALL
            .into_iter()
            .find(|o| o.code() == code)
            .ok_or_else(|| UnknownVariant::new("task outcome code", code))
    }

    /// True once the task has a final outcome.
    pub fn is_resolved(self) -> bool {
        self != TaskOutcome::Unspecified
    }
}

impl FromStr for TaskOutcome {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TASK_OUTCOME_UNSPECIFIED" | "UNSPECIFIED" => Ok(TaskOutcome::Unspecified),
            "SUCCEEDED" => Ok(TaskOutcome::Succeeded),
            "FAILED" => Ok(TaskOutcome::Failed),
            other => Err(UnknownVariant::new("task outcome", other)),
        }
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Kind of work a task represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    /// Collect a parcel.
    Pickup,
    /// Hand over a parcel.
    Delivery,
    /// A planned stop with no parcel, e.g. a break.
    ScheduledStop,
    /// The vehicle is unavailable.
    Unavailable,
}

impl TaskType {
    /// Every variant in code order.
    pub const ALL: [TaskType; 4] = [
        TaskType::Pickup,
        TaskType::Delivery,
        TaskType::ScheduledStop,
        TaskType::Unavailable,
    ];

    /// Canonical wire name.
    pub fn wire_name(self) -> &'static str {
        match self {
            TaskType::Pickup => "PICKUP",
            TaskType::Delivery => "DELIVERY",
            TaskType::ScheduledStop => "SCHEDULED_STOP",
            TaskType::Unavailable => "UNAVAILABLE",
        }
    }

    /// Fleet-engine numeric code.
    pub fn code(self) -> i32 {
        match self {
            TaskType::Pickup => 1,
            TaskType::Delivery => 2,
            TaskType::ScheduledStop => 3,
            TaskType::Unavailable => 4,
        }
    }

    /// Inverse of [`TaskType::code`].
    pub fn from_code(code: i32) -> Result<Self, UnknownVariant> {
        Self::ALL
            .into_iter()
            .find(|t| t.code() == code)
            .ok_or_else(|| UnknownVariant::new("task type code", code))
    }
}

impl FromStr for TaskType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.wire_name() == s)
            .ok_or_else(|| UnknownVariant::new("task type", s))
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// A geographic point with an optional title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    /// Title shown to the driver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

/// A single unit of work performed at a stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique, stable id.
    pub task_id: String,
    /// Id a consumer uses to follow the parcel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_id: Option<String>,
    /// Where the task is carried out.
    pub planned_waypoint: Waypoint,
    /// Expected time spent on the task.
    #[serde(default)]
    pub duration_seconds: u64,
    /// Kind of work.
    pub task_type: TaskType,
    /// Person to hand over to or collect from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    /// Free-form note for the driver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Outcome, one-way once resolved.
    #[serde(default)]
    pub task_outcome: TaskOutcome,
    /// Set when `task_outcome` becomes resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_outcome_time_ms: Option<i64>,
}

/// A location the vehicle visits, bundling one or more tasks by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    /// Unique id within the manifest.
    pub stop_id: String,
    /// Where the vehicle stops.
    pub planned_waypoint: Waypoint,
    /// Ids of the open tasks at this stop; closed tasks are removed.
    #[serde(default)]
    pub tasks: Vec<String>,
}

/// Vehicle identity as configured for the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    /// Unique id within the provider.
    pub vehicle_id: String,
    /// Fleet-engine provider; always overwritten by the daemon's own.
    #[serde(default)]
    pub provider_id: String,
    /// Where the vehicle starts its day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_location: Option<Waypoint>,
}

/// Authoritative itinerary of one vehicle, as kept by the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// The vehicle driving this itinerary.
    pub vehicle: Vehicle,
    /// Every task, closed ones included.
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// Every stop, in configured order.
    #[serde(default)]
    pub stops: Vec<Stop>,
    /// Client this vehicle is assigned to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// State of the first remaining stop, as last pushed to the fleet engine.
    #[serde(default)]
    pub current_stop_state: StopState,
    /// Visit order of the stops that are not completed yet.
    #[serde(default)]
    pub remaining_stop_id_list: Vec<String>,
}

impl Manifest {
    /// Vehicle id shortcut.
    pub fn vehicle_id(&self) -> &str {
        &self.vehicle.vehicle_id
    }

    /// Stop by id.
    pub fn stop(&self, stop_id: &str) -> Option<&Stop> {
        self.stops.iter().find(|s| s.stop_id == stop_id)
    }

    /// Task by id.
    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }

    /// Mutable task by id.
    pub fn task_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.task_id == task_id)
    }

    /// Stops in remaining order.
    pub fn remaining_stops(&self) -> impl Iterator<Item = &Stop> {
        self.remaining_stop_id_list
            .iter()
            .filter_map(|id| self.stop(id))
    }

    /// Removes a closed task from every stop that lists it.
    pub fn close_task(&mut self, task_id: &str) {
        for stop in &mut self.stops {
            stop.tasks.retain(|t| t != task_id);
        }
    }

    /// Checks the structural invariants of a freshly configured manifest.
    pub fn validate(&self) -> Result<(), ItineraryError> {
        let vehicle_id = self.vehicle_id();
        if vehicle_id.is_empty() {
            return Err(ItineraryError::invalid("vehicle_id must not be empty"));
        }

        let mut task_ids = HashSet::new();
        for task in &self.tasks {
            if task.task_id.is_empty() {
                return Err(ItineraryError::invalid(format!(
                    "vehicle {vehicle_id}: task_id must not be empty"
                )));
            }
            if !task_ids.insert(task.task_id.as_str()) {
                return Err(ItineraryError::invalid(format!(
                    "vehicle {vehicle_id}: duplicate task id {}",
                    task.task_id
                )));
            }
        }

        let mut stop_ids = HashSet::new();
        for stop in &self.stops {
            if !stop_ids.insert(stop.stop_id.as_str()) {
                return Err(ItineraryError::invalid(format!(
                    "vehicle {vehicle_id}: duplicate stop id {}",
                    stop.stop_id
                )));
            }
            if stop.tasks.is_empty() {
                return Err(ItineraryError::invalid(format!(
                    "vehicle {vehicle_id}: stop {} has no tasks",
                    stop.stop_id
                )));
            }
            if let Some(missing) = stop.tasks.iter().find(|t| !task_ids.contains(t.as_str())) {
                return Err(ItineraryError::invalid(format!(
                    "vehicle {vehicle_id}: stop {} references unknown task {missing}",
                    stop.stop_id
                )));
            }
        }

        let mut seen = HashSet::new();
        for id in &self.remaining_stop_id_list {
            if !stop_ids.contains(id.as_str()) {
                return Err(ItineraryError::invalid(format!(
                    "vehicle {vehicle_id}: remaining stop {id} is not a configured stop"
                )));
            }
            if !seen.insert(id.as_str()) {
                return Err(ItineraryError::invalid(format!(
                    "vehicle {vehicle_id}: remaining stop {id} listed twice"
                )));
            }
        }
        Ok(())
    }
}
