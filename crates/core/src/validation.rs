//! Request validation that runs before any state is touched.

use std::collections::HashSet;

use crate::api::{ManifestUpdateRequest, TaskUpdateRequest};
use crate::error::ItineraryError;
use crate::model::{StopState, TaskOutcome};

/// A classified manifest update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestUpdate {
    /// Bind the client to a vehicle.
    Assign {
        /// Client asking for a vehicle.
        client_id: String,
    },
    /// Reorder or drop stops, then set the first stop's state.
    Modify {
        /// New remaining-stop list, applied first.
        stop_ids: Option<Vec<String>>,
        /// New state of the first remaining stop.
        stop_state: Option<StopState>,
    },
}

/// Classifies a manifest update and parses every enum value it carries.
pub fn classify_manifest_update(
    req: &ManifestUpdateRequest,
) -> Result<ManifestUpdate, ItineraryError> {
    let has_other = req.remaining_stop_id_list.is_some() || req.current_stop_state.is_some();

    match (&req.client_id, has_other) {
        (None, false) => Err(ItineraryError::invalid("The update must be specified.")),
        (Some(_), true) => Err(ItineraryError::invalid(
            "The request cannot contain both an assignment and other updates.",
        )),
        (Some(client_id), false) => {
            if client_id.is_empty() {
                return Err(ItineraryError::invalid("The client ID is invalid."));
            }
            Ok(ManifestUpdate::Assign {
                client_id: client_id.clone(),
            })
        }
        (None, true) => {
            let stop_state = req
                .current_stop_state
                .as_deref()
                .map(parse_fleet_stop_state)
                .transpose()?;
            Ok(ManifestUpdate::Modify {
                stop_ids: req.remaining_stop_id_list.clone(),
                stop_state,
            })
        }
    }
}

/// Parses a stop state the fleet engine accepts. `COMPLETED` is local-only and rejected.
pub fn parse_fleet_stop_state(name: &str) -> Result<StopState, ItineraryError> {
    match name.parse::<StopState>() {
        Ok(state) if state.is_fleet_state() => Ok(state),
        _ => Err(ItineraryError::invalid(format!(
            "Stop state {name} is invalid."
        ))),
    }
}

/// Parses the outcome carried by a task update.
pub fn parse_task_update(req: &TaskUpdateRequest) -> Result<TaskOutcome, ItineraryError> {
    let Some(name) = req.task_outcome.as_deref() else {
        return Err(ItineraryError::invalid("No task outcome was specified."));
    };
    name.parse::<TaskOutcome>()
        .map_err(|_| ItineraryError::invalid(format!("Task outcome {name} is invalid.")))
}

/// Checks that `proposed` is a duplicate-free subset of `current`.
///
/// Returns, for each proposed id, its index in `current`.
pub fn check_stop_subset(
    current: &[String],
    proposed: &[String],
) -> Result<Vec<usize>, ItineraryError> {
    let mut seen = HashSet::with_capacity(proposed.len());
    proposed
        .iter()
        .map(|id| {
            if !seen.insert(id.as_str()) {
                return Err(ItineraryError::invalid(format!(
                    "Stop {id} appears more than once in the update."
                )));
            }
            current.iter().position(|c| c == id).ok_or_else(|| {
                ItineraryError::not_found(
                    "The update request contained a stopId that isn't in the original set",
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn subset_maps_to_current_positions() {
        let current = ids(&["s1", "s2", "s3", "s4"]);
        assert_eq!(
            check_stop_subset(&current, &ids(&["s4", "s1"])).unwrap(),
            vec![3, 0]
        );
        assert!(check_stop_subset(&current, &[]).unwrap().is_empty());
    }

    #[test]
    fn duplicate_is_invalid_before_unknown() {
        let current = ids(&["s1", "s2"]);
        let err = check_stop_subset(&current, &ids(&["s1", "s1", "s9"])).unwrap_err();
        assert!(matches!(err, ItineraryError::InvalidArgument(_)));
    }
}
