//! The driver's local, provisional view of the itinerary.

use std::collections::HashSet;

use itinerary_core::model::{Manifest, StopState, Task, Waypoint};
use tracing::warn;

/// A stop as the driver sees it, with its tasks resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ItineraryStop {
    pub stop_id: String,
    pub waypoint: Waypoint,
    pub tasks: Vec<Task>,
    pub state: StopState,
}

impl ItineraryStop {
    pub fn has_unresolved_task(&self) -> bool {
        self.tasks.iter().any(|t| !t.task_outcome.is_resolved())
    }
}

/// Ordered arena of stops plus the last remaining-stop list the server accepted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Itinerary {
    stops: Vec<ItineraryStop>,
    remaining: Vec<String>,
}

impl Itinerary {
    /// Builds the view from a server manifest. Stops without any known task are skipped.
    pub fn from_manifest(manifest: &Manifest) -> Self {
        let mut stops = Vec::with_capacity(manifest.stops.len());
        for stop in &manifest.stops {
            let tasks: Vec<Task> = stop
                .tasks
                .iter()
                .filter_map(|id| {
                    let task = manifest.task(id).cloned();
                    if task.is_none() {
                        warn!(stop_id = %stop.stop_id, task_id = %id, "stop references an unknown task");
                    }
                    task
                })
                .collect();
            if tasks.is_empty() {
                warn!(stop_id = %stop.stop_id, "skipping stop without tasks");
                continue;
            }
            stops.push(ItineraryStop {
                stop_id: stop.stop_id.clone(),
                waypoint: stop.planned_waypoint.clone(),
                tasks,
                state: StopState::New,
            });
        }

        let mut itinerary = Itinerary {
            stops,
            remaining: Vec::new(),
        };
        itinerary.reconcile(manifest);
        itinerary
    }

    pub fn stops(&self) -> &[ItineraryStop] {
        &self.stops
    }

    /// Remaining stop ids as last accepted by the server.
    pub fn remaining_stop_ids(&self) -> &[String] {
        &self.remaining
    }

    pub fn position(&self, stop_id: &str) -> Option<usize> {
        self.stops.iter().position(|s| s.stop_id == stop_id)
    }

    /// Index of the first stop that is not completed and still has work.
    pub fn active_index(&self) -> Option<usize> {
        self.stops
            .iter()
            .position(|s| !s.state.is_terminal() && s.has_unresolved_task())
    }

    pub fn active_stop(&self) -> Option<&ItineraryStop> {
        self.active_index().map(|i| &self.stops[i])
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.stops
            .iter()
            .flat_map(|s| s.tasks.iter())
            .find(|t| t.task_id == task_id)
    }

    pub fn set_state(&mut self, index: usize, state: StopState) {
        if let Some(stop) = self.stops.get_mut(index) {
            stop.state = state;
        }
    }

    /// Stores a task returned by the server; its stop becomes COMPLETED once every task is
    /// resolved. Returns the stop's new state.
    pub fn record_outcome(&mut self, updated: &Task) -> Option<StopState> {
        let stop = self
            .stops
            .iter_mut()
            .find(|s| s.tasks.iter().any(|t| t.task_id == updated.task_id))?;
        if let Some(task) = stop.tasks.iter_mut().find(|t| t.task_id == updated.task_id) {
            *task = updated.clone();
        }
        if !stop.has_unresolved_task() {
            stop.state = StopState::Completed;
        }
        Some(stop.state)
    }

    /// Remaining list implied by `order`: the listed stops that still have unresolved tasks.
    pub fn pending_order(&self, order: &[String]) -> Vec<String> {
        order
            .iter()
            .filter(|id| {
                self.position(id)
                    .is_some_and(|i| self.stops[i].has_unresolved_task())
            })
            .cloned()
            .collect()
    }

    /// Adopts the server's view: resolved outcomes, the remaining order and the state of the
    /// first remaining stop. Stops the server no longer lists are completed and move ahead of
    /// the remaining ones.
    pub fn reconcile(&mut self, manifest: &Manifest) {
        for stop in &mut self.stops {
            for task in &mut stop.tasks {
                if let Some(server) = manifest.task(&task.task_id) {
                    if server.task_outcome.is_resolved() && !task.task_outcome.is_resolved() {
                        *task = server.clone();
                    }
                }
            }
        }

        let mut remaining = Vec::with_capacity(manifest.remaining_stop_id_list.len());
        for id in &manifest.remaining_stop_id_list {
            if self.position(id).is_some() {
                remaining.push(id.clone());
            } else {
                warn!(stop_id = %id, "server lists a stop missing from the local itinerary");
            }
        }

        let listed: HashSet<&str> = remaining.iter().map(String::as_str).collect();
        let (mut ordered, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.stops)
            .into_iter()
            .partition(|s| !listed.contains(s.stop_id.as_str()));
        for stop in &mut ordered {
            stop.state = StopState::Completed;
        }
        let mut rest: Vec<Option<ItineraryStop>> = rest.into_iter().map(Some).collect();
        for id in &remaining {
            if let Some(stop) = rest
                .iter_mut()
                .find(|s| s.as_ref().is_some_and(|s| &s.stop_id == id))
                .and_then(Option::take)
            {
                ordered.push(stop);
            }
        }

        let first = remaining.first().cloned();
        for stop in ordered.iter_mut() {
            if !listed.contains(stop.stop_id.as_str()) {
                continue;
            }
            if !stop.has_unresolved_task() {
                stop.state = StopState::Completed;
            } else if Some(&stop.stop_id) == first.as_ref() {
                stop.state = manifest.current_stop_state;
            } else {
                stop.state = StopState::New;
            }
        }

        self.stops = ordered;
        self.remaining = remaining;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itinerary_core::model::{Stop, TaskOutcome, TaskType, Vehicle};

    fn waypoint() -> Waypoint {
        Waypoint {
            description: None,
            lat: 0.0,
            lng: 0.0,
        }
    }

    fn task(id: &str) -> Task {
        Task {
            task_id: id.into(),
            tracking_id: None,
            planned_waypoint: waypoint(),
            duration_seconds: 0,
            task_type: TaskType::Delivery,
            contact_name: None,
            description: None,
            task_outcome: TaskOutcome::Unspecified,
            task_outcome_time_ms: None,
        }
    }

    fn stop(id: &str, tasks: &[&str]) -> Stop {
        Stop {
            stop_id: id.into(),
            planned_waypoint: waypoint(),
            tasks: tasks.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn manifest() -> Manifest {
        Manifest {
            vehicle: Vehicle {
                vehicle_id: "v1".into(),
                provider_id: "p".into(),
                start_location: None,
            },
            tasks: vec![task("t1"), task("t2"), task("t3")],
            stops: vec![
                stop("s1", &["t1"]),
                stop("s2", &["t2", "t3"]),
                stop("s3", &[]),
            ],
            client_id: Some("c1".into()),
            current_stop_state: StopState::Enroute,
            remaining_stop_id_list: vec!["s1".into(), "s2".into(), "s3".into()],
        }
    }

    #[test]
    fn taskless_stops_are_skipped() {
        let it = Itinerary::from_manifest(&manifest());
        let ids: Vec<_> = it.stops().iter().map(|s| s.stop_id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2"]);
        assert_eq!(it.remaining_stop_ids(), ["s1", "s2"]);
        assert_eq!(it.stops()[0].state, StopState::Enroute);
        assert_eq!(it.stops()[1].state, StopState::New);
        assert_eq!(it.active_stop().unwrap().stop_id, "s1");
    }

    #[test]
    fn stop_completes_when_all_tasks_resolved() {
        let mut it = Itinerary::from_manifest(&manifest());
        let mut t2 = task("t2");
        t2.task_outcome = TaskOutcome::Succeeded;
        assert_eq!(it.record_outcome(&t2), Some(StopState::New));

        let mut t3 = task("t3");
        t3.task_outcome = TaskOutcome::Failed;
        assert_eq!(it.record_outcome(&t3), Some(StopState::Completed));
        assert_eq!(it.pending_order(&["s2".into(), "s1".into()]), vec!["s1"]);
        assert!(it.record_outcome(&task("t9")).is_none());
    }

    #[test]
    fn reconcile_follows_server_order() {
        let mut it = Itinerary::from_manifest(&manifest());
        let mut m = manifest();
        m.remaining_stop_id_list = vec!["s2".into()];
        m.current_stop_state = StopState::New;
        it.reconcile(&m);

        assert_eq!(it.stops()[0].stop_id, "s1");
        assert_eq!(it.stops()[0].state, StopState::Completed);
        assert_eq!(it.active_stop().unwrap().stop_id, "s2");
        assert_eq!(it.remaining_stop_ids(), ["s2"]);
    }
}
