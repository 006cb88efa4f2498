use std::sync::Arc;

use async_trait::async_trait;
use itinerary_agent::{BackendError, DeliveryBackend, ItineraryManager, ManagerOptions};
use itinerary_core::api::{DeliveryConfig, ManifestUpdateRequest, TaskUpdateRequest};
use itinerary_core::model::{Manifest, StopState, Task, TaskOutcome};
use itinerary_core::state::StopTransition;
use itinerary_core::ItineraryError;
use itinerary_daemon::coordinator::ManifestCoordinator;
use itinerary_daemon::fleet::InMemoryFleetEngine;
use itinerary_daemon::store::MemoryStore;

/// Drives the coordinator directly, the way the HTTP handlers do.
struct InProcess(Arc<ManifestCoordinator>);

fn to_backend(e: ItineraryError) -> BackendError {
    BackendError::Server {
        status: e.status_code(),
        message: e.to_string(),
    }
}

#[async_trait]
impl DeliveryBackend for InProcess {
    async fn assign_vehicle(
        &self,
        client_id: &str,
        vehicle_id: Option<&str>,
    ) -> Result<Manifest, BackendError> {
        self.0
            .apply_update(vehicle_id, &ManifestUpdateRequest::assign(client_id))
            .await
            .map_err(to_backend)
    }

    async fn fetch_manifest(&self, vehicle_id: &str) -> Result<Manifest, BackendError> {
        self.0.manifest(vehicle_id).await.map_err(to_backend)
    }

    async fn update_stop_state(
        &self,
        vehicle_id: &str,
        state: StopState,
    ) -> Result<Manifest, BackendError> {
        self.0
            .apply_update(
                Some(vehicle_id),
                &ManifestUpdateRequest::stop_state(state.wire_name()),
            )
            .await
            .map_err(to_backend)
    }

    async fn update_stop_id_list(
        &self,
        vehicle_id: &str,
        stop_ids: &[String],
    ) -> Result<Manifest, BackendError> {
        self.0
            .apply_update(
                Some(vehicle_id),
                &ManifestUpdateRequest::stop_ids(stop_ids.to_vec()),
            )
            .await
            .map_err(to_backend)
    }

    async fn update_task_outcome(
        &self,
        task_id: &str,
        outcome: TaskOutcome,
    ) -> Result<Task, BackendError> {
        let req = TaskUpdateRequest {
            task_outcome: Some(outcome.wire_name().to_string()),
        };
        self.0
            .update_task_outcome(task_id, &req)
            .await
            .map_err(to_backend)
    }
}

const CONFIG: &str = r#"{
  "description": "end to end",
  "manifests": [
    {
      "vehicle": { "vehicle_id": "v1" },
      "tasks": [
        { "task_id": "t1", "planned_waypoint": { "lat": 1.0, "lng": 1.0 }, "task_type": "DELIVERY" },
        { "task_id": "t2", "planned_waypoint": { "lat": 2.0, "lng": 2.0 }, "task_type": "DELIVERY" }
      ],
      "stops": [
        { "stop_id": "s1", "planned_waypoint": { "lat": 1.0, "lng": 1.0 }, "tasks": ["t1"] },
        { "stop_id": "s2", "planned_waypoint": { "lat": 2.0, "lng": 2.0 }, "tasks": ["t2"] }
      ]
    }
  ]
}"#;

async fn coordinator() -> (Arc<ManifestCoordinator>, Arc<InMemoryFleetEngine>) {
    let fleet = Arc::new(InMemoryFleetEngine::new());
    let coordinator = Arc::new(ManifestCoordinator::new(
        Arc::new(MemoryStore::new()),
        fleet.clone(),
        "provider-1",
    ));
    let config: DeliveryConfig = serde_json::from_str(CONFIG).unwrap();
    coordinator.load_config(config).await.unwrap();
    (coordinator, fleet)
}

#[tokio::test(start_paused = true)]
async fn test_driver_completes_first_stop() {
    let (coordinator, fleet) = coordinator().await;
    let backend = Arc::new(InProcess(coordinator.clone()));
    let manager = ItineraryManager::start(backend, "driver-1", None, ManagerOptions::default())
        .await
        .unwrap();
    assert_eq!(manager.vehicle_id(), "v1");
    assert_eq!(
        coordinator.manifest("v1").await.unwrap().client_id.as_deref(),
        Some("driver-1")
    );

    manager
        .advance_stop(StopTransition::BeginNavigation)
        .await
        .unwrap()
        .unwrap();
    manager.advance_stop(StopTransition::Arrive).await.unwrap().unwrap();
    let server = coordinator.manifest("v1").await.unwrap();
    assert_eq!(server.current_stop_state, StopState::Arrived);
    let vehicle = fleet.vehicle("v1").await.unwrap();
    assert_eq!(
        vehicle.remaining_vehicle_journey_segments[0].stop.state,
        StopState::Arrived
    );

    let failed = manager.record_task_outcomes(&["t1".to_string()], true).await;
    assert!(failed.is_empty());
    assert_eq!(manager.stops().await[0].state, StopState::Completed);

    let remaining = manager
        .reorder_or_complete_stops(&["s1".to_string(), "s2".to_string()])
        .await
        .unwrap();
    assert_eq!(remaining, vec!["s2"]);

    let server = coordinator.manifest("v1").await.unwrap();
    assert_eq!(server.remaining_stop_id_list, vec!["s2"]);
    assert_eq!(server.current_stop_state, StopState::New);
    assert!(server.stop("s1").unwrap().tasks.is_empty());
    assert_eq!(
        server.task("t1").unwrap().task_outcome,
        TaskOutcome::Succeeded
    );

    let active = manager.active_stop().await.unwrap();
    assert_eq!(active.stop_id, "s2");
    assert_eq!(active.state, StopState::New);
}

#[tokio::test]
async fn test_second_driver_cannot_take_assigned_vehicle() {
    let (coordinator, _fleet) = coordinator().await;
    let backend = Arc::new(InProcess(coordinator));
    ItineraryManager::start(backend.clone(), "driver-1", Some("v1"), ManagerOptions::default())
        .await
        .unwrap();

    let err = ItineraryManager::start(backend, "driver-2", Some("v1"), ManagerOptions::default())
        .await
        .err()
        .unwrap();
    match err {
        itinerary_agent::ManagerError::Remote(BackendError::Server { status, .. }) => {
            assert_eq!(status, 403)
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_next_stop_state_lands_on_the_right_stop() {
    let (coordinator, fleet) = coordinator().await;
    let backend = Arc::new(InProcess(coordinator.clone()));
    let manager = ItineraryManager::start(backend, "driver-1", None, ManagerOptions::default())
        .await
        .unwrap();

    let failed = manager.record_task_outcomes(&["t1".to_string()], true).await;
    assert!(failed.is_empty());

    let stop = manager
        .advance_stop(StopTransition::BeginNavigation)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stop.stop_id, "s2");
    assert_eq!(stop.state, StopState::Enroute);

    let local: Vec<_> = manager
        .stops()
        .await
        .into_iter()
        .map(|s| (s.stop_id, s.state))
        .collect();
    assert_eq!(
        local,
        vec![
            ("s1".to_string(), StopState::Completed),
            ("s2".to_string(), StopState::Enroute)
        ]
    );

    let server = coordinator.manifest("v1").await.unwrap();
    assert_eq!(server.remaining_stop_id_list, vec!["s2"]);
    assert_eq!(server.current_stop_state, StopState::Enroute);

    let segments = fleet.vehicle("v1").await.unwrap().remaining_vehicle_journey_segments;
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].stop.tasks[0].task_id, "t2");
    assert_eq!(segments[0].stop.state, StopState::Enroute);
}

#[tokio::test]
async fn test_complete_is_refused_while_task_is_open() {
    let (coordinator, _fleet) = coordinator().await;
    let backend = Arc::new(InProcess(coordinator.clone()));
    let manager = ItineraryManager::start(backend, "driver-1", None, ManagerOptions::default())
        .await
        .unwrap();
    manager.advance_stop(StopTransition::BeginNavigation).await.unwrap();
    manager.advance_stop(StopTransition::Arrive).await.unwrap();

    let err = manager.advance_stop(StopTransition::Complete).await.unwrap_err();
    assert!(matches!(err, itinerary_agent::ManagerError::UnresolvedTasks(_)));
    assert_eq!(manager.remaining_stop_ids().await, vec!["s1", "s2"]);
    assert_eq!(
        coordinator.task("t1").await.unwrap().task_outcome,
        TaskOutcome::Unspecified
    );
}
