use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use itinerary_core::model::{Manifest, StopState, Task, TaskOutcome, Vehicle};
use itinerary_daemon::auth::{NoToken, StaticToken, TokenProvider};
use itinerary_daemon::fleet::{
    journey_for, DeliveryVehicle, FleetEngine, FleetError, FleetTask, HttpFleetEngine,
};
use serde_json::{json, Value};

#[derive(Debug, Clone)]
struct Recorded {
    method: Method,
    path: String,
    query: HashMap<String, String>,
    auth: Option<String>,
    body: Value,
}

type Log = Arc<Mutex<Vec<Recorded>>>;

/// Records every request and echoes its body back, like the fleet engine returning the stored
/// resource. Ids starting with `dup` already exist.
async fn record(
    State(log): State<Log>,
    method: Method,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let conflict = query.values().any(|v| v.starts_with("dup"));
    log.lock().unwrap().push(Recorded {
        method,
        path: uri.path().to_string(),
        query,
        auth: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: body.clone(),
    });
    if conflict {
        return (StatusCode::CONFLICT, "entity already exists").into_response();
    }
    axum::Json(body).into_response()
}

async fn fake_fleet_engine(tokens: Arc<dyn TokenProvider>) -> (HttpFleetEngine, Log) {
    let log: Log = Arc::default();
    let app = Router::new().fallback(record).with_state(log.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let engine = HttpFleetEngine::new(
        format!("http://{addr}/"),
        "provider-1",
        tokens,
        Duration::from_secs(5),
    )
    .unwrap();
    (engine, log)
}

fn vehicle(vehicle_id: &str) -> DeliveryVehicle {
    let vehicle: Vehicle = serde_json::from_value(json!({ "vehicle_id": vehicle_id })).unwrap();
    DeliveryVehicle::for_vehicle("provider-1", &vehicle)
}

fn task(task_id: &str) -> Task {
    serde_json::from_value(json!({
        "task_id": task_id,
        "planned_waypoint": { "lat": 1.0, "lng": 2.0 },
        "task_type": "DELIVERY",
        "duration_seconds": 90
    }))
    .unwrap()
}

#[tokio::test]
async fn create_calls_encode_ids_and_send_bearer_token() {
    let (engine, log) = fake_fleet_engine(Arc::new(StaticToken::new("fleet-jwt"))).await;

    let created = engine
        .create_vehicle("van 1&x=2", vehicle("van 1&x=2"))
        .await
        .unwrap();
    assert_eq!(created.name, "providers/provider-1/deliveryVehicles/van 1&x=2");
    engine
        .create_task("t/1?", FleetTask::for_task("provider-1", &task("t/1?")))
        .await
        .unwrap();

    let log = log.lock().unwrap().clone();
    assert_eq!(log.len(), 2);

    assert_eq!(log[0].method, Method::POST);
    assert_eq!(log[0].path, "/v1/providers/provider-1/deliveryVehicles");
    assert_eq!(log[0].query.len(), 1);
    assert_eq!(log[0].query["deliveryVehicleId"], "van 1&x=2");
    assert_eq!(log[0].auth.as_deref(), Some("Bearer fleet-jwt"));

    assert_eq!(log[1].path, "/v1/providers/provider-1/tasks");
    assert_eq!(log[1].query.len(), 1);
    assert_eq!(log[1].query["taskId"], "t/1?");
    assert_eq!(log[1].body["type"], "DELIVERY");
    assert_eq!(log[1].body["state"], "OPEN");
    assert_eq!(log[1].body["taskDuration"], "90s");
    assert_eq!(log[1].auth.as_deref(), Some("Bearer fleet-jwt"));
}

#[tokio::test]
async fn updates_patch_the_resource_with_an_update_mask() {
    let (engine, log) = fake_fleet_engine(Arc::new(NoToken)).await;

    let manifest: Manifest = serde_json::from_value(json!({
        "vehicle": { "vehicle_id": "v1", "provider_id": "provider-1" },
        "tasks": [task("t1")],
        "stops": [
            { "stop_id": "s1", "planned_waypoint": { "lat": 1.0, "lng": 2.0 }, "tasks": ["t1"] }
        ],
        "remaining_stop_id_list": ["s1"]
    }))
    .unwrap();
    let mut v1 = vehicle("v1");
    v1.remaining_vehicle_journey_segments = journey_for(&manifest);
    v1.remaining_vehicle_journey_segments[0].stop.state = StopState::Enroute;
    let updated = engine.update_vehicle_journey(v1).await.unwrap();
    assert_eq!(updated.current_stop_state(), Some(StopState::Enroute));

    let mut t1 = FleetTask::for_task("provider-1", &task("t1"));
    t1.task_outcome = TaskOutcome::Succeeded;
    let updated = engine.update_task_outcome(t1).await.unwrap();
    assert_eq!(updated.task_outcome, TaskOutcome::Succeeded);

    let log = log.lock().unwrap().clone();
    assert_eq!(log[0].method, Method::PATCH);
    assert_eq!(log[0].path, "/v1/providers/provider-1/deliveryVehicles/v1");
    assert_eq!(
        log[0].query["updateMask"],
        "remaining_vehicle_journey_segments"
    );
    assert_eq!(
        log[0].body["remainingVehicleJourneySegments"][0]["stop"]["state"],
        "ENROUTE"
    );
    assert_eq!(
        log[0].body["remainingVehicleJourneySegments"][0]["stop"]["tasks"][0]["taskId"],
        "t1"
    );
    assert_eq!(log[0].auth, None);

    assert_eq!(log[1].method, Method::PATCH);
    assert_eq!(log[1].path, "/v1/providers/provider-1/tasks/t1");
    assert_eq!(log[1].query["updateMask"], "task_outcome,task_outcome_time");
    assert_eq!(log[1].body["taskOutcome"], "SUCCEEDED");
}

#[tokio::test]
async fn existing_resource_is_a_conflict() {
    let (engine, _log) = fake_fleet_engine(Arc::new(NoToken)).await;
    let err = engine
        .create_task("dup-1", FleetTask::for_task("provider-1", &task("dup-1")))
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    match err {
        FleetError::Status { status, message } => {
            assert_eq!(status, 409);
            assert_eq!(message, "entity already exists");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn empty_static_token_fails_before_sending() {
    let (engine, log) = fake_fleet_engine(Arc::new(StaticToken::new(""))).await;
    let err = engine
        .create_vehicle("v1", vehicle("v1"))
        .await
        .unwrap_err();
    assert!(matches!(err, FleetError::Auth(_)));
    assert!(log.lock().unwrap().is_empty());
}
