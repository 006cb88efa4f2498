use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use itinerary_core::api::{
    DeliveryConfig, LoadConfigResponse, ManifestUpdateRequest, TaskUpdateRequest,
    VehicleUpdateRequest,
};
use itinerary_core::model::{Manifest, Task};
use itinerary_core::ItineraryError;
use serde::{de::DeserializeOwned, Deserialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::coordinator::ManifestCoordinator;
use crate::fleet::DeliveryVehicle;

#[derive(Clone)]
pub struct AppState {
    coordinator: Arc<ManifestCoordinator>,
}

pub fn router(coordinator: Arc<ManifestCoordinator>) -> Router {
    let state = AppState { coordinator };
    Router::new()
        .route("/healthz", get(healthz))
        .route("/backend_config", post(load_config))
        .route("/manifest", get(manifest_without_id).post(update_unassigned))
        .route("/manifest/{vehicle_id}", get(get_manifest).post(update_manifest))
        .route("/task/{task_id}", get(get_task).post(update_task))
        .route("/tasks", get(vehicle_tasks))
        .route("/taskInfoByTrackingId", get(tracking_id_missing))
        .route("/taskInfoByTrackingId/{tracking_id}", get(task_by_tracking_id))
        .route(
            "/delivery_vehicle",
            get(vehicle_id_missing).post(vehicle_id_missing),
        )
        .route(
            "/delivery_vehicle/{vehicle_id}",
            get(get_delivery_vehicle).post(update_delivery_vehicle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

/// Update bodies are lenient: an empty or unparsable body counts as `{}` and is rejected by
/// validation with a proper error body.
fn lenient<T: DeserializeOwned + Default>(body: &Bytes) -> T {
    serde_json::from_slice(body).unwrap_or_default()
}

async fn load_config(
    State(st): State<AppState>,
    body: Bytes,
) -> Result<Json<LoadConfigResponse>, AppError> {
    let config: DeliveryConfig = serde_json::from_slice(&body)
        .map_err(|e| ItineraryError::invalid(format!("invalid delivery configuration: {e}")))?;
    Ok(Json(st.coordinator.load_config(config).await?))
}

async fn manifest_without_id() -> AppError {
    ItineraryError::invalid("The vehicle ID must be specified.").into()
}

async fn get_manifest(
    State(st): State<AppState>,
    Path(vehicle_id): Path<String>,
) -> Result<Json<Manifest>, AppError> {
    Ok(Json(st.coordinator.manifest(&vehicle_id).await?))
}

async fn update_unassigned(
    State(st): State<AppState>,
    body: Bytes,
) -> Result<Json<Manifest>, AppError> {
    let req: ManifestUpdateRequest = lenient(&body);
    Ok(Json(st.coordinator.apply_update(None, &req).await?))
}

async fn update_manifest(
    State(st): State<AppState>,
    Path(vehicle_id): Path<String>,
    body: Bytes,
) -> Result<Json<Manifest>, AppError> {
    let req: ManifestUpdateRequest = lenient(&body);
    tracing::debug!(vehicle_id = %vehicle_id, ?req, "manifest update");
    Ok(Json(
        st.coordinator
            .apply_update(Some(&vehicle_id), &req)
            .await?,
    ))
}

async fn get_task(
    State(st): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<Task>, AppError> {
    Ok(Json(st.coordinator.task(&task_id).await?))
}

async fn update_task(
    State(st): State<AppState>,
    Path(task_id): Path<String>,
    body: Bytes,
) -> Result<Json<Task>, AppError> {
    let req: TaskUpdateRequest = lenient(&body);
    Ok(Json(
        st.coordinator.update_task_outcome(&task_id, &req).await?,
    ))
}

#[derive(Debug, Deserialize)]
struct TasksQuery {
    #[serde(rename = "vehicleId")]
    vehicle_id: Option<String>,
}

async fn vehicle_tasks(
    State(st): State<AppState>,
    Query(query): Query<TasksQuery>,
) -> Result<Json<Vec<Task>>, AppError> {
    let vehicle_id = query
        .vehicle_id
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ItineraryError::invalid("The vehicle ID must be specified."))?;
    Ok(Json(st.coordinator.vehicle_tasks(&vehicle_id).await?))
}

async fn tracking_id_missing() -> AppError {
    ItineraryError::invalid("The tracking ID must be specified.").into()
}

async fn task_by_tracking_id(
    State(st): State<AppState>,
    Path(tracking_id): Path<String>,
) -> Result<Json<Task>, AppError> {
    Ok(Json(st.coordinator.task_by_tracking_id(&tracking_id).await?))
}

async fn vehicle_id_missing() -> AppError {
    ItineraryError::invalid("The vehicle ID must be specified.").into()
}

async fn get_delivery_vehicle(
    State(st): State<AppState>,
    Path(vehicle_id): Path<String>,
) -> Result<Json<DeliveryVehicle>, AppError> {
    Ok(Json(st.coordinator.delivery_vehicle(&vehicle_id).await?))
}

async fn update_delivery_vehicle(
    State(st): State<AppState>,
    Path(vehicle_id): Path<String>,
    body: Bytes,
) -> Result<Json<DeliveryVehicle>, AppError> {
    let req: VehicleUpdateRequest = lenient(&body);
    Ok(Json(
        st.coordinator
            .update_vehicle_stop_state(&vehicle_id, &req)
            .await?,
    ))
}

#[derive(Debug)]
pub struct AppError(ItineraryError);

impl From<ItineraryError> for AppError {
    fn from(value: ItineraryError) -> Self {
        Self(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = self.0.to_body();
        let status =
            StatusCode::from_u16(body.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::warn!(error = %self.0, code = body.code, "request rejected");
        }
        (status, Json(body)).into_response()
    }
}
