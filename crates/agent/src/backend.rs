//! Client side of the daemon's HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use itinerary_core::api::{ErrorBody, ManifestUpdateRequest, TaskUpdateRequest};
use itinerary_core::model::{Manifest, StopState, Task, TaskOutcome};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP {status}: {message}")]
    Server { status: u16, message: String },
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// What the itinerary manager needs from the delivery backend.
#[async_trait]
pub trait DeliveryBackend: Send + Sync + 'static {
    /// Binds `client_id` to a vehicle (the requested one, or any free one).
    async fn assign_vehicle(
        &self,
        client_id: &str,
        vehicle_id: Option<&str>,
    ) -> Result<Manifest, BackendError>;

    async fn fetch_manifest(&self, vehicle_id: &str) -> Result<Manifest, BackendError>;

    async fn update_stop_state(
        &self,
        vehicle_id: &str,
        state: StopState,
    ) -> Result<Manifest, BackendError>;

    async fn update_stop_id_list(
        &self,
        vehicle_id: &str,
        stop_ids: &[String],
    ) -> Result<Manifest, BackendError>;

    async fn update_task_outcome(
        &self,
        task_id: &str,
        outcome: TaskOutcome,
    ) -> Result<Task, BackendError>;
}

pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, BackendError> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn parse<R: DeserializeOwned>(resp: reqwest::Response) -> Result<R, BackendError> {
        let status = resp.status();
        if !status.is_success() {
            let code = status.as_u16();
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|b| b.message)
                .unwrap_or(text);
            return Err(BackendError::Server {
                status: code,
                message,
            });
        }
        resp.json::<R>()
            .await
            .map_err(|e| BackendError::Decode(format!("response body: {e}")))
    }

    async fn post<B: Serialize + Sync, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, BackendError> {
        let resp = self.http.post(self.url(path)).json(body).send().await?;
        Self::parse(resp).await
    }
}

#[async_trait]
impl DeliveryBackend for HttpBackend {
    async fn assign_vehicle(
        &self,
        client_id: &str,
        vehicle_id: Option<&str>,
    ) -> Result<Manifest, BackendError> {
        let path = match vehicle_id {
            Some(id) => format!("manifest/{id}"),
            None => "manifest".to_string(),
        };
        self.post(&path, &ManifestUpdateRequest::assign(client_id))
            .await
    }

    async fn fetch_manifest(&self, vehicle_id: &str) -> Result<Manifest, BackendError> {
        let resp = self
            .http
            .get(self.url(&format!("manifest/{vehicle_id}")))
            .send()
            .await?;
        Self::parse(resp).await
    }

    async fn update_stop_state(
        &self,
        vehicle_id: &str,
        state: StopState,
    ) -> Result<Manifest, BackendError> {
        self.post(
            &format!("manifest/{vehicle_id}"),
            &ManifestUpdateRequest::stop_state(state.wire_name()),
        )
        .await
    }

    async fn update_stop_id_list(
        &self,
        vehicle_id: &str,
        stop_ids: &[String],
    ) -> Result<Manifest, BackendError> {
        self.post(
            &format!("manifest/{vehicle_id}"),
            &ManifestUpdateRequest::stop_ids(stop_ids.to_vec()),
        )
        .await
    }

    async fn update_task_outcome(
        &self,
        task_id: &str,
        outcome: TaskOutcome,
    ) -> Result<Task, BackendError> {
        let body = TaskUpdateRequest {
            task_outcome: Some(outcome.wire_name().to_string()),
        };
        self.post(&format!("task/{task_id}"), &body).await
    }
}
