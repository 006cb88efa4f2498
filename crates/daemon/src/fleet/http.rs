//! REST client for the fleet engine.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::{DeliveryVehicle, FleetEngine, FleetError, FleetTask};
use crate::auth::TokenProvider;

pub struct HttpFleetEngine {
    http: reqwest::Client,
    base_url: String,
    provider_id: String,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpFleetEngine {
    pub fn new(
        base_url: impl Into<String>,
        provider_id: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
        timeout: Duration,
    ) -> Result<Self, FleetError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            provider_id: provider_id.into(),
            tokens,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path)
    }

    async fn authed(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, FleetError> {
        match self.tokens.token().await? {
            Some(token) => Ok(builder.bearer_auth(token)),
            None => Ok(builder),
        }
    }

    async fn send<R: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<R, FleetError> {
        let resp = self.authed(builder).await?.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(FleetError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp.json::<R>().await?)
    }
}

#[async_trait]
impl FleetEngine for HttpFleetEngine {
    async fn create_vehicle(
        &self,
        vehicle_id: &str,
        vehicle: DeliveryVehicle,
    ) -> Result<DeliveryVehicle, FleetError> {
        let url = self.url(&format!("providers/{}/deliveryVehicles", self.provider_id));
        tracing::debug!(vehicle_id, "creating delivery vehicle");
        let req = self
            .http
            .post(url)
            .query(&[("deliveryVehicleId", vehicle_id)])
            .json(&vehicle);
        self.send(req).await
    }

    async fn create_task(&self, task_id: &str, task: FleetTask) -> Result<FleetTask, FleetError> {
        let url = self.url(&format!("providers/{}/tasks", self.provider_id));
        tracing::debug!(task_id, "creating task");
        let req = self.http.post(url).query(&[("taskId", task_id)]).json(&task);
        self.send(req).await
    }

    async fn update_vehicle_journey(
        &self,
        vehicle: DeliveryVehicle,
    ) -> Result<DeliveryVehicle, FleetError> {
        let req = self
            .http
            .patch(self.url(&vehicle.name))
            .query(&[("updateMask", "remaining_vehicle_journey_segments")])
            .json(&vehicle);
        self.send(req).await
    }

    async fn update_task_outcome(&self, task: FleetTask) -> Result<FleetTask, FleetError> {
        let req = self
            .http
            .patch(self.url(&task.name))
            .query(&[("updateMask", "task_outcome,task_outcome_time")])
            .json(&task);
        self.send(req).await
    }
}
