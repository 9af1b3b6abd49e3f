use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use gemba_core::config::CmmsConfig;
use gemba_core::domain::ticket::Ticket;

use crate::system::{WorkOrderError, WorkOrderSnapshot, WorkOrderSystem};

/// REST client for the external maintenance system's work-order API.
pub struct HttpWorkOrderSystem {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
}

#[derive(Serialize)]
struct CreateWorkOrderRequest<'a> {
    ticket_number: &'a str,
    plant: &'a str,
    area: Option<&'a str>,
    line: Option<&'a str>,
    machine: Option<&'a str>,
    description: Option<&'a str>,
    status_code: u8,
}

#[derive(Serialize)]
struct UpdateWorkOrderRequest {
    status_code: u8,
}

#[derive(Deserialize)]
struct WorkOrderResponse {
    id: String,
    status_code: u8,
}

impl HttpWorkOrderSystem {
    pub fn from_config(config: &CmmsConfig) -> Result<Self, WorkOrderError> {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| WorkOrderError::Request("cmms base url is not set".to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|error| WorkOrderError::Request(error.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key.expose_secret()),
            None => request,
        }
    }

    async fn decode(response: reqwest::Response) -> Result<WorkOrderSnapshot, WorkOrderError> {
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(WorkOrderError::NotFound("work order".to_string()));
        }
        let response = response
            .error_for_status()
            .map_err(|error| WorkOrderError::Request(error.to_string()))?;
        let body: WorkOrderResponse =
            response.json().await.map_err(|error| WorkOrderError::Request(error.to_string()))?;
        Ok(WorkOrderSnapshot { external_id: body.id, status_code: body.status_code })
    }
}

#[async_trait]
impl WorkOrderSystem for HttpWorkOrderSystem {
    async fn create_work_order(
        &self,
        ticket: &Ticket,
        status_code: u8,
    ) -> Result<WorkOrderSnapshot, WorkOrderError> {
        let url = format!("{}/work-orders", self.base_url);
        let request = self.authorize(self.client.post(&url)).json(&CreateWorkOrderRequest {
            ticket_number: &ticket.ticket_number,
            plant: &ticket.unit_scope.plant,
            area: ticket.unit_scope.area.as_deref(),
            line: ticket.unit_scope.line.as_deref(),
            machine: ticket.unit_scope.machine.as_deref(),
            description: ticket.description.as_deref(),
            status_code,
        });

        let response =
            request.send().await.map_err(|error| WorkOrderError::Request(error.to_string()))?;
        Self::decode(response).await
    }

    async fn update_status(
        &self,
        external_id: &str,
        status_code: u8,
    ) -> Result<WorkOrderSnapshot, WorkOrderError> {
        let url = format!("{}/work-orders/{external_id}", self.base_url);
        let request =
            self.authorize(self.client.patch(&url)).json(&UpdateWorkOrderRequest { status_code });

        let response =
            request.send().await.map_err(|error| WorkOrderError::Request(error.to_string()))?;
        Self::decode(response).await
    }

    async fn get_status(
        &self,
        external_id: &str,
    ) -> Result<WorkOrderSnapshot, WorkOrderError> {
        let url = format!("{}/work-orders/{external_id}", self.base_url);
        let request = self.authorize(self.client.get(&url));

        let response =
            request.send().await.map_err(|error| WorkOrderError::Request(error.to_string()))?;
        Self::decode(response).await
    }
}
