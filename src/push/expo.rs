/// Expo push service client
use super::{PushGateway, PushMessage, PushReceipt, PushTicket};
use crate::{
    config::PushConfig,
    error::{SteepleError, SteepleResult},
};
use async_trait::async_trait;
use reqwest::{header, Client, Response};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ExpoEnvelope<T> {
    data: Option<T>,
}

/// HTTP gateway backed by `exp.host`
pub struct ExpoGateway {
    http_client: Client,
    send_url: String,
    receipts_url: String,
}

impl ExpoGateway {
    pub fn new(config: &PushConfig) -> SteepleResult<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
        if let Some(token) = &config.access_token {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| SteepleError::invalid("EXPO_ACCESS_TOKEN is not a valid header value"))?;
            headers.insert(header::AUTHORIZATION, value);
        }

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| SteepleError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            send_url: config.send_url.clone(),
            receipts_url: config.receipts_url.clone(),
        })
    }

    async fn check(response: Response, what: &str) -> SteepleResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.ok();
        Err(SteepleError::Upstream {
            message: format!("Expo {} request failed ({})", what, status.as_u16()),
            body,
        })
    }
}

#[async_trait]
impl PushGateway for ExpoGateway {
    async fn send_batch(&self, batch: &[PushMessage]) -> SteepleResult<Vec<PushTicket>> {
        let response = self
            .http_client
            .post(&self.send_url)
            .json(batch)
            .send()
            .await?;
        let response = Self::check(response, "push").await?;

        let envelope: ExpoEnvelope<Vec<PushTicket>> = response.json().await?;
        Ok(envelope.data.unwrap_or_default())
    }

    async fn get_receipts(&self, ids: &[String]) -> SteepleResult<HashMap<String, PushReceipt>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let response = self
            .http_client
            .post(&self.receipts_url)
            .json(&serde_json::json!({ "ids": ids }))
            .send()
            .await?;
        let response = Self::check(response, "receipt").await?;

        let envelope: ExpoEnvelope<HashMap<String, PushReceipt>> = response.json().await?;
        Ok(envelope.data.unwrap_or_default())
    }
}
