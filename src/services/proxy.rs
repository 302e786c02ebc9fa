use reqwest::Client;
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::services::http::redact_url;

/// Relays a JSON body to a fixed webhook and hands back its JSON answer.
#[derive(Debug, Clone)]
pub struct WebhookProxy {
    client: Client,
    webhook_url: Option<String>,
}

impl WebhookProxy {
    pub fn new(client: Client, webhook_url: Option<String>) -> Self {
        Self {
            client,
            webhook_url,
        }
    }

    pub async fn forward(&self, body: &Value) -> AppResult<Value> {
        let url = self
            .webhook_url
            .as_deref()
            .ok_or_else(|| AppError::Proxy("PROXY_WEBHOOK_URL is not configured".to_string()))?;

        tracing::debug!("Forwarding proxy request to {}", redact_url(url));

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Proxy(e.to_string()))?;

        // The upstream status is not inspected: whatever JSON it answers with is relayed.
        response
            .json::<Value>()
            .await
            .map_err(|e| AppError::Proxy(format!("Invalid JSON from webhook: {}", e)))
    }
}
