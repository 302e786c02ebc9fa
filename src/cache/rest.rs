use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{CacheError, CacheStore};

/// Redis-over-REST store (the protocol spoken by Vercel KV and Upstash).
///
/// Every command is a `POST` of a JSON array to the base URL, authenticated
/// with a bearer token.
#[derive(Debug, Clone)]
pub struct RestKvStore {
    client: Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct CommandResponse {
    #[serde(default)]
    result: Value,
    error: Option<String>,
}

impl RestKvStore {
    pub fn new(client: Client, base_url: &str, token: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    async fn command(&self, command: Value) -> Result<Value, CacheError> {
        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.token)
            .json(&command)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        let parsed: CommandResponse = serde_json::from_str(&text).map_err(|e| {
            CacheError::Backend(format!("Unexpected KV response (status {}): {}", status, e))
        })?;

        if let Some(error) = parsed.error {
            return Err(CacheError::Backend(error));
        }
        if !status.is_success() {
            return Err(CacheError::Backend(format!("KV returned status {}", status)));
        }

        Ok(parsed.result)
    }
}

#[async_trait]
impl CacheStore for RestKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match self.command(json!(["GET", key])).await? {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s)),
            other => Err(CacheError::Backend(format!(
                "Unexpected GET result for {}: {}",
                key, other
            ))),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let ttl_secs = ttl.as_secs().max(1).to_string();
        self.command(json!(["SET", key, value, "EX", ttl_secs]))
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let removed = self.command(json!(["DEL", key])).await?;
        Ok(removed.as_u64().unwrap_or(0) > 0)
    }
}
