//! Outbound HTTP plumbing shared by the registry, feed and proxy clients.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Build the shared HTTP client.
pub fn build_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
}

/// Redact credentials and query strings from a URL before logging.
///
/// Published sheet links and KV endpoints carry secrets in the query or userinfo.
pub fn redact_url(raw: &str) -> String {
    if let Ok(url) = url::Url::parse(raw) {
        let host = url.host_str().unwrap_or("");
        let port_part = url.port().map(|p| format!(":{}", p)).unwrap_or_default();
        format!("{}://{}{}{}", url.scheme(), host, port_part, url.path())
    } else {
        "(redacted)".to_string()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
        }
    }

    /// Single attempt, no waiting.
    pub fn once() -> Self {
        Self::new(1)
    }
}

fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Send a request, retrying 429/5xx responses and transport errors with
/// exponential backoff. `Retry-After` (seconds) overrides the computed wait.
///
/// The last response is returned even when it is still an error status; the
/// caller decides how to treat it.
pub async fn send_with_backoff<F>(make_request: F, policy: RetryPolicy) -> reqwest::Result<Response>
where
    F: Fn() -> RequestBuilder,
{
    let mut backoff = policy.initial_backoff;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let last_attempt = attempt >= policy.max_attempts;

        match (make_request)().send().await {
            Ok(resp) if is_transient(resp.status()) && !last_attempt => {
                let mut wait = backoff;
                if let Some(h) = resp.headers().get(reqwest::header::RETRY_AFTER) {
                    if let Ok(secs) = h.to_str().unwrap_or_default().parse::<u64>() {
                        wait = Duration::from_secs(secs).min(policy.max_backoff);
                    }
                }
                tracing::warn!(
                    "Transient upstream error (status: {}). Retrying in {:?} (attempt {}/{})",
                    resp.status(),
                    wait,
                    attempt,
                    policy.max_attempts
                );
                tokio::time::sleep(wait).await;
            }
            Ok(resp) => return Ok(resp),
            Err(e) if !last_attempt => {
                tracing::warn!(
                    "HTTP request failed: {}. Retrying in {:?} (attempt {}/{})",
                    e,
                    backoff,
                    attempt,
                    policy.max_attempts
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }

        backoff = std::cmp::min(backoff * 2, policy.max_backoff);
    }
}
