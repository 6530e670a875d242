//! Authenticated request execution with bounded retry.

use crate::error::{RestError, RestResult};
use crate::signer;
use relay_core::Credentials;
use relay_telemetry::metrics::REST_ATTEMPTS_TOTAL;
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// REST pipeline configuration. All fields overridable from the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestConfig {
    /// Exchange REST base URL.
    pub base_url: String,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Maximum attempts per call (first try included).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base backoff delay in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Backoff multiplier between consecutive delays.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: u32,
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_backoff_multiplier() -> u32 {
    2
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

/// Executes exchange REST calls with deterministic signing and bounded
/// retry. Calls are independent: each call's backoff sleep suspends only
/// that call's task.
///
/// This layer has no side effects beyond the HTTP call itself; callers own
/// idempotency (an order placement retried here is re-sent as-is).
pub struct SignedRequestExecutor {
    client: Client,
    config: RestConfig,
    credentials: Credentials,
}

impl SignedRequestExecutor {
    pub fn new(config: RestConfig, credentials: Credentials) -> RestResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| RestError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            credentials,
        })
    }

    /// Perform one REST call, retrying retryable failures up to
    /// `max_retries` attempts.
    ///
    /// `signed` controls whether the `X-API-KEY` / `X-SIGNATURE` /
    /// `X-TIMESTAMP` headers are attached; public endpoints omit them.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        signed: bool,
    ) -> RestResult<serde_json::Value> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match self.dispatch(method.clone(), path, body, signed).await {
                Ok(value) => {
                    REST_ATTEMPTS_TOTAL.with_label_values(&["ok"]).inc();
                    return Ok(value);
                }
                Err(err) if err.is_retriable() && attempt < self.config.max_retries => {
                    let delay = self.backoff_delay(attempt);
                    REST_ATTEMPTS_TOTAL.with_label_values(&["retried"]).inc();
                    warn!(
                        %method,
                        path,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retryable REST failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    REST_ATTEMPTS_TOTAL.with_label_values(&["terminal"]).inc();
                    warn!(%method, path, attempt, error = %err, "REST call failed");
                    return Err(err);
                }
            }
        }
    }

    /// Delay slept after failed attempt `attempt` (1-based):
    /// `retry_delay * multiplier^(attempt-1)` — 1s, 2s, 4s with defaults.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(10);
        let factor = (self.config.backoff_multiplier as u64).saturating_pow(exponent);
        Duration::from_millis(self.config.retry_delay_ms.saturating_mul(factor))
    }

    /// One attempt: fresh timestamp, fresh signature, one HTTP round trip.
    async fn dispatch(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        signed: bool,
    ) -> RestResult<serde_json::Value> {
        let url = format!("{}{}", self.config.base_url, path);
        let body_str = body.map(|b| b.to_string()).unwrap_or_default();

        let mut request = self.client.request(method.clone(), &url);

        if signed {
            // Timestamp is computed here, per attempt, so two calls in the
            // same millisecond each carry their own.
            let timestamp = signer::timestamp_ms();
            let signature = signer::sign(
                self.credentials.secret_bytes(),
                method.as_str(),
                path,
                &body_str,
                timestamp,
            );
            request = request
                .header("X-API-KEY", self.credentials.api_key())
                .header("X-SIGNATURE", signature)
                .header("X-TIMESTAMP", timestamp);
        }

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                // No response at all: network error or timeout.
                return Err(RestError::RequestFailed {
                    status: None,
                    message: e.to_string(),
                    retriable: true,
                });
            }
        };

        let status = response.status();
        if status.is_success() {
            debug!(%method, path, status = status.as_u16(), "REST call ok");
            return response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| RestError::Decode(format!("Failed to parse response: {e}")));
        }

        let message = exchange_message(response.text().await.unwrap_or_default(), status);
        Err(RestError::RequestFailed {
            status: Some(status.as_u16()),
            message,
            retriable: status_is_retryable(status),
        })
    }
}

/// 5xx and 429 are worth retrying; every other 4xx is terminal.
fn status_is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Prefer the exchange's own error message when the body carries one.
fn exchange_message(body: String, status: StatusCode) -> String {
    serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            v.get("msg")
                .or_else(|| v.get("message"))
                .and_then(|m| m.as_str())
                .map(|m| m.to_string())
        })
        .unwrap_or_else(|| {
            if body.is_empty() {
                format!("HTTP {status}")
            } else {
                body
            }
        })
}
