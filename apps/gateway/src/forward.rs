//! Forwarding authenticated requests to the backend.

use crate::error::CORRELATION_HEADER;
use keygate_core::CorrelationId;
use keygate_error::Error;
use keygate_resilience::{Bulkhead, CircuitBreaker, ResilienceError};
use std::sync::Arc;
use std::time::Duration;

/// HTTP client for the backend, behind its own circuit breaker and
/// bulkhead so backend saturation cannot drain the vault or cache pools.
pub struct BackendForwarder {
    client: reqwest::Client,
    base_url: String,
    breaker: Arc<CircuitBreaker>,
    bulkhead: Bulkhead,
}

/// Relayed backend response.
pub struct ForwardedResponse {
    pub status: http::StatusCode,
    pub body: serde_json::Value,
}

impl BackendForwarder {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::internal(format!("backend client build failed: {e}")))?;
        Ok(Self {
            client,
            base_url,
            breaker: Arc::new(CircuitBreaker::new("backend")),
            bulkhead: Bulkhead::new("backend", 64),
        })
    }

    /// POST a JSON body to the backend with the bearer token attached and
    /// relay status and body verbatim.
    pub async fn post(
        &self,
        path: &str,
        token: &str,
        correlation_id: &CorrelationId,
        body: serde_json::Value,
    ) -> Result<ForwardedResponse, Error> {
        let url = format!("{}{path}", self.base_url);
        let result = self
            .breaker
            .execute(
                || {
                    self.bulkhead.execute(|| async {
                        let response = self
                            .client
                            .post(&url)
                            .bearer_auth(token)
                            .header(CORRELATION_HEADER, correlation_id.as_str())
                            .json(&body)
                            .send()
                            .await
                            .map_err(|e| Error::dependency_unavailable(describe(&e)))?;

                        let status = response.status();
                        let body = response
                            .json::<serde_json::Value>()
                            .await
                            .unwrap_or(serde_json::Value::Null);
                        Ok::<_, Error>(ForwardedResponse { status, body })
                    })
                },
                // Only transport-level trouble feeds the breaker; an HTTP
                // error status is a delivered answer.
                |e| matches!(e, ResilienceError::Inner(inner) if inner.is_retryable()),
            )
            .await;

        match result {
            Ok(forwarded) => Ok(forwarded),
            Err(ResilienceError::CircuitOpen { .. }) => {
                Err(Error::dependency_unavailable("backend circuit open"))
            }
            Err(ResilienceError::Inner(ResilienceError::Inner(e))) => Err(e),
            Err(_) => Err(Error::dependency_unavailable("backend unavailable")),
        }
    }
}

fn describe(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "backend call timed out".into()
    } else if e.is_connect() {
        "backend connection failed".into()
    } else {
        "backend transport error".into()
    }
}
