//! Renewal delegation to the gateway.

use async_trait::async_trait;
use keygate_auth::RenewalClient;
use keygate_error::Error;
use serde::Deserialize;
use std::time::Duration;

/// Calls `POST /api/v1/auth/refresh` on the gateway.
pub struct HttpRenewalClient {
    client: reqwest::Client,
    refresh_url: String,
}

#[derive(Deserialize)]
struct RefreshResponse {
    token: String,
}

impl HttpRenewalClient {
    pub fn new(gateway_url: &str, timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::internal(format!("gateway client build failed: {e}")))?;
        Ok(Self {
            client,
            refresh_url: format!("{gateway_url}/api/v1/auth/refresh"),
        })
    }
}

#[async_trait]
impl RenewalClient for HttpRenewalClient {
    async fn renew(&self, token: &str) -> keygate_error::Result<String> {
        let response = self
            .client
            .post(&self.refresh_url)
            .json(&serde_json::json!({ "token": token }))
            .send()
            .await
            .map_err(|_| Error::dependency_unavailable("gateway unreachable for renewal"))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::authentication("gateway refused renewal"));
        }
        if !response.status().is_success() {
            return Err(Error::dependency_unavailable(format!(
                "gateway renewal failed with status {}",
                response.status()
            )));
        }

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|_| Error::internal("gateway renewal response malformed"))?;
        Ok(body.token)
    }
}
