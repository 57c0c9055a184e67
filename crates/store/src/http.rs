//! REST vault client.
//!
//! Speaks a KV-v2-style HTTP contract: the adapter logs in with its mutual
//! TLS identity, receives a session token, and presents it on every call.
//! Session expiry shows up as 403 and is healed by one transparent
//! re-authentication; connection failures go through the retry strategy.

use crate::{SecretStore, StoreError};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use keygate_resilience::RetryStrategy;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::RwLock;

/// Boxed future returned by the retry/session helper closures below; used
/// instead of `AsyncFn` bounds to avoid an HRTB/`Send` inference limitation
/// with async closures that capture `&self` across an `.await`.
type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Connection settings for [`VaultHttpStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultHttpConfig {
    /// Base address, e.g. `https://vault.internal:8200`.
    pub address: String,
    /// KV mount all keygate paths live under.
    pub path_prefix: String,
    /// PEM bundle (certificate + private key) for the mTLS identity.
    pub client_identity_pem: Option<String>,
    /// PEM of the CA signing the vault's server certificate.
    pub ca_cert_pem: Option<String>,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
    /// Applied to connection failures only.
    pub retry: RetryStrategy,
}

impl Default for VaultHttpConfig {
    fn default() -> Self {
        Self {
            address: "https://127.0.0.1:8200".into(),
            path_prefix: "keygate".into(),
            client_identity_pem: None,
            ca_cert_pem: None,
            connect_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(5),
            retry: RetryStrategy::exponential(3, Duration::from_millis(500), 1.5),
        }
    }
}

impl VaultHttpConfig {
    fn validate(&self) -> Result<(), StoreError> {
        if !self.address.starts_with("http://") && !self.address.starts_with("https://") {
            return Err(StoreError::Malformed {
                path: "[config]".into(),
                reason: "vault address must start with http:// or https://".into(),
            });
        }
        if self.path_prefix.is_empty() || self.path_prefix.contains('/') {
            return Err(StoreError::Malformed {
                path: "[config]".into(),
                reason: "path_prefix must be a single non-empty segment".into(),
            });
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct LoginResponse {
    auth: LoginAuth,
}

#[derive(Deserialize)]
struct LoginAuth {
    client_token: String,
}

#[derive(Deserialize)]
struct ReadResponse {
    data: ReadOuter,
}

#[derive(Deserialize)]
struct ReadOuter {
    data: ReadInner,
}

#[derive(Deserialize)]
struct ReadInner {
    payload: String,
}

/// `SecretStore` over the REST vault.
pub struct VaultHttpStore {
    config: VaultHttpConfig,
    client: reqwest::Client,
    session: RwLock<Option<String>>,
}

impl VaultHttpStore {
    /// Build the client; does not touch the network.
    pub fn new(config: VaultHttpConfig) -> Result<Self, StoreError> {
        config.validate()?;

        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout);

        if let Some(pem) = &config.client_identity_pem {
            let identity =
                reqwest::Identity::from_pem(pem.as_bytes()).map_err(|e| StoreError::Malformed {
                    path: "[config]".into(),
                    reason: format!("client identity PEM rejected: {e}"),
                })?;
            builder = builder.identity(identity);
        }
        if let Some(pem) = &config.ca_cert_pem {
            let cert = reqwest::Certificate::from_pem(pem.as_bytes()).map_err(|e| {
                StoreError::Malformed {
                    path: "[config]".into(),
                    reason: format!("CA certificate PEM rejected: {e}"),
                }
            })?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder
            .build()
            .map_err(|e| StoreError::connection(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            session: RwLock::new(None),
        })
    }

    fn data_url(&self, path: &str) -> String {
        format!(
            "{}/v1/{}/data/{path}",
            self.config.address, self.config.path_prefix
        )
    }

    fn metadata_url(&self, path: &str) -> String {
        format!(
            "{}/v1/{}/metadata/{path}",
            self.config.address, self.config.path_prefix
        )
    }

    async fn session_token(&self) -> Result<String, StoreError> {
        if let Some(token) = self.session.read().await.clone() {
            return Ok(token);
        }
        self.authenticate().await?;
        self.session
            .read()
            .await
            .clone()
            .ok_or_else(|| StoreError::Authentication {
                reason: "login succeeded but no session token was issued".into(),
            })
    }

    /// Run one store call, healing an expired session exactly once.
    async fn with_session<'a, T, F>(&'a self, op: F) -> Result<T, StoreError>
    where
        F: Fn(String) -> BoxFuture<'a, T>,
    {
        let token = self.session_token().await?;
        match op(token).await {
            Err(StoreError::Authentication { .. }) => {
                tracing::debug!("vault session rejected, re-authenticating");
                self.session.write().await.take();
                let token = self.session_token().await?;
                op(token).await
            }
            other => other,
        }
    }

    /// Retry connection failures on the configured backoff schedule.
    /// Authentication failures and not-found pass through untouched.
    async fn with_retry<'a, T, F>(&'a self, op: F) -> Result<T, StoreError>
    where
        F: Fn() -> BoxFuture<'a, T>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_connection() => {
                    match self.config.retry.delay_for_attempt(attempt) {
                        Some(delay) => {
                            tracing::debug!(
                                attempt,
                                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                                "vault call failed, backing off"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => return Err(e),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn map_transport_error(err: &reqwest::Error) -> StoreError {
        if err.is_timeout() {
            StoreError::connection("request timed out")
        } else if err.is_connect() {
            StoreError::connection("connection failed")
        } else {
            StoreError::connection(format!("transport error: {err}"))
        }
    }

    fn status_to_error(status: reqwest::StatusCode, path: &str) -> StoreError {
        match status.as_u16() {
            401 | 403 => StoreError::Authentication {
                reason: format!("status {status}"),
            },
            404 => StoreError::NotFound {
                path: path.to_owned(),
            },
            _ => StoreError::connection(format!("unexpected status {status}")),
        }
    }
}

impl VaultHttpStore {
    #[tracing::instrument(skip(self))]
    async fn authenticate_impl<'a>(&'a self) -> Result<(), StoreError> {
        let url = format!("{}/v1/auth/cert/login", self.config.address);
        let response = self
            .client
            .post(&url)
            .json(&json!({}))
            .send()
            .await
            .map_err(|e| Self::map_transport_error(&e))?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(StoreError::Authentication {
                reason: format!("login rejected with status {status}"),
            });
        }
        if !status.is_success() {
            return Err(StoreError::connection(format!(
                "login failed with status {status}"
            )));
        }

        let login: LoginResponse = response.json().await.map_err(|e| StoreError::Malformed {
            path: "[login]".into(),
            reason: e.to_string(),
        })?;

        *self.session.write().await = Some(login.auth.client_token);
        tracing::debug!("vault session established");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn get_secret_impl<'a>(&'a self, path: &'a str) -> Result<Vec<u8>, StoreError> {
        self.with_retry(move || -> BoxFuture<'a, Vec<u8>> {
            Box::pin(async move {
                self.with_session(move |token: String| -> BoxFuture<'a, Vec<u8>> {
                    Box::pin(async move {
                        let response = self
                            .client
                            .get(self.data_url(path))
                            .header("X-Vault-Token", token)
                            .send()
                            .await
                            .map_err(|e| Self::map_transport_error(&e))?;

                        let status = response.status();
                        if !status.is_success() {
                            return Err(Self::status_to_error(status, path));
                        }

                        let body: ReadResponse =
                            response.json().await.map_err(|e| StoreError::Malformed {
                                path: path.to_owned(),
                                reason: e.to_string(),
                            })?;

                        BASE64
                            .decode(body.data.data.payload)
                            .map_err(|e| StoreError::Malformed {
                                path: path.to_owned(),
                                reason: format!("payload is not valid base64: {e}"),
                            })
                    })
                })
                .await
            })
        })
        .await
    }

    #[tracing::instrument(skip(self, value))]
    async fn put_secret_impl<'a>(&'a self, path: &'a str, value: &'a [u8]) -> Result<(), StoreError> {
        let encoded = BASE64.encode(value);
        self.with_retry(move || -> BoxFuture<'a, ()> {
            let encoded = encoded.clone();
            Box::pin(async move {
                self.with_session(move |token: String| -> BoxFuture<'a, ()> {
                    let encoded = encoded.clone();
                    Box::pin(async move {
                        let response = self
                            .client
                            .post(self.data_url(path))
                            .header("X-Vault-Token", token)
                            .json(&json!({ "data": { "payload": encoded.as_str() } }))
                            .send()
                            .await
                            .map_err(|e| Self::map_transport_error(&e))?;

                        let status = response.status();
                        if status.is_success() {
                            Ok(())
                        } else {
                            Err(Self::status_to_error(status, path))
                        }
                    })
                })
                .await
            })
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn delete_secret_impl<'a>(&'a self, path: &'a str) -> Result<(), StoreError> {
        self.with_retry(move || -> BoxFuture<'a, ()> {
            Box::pin(async move {
                self.with_session(move |token: String| -> BoxFuture<'a, ()> {
                    Box::pin(async move {
                        let response = self
                            .client
                            .delete(self.metadata_url(path))
                            .header("X-Vault-Token", token)
                            .send()
                            .await
                            .map_err(|e| Self::map_transport_error(&e))?;

                        let status = response.status();
                        // Deleting an absent secret is a success (idempotent).
                        if status.is_success() || status.as_u16() == 404 {
                            Ok(())
                        } else {
                            Err(Self::status_to_error(status, path))
                        }
                    })
                })
                .await
            })
        })
        .await
    }

    async fn is_connected_impl(&self) -> bool {
        let url = format!("{}/v1/sys/health", self.config.address);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl SecretStore for VaultHttpStore {
    async fn authenticate(&self) -> Result<(), StoreError> {
        self.authenticate_impl().await
    }

    async fn get_secret(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        self.get_secret_impl(path).await
    }

    async fn put_secret(&self, path: &str, value: &[u8]) -> Result<(), StoreError> {
        self.put_secret_impl(path, value).await
    }

    async fn delete_secret(&self, path: &str) -> Result<(), StoreError> {
        self.delete_secret_impl(path).await
    }

    async fn is_connected(&self) -> bool {
        self.is_connected_impl().await
    }
}
