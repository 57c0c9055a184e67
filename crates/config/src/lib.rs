//! Typed settings for both keygate services.
//!
//! Settings load from a TOML file, then selected `KEYGATE_*` environment
//! variables override individual fields (deployment glue never edits files).
//! Every load ends with [`Settings::validate`]; a service refuses to start
//! on out-of-range values rather than limping along with them.

mod load;

pub use load::ConfigError;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root settings document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub token: TokenSettings,
    pub cache: CacheSettings,
    pub vault: VaultSettings,
    pub rotation: RotationSettings,
    pub degraded_mode: DegradedModeSettings,
    pub gateway: GatewaySettings,
    pub backend: BackendSettings,
}

/// Token minting and verification knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TokenSettings {
    /// Issuer identifier embedded in minted tokens.
    pub issuer: String,
    /// Audience identifier minted tokens are bound to.
    pub audience: String,
    /// Token validity window.
    #[serde(with = "humantime_serde")]
    pub lifetime: Duration,
    /// Hard ceiling on any requested lifetime.
    #[serde(with = "humantime_serde")]
    pub max_lifetime: Duration,
    /// Whether expired-but-in-grace tokens may be renewed.
    pub renewal_enabled: bool,
    /// How long past expiry a token is still renewable.
    #[serde(with = "humantime_serde")]
    pub renewal_grace: Duration,
    /// Allowance for clock skew when judging cached-token freshness.
    #[serde(with = "humantime_serde")]
    pub clock_skew: Duration,
    /// How often the signing key is re-read from the secret store.
    #[serde(with = "humantime_serde")]
    pub key_refresh_interval: Duration,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            issuer: "keygate-gateway".into(),
            audience: "keygate-backend".into(),
            lifetime: Duration::from_secs(3600),
            max_lifetime: Duration::from_secs(3600),
            renewal_enabled: true,
            renewal_grace: Duration::from_secs(300),
            clock_skew: Duration::from_secs(30),
            key_refresh_interval: Duration::from_secs(900),
        }
    }
}

/// Cache TTLs and at-rest encryption.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    /// TTL for cached tokens; `None` aligns with the token lifetime.
    #[serde(with = "humantime_serde::option")]
    pub token_ttl: Option<Duration>,
    /// TTL for the credential-metadata fallback entries.
    #[serde(with = "humantime_serde")]
    pub cred_meta_ttl: Duration,
    /// TTL for the transition-record micro-cache.
    #[serde(with = "humantime_serde")]
    pub transition_ttl: Duration,
    /// Entry capacity of the in-memory cache.
    pub capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            token_ttl: None,
            cred_meta_ttl: Duration::from_secs(900),
            transition_ttl: Duration::from_secs(5),
            capacity: 10_000,
        }
    }
}

impl CacheSettings {
    /// Effective token TTL given the configured token lifetime.
    pub fn effective_token_ttl(&self, token_lifetime: Duration) -> Duration {
        self.token_ttl.unwrap_or(token_lifetime)
    }
}

/// Secret-store (vault) connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VaultSettings {
    /// Vault base address, e.g. `https://vault.internal:8200`.
    pub address: String,
    /// Path prefix all keygate secrets live under.
    pub path_prefix: String,
    /// PEM bundle with the client certificate + key for mutual TLS.
    pub client_identity_pem: Option<String>,
    /// PEM file with the CA that signs the vault's server certificate.
    pub ca_cert_pem: Option<String>,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
    /// Maximum connection-failure attempts (first try included).
    pub retry_count: u32,
    #[serde(with = "humantime_serde")]
    pub retry_base_delay: Duration,
    pub retry_backoff_multiplier: f64,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            address: "https://127.0.0.1:8200".into(),
            path_prefix: "keygate".into(),
            client_identity_pem: None,
            ca_cert_pem: None,
            connect_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(5),
            retry_count: 3,
            retry_base_delay: Duration::from_millis(500),
            retry_backoff_multiplier: 1.5,
        }
    }
}

/// Rotation driver behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RotationSettings {
    /// How often the driver polls non-terminal rotations.
    #[serde(with = "humantime_serde")]
    pub check_interval: Duration,
    /// Transition-window length when an initiation does not specify one.
    pub default_transition_minutes: u64,
    /// Keep accepting DEPRECATED versions for new authentications until
    /// NEW_ACTIVE instead of rejecting them at OLD_DEPRECATED.
    pub accept_deprecated: bool,
    /// TTL of the per-client rotation lease in the cache.
    #[serde(with = "humantime_serde")]
    pub lock_ttl: Duration,
}

/// Smallest transition window the initiation API accepts.
pub const MIN_TRANSITION_MINUTES: u64 = 5;

impl Default for RotationSettings {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            default_transition_minutes: 60,
            accept_deprecated: false,
            lock_ttl: Duration::from_secs(30),
        }
    }
}

/// Fallback behaviour when the vault is unreachable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DegradedModeSettings {
    pub enabled: bool,
}

impl Default for DegradedModeSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Gateway service wiring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewaySettings {
    pub listen_addr: String,
    /// Base URL of the backend service requests are forwarded to.
    pub backend_url: String,
    /// Total deadline for a forwarded backend call.
    #[serde(with = "humantime_serde")]
    pub backend_timeout: Duration,
    /// Bounded wait for the per-client mint lock.
    #[serde(with = "humantime_serde")]
    pub mint_lock_timeout: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            backend_url: "http://127.0.0.1:8081".into(),
            backend_timeout: Duration::from_secs(10),
            mint_lock_timeout: Duration::from_secs(5),
        }
    }
}

/// Backend service wiring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendSettings {
    pub listen_addr: String,
    /// Base URL of the gateway, used to delegate token renewal.
    pub gateway_url: String,
    #[serde(with = "humantime_serde")]
    pub gateway_timeout: Duration,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8081".into(),
            gateway_url: "http://127.0.0.1:8080".into(),
            gateway_timeout: Duration::from_secs(5),
        }
    }
}

impl Settings {
    /// Reject configurations that would misbehave at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.issuer.is_empty() {
            return Err(ConfigError::missing("token.issuer"));
        }
        if self.token.audience.is_empty() {
            return Err(ConfigError::missing("token.audience"));
        }
        if self.token.lifetime.is_zero() {
            return Err(ConfigError::invalid("token.lifetime", "must be non-zero"));
        }
        if self.token.lifetime > self.token.max_lifetime {
            return Err(ConfigError::invalid(
                "token.lifetime",
                "must not exceed token.max_lifetime",
            ));
        }
        if self.vault.address.is_empty() {
            return Err(ConfigError::missing("vault.address"));
        }
        if !self.vault.address.starts_with("http://") && !self.vault.address.starts_with("https://")
        {
            return Err(ConfigError::invalid(
                "vault.address",
                "must start with http:// or https://",
            ));
        }
        if self.vault.retry_count == 0 {
            return Err(ConfigError::invalid("vault.retry_count", "must be at least 1"));
        }
        if self.vault.retry_backoff_multiplier < 1.0 {
            return Err(ConfigError::invalid(
                "vault.retry_backoff_multiplier",
                "must be at least 1.0",
            ));
        }
        if self.rotation.default_transition_minutes < MIN_TRANSITION_MINUTES {
            return Err(ConfigError::invalid(
                "rotation.default_transition_minutes",
                "must be at least 5 minutes",
            ));
        }
        if self.rotation.check_interval.is_zero() {
            return Err(ConfigError::invalid(
                "rotation.check_interval",
                "must be non-zero",
            ));
        }
        if self.cache.cred_meta_ttl.is_zero() || self.cache.transition_ttl.is_zero() {
            return Err(ConfigError::invalid("cache", "TTLs must be non-zero"));
        }
        if self.cache.capacity == 0 {
            return Err(ConfigError::invalid("cache.capacity", "must be non-zero"));
        }
        Ok(())
    }
}
