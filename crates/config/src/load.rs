//! Settings loading: TOML file, then environment overrides.

use crate::Settings;
use std::path::Path;
use thiserror::Error;

/// Error type for settings loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("missing required setting '{field}'")]
    MissingRequired { field: &'static str },

    #[error("invalid setting '{field}': {reason}")]
    InvalidValue {
        field: &'static str,
        reason: &'static str,
    },
}

impl ConfigError {
    pub(crate) fn missing(field: &'static str) -> Self {
        Self::MissingRequired { field }
    }

    pub(crate) fn invalid(field: &'static str, reason: &'static str) -> Self {
        Self::InvalidValue { field, reason }
    }
}

impl Settings {
    /// Load settings from a TOML file, apply environment overrides, validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut settings: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    /// Defaults plus environment overrides; used when no file is given.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Self::default();
        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    /// Overlay the handful of fields deployment glue injects per pod.
    ///
    /// File settings describe the installation; these variables describe the
    /// instance (addresses, peer URLs, TLS material paths).
    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("KEYGATE_VAULT_ADDR") {
            self.vault.address = addr;
        }
        if let Ok(pem) = std::env::var("KEYGATE_VAULT_CLIENT_IDENTITY_PEM") {
            self.vault.client_identity_pem = Some(pem);
        }
        if let Ok(pem) = std::env::var("KEYGATE_VAULT_CA_CERT_PEM") {
            self.vault.ca_cert_pem = Some(pem);
        }
        if let Ok(addr) = std::env::var("KEYGATE_GATEWAY_LISTEN_ADDR") {
            self.gateway.listen_addr = addr;
        }
        if let Ok(url) = std::env::var("KEYGATE_BACKEND_URL") {
            self.gateway.backend_url = url;
        }
        if let Ok(addr) = std::env::var("KEYGATE_BACKEND_LISTEN_ADDR") {
            self.backend.listen_addr = addr;
        }
        if let Ok(url) = std::env::var("KEYGATE_GATEWAY_URL") {
            self.backend.gateway_url = url;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_partial_file_fills_defaults() {
        let mut file = tempfile_in_target();
        writeln!(
            file.1,
            r#"
[token]
issuer = "pay-gateway"
lifetime = "30m"

[rotation]
default_transition_minutes = 10
"#
        )
        .unwrap();

        let settings = Settings::load(&file.0).unwrap();
        assert_eq!(settings.token.issuer, "pay-gateway");
        assert_eq!(settings.token.lifetime, std::time::Duration::from_secs(1800));
        // untouched sections keep their defaults
        assert_eq!(settings.token.audience, "keygate-backend");
        assert_eq!(settings.rotation.default_transition_minutes, 10);
        drop(file.1);
        let _ = std::fs::remove_file(&file.0);
    }

    #[test]
    fn test_unknown_field_is_a_parse_error() {
        let mut file = tempfile_in_target();
        writeln!(file.1, "[token]\nlifetme = \"30m\"").unwrap();
        let err = Settings::load(&file.0).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        drop(file.1);
        let _ = std::fs::remove_file(&file.0);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = Settings::load("/nonexistent/keygate.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    fn tempfile_in_target() -> (std::path::PathBuf, std::fs::File) {
        let path = std::env::temp_dir().join(format!(
            "keygate-config-test-{}-{}.toml",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        let file = std::fs::File::create(&path).unwrap();
        (path, file)
    }
}
