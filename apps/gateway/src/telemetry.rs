//! Tracing bootstrap.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` controls filtering;
/// `KEYGATE_LOG_JSON=1` switches to JSON lines for log shippers.
pub fn init(service: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,keygate=debug"));

    let json = std::env::var("KEYGATE_LOG_JSON").is_ok_and(|v| v == "1");
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    tracing::info!(service, "telemetry initialized");
}
