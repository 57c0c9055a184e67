use keygate_backend::{routes, state};
use keygate_config::Settings;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,keygate=debug"));
    if std::env::var("KEYGATE_LOG_JSON").is_ok_and(|v| v == "1") {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let settings = match std::env::var("KEYGATE_CONFIG") {
        Ok(path) => Settings::load(path)?,
        Err(_) => Settings::from_env()?,
    };

    let shutdown = CancellationToken::new();
    let app_state = state::build(&settings, shutdown.clone()).await?;
    let app = routes::router(app_state);

    let listener = tokio::net::TcpListener::bind(&settings.backend.listen_addr).await?;
    tracing::info!(addr = %settings.backend.listen_addr, "backend listening");

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
        signal_token.cancel();
    });

    axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move { shutdown.cancelled().await }
        })
        .await?;

    shutdown.cancel();
    tracing::info!("backend stopped");
    Ok(())
}
