use keygate_config::Settings;
use keygate_gateway::{routes, state, telemetry};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init("keygate-gateway");

    let settings = match std::env::var("KEYGATE_CONFIG") {
        Ok(path) => Settings::load(path)?,
        Err(_) => Settings::from_env()?,
    };

    let shutdown = CancellationToken::new();
    let app_state = state::build(&settings, shutdown.clone()).await?;
    let app = routes::router(app_state);

    let listener = tokio::net::TcpListener::bind(&settings.gateway.listen_addr).await?;
    tracing::info!(addr = %settings.gateway.listen_addr, "gateway listening");

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("shutdown signal received");
        signal_token.cancel();
    });

    axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move { shutdown.cancelled().await }
        })
        .await?;

    // Background tasks (rotation driver, key refresh) share the token and
    // wind down with the listener.
    shutdown.cancel();
    tracing::info!("gateway stopped");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
