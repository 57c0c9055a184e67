//! Scheduled rotation driver.

use crate::RotationManager;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Long-lived task polling non-terminal rotations.
///
/// Each tick walks the tracked clients and advances whatever is time-due;
/// the per-client lease inside the manager keeps concurrent driver
/// instances from doubling up. Cancels cleanly on shutdown.
pub struct RotationDriver {
    manager: Arc<RotationManager>,
    check_interval: Duration,
}

impl RotationDriver {
    pub fn new(manager: Arc<RotationManager>, check_interval: Duration) -> Self {
        Self {
            manager,
            check_interval,
        }
    }

    /// Run until `shutdown` fires. Spawn this on its own task.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.check_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.check_interval.as_secs(),
            "rotation driver started"
        );
        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick_all().await,
                () = shutdown.cancelled() => {
                    tracing::info!("rotation driver shutting down");
                    return;
                }
            }
        }
    }

    /// One full pass over the tracked rotations.
    pub async fn tick_all(&self) {
        let clients = match self.manager.tracked_clients().await {
            Ok(clients) => clients,
            Err(e) => {
                tracing::warn!(error = %e, "could not list tracked rotations");
                return;
            }
        };

        for client_id in clients {
            match self.manager.tick(&client_id).await {
                Ok(Some(record)) => tracing::info!(
                    client_id = %client_id,
                    state = %record.current_state,
                    "rotation advanced by driver"
                ),
                Ok(None) => {}
                Err(e) => tracing::warn!(
                    client_id = %client_id,
                    error = %e,
                    "driver tick failed for client"
                ),
            }
        }
    }
}
