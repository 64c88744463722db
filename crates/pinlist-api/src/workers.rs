//! Background maintenance tasks. Both stop when the shutdown token fires.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::auth::AppState;
use crate::rate_limit::{RateLimiter, SWEEP_INTERVAL};

/// Deletes expired tokens every `every`.
pub fn spawn_token_sweeper(
    state: AppState,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let s = state.clone();
                    match tokio::task::spawn_blocking(move || s.db.sweep_expired_tokens()).await {
                        Ok(Ok(removed)) => info!(removed, "Token sweep complete"),
                        Ok(Err(e)) => error!(error = %e, "Token sweep failed"),
                        Err(e) => error!(error = %e, "Token sweep task panicked"),
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("Token sweeper shutting down");
                    break;
                }
            }
        }
    })
}

pub fn spawn_rate_limit_sweeper(
    limiter: Arc<RateLimiter>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(limiter.run_sweeper(SWEEP_INTERVAL, shutdown))
}
