//! Background sweep that deactivates expired tokens.
//!
//! Validation already expires tokens lazily; the sweep only keeps the store
//! from accumulating stale active rows.

use crate::services::token::TokenManager;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub struct TokenReaper {
    manager: TokenManager,
    interval: Duration,
    shutdown_token: CancellationToken,
}

impl TokenReaper {
    pub fn new(manager: TokenManager, interval: Duration) -> Self {
        Self {
            manager,
            interval,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Token that stops the sweep loop when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(
                interval_seconds = self.interval.as_secs(),
                "Starting token reaper"
            );

            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = self.shutdown_token.cancelled() => {
                        tracing::info!("Token reaper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.manager.reap_expired().await {
                            tracing::error!(error = %e, "Token sweep failed");
                        }
                    }
                }
            }
        })
    }
}
