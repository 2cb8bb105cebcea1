//! Periodic table refresh.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::view_model::{RebuildOutcome, ViewModel};

/// Default refresh cadence.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(2000);

/// Drives `ViewModel::try_rebuild` on a fixed interval until stopped.
pub struct RefreshScheduler {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl RefreshScheduler {
    /// Start the refresh loop. The first tick is one full period away; the
    /// caller is expected to have rebuilt once already.
    pub fn spawn(view: Arc<ViewModel>, period: Duration) -> Result<Self> {
        if period.is_zero() {
            bail!("refresh interval must be greater than zero");
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // Skip the immediate first tick
            interval.tick().await;

            info!(interval_ms = period.as_millis() as u64, "refresh scheduler started");
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match view.try_rebuild().await {
                            Some(RebuildOutcome::Rebuilt { rows, visible, .. }) => {
                                debug!(rows, visible, "refresh tick");
                            }
                            Some(RebuildOutcome::NoData) | None => {}
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("refresh scheduler stopped");
        });

        Ok(Self { stop_tx, handle })
    }

    /// Stop the loop and wait for it to exit.
    pub async fn stop(mut self) {
        let _ = self.stop_tx.send(true);
        let _ = (&mut self.handle).await;
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
