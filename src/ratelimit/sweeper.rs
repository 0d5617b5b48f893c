//! Periodic removal of expired windows.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::backend::WindowBackend;

/// Default time between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Handle to a background task that sweeps a window backend.
///
/// Stop it with [`Sweeper::stop`]. Dropping a running sweeper aborts the task.
pub struct Sweeper {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    /// Spawn a sweep task on the current tokio runtime.
    ///
    /// The first sweep happens one `interval` after start. `interval` must be non-zero.
    pub fn start<B: WindowBackend + 'static>(store: Arc<B>, interval: Duration) -> Self {
        let (shutdown, mut stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let removed = store.sweep();
                        debug!(removed = removed, "Swept expired rate limit windows");
                    }
                }
            }

            debug!("Sweeper task exiting");
        });

        info!(interval_secs = interval.as_secs(), "Started rate limit sweeper");

        Self {
            shutdown: Some(shutdown),
            handle: Some(handle),
        }
    }

    /// Whether the sweep task is still alive.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the sweep task and wait for it to exit.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            // The task may already be gone; nothing to signal then.
            let _ = shutdown.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Sweeper task ended abnormally");
            }
        }
        info!("Stopped rate limit sweeper");
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
