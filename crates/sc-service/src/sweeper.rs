//! Staleness sweeper background task.
//!
//! Periodically evicts subscriptions whose owner stopped revalidating them
//! (clients that vanished without terminating). Eviction releases each
//! subscription's admission budget.
//!
//! # Lifecycle
//!
//! The host owns the sweeper through [`crate::service::SubscriptionService`]
//! and drives it with [`StalenessSweeper::start`] and
//! [`StalenessSweeper::stop`]. Nothing runs until `start()` is called. On
//! `stop()` the cancellation token is triggered and the task is awaited, so
//! no sweep is in flight once `stop()` returns.

use crate::admission::AdmissionControl;
use crate::observability::{metrics, SubscriptionMetrics};
use crate::registry::SubscriptionRegistry;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

/// Default interval between sweeps (5 minutes).
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// One staleness pass over the registry.
#[derive(Clone)]
struct Sweep {
    registry: Arc<SubscriptionRegistry>,
    admission: Arc<dyn AdmissionControl>,
    tracker: Arc<SubscriptionMetrics>,
}

impl Sweep {
    fn run(&self) -> usize {
        let evicted = self.registry.cleanup();
        for entry in &evicted {
            self.admission.release(&entry.subscription_id);
        }

        let count = evicted.len();
        if count > 0 {
            self.tracker.record_evicted_stale(count as u64);
            metrics::record_stale_evictions(count as u64);
            metrics::record_subscriptions_terminated("stale", count as u64);
            info!(
                target: "sc.task.staleness_sweeper",
                evicted = count,
                "Evicted stale subscriptions"
            );
        } else {
            debug!(target: "sc.task.staleness_sweeper", "No stale subscriptions");
        }
        count
    }
}

struct RunningTask {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owner of the recurring staleness sweep.
pub struct StalenessSweeper {
    sweep: Sweep,
    interval: Duration,
    task: Mutex<Option<RunningTask>>,
}

impl StalenessSweeper {
    #[must_use]
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        admission: Arc<dyn AdmissionControl>,
        tracker: Arc<SubscriptionMetrics>,
        interval: Duration,
    ) -> Self {
        Self {
            sweep: Sweep {
                registry,
                admission,
                tracker,
            },
            interval,
            task: Mutex::new(None),
        }
    }

    fn task(&self) -> MutexGuard<'_, Option<RunningTask>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one sweep immediately. Returns the number of evicted subscriptions.
    pub fn run_once(&self) -> usize {
        self.sweep.run()
    }

    /// Spawn the recurring sweep on the current Tokio runtime.
    ///
    /// Returns `false` if the sweeper is already running.
    pub fn start(&self) -> bool {
        let mut task = self.task();
        if task.is_some() {
            return false;
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(run_sweeper(
            self.sweep.clone(),
            self.interval,
            cancel_token.clone(),
        ));
        *task = Some(RunningTask {
            cancel_token,
            handle,
        });
        true
    }

    /// Cancel the recurring sweep and wait for it to exit.
    ///
    /// Returns `false` if the sweeper was not running.
    pub async fn stop(&self) -> bool {
        let Some(RunningTask {
            cancel_token,
            handle,
        }) = self.task().take()
        else {
            return false;
        };

        cancel_token.cancel();
        if let Err(e) = handle.await {
            error!(
                target: "sc.task.staleness_sweeper",
                error = %e,
                "Staleness sweeper task failed"
            );
        }
        true
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task().is_some()
    }
}

#[instrument(skip_all, name = "sc.task.staleness_sweeper")]
async fn run_sweeper(sweep: Sweep, period: Duration, cancel_token: CancellationToken) {
    info!(
        target: "sc.task.staleness_sweeper",
        interval_seconds = period.as_secs(),
        "Starting staleness sweeper task"
    );

    // First sweep one full period after start.
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                sweep.run();
            }
            () = cancel_token.cancelled() => {
                info!(
                    target: "sc.task.staleness_sweeper",
                    "Staleness sweeper received shutdown signal, exiting"
                );
                break;
            }
        }
    }

    info!(target: "sc.task.staleness_sweeper", "Staleness sweeper task stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::admission::AdmissionController;

    fn sweeper() -> StalenessSweeper {
        let tracker = SubscriptionMetrics::new();
        let registry = Arc::new(SubscriptionRegistry::new(
            Duration::from_secs(600),
            Arc::clone(&tracker),
        ));
        StalenessSweeper::new(
            registry,
            Arc::new(AdmissionController::default()),
            tracker,
            DEFAULT_SWEEP_INTERVAL,
        )
    }

    #[test]
    fn test_default_sweep_interval() {
        assert_eq!(DEFAULT_SWEEP_INTERVAL, Duration::from_secs(300));
    }

    #[test]
    fn test_run_once_on_empty_registry() {
        assert_eq!(sweeper().run_once(), 0);
    }

    #[tokio::test]
    async fn test_start_stop_are_idempotent() {
        let sweeper = sweeper();
        assert!(!sweeper.is_running());
        assert!(!sweeper.stop().await);

        assert!(sweeper.start());
        assert!(!sweeper.start());
        assert!(sweeper.is_running());

        assert!(sweeper.stop().await);
        assert!(!sweeper.is_running());
        assert!(!sweeper.stop().await);
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let sweeper = sweeper();
        assert!(sweeper.start());
        assert!(sweeper.stop().await);
        assert!(sweeper.start());
        assert!(sweeper.stop().await);
    }
}
