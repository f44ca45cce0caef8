//! Autonomous build watchdog.
//!
//! Polls build status on a fixed interval while the orchestrator is
//! otherwise idle and starts a remediation cycle when a *new* failed
//! build appears. The high-water mark of evaluated build numbers is the
//! de-duplication mechanism: the same failure is never reacted to twice.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use remedy_core::types::{BuildResult, BuildSnapshot, BuildStatus};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::orchestrator::{BuildServer, CycleEntry, CycleRunner};

/// What the watchdog decided about one observed status.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchAction {
    /// Nothing to do for this observation.
    Ignore,
    /// A new failed build; start a remediation cycle for it.
    Remediate(BuildSnapshot),
}

/// Watchdog over one job's build numbers.
#[derive(Debug)]
pub struct BuildWatchdog {
    interval: Duration,
    /// Highest build number already evaluated (0 = none yet).
    last_seen: AtomicU64,
}

impl BuildWatchdog {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_seen: AtomicU64::new(0),
        }
    }

    pub fn last_seen(&self) -> u64 {
        self.last_seen.load(Ordering::SeqCst)
    }

    /// Evaluate one observed status against the high-water mark.
    ///
    /// Only completed builds advance the mark, and only a strictly
    /// greater failed build yields a remediation.
    pub fn evaluate(&self, status: &BuildStatus, busy: bool) -> WatchAction {
        if busy {
            return WatchAction::Ignore;
        }
        let Some(snap) = status.snapshot() else {
            return WatchAction::Ignore;
        };
        if snap.building {
            return WatchAction::Ignore;
        }
        if snap.number <= self.last_seen() {
            return WatchAction::Ignore;
        }

        self.last_seen.store(snap.number, Ordering::SeqCst);

        if snap.result == Some(BuildResult::Failure) {
            WatchAction::Remediate(snap.clone())
        } else {
            debug!(number = snap.number, "recorded completed build");
            WatchAction::Ignore
        }
    }

    /// Periodic poll loop; runs until cancelled.
    pub async fn run<B: BuildServer>(
        self: Arc<Self>,
        server: Arc<B>,
        runner: Arc<dyn CycleRunner>,
        cancel: CancellationToken,
    ) {
        info!(interval_sec = self.interval.as_secs(), "watchdog started");
        loop {
            tokio::select! {
                () = tokio::time::sleep(self.interval) => {}
                () = cancel.cancelled() => {
                    info!("watchdog stopped");
                    return;
                }
            }

            // Never compete with a cycle in flight; the same failure will
            // still be there on the next tick.
            if runner.status().is_processing {
                continue;
            }

            let status = match server.check_build_status().await {
                Ok(status) => status,
                Err(err) => {
                    warn!(error = %err, "watchdog status check failed");
                    continue;
                }
            };

            if let WatchAction::Remediate(snap) = self.evaluate(&status, false) {
                info!(number = snap.number, "watchdog observed a new failed build");
                let report = runner
                    .run_cycle(CycleEntry::ObservedFailure(snap), cancel.clone())
                    .await;
                info!(
                    outcome = report.outcome.as_str(),
                    message = %report.message,
                    "watchdog-initiated cycle finished"
                );
            }
        }
    }
}
