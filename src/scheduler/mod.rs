//! Background sweeper for the working directory.
//!
//! Runs as a single tokio task for the life of the process. The first sweep
//! happens as soon as the task starts; after that it sweeps once per
//! interval, independent of request load.
//!
//! Nothing stops a sweep from deleting a file that a slow client is still
//! downloading. The default one-hour age limit is far longer than any
//! realistic request plus transfer, which is what keeps that from happening.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::store::{ArtifactStore, EvictionReport};

/// How old a file may get and how often to look
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupPolicy {
    /// Files older than this are deleted
    pub max_age_secs: u64,

    /// Time between sweeps
    pub sweep_interval_secs: u64,
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self {
            max_age_secs: 3600,
            sweep_interval_secs: 1800,
        }
    }
}

impl CleanupPolicy {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Periodically evicts old artifacts from an [`ArtifactStore`]
#[derive(Clone)]
pub struct CleanupScheduler {
    store: Arc<ArtifactStore>,
    policy: CleanupPolicy,
}

impl CleanupScheduler {
    pub fn new(store: Arc<ArtifactStore>, policy: CleanupPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> CleanupPolicy {
        self.policy
    }

    /// Start the sweep loop on the runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    /// Sweep immediately, then once per interval, forever
    pub async fn run(&self) {
        tracing::info!(
            "Starting cleanup scheduler (interval: {:?}, max age: {:?})",
            self.policy.sweep_interval(),
            self.policy.max_age()
        );

        // The first tick completes immediately
        let mut ticker = interval(self.policy.sweep_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.sweep_once().await;
        }
    }

    /// One sweep, surfacing directory-level errors to the caller
    pub async fn sweep(&self) -> std::io::Result<EvictionReport> {
        self.store.evict_older_than(self.policy.max_age()).await
    }

    /// One sweep; errors are logged and never escape
    pub async fn sweep_once(&self) -> Option<EvictionReport> {
        match self.sweep().await {
            Ok(report) => {
                if !report.removed.is_empty() || report.failed > 0 {
                    tracing::info!(
                        removed = report.removed.len(),
                        failed = report.failed,
                        "Cleanup sweep finished"
                    );
                } else {
                    tracing::debug!("Cleanup sweep found nothing to remove");
                }
                Some(report)
            }
            Err(e) => {
                tracing::error!("Error during cleanup: {}", e);
                None
            }
        }
    }
}
