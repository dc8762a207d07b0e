//! # Live job tracker.
//!
//! Records which jobs are currently executing so that a shutdown that runs
//! out of grace can name the stuck ones.
//!
//! ```text
//! WorkerPool job wrapper ──► start(id, name) ... run ... finish(id)
//!                                      │
//!                                      ▼
//!                           HashMap<JobId, name>  ──► snapshot() (sorted names)
//! ```
//!
//! Jobs waiting for a concurrency permit are not "live" yet.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::pool::job::JobId;

/// Thread-safe set of running jobs.
#[derive(Default)]
pub(crate) struct JobTracker {
    state: RwLock<HashMap<JobId, Arc<str>>>,
}

impl JobTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Marks a job as running.
    pub(crate) async fn start(&self, id: JobId, name: Arc<str>) {
        self.state.write().await.insert(id, name);
    }

    /// Marks a job as finished. Unknown ids are ignored.
    pub(crate) async fn finish(&self, id: JobId) {
        self.state.write().await.remove(&id);
    }

    /// Returns the sorted names of running jobs (duplicates kept).
    pub(crate) async fn snapshot(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut live: Vec<String> = state.values().map(|n| n.to_string()).collect();
        live.sort_unstable();
        live
    }

    /// Number of running jobs. Jobs still waiting for a permit are not counted.
    pub(crate) async fn len(&self) -> usize {
        self.state.read().await.len()
    }
}
