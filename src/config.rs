//! # Global runtime configuration.
//!
//! Provides [`Config`] centralized settings for the broker, the worker pool
//! and the runtime shutdown sequence.
//!
//! ## Sentinel values
//! - `listener_timeout = 0s` → listeners have no deadline
//! - `max_concurrent_jobs = 0` → unlimited (no pool semaphore created)
//! - `job_timeout = 0s` → background jobs have no deadline

use std::time::Duration;

/// Global configuration for the runtime.
///
/// ## Field semantics
/// - `grace`: Maximum wait for background jobs on shutdown (`0s` = do not wait)
/// - `listener_timeout`: Per-listener deadline during dispatch (`0s` = none)
/// - `mailbox_capacity`: Registry worker mailbox size (min 1; clamped)
/// - `max_concurrent_jobs`: Worker pool concurrency limit (`0` = unlimited)
/// - `job_timeout`: Per-job deadline on the worker pool (`0s` = none)
///
/// Prefer the helper accessors over checking the `0` sentinels directly.
#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum time to wait for background jobs once shutdown starts.
    ///
    /// Jobs are cancelled via their `CancellationToken` first; if some are
    /// still running after `grace`, the runtime returns
    /// [`RuntimeError::GraceExceeded`](crate::RuntimeError::GraceExceeded).
    pub grace: Duration,

    /// Deadline applied to each listener invocation.
    ///
    /// A listener that exceeds it is reported as failed and dispatch moves on
    /// to the next listener.
    pub listener_timeout: Duration,

    /// Capacity of the registry worker's command mailbox.
    ///
    /// Callers wait for a free slot when it is full; it bounds memory, not
    /// throughput.
    pub mailbox_capacity: usize,

    /// Maximum number of background jobs running at once.
    pub max_concurrent_jobs: usize,

    /// Default deadline for background jobs.
    pub job_timeout: Duration,
}

impl Config {
    /// Returns the listener deadline as an `Option`.
    #[inline]
    pub fn listener_deadline(&self) -> Option<Duration> {
        if self.listener_timeout == Duration::ZERO {
            None
        } else {
            Some(self.listener_timeout)
        }
    }

    /// Returns the worker pool concurrency limit as an `Option`.
    ///
    /// - `None` → unlimited (no semaphore)
    /// - `Some(n)` → at most `n` concurrent jobs
    #[inline]
    pub fn concurrency_limit(&self) -> Option<usize> {
        if self.max_concurrent_jobs == 0 {
            None
        } else {
            Some(self.max_concurrent_jobs)
        }
    }

    /// Returns the default job deadline as an `Option`.
    #[inline]
    pub fn job_deadline(&self) -> Option<Duration> {
        if self.job_timeout == Duration::ZERO {
            None
        } else {
            Some(self.job_timeout)
        }
    }

    /// Returns the mailbox capacity clamped to a minimum of 1.
    #[inline]
    pub fn mailbox_capacity_clamped(&self) -> usize {
        self.mailbox_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `grace = 30s`
    /// - `listener_timeout = 0s` (no deadline)
    /// - `mailbox_capacity = 256`
    /// - `max_concurrent_jobs = 0` (unlimited)
    /// - `job_timeout = 0s` (no deadline)
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(30),
            listener_timeout: Duration::ZERO,
            mailbox_capacity: 256,
            max_concurrent_jobs: 0,
            job_timeout: Duration::ZERO,
        }
    }
}
