//! # Job abstraction.
//!
//! This module defines the [`Job`] trait (async, cancelable) run by the
//! [`WorkerPool`](crate::WorkerPool). The common handle type is [`JobRef`], an
//! `Arc<dyn Job>` suitable for sharing across the runtime.
//!
//! A job receives a [`CancellationToken`] and should check it to stop
//! cooperatively when the pool shuts down.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::JobError;

/// # Asynchronous, cancelable unit of background work.
///
/// # Example
/// ```
/// use tokio_util::sync::CancellationToken;
/// use async_trait::async_trait;
/// use arachne::{Job, JobError};
///
/// struct Reindex;
///
/// #[async_trait]
/// impl Job for Reindex {
///     fn name(&self) -> &str { "reindex" }
///
///     async fn run(&self, ctx: CancellationToken) -> Result<(), JobError> {
///         if ctx.is_cancelled() {
///             return Err(JobError::Canceled);
///         }
///         // do work...
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Job: Send + Sync + 'static {
    /// Human-readable job name, reported for stuck jobs on shutdown.
    fn name(&self) -> &str;

    /// Executes the job until completion or cancellation.
    ///
    /// Implementations should check `ctx.is_cancelled()` and return
    /// [`JobError::Canceled`] promptly.
    async fn run(&self, ctx: CancellationToken) -> Result<(), JobError>;
}

/// Shared handle to a job object.
pub type JobRef = Arc<dyn Job>;

/// Pool-assigned job identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub(crate) u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}
