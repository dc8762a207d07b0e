//! # Function-backed job (`JobFn`)
//!
//! [`JobFn`] wraps a closure `F: Fn(CancellationToken) -> Fut`, producing a
//! fresh future per run. Shared state must be captured explicitly (`Arc<...>`).
//!
//! ## Example
//! ```rust
//! use tokio_util::sync::CancellationToken;
//! use arachne::{JobError, JobFn, JobRef};
//!
//! let j: JobRef = JobFn::arc("index", |ctx: CancellationToken| async move {
//!     if ctx.is_cancelled() {
//!         return Err(JobError::Canceled);
//!     }
//!     Ok(())
//! });
//!
//! assert_eq!(j.name(), "index");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::JobError;
use crate::pool::job::Job;

/// Function-backed job implementation.
#[derive(Debug)]
pub struct JobFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> JobFn<F> {
    /// Creates a new function-backed job.
    ///
    /// Prefer [`JobFn::arc`] when you immediately need a [`JobRef`](crate::JobRef).
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the job and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> Job for JobFn<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: CancellationToken) -> Result<(), JobError> {
        (self.f)(ctx).await
    }
}
