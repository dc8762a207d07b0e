//! Background work: the [`WorkerPool`] and its job abstraction.
//!
//! - [`Job`] / [`JobRef`] async, cancelable unit of work
//! - [`JobFn`] closure-backed job
//! - [`WorkerPool`] tracked spawning, concurrency cap, timeouts, graceful drain
//! - [`JobHandle`] optional handle to await or abort a job

mod job;
mod job_fn;
#[allow(clippy::module_inception)]
mod pool;
mod tracker;

pub use job::{Job, JobId, JobRef};
pub use job_fn::JobFn;
pub use pool::{JobHandle, WorkerPool};
