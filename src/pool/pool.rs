//! # Worker pool: tracked background jobs with cancellation and grace.
//!
//! Listeners must not block dispatch with heavy work; they hand it to the
//! [`WorkerPool`] instead. Every job is spawned on a [`TaskTracker`], so a
//! fire-and-forget job is never lost: [`WorkerPool::shutdown`] cancels and
//! waits for all of them.
//!
//! ## Job flow
//! ```text
//! submit(job) / submit_blocking(name, f)
//!   └─► tracker.spawn(async {
//!         acquire permit (optional, cancel-aware)  ── cancelled → Canceled
//!         alive.start(id, name)
//!         run_once(job, child_token, timeout)      ── Ok / Fail / Panicked / Timeout / Canceled
//!         alive.finish(id)
//!       })
//!   └─► JobHandle { id, name, join }   (drop = fire-and-forget, wait() = result)
//!
//! shutdown(grace)
//!   ├─► tracker.close(); token.cancel()     → propagates to child tokens
//!   └─► timeout(grace, tracker.wait())
//!          ├─ Ok       → Ok(())
//!          └─ elapsed  → GraceExceeded { stuck: alive.snapshot() }
//! ```
//!
//! ## Rules
//! - Each job runs with a **child token** of the pool token.
//! - On timeout the child token is cancelled and `Timeout` is returned.
//! - Jobs submitted after shutdown started complete immediately with `Canceled`.
//! - A blocking closure that ignores its token keeps its thread busy after a
//!   timeout; only the job result is abandoned.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{JobError, RuntimeError, panic_message};
use crate::pool::job::{JobId, JobRef};
use crate::pool::tracker::JobTracker;

struct Inner {
    token: CancellationToken,
    tasks: TaskTracker,
    semaphore: Option<Arc<Semaphore>>,
    timeout: Option<Duration>,
    alive: JobTracker,
    next_id: AtomicU64,
}

/// Cloneable handle to the background job pool.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<Inner>,
}

impl WorkerPool {
    /// Creates a pool using `max_concurrent_jobs` and `job_timeout` from `cfg`.
    pub fn new(cfg: &Config) -> Self {
        Self {
            inner: Arc::new(Inner {
                token: CancellationToken::new(),
                tasks: TaskTracker::new(),
                semaphore: cfg.concurrency_limit().map(Semaphore::new).map(Arc::new),
                timeout: cfg.job_deadline(),
                alive: JobTracker::new(),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Spawns an async job. Must be called from within a Tokio runtime.
    pub fn submit(&self, job: JobRef) -> JobHandle {
        let name: Arc<str> = job.name().into();
        self.spawn(name, move |ctx| async move { job.run(ctx).await })
    }

    /// Runs a CPU-bound closure on Tokio's blocking thread pool.
    ///
    /// The closure gets the job's cancellation token and may poll it between
    /// work units.
    pub fn submit_blocking<F>(&self, name: impl Into<Arc<str>>, f: F) -> JobHandle
    where
        F: FnOnce(CancellationToken) -> Result<(), JobError> + Send + 'static,
    {
        self.spawn(name.into(), move |ctx| async move {
            tokio::task::spawn_blocking(move || f(ctx))
                .await
                .map_err(join_error)?
        })
    }

    /// Cancels every job and waits up to `grace` for all of them to finish.
    ///
    /// Returns [`RuntimeError::GraceExceeded`] with the names of the jobs
    /// still running when the grace period ran out.
    pub async fn shutdown(&self, grace: Duration) -> Result<(), RuntimeError> {
        let inner = &self.inner;
        inner.tasks.close();
        inner.token.cancel();
        info!(
            jobs = inner.tasks.len(),
            running = inner.alive.len().await,
            ?grace,
            "draining worker pool"
        );

        match time::timeout(grace, inner.tasks.wait()).await {
            Ok(()) => {
                info!("all jobs stopped within grace");
                Ok(())
            }
            Err(_elapsed) => {
                let stuck = inner.alive.snapshot().await;
                warn!(?grace, ?stuck, "grace exceeded");
                Err(RuntimeError::GraceExceeded { grace, stuck })
            }
        }
    }

    /// Names of the jobs currently executing, sorted.
    pub async fn live_jobs(&self) -> Vec<String> {
        self.inner.alive.snapshot().await
    }

    /// True once [`WorkerPool::shutdown`] was called.
    pub fn is_closed(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    fn spawn<F, Fut>(&self, name: Arc<str>, make: F) -> JobHandle
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), JobError>> + Send + 'static,
    {
        let id = JobId(self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let inner = Arc::clone(&self.inner);
        let job_name = Arc::clone(&name);

        let join = self.inner.tasks.spawn(async move {
            let child = inner.token.child_token();

            let _permit = match &inner.semaphore {
                Some(sem) => tokio::select! {
                    _ = child.cancelled() => return Err(JobError::Canceled),
                    permit = Arc::clone(sem).acquire_owned() => match permit {
                        Ok(p) => Some(p),
                        Err(_closed) => return Err(JobError::Canceled),
                    },
                },
                None => None,
            };
            if child.is_cancelled() {
                debug!(job = %job_name, %id, "job canceled before start");
                return Err(JobError::Canceled);
            }

            inner.alive.start(id, Arc::clone(&job_name)).await;
            debug!(job = %job_name, %id, "job started");
            let res = run_once(make(child.clone()), &child, inner.timeout).await;
            inner.alive.finish(id).await;

            match &res {
                Ok(()) => debug!(job = %job_name, %id, "job finished"),
                Err(JobError::Canceled) => debug!(job = %job_name, %id, "job canceled"),
                Err(e) => warn!(job = %job_name, %id, error = %e, label = e.as_label(), "job failed"),
            }
            res
        });

        JobHandle { id, name, join }
    }
}

/// Executes one job future with panic capture and an optional deadline.
///
/// On timeout the job's token is cancelled so cooperative work can stop.
async fn run_once<Fut>(
    fut: Fut,
    child: &CancellationToken,
    timeout: Option<Duration>,
) -> Result<(), JobError>
where
    Fut: Future<Output = Result<(), JobError>>,
{
    let fut = AssertUnwindSafe(fut).catch_unwind();
    let outcome = match timeout {
        Some(dur) => match time::timeout(dur, fut).await {
            Ok(outcome) => outcome,
            Err(_elapsed) => {
                child.cancel();
                return Err(JobError::Timeout { timeout: dur });
            }
        },
        None => fut.await,
    };

    outcome.unwrap_or_else(|panic_err| {
        Err(JobError::Panicked {
            info: panic_message(&*panic_err),
        })
    })
}

fn join_error(err: JoinError) -> JobError {
    if err.is_panic() {
        JobError::Panicked {
            info: panic_message(&*err.into_panic()),
        }
    } else {
        JobError::Canceled
    }
}

/// Handle to a submitted job. Dropping it detaches the job (it stays tracked).
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    name: Arc<str>,
    join: JoinHandle<Result<(), JobError>>,
}

impl JobHandle {
    /// Pool-assigned id.
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Job name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Waits for the job and returns its result.
    pub async fn wait(self) -> Result<(), JobError> {
        self.join.await.map_err(join_error)?
    }

    /// Aborts the job at its next await point.
    pub fn abort(&self) {
        self.join.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use tokio::sync::oneshot;
    use tracing_test::traced_test;

    use super::*;
    use crate::pool::JobFn;

    fn pool_with(max_concurrent_jobs: usize, job_timeout: Duration) -> WorkerPool {
        WorkerPool::new(&Config {
            max_concurrent_jobs,
            job_timeout,
            ..Config::default()
        })
    }

    #[tokio::test]
    async fn submitted_job_runs_and_reports() {
        let pool = WorkerPool::new(&Config::default());
        let ok = pool.submit(JobFn::arc("ok", |_ctx: CancellationToken| async {
            Ok::<_, JobError>(())
        }));
        let bad = pool.submit(JobFn::arc("bad", |_ctx: CancellationToken| async {
            Err::<(), _>(JobError::fail("corrupt archive"))
        }));

        assert_eq!(ok.name(), "ok");
        assert_ne!(ok.id(), bad.id());
        assert_eq!(ok.wait().await, Ok(()));
        assert_eq!(bad.wait().await.unwrap_err().as_label(), "job_failed");
    }

    #[tokio::test]
    async fn panics_are_reported_not_propagated() {
        let pool = WorkerPool::new(&Config::default());
        let async_job = pool.submit(JobFn::arc("boom", |_ctx: CancellationToken| async {
            let explode = true;
            if explode {
                panic!("async boom");
            }
            Ok::<_, JobError>(())
        }));
        let blocking = pool.submit_blocking("blocking-boom", |_ctx| -> Result<(), JobError> {
            panic!("blocking boom")
        });

        assert_eq!(
            async_job.wait().await,
            Err(JobError::Panicked {
                info: "async boom".into()
            })
        );
        assert_eq!(
            blocking.wait().await,
            Err(JobError::Panicked {
                info: "blocking boom".into()
            })
        );
    }

    #[tokio::test]
    async fn blocking_job_runs_off_the_runtime() {
        let pool = WorkerPool::new(&Config::default());
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);

        pool.submit_blocking("count", move |_ctx| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .wait()
        .await
        .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrency_cap_is_respected() {
        let pool = pool_with(2, Duration::ZERO);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let (running, peak) = (Arc::clone(&running), Arc::clone(&peak));
                pool.submit(JobFn::arc("capped", move |_ctx: CancellationToken| {
                    let (running, peak) = (Arc::clone(&running), Arc::clone(&peak));
                    async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, JobError>(())
                    }
                }))
            })
            .collect();
        for h in handles {
            h.wait().await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn job_timeout_cancels_the_job_token() {
        let pool = pool_with(0, Duration::from_millis(100));
        let (tx, rx) = oneshot::channel();
        let tx = std::sync::Mutex::new(Some(tx));

        let handle = pool.submit(JobFn::arc("slow", move |ctx: CancellationToken| {
            if let Some(tx) = tx.lock().unwrap().take() {
                let _ = tx.send(ctx.clone());
            }
            async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, JobError>(())
            }
        }));

        assert_eq!(
            handle.wait().await,
            Err(JobError::Timeout {
                timeout: Duration::from_millis(100)
            })
        );
        assert!(rx.await.unwrap().is_cancelled());
    }

    #[tokio::test]
    async fn shutdown_waits_for_detached_jobs() {
        let pool = WorkerPool::new(&Config::default());
        let done = Arc::new(AtomicUsize::new(0));
        let (started_tx, mut started_rx) = tokio::sync::mpsc::unbounded_channel::<()>();

        for _ in 0..3 {
            let (done, started_tx) = (Arc::clone(&done), started_tx.clone());
            // Handle dropped on purpose: fire-and-forget.
            pool.submit(JobFn::arc("cooperative", move |ctx: CancellationToken| {
                let (done, started_tx) = (Arc::clone(&done), started_tx.clone());
                async move {
                    let _ = started_tx.send(());
                    ctx.cancelled().await;
                    done.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(JobError::Canceled)
                }
            }));
        }
        for _ in 0..3 {
            started_rx.recv().await.unwrap();
        }

        pool.shutdown(Duration::from_secs(5)).await.unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert!(pool.live_jobs().await.is_empty());
        assert!(pool.is_closed());
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn stuck_job_is_named_when_grace_runs_out() {
        let pool = WorkerPool::new(&Config::default());
        let (started_tx, started_rx) = oneshot::channel::<()>();
        let started_tx = std::sync::Mutex::new(Some(started_tx));

        pool.submit(JobFn::arc("stubborn", move |_ctx: CancellationToken| {
            if let Some(tx) = started_tx.lock().unwrap().take() {
                let _ = tx.send(());
            }
            async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok::<_, JobError>(())
            }
        }));
        started_rx.await.unwrap();

        let err = pool.shutdown(Duration::from_millis(200)).await.unwrap_err();
        match err {
            RuntimeError::GraceExceeded { grace, stuck } => {
                assert_eq!(grace, Duration::from_millis(200));
                assert_eq!(stuck, ["stubborn"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(logs_contain("running=1"));
    }

    #[tokio::test]
    async fn submit_after_shutdown_is_canceled() {
        let pool = WorkerPool::new(&Config::default());
        pool.shutdown(Duration::from_secs(1)).await.unwrap();

        let handle = pool.submit(JobFn::arc("late", |_ctx: CancellationToken| async {
            Ok::<_, JobError>(())
        }));
        assert_eq!(handle.wait().await, Err(JobError::Canceled));
    }
}
