//! # Runtime: bootstrap, startup and graceful shutdown.
//!
//! The [`Runtime`] owns the [`Broker`], the [`WorkerPool`] and the
//! [`Config`]. It is the only place that fires the application lifecycle
//! events.
//!
//! ## Lifecycle
//! ```text
//! Runtime::builder(cfg).build()          → Broker::new + WorkerPool::new
//!
//! run(services):
//!   start(services)
//!     ├─► register_service(s) for s in preset ++ services   (in order)
//!     │      └─ InitializationFailed → logged, skipped
//!     └─► fire_event(ApplicationStartup)
//!   wait:
//!     ├─ OS signal            → reason = Signal
//!     └─ request_shutdown()   → reason = Requested
//!   stop(reason)
//!     ├─► fire_event(ApplicationShutdown { reason })
//!     ├─► pool.shutdown(cfg.grace)   → Ok | GraceExceeded { stuck }
//!     └─► broker.close()
//! ```
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use arachne::{Config, Runtime, Service};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), arachne::RuntimeError> {
//!     let runtime = Runtime::builder(Config::default()).build();
//!
//!     // A quit command would normally do this from another task.
//!     runtime.request_shutdown();
//!
//!     let services: Vec<Arc<dyn Service>> = Vec::new();
//!     runtime.run(services).await
//! }
//! ```

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::broker::{Broker, Service, ServiceHandle};
use crate::config::Config;
use crate::core::builder::RuntimeBuilder;
use crate::core::shutdown;
use crate::error::{BrokerError, RuntimeError};
use crate::events::{ApplicationShutdown, ApplicationStartup, ShutdownReason};
use crate::pool::WorkerPool;

/// Application runtime. Cheap to clone; clones share broker, pool and
/// shutdown trigger.
#[derive(Clone)]
pub struct Runtime {
    cfg: Config,
    broker: Broker,
    pool: WorkerPool,
    preset: Vec<Arc<dyn Service>>,
    shutdown: CancellationToken,
}

impl Runtime {
    /// Returns a builder for a runtime with `cfg`.
    pub fn builder(cfg: Config) -> RuntimeBuilder {
        RuntimeBuilder::new(cfg)
    }

    pub(crate) fn new_internal(
        cfg: Config,
        broker: Broker,
        pool: WorkerPool,
        preset: Vec<Arc<dyn Service>>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            cfg,
            broker,
            pool,
            preset,
            shutdown,
        }
    }

    /// The event broker.
    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    /// The background worker pool.
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// The runtime configuration.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Registers the preset services followed by `services`, in order, then
    /// fires [`ApplicationStartup`].
    ///
    /// A service whose initialization fails is logged and skipped. Returns the
    /// handles of the services that were admitted.
    pub async fn start(
        &self,
        services: Vec<Arc<dyn Service>>,
    ) -> Result<Vec<ServiceHandle>, RuntimeError> {
        let mut admitted = Vec::new();
        for service in self.preset.iter().cloned().chain(services) {
            match self.broker.register_service(service).await {
                Ok(handle) => admitted.push(handle),
                Err(e @ BrokerError::InitializationFailed { .. }) => {
                    error!(error = %e, label = e.as_label(), "service skipped");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let report = self.broker.fire_event(ApplicationStartup::now()).await?;
        info!(
            services = admitted.len(),
            listeners = report.matched(),
            "application started"
        );
        Ok(admitted)
    }

    /// Fires [`ApplicationShutdown`], drains the worker pool within
    /// `cfg.grace` and closes the broker.
    ///
    /// The broker is closed even if the pool exceeded its grace period; the
    /// grace error is returned afterwards.
    pub async fn stop(&self, reason: ShutdownReason) -> Result<(), RuntimeError> {
        info!(?reason, "application shutting down");
        self.shutdown.cancel();

        let fired = self
            .broker
            .fire_event(ApplicationShutdown::now(reason))
            .await;
        let drained = self.pool.shutdown(self.cfg.grace).await;
        self.broker.close();

        fired?;
        drained
    }

    /// Runs the full lifecycle: [`start`](Runtime::start), wait for a
    /// termination signal or [`request_shutdown`](Runtime::request_shutdown),
    /// then [`stop`](Runtime::stop).
    pub async fn run(&self, services: Vec<Arc<dyn Service>>) -> Result<(), RuntimeError> {
        self.start(services).await?;

        let reason = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => ShutdownReason::Requested,
            signal = shutdown::wait_for_termination() => match signal {
                Ok(name) => {
                    info!(signal = name, "termination signal received");
                    ShutdownReason::Signal
                }
                Err(e) => {
                    warn!(error = %e, "cannot listen for signals; waiting for a shutdown request");
                    self.shutdown.cancelled().await;
                    ShutdownReason::Requested
                }
            },
        };

        self.stop(reason).await
    }

    /// Asks a running [`Runtime::run`] to shut down. Idempotent.
    pub fn request_shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Completes once shutdown was requested or started.
    pub async fn shutdown_requested(&self) {
        self.shutdown.cancelled().await;
    }

    /// True once shutdown was requested or started.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
