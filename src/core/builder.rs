use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::broker::{Broker, Service};
use crate::config::Config;
use crate::core::Runtime;
use crate::pool::WorkerPool;

/// Builder for a [`Runtime`].
///
/// Services added here are registered before the ones passed to
/// [`Runtime::start`] / [`Runtime::run`], in insertion order.
pub struct RuntimeBuilder {
    cfg: Config,
    services: Vec<Arc<dyn Service>>,
}

impl RuntimeBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            services: Vec::new(),
        }
    }

    /// Adds a service registered ahead of the ones passed at start.
    pub fn with_service(mut self, service: Arc<dyn Service>) -> Self {
        self.services.push(service);
        self
    }

    /// Adds the built-in [`EventLog`](crate::EventLog) as the first service.
    ///
    /// Requires the `logging` feature flag.
    #[cfg(feature = "logging")]
    pub fn with_event_log(mut self) -> Self {
        self.services.insert(0, Arc::new(crate::services::EventLog::new()));
        self
    }

    /// Builds the runtime: spawns the broker's registry worker and creates
    /// the worker pool.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> Runtime {
        let broker = Broker::new(&self.cfg);
        let pool = WorkerPool::new(&self.cfg);
        Runtime::new_internal(self.cfg, broker, pool, self.services, CancellationToken::new())
    }
}
