//! Error types used by the broker, the runtime and background jobs.
//!
//! This module defines the error enums of the core:
//!
//! - [`BrokerError`] errors raised by the event broker itself.
//! - [`ServiceError`] errors returned by a service's `initialize` hook.
//! - [`ListenerError`] errors returned by an event listener.
//! - [`JobError`] errors raised by background jobs on the worker pool.
//! - [`RuntimeError`] errors raised by the runtime shutdown sequence.
//!
//! All of them provide `as_label` (a short stable snake_case label) for logs.
//! Domain errors of the workspace and the features live next to their modules.

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by the event broker.
///
/// Listener failures are **not** represented here: they are isolated per
/// listener and reported through [`DispatchReport`](crate::DispatchReport).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The registry worker has stopped (broker closed or runtime gone).
    #[error("event broker is closed")]
    Closed,

    /// The service handle does not belong to a pending or registered service.
    ///
    /// Returned when subscribing on behalf of a service whose initialization
    /// failed, or with a handle from another broker.
    #[error("service '{service}' is not registered at the broker")]
    UnknownService {
        /// Name of the offending service.
        service: String,
    },

    /// The service's `initialize` hook failed (error or panic); it was not admitted.
    #[error("initialization of service '{service}' failed: {reason}")]
    InitializationFailed {
        /// Name of the service.
        service: String,
        /// Error message or panic payload.
        reason: String,
    },
}

impl BrokerError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use arachne::BrokerError;
    ///
    /// assert_eq!(BrokerError::Closed.as_label(), "broker_closed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            BrokerError::Closed => "broker_closed",
            BrokerError::UnknownService { .. } => "broker_unknown_service",
            BrokerError::InitializationFailed { .. } => "broker_initialization_failed",
        }
    }
}

/// # Errors returned by [`Service::initialize`](crate::Service::initialize).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Subscribing a listener failed.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// The service could not set itself up.
    #[error("service setup failed: {error}")]
    Setup {
        /// The underlying error message.
        error: String,
    },
}

impl ServiceError {
    /// Convenience constructor for [`ServiceError::Setup`].
    pub fn setup(error: impl Into<String>) -> Self {
        ServiceError::Setup {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ServiceError::Broker(e) => e.as_label(),
            ServiceError::Setup { .. } => "service_setup_failed",
        }
    }
}

/// # Errors produced by a single listener invocation.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListenerError {
    /// Listener returned an error.
    #[error("listener failed: {error}")]
    Failed {
        /// The underlying error message.
        error: String,
    },

    /// Listener panicked; the panic was caught.
    #[error("listener panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },

    /// Listener exceeded the configured per-listener deadline.
    #[error("listener timed out after {timeout:?}")]
    Timeout {
        /// The deadline that was exceeded.
        timeout: Duration,
    },
}

impl ListenerError {
    /// Convenience constructor for [`ListenerError::Failed`].
    pub fn failed(error: impl Into<String>) -> Self {
        ListenerError::Failed {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ListenerError::Failed { .. } => "listener_failed",
            ListenerError::Panicked { .. } => "listener_panicked",
            ListenerError::Timeout { .. } => "listener_timeout",
        }
    }
}

/// # Errors produced by background jobs.
///
/// These represent failures of individual jobs submitted to the
/// [`WorkerPool`](crate::WorkerPool).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// Job execution exceeded its timeout duration.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Job execution failed.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Job panicked (or its blocking thread did).
    #[error("job panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },

    /// Job was cancelled because the pool is shutting down.
    #[error("context cancelled")]
    Canceled,
}

impl JobError {
    /// Convenience constructor for [`JobError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        JobError::Fail {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use arachne::JobError;
    /// use std::time::Duration;
    ///
    /// let err = JobError::Timeout { timeout: Duration::from_secs(1) };
    /// assert_eq!(err.as_label(), "job_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            JobError::Timeout { .. } => "job_timeout",
            JobError::Fail { .. } => "job_failed",
            JobError::Panicked { .. } => "job_panicked",
            JobError::Canceled => "job_canceled",
        }
    }
}

/// # Errors produced by the runtime.
///
/// These represent failures in the bootstrap/shutdown sequence itself.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some background jobs were still running.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Names of the jobs that did not finish in time.
        stuck: Vec<String>,
    },

    /// The broker stopped before the runtime finished its sequence.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// Registering the OS signal handlers failed.
    #[error("failed to listen for shutdown signals: {0}")]
    Signal(#[from] std::io::Error),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use arachne::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::Broker(_) => "runtime_broker",
            RuntimeError::Signal(_) => "runtime_signal",
        }
    }
}

/// Renders a caught panic payload as text.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
