//! # Service contract
//!
//! A [`Service`] is a named, long-lived component that the broker initializes
//! exactly once before admitting it. During [`Service::initialize`] it
//! receives a [`Registration`] through which it subscribes listeners; those
//! subscriptions only become visible to dispatch once initialization returned
//! `Ok` and the broker committed the registration.
//!
//! ## Example
//! ```rust
//! use arachne::{ApplicationShutdown, ListenerError, Registration, Service, ServiceError};
//! use async_trait::async_trait;
//!
//! struct Cache;
//!
//! #[async_trait]
//! impl Service for Cache {
//!     fn name(&self) -> &str { "cache" }
//!
//!     async fn initialize(&self, reg: &Registration) -> Result<(), ServiceError> {
//!         reg.listen(|_ev: ApplicationShutdown| async move {
//!             // flush...
//!             Ok::<_, ListenerError>(())
//!         })
//!         .await?;
//!         Ok(())
//!     }
//! }
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::broker::Broker;
use crate::error::{BrokerError, ListenerError, ServiceError};
use crate::events::EventType;

/// Broker-assigned identity of a service (unique per broker).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceId(pub(crate) u64);

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle naming a pending or registered service.
///
/// Returned by [`Broker::register_service`] and available inside
/// `initialize` via [`Registration::service`]. Keep it to subscribe more
/// listeners after initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceHandle {
    id: ServiceId,
    name: Arc<str>,
}

impl ServiceHandle {
    pub(crate) fn new(id: ServiceId, name: Arc<str>) -> Self {
        Self { id, name }
    }

    /// Broker-assigned id.
    pub fn id(&self) -> ServiceId {
        self.id
    }

    /// Diagnostic name reported by [`Service::name`].
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.id)
    }
}

/// Contract for components registered at the broker.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Human-readable name (for logs only, not a lookup key).
    fn name(&self) -> &str;

    /// One-time setup, run by [`Broker::register_service`] before admission.
    ///
    /// May perform I/O and subscribe listeners through `registration`.
    /// Returning an error (or panicking) aborts the registration and discards
    /// every listener subscribed here.
    async fn initialize(&self, registration: &Registration) -> Result<(), ServiceError>;
}

/// Registration context handed to [`Service::initialize`].
pub struct Registration {
    broker: Broker,
    service: ServiceHandle,
}

impl Registration {
    pub(crate) fn new(broker: Broker, service: ServiceHandle) -> Self {
        Self { broker, service }
    }

    /// The broker the service is being registered at.
    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    /// Handle of the service being registered.
    pub fn service(&self) -> &ServiceHandle {
        &self.service
    }

    /// Subscribes `listener` for events of type `E` on behalf of this service.
    ///
    /// Shorthand for [`Broker::register_event_listener`] with
    /// [`Registration::service`].
    pub async fn listen<E, F, Fut>(&self, listener: F) -> Result<(), BrokerError>
    where
        E: EventType,
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ListenerError>> + Send + 'static,
    {
        self.broker
            .register_event_listener(&self.service, listener)
            .await
    }
}
