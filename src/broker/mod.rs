//! Event broker: service registry plus typed, synchronous event dispatch.
//!
//! ## Contents
//! - [`Broker`] cloneable handle; registers services and fires events
//! - [`Service`], [`Registration`] the service contract and its init context
//! - [`ServiceHandle`], [`ServiceId`] identity of a registered service
//! - [`DispatchReport`], [`ListenerFailure`] outcome of one dispatch
//!
//! Internals (`registry`, `listener`) are crate-private: the registry worker
//! and the type-erasure of listeners.

#[allow(clippy::module_inception)]
mod broker;
mod listener;
mod registry;
mod service;

pub use broker::Broker;
pub use listener::{DispatchReport, ListenerFailure};
pub use service::{Registration, Service, ServiceHandle, ServiceId};
