//! Runtime events: the closed set of payloads fired through the broker.
//!
//! ## Contents
//! - [`Event`], [`EventKind`] the event enum and its discriminator
//! - [`EventType`] typed link from a payload struct to its kind
//! - payloads: [`ApplicationStartup`], [`ApplicationShutdown`],
//!   [`ResourceAdded`], [`ResourceUpdated`]
//!
//! ## Quick reference
//! - **Producers**: `Runtime` (startup/shutdown), `WorkspaceService` (resources).
//! - **Consumers**: any service that subscribed through the broker.

mod event;

pub use event::{
    ApplicationShutdown, ApplicationStartup, Event, EventKind, EventType, ResourceAdded,
    ResourceUpdated, ShutdownReason,
};
