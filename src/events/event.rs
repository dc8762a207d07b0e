//! # Events broadcast through the broker.
//!
//! The set of events is **closed**: [`Event`] is an enum with one variant per
//! payload struct, and [`EventKind`] is its plain discriminator. Listeners are
//! keyed by `EventKind`, and the [`EventType`] trait links each payload struct
//! to its kind so a listener can be written against the concrete payload type
//! without any cast.
//!
//! ## Ordering
//! Every payload carries a process-wide monotonic sequence number (`seq`) and a
//! wall-clock timestamp (`at`). Use `seq` to restore order across concurrent
//! dispatches.
//!
//! ## Example
//! ```rust
//! use arachne::{ApplicationStartup, Event, EventKind, EventType};
//!
//! let ev: Event = ApplicationStartup::now().into();
//! assert_eq!(ev.kind(), EventKind::ApplicationStartup);
//! assert!(ApplicationStartup::from_event(&ev).is_some());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::workspace::FileEntry;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

#[inline]
fn next_seq() -> u64 {
    EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed)
}

/// Discriminator of an [`Event`]. Subscriptions are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// All services are registered; the application is starting.
    ApplicationStartup,
    /// The application is shutting down.
    ApplicationShutdown,
    /// A file was added to the workspace.
    ResourceAdded,
    /// A workspace file received new content.
    ResourceUpdated,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [EventKind; 4] = [
        EventKind::ApplicationStartup,
        EventKind::ApplicationShutdown,
        EventKind::ResourceAdded,
        EventKind::ResourceUpdated,
    ];

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            EventKind::ApplicationStartup => "application_startup",
            EventKind::ApplicationShutdown => "application_shutdown",
            EventKind::ResourceAdded => "resource_added",
            EventKind::ResourceUpdated => "resource_updated",
        }
    }
}

/// Why the application is shutting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// An OS termination signal was observed.
    Signal,
    /// Shutdown was requested programmatically (e.g. a quit command).
    Requested,
}

/// Fired once after the bootstrap registered every service.
#[derive(Debug, Clone)]
pub struct ApplicationStartup {
    /// Global sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
}

impl ApplicationStartup {
    /// Creates the event stamped with the current time.
    pub fn now() -> Self {
        Self {
            seq: next_seq(),
            at: SystemTime::now(),
        }
    }
}

/// Fired once when the runtime starts shutting down.
#[derive(Debug, Clone)]
pub struct ApplicationShutdown {
    /// Global sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// What triggered the shutdown.
    pub reason: ShutdownReason,
}

impl ApplicationShutdown {
    /// Creates the event stamped with the current time.
    pub fn now(reason: ShutdownReason) -> Self {
        Self {
            seq: next_seq(),
            at: SystemTime::now(),
            reason,
        }
    }
}

/// A file entry with content was added to the workspace.
#[derive(Debug, Clone)]
pub struct ResourceAdded {
    /// Global sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// The new entry.
    pub file: FileEntry,
    /// Its content (shared, never copied per listener).
    pub content: Arc<[u8]>,
}

impl ResourceAdded {
    /// Creates the event stamped with the current time.
    pub fn new(file: FileEntry, content: Arc<[u8]>) -> Self {
        Self {
            seq: next_seq(),
            at: SystemTime::now(),
            file,
            content,
        }
    }
}

/// A workspace file received new content.
#[derive(Debug, Clone)]
pub struct ResourceUpdated {
    /// Global sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// The updated entry.
    pub file: FileEntry,
    /// The new content.
    pub content: Arc<[u8]>,
}

impl ResourceUpdated {
    /// Creates the event stamped with the current time.
    pub fn new(file: FileEntry, content: Arc<[u8]>) -> Self {
        Self {
            seq: next_seq(),
            at: SystemTime::now(),
            file,
            content,
        }
    }
}

/// An event fired through the [`Broker`](crate::Broker).
#[derive(Debug, Clone)]
pub enum Event {
    /// See [`ApplicationStartup`].
    ApplicationStartup(ApplicationStartup),
    /// See [`ApplicationShutdown`].
    ApplicationShutdown(ApplicationShutdown),
    /// See [`ResourceAdded`].
    ResourceAdded(ResourceAdded),
    /// See [`ResourceUpdated`].
    ResourceUpdated(ResourceUpdated),
}

impl Event {
    /// Returns the discriminator used to select listeners.
    pub fn kind(&self) -> EventKind {
        match self {
            Event::ApplicationStartup(_) => EventKind::ApplicationStartup,
            Event::ApplicationShutdown(_) => EventKind::ApplicationShutdown,
            Event::ResourceAdded(_) => EventKind::ResourceAdded,
            Event::ResourceUpdated(_) => EventKind::ResourceUpdated,
        }
    }

    /// Returns the global sequence number of the payload.
    pub fn seq(&self) -> u64 {
        match self {
            Event::ApplicationStartup(e) => e.seq,
            Event::ApplicationShutdown(e) => e.seq,
            Event::ResourceAdded(e) => e.seq,
            Event::ResourceUpdated(e) => e.seq,
        }
    }
}

/// Links a payload type to its [`EventKind`] and [`Event`] variant.
///
/// Implemented for every payload struct in this module; the set is closed.
pub trait EventType: Clone + Send + Sync + 'static {
    /// The discriminator of this payload type.
    const KIND: EventKind;

    /// Borrows the payload if `event` is of this type.
    fn from_event(event: &Event) -> Option<&Self>;
}

macro_rules! event_type {
    ($payload:ident) => {
        impl EventType for $payload {
            const KIND: EventKind = EventKind::$payload;

            #[inline]
            fn from_event(event: &Event) -> Option<&Self> {
                match event {
                    Event::$payload(inner) => Some(inner),
                    _ => None,
                }
            }
        }

        impl From<$payload> for Event {
            #[inline]
            fn from(inner: $payload) -> Self {
                Event::$payload(inner)
            }
        }
    };
}

event_type!(ApplicationStartup);
event_type!(ApplicationShutdown);
event_type!(ResourceAdded);
event_type!(ResourceUpdated);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        let startup: Event = ApplicationStartup::now().into();
        let shutdown: Event = ApplicationShutdown::now(ShutdownReason::Requested).into();

        assert_eq!(startup.kind(), ApplicationStartup::KIND);
        assert_eq!(shutdown.kind(), ApplicationShutdown::KIND);
        assert!(ApplicationStartup::from_event(&shutdown).is_none());
        assert!(ApplicationShutdown::from_event(&shutdown).is_some());
    }

    #[test]
    fn sequence_is_monotonic() {
        let a: Event = ApplicationStartup::now().into();
        let b: Event = ApplicationStartup::now().into();
        assert!(b.seq() > a.seq());
    }
}
