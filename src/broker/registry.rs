//! # Service registry - single-owner state behind the broker.
//!
//! The registry is owned by one dedicated task; every mutation and every
//! dispatch snapshot is a [`Command`] sent to that task. Commands are applied
//! one at a time and synchronously, so the command log is totally ordered and
//! no lock is ever held across a service's initialization or a listener call.
//!
//! ## Architecture
//! ```text
//! Broker (many clones) ── mpsc<Command> ──► registry worker ──► Registry::apply()
//!        ▲                                        │
//!        └────────────── oneshot reply ◄──────────┘
//!
//! Reserve(name)            → pending[id] = {handle, []}
//! Subscribe(handle, kind)  → pending[id].push(sub)  |  table[kind].push(sub)
//! Admit(id, service)       → services.push(..); table[kind] += pending[id] (in order)
//! Discard(id)              → drop pending[id] and its subscriptions
//! Snapshot(kind)           → table[kind].clone()
//! ```
//!
//! ## Rules
//! - A subscription is in `table` only if its service was admitted.
//! - `table[kind]` is in commit order: subscriptions of a pending service
//!   commit at admission, later ones commit when they arrive.
//! - Snapshots are clones of `Arc`s; iterating them never touches the registry.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::broker::listener::{ErasedListener, Subscription};
use crate::broker::{Service, ServiceHandle, ServiceId};
use crate::error::BrokerError;
use crate::events::EventKind;

/// Message understood by the registry worker.
pub(crate) enum Command {
    Reserve {
        name: Arc<str>,
        reply: oneshot::Sender<ServiceHandle>,
    },
    Subscribe {
        service: ServiceHandle,
        kind: EventKind,
        listener: ErasedListener,
        reply: oneshot::Sender<Result<(), BrokerError>>,
    },
    Admit {
        service: ServiceId,
        instance: Arc<dyn Service>,
        reply: oneshot::Sender<Result<(), BrokerError>>,
    },
    Discard {
        service: ServiceId,
    },
    Snapshot {
        kind: EventKind,
        reply: oneshot::Sender<Vec<Subscription>>,
    },
    Services {
        reply: oneshot::Sender<Vec<ServiceHandle>>,
    },
}

/// Service whose `initialize` is still running.
struct Pending {
    handle: ServiceHandle,
    subscriptions: Vec<Subscription>,
}

/// Admitted service. The instance is kept alive for the registry's lifetime.
struct Registered {
    handle: ServiceHandle,
    #[allow(dead_code)]
    instance: Arc<dyn Service>,
}

/// Registry state. Only ever touched by the registry worker.
#[derive(Default)]
pub(crate) struct Registry {
    next_id: u64,
    pending: HashMap<ServiceId, Pending>,
    services: Vec<Registered>,
    table: HashMap<EventKind, Vec<Subscription>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Applies one command. Reply send errors mean the caller went away; ignored.
    pub(crate) fn apply(&mut self, cmd: Command) {
        match cmd {
            Command::Reserve { name, reply } => {
                let handle = self.reserve(name);
                let id = handle.id();
                // Nobody will ever admit or discard a slot its caller never saw.
                if reply.send(handle).is_err() {
                    self.discard(id);
                }
            }
            Command::Subscribe {
                service,
                kind,
                listener,
                reply,
            } => {
                let _ = reply.send(self.subscribe(service, kind, listener));
            }
            Command::Admit {
                service,
                instance,
                reply,
            } => {
                let _ = reply.send(self.admit(service, instance));
            }
            Command::Discard { service } => {
                self.discard(service);
            }
            Command::Snapshot { kind, reply } => {
                let _ = reply.send(self.snapshot(kind));
            }
            Command::Services { reply } => {
                let _ = reply.send(self.services());
            }
        }
    }

    fn reserve(&mut self, name: Arc<str>) -> ServiceHandle {
        self.next_id += 1;
        let handle = ServiceHandle::new(ServiceId(self.next_id), name);
        self.pending.insert(
            handle.id(),
            Pending {
                handle: handle.clone(),
                subscriptions: Vec::new(),
            },
        );
        trace!(service = %handle, "reserved service slot");
        handle
    }

    fn subscribe(
        &mut self,
        service: ServiceHandle,
        kind: EventKind,
        listener: ErasedListener,
    ) -> Result<(), BrokerError> {
        if let Some(pending) = self.pending.get_mut(&service.id()) {
            pending.subscriptions.push(Subscription {
                service: pending.handle.clone(),
                kind,
                listener,
            });
            trace!(service = %service, kind = kind.as_label(), "listener pending admission");
            return Ok(());
        }

        let Some(owner) = self.find(service.id()) else {
            return Err(BrokerError::UnknownService {
                service: service.name().to_string(),
            });
        };
        let owner = owner.clone();
        self.table.entry(kind).or_default().push(Subscription {
            service: owner,
            kind,
            listener,
        });
        trace!(service = %service, kind = kind.as_label(), "listener committed");
        Ok(())
    }

    fn admit(&mut self, id: ServiceId, instance: Arc<dyn Service>) -> Result<(), BrokerError> {
        let Some(pending) = self.pending.remove(&id) else {
            return Err(BrokerError::UnknownService {
                service: instance.name().to_string(),
            });
        };

        for sub in pending.subscriptions {
            self.table.entry(sub.kind).or_default().push(sub);
        }
        self.services.push(Registered {
            handle: pending.handle,
            instance,
        });
        Ok(())
    }

    fn discard(&mut self, id: ServiceId) {
        if let Some(pending) = self.pending.remove(&id) {
            debug!(
                service = %pending.handle,
                dropped = pending.subscriptions.len(),
                "discarded pending service"
            );
        }
    }

    fn snapshot(&self, kind: EventKind) -> Vec<Subscription> {
        self.table.get(&kind).cloned().unwrap_or_default()
    }

    fn services(&self) -> Vec<ServiceHandle> {
        self.services.iter().map(|s| s.handle.clone()).collect()
    }

    fn find(&self, id: ServiceId) -> Option<&ServiceHandle> {
        self.services
            .iter()
            .map(|s| &s.handle)
            .find(|h| h.id() == id)
    }
}

/// Spawns the registry worker. It exits when `token` is cancelled or every
/// sender is dropped.
pub(crate) fn spawn_worker(
    mut rx: mpsc::Receiver<Command>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut registry = Registry::new();
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                cmd = rx.recv() => match cmd {
                    Some(cmd) => registry.apply(cmd),
                    None => break,
                }
            }
        }
        debug!(services = registry.services.len(), "registry worker stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::Registration;
    use crate::broker::listener::erase;
    use crate::error::{ListenerError, ServiceError};
    use crate::events::ApplicationStartup;
    use async_trait::async_trait;

    struct Inert(&'static str);

    #[async_trait]
    impl Service for Inert {
        fn name(&self) -> &str {
            self.0
        }

        async fn initialize(&self, _reg: &Registration) -> Result<(), ServiceError> {
            Ok(())
        }
    }

    fn noop() -> ErasedListener {
        erase(|_ev: ApplicationStartup| async { Ok::<_, ListenerError>(()) })
    }

    fn owners(registry: &Registry, kind: EventKind) -> Vec<String> {
        registry
            .snapshot(kind)
            .iter()
            .map(|s| s.service.name().to_string())
            .collect()
    }

    #[test]
    fn pending_subscriptions_are_invisible_until_admitted() {
        let mut registry = Registry::new();
        let a = registry.reserve("a".into());
        registry
            .subscribe(a.clone(), EventKind::ApplicationStartup, noop())
            .unwrap();

        assert!(registry.snapshot(EventKind::ApplicationStartup).is_empty());

        registry.admit(a.id(), Arc::new(Inert("a"))).unwrap();
        assert_eq!(owners(&registry, EventKind::ApplicationStartup), ["a"]);
    }

    #[test]
    fn discard_drops_subscriptions_and_rejects_later_ones() {
        let mut registry = Registry::new();
        let a = registry.reserve("a".into());
        registry
            .subscribe(a.clone(), EventKind::ApplicationStartup, noop())
            .unwrap();
        registry.discard(a.id());

        assert!(registry.snapshot(EventKind::ApplicationStartup).is_empty());
        assert!(registry.services().is_empty());
        assert_eq!(
            registry.subscribe(a.clone(), EventKind::ApplicationStartup, noop()),
            Err(BrokerError::UnknownService {
                service: "a".into()
            })
        );
        assert!(registry.admit(a.id(), Arc::new(Inert("a"))).is_err());
    }

    #[test]
    fn table_keeps_commit_order() {
        let mut registry = Registry::new();
        let a = registry.reserve("a".into());
        let b = registry.reserve("b".into());

        // b finishes initializing first, so it commits first.
        registry
            .subscribe(b.clone(), EventKind::ApplicationStartup, noop())
            .unwrap();
        registry
            .subscribe(a.clone(), EventKind::ApplicationStartup, noop())
            .unwrap();
        registry.admit(b.id(), Arc::new(Inert("b"))).unwrap();
        registry.admit(a.id(), Arc::new(Inert("a"))).unwrap();

        // Late subscription of an admitted service goes to the end.
        registry
            .subscribe(b.clone(), EventKind::ApplicationStartup, noop())
            .unwrap();

        assert_eq!(owners(&registry, EventKind::ApplicationStartup), ["b", "a", "b"]);
        let names: Vec<_> = registry
            .services()
            .iter()
            .map(|h| h.name().to_string())
            .collect();
        assert_eq!(names, ["b", "a"]);
    }

    #[test]
    fn reservation_without_a_waiting_caller_is_dropped() {
        let mut registry = Registry::new();
        let (reply, rx) = oneshot::channel();
        drop(rx);

        registry.apply(Command::Reserve {
            name: "gone".into(),
            reply,
        });

        assert!(registry.pending.is_empty());
    }

    #[test]
    fn snapshot_is_exact_per_kind() {
        let mut registry = Registry::new();
        let a = registry.reserve("a".into());
        registry
            .subscribe(a.clone(), EventKind::ResourceAdded, noop())
            .unwrap();
        registry.admit(a.id(), Arc::new(Inert("a"))).unwrap();

        assert_eq!(registry.snapshot(EventKind::ResourceAdded).len(), 1);
        assert!(registry.snapshot(EventKind::ResourceUpdated).is_empty());
    }
}
