//! # Broker: the only path by which services talk to each other.
//!
//! [`Broker`] is a cheap, cloneable handle to the registry worker (see
//! `registry.rs`). It is created by the runtime bootstrap and passed to every
//! component that publishes or subscribes; there is no global instance.
//!
//! ## Dispatch: snapshot-then-invoke
//! ```text
//! fire_event(ev)
//!   ├─► Snapshot(kind) ──► registry worker   (serialized with registrations)
//!   │       ◄── [sub1, sub2, ... subN]        (commit order, exact kind)
//!   └─► for sub in snapshot:                  (on the caller's task)
//!           invoke(sub, &ev)  ── Ok / Err / panic / timeout
//!                               └─► failures logged + collected in DispatchReport
//! ```
//! A listener committed while a dispatch is in flight is not part of that
//! dispatch's snapshot; it sees every event fired after its commit.
//!
//! ## Registration
//! ```text
//! register_service(svc)
//!   ├─► Reserve(name)                  → ServiceHandle (pending)
//!   ├─► svc.initialize(&Registration)  → may Subscribe(...) (kept pending)
//!   ├─► Ok    → Admit(id)   → service + its listeners become visible atomically
//!   └─► Err / panic → Discard(id) → nothing of it is ever visible
//! ```
//! Dropping the registration future before it decided also discards the slot.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::broker::listener::{self, DispatchReport, ListenerFailure};
use crate::broker::registry::{self, Command};
use crate::broker::{Registration, Service, ServiceHandle};
use crate::config::Config;
use crate::error::{BrokerError, ListenerError, panic_message};
use crate::events::{Event, EventType};

/// Handle to the event broker.
///
/// ### Properties
/// - **Cloneable**: every clone talks to the same registry worker.
/// - **Serialized registry**: registrations and snapshots are totally ordered.
/// - **Isolated listeners**: a failing listener never fails the dispatch.
#[derive(Clone)]
pub struct Broker {
    tx: mpsc::Sender<Command>,
    token: CancellationToken,
    listener_timeout: Option<Duration>,
}

impl Broker {
    /// Creates a broker and spawns its registry worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(cfg: &Config) -> Self {
        let (tx, rx) = mpsc::channel(cfg.mailbox_capacity_clamped());
        let token = CancellationToken::new();
        registry::spawn_worker(rx, token.clone());
        Self {
            tx,
            token,
            listener_timeout: cfg.listener_deadline(),
        }
    }

    /// Initializes `service` and, if that succeeds, admits it to the registry.
    ///
    /// Listeners subscribed during `initialize` become visible together with
    /// the service. If `initialize` fails or panics, the failure is logged,
    /// the service and everything it subscribed are discarded, and
    /// [`BrokerError::InitializationFailed`] is returned.
    pub async fn register_service(
        &self,
        service: Arc<dyn Service>,
    ) -> Result<ServiceHandle, BrokerError> {
        let name: Arc<str> = service.name().into();
        debug!(service = %name, "attempting to register service");

        let handle = self
            .call(|reply| Command::Reserve { name, reply })
            .await?;
        let mut pending = PendingGuard::new(self.tx.clone(), &handle);
        let registration = Registration::new(self.clone(), handle.clone());

        let init = AssertUnwindSafe(service.initialize(&registration))
            .catch_unwind()
            .await;
        let failure = match init {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(panic_err) => Some(format!("panicked: {}", panic_message(&*panic_err))),
        };

        if let Some(reason) = failure {
            error!(service = %handle, %reason, "service initialization failed");
            // Best effort: if the worker is gone there is nothing left to discard.
            let _ = self
                .tx
                .send(Command::Discard {
                    service: handle.id(),
                })
                .await;
            pending.defuse();
            return Err(BrokerError::InitializationFailed {
                service: handle.name().to_string(),
                reason,
            });
        }

        // A Discard queued behind Admit finds nothing pending and is a no-op.
        self.call(|reply| Command::Admit {
            service: handle.id(),
            instance: service,
            reply,
        })
        .await??;
        pending.defuse();

        info!(service = %handle, "registered service");
        Ok(handle)
    }

    /// Subscribes `listener` to events of type `E` on behalf of `service`.
    ///
    /// Allowed during the service's `initialize` (the subscription stays
    /// pending until admission) or any time after it was registered.
    /// Duplicates are allowed and all fire.
    ///
    /// Returns [`BrokerError::UnknownService`] if `service` was discarded or
    /// belongs to another broker.
    pub async fn register_event_listener<E, F, Fut>(
        &self,
        service: &ServiceHandle,
        listener: F,
    ) -> Result<(), BrokerError>
    where
        E: EventType,
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ListenerError>> + Send + 'static,
    {
        let service = service.clone();
        let listener = listener::erase(listener);
        self.call(|reply| Command::Subscribe {
            service,
            kind: E::KIND,
            listener,
            reply,
        })
        .await?
    }

    /// Fires `event` at every listener subscribed to exactly its kind.
    ///
    /// Listeners run one after another, in commit order, on the caller's task;
    /// the call returns once all of them finished. Listener errors, panics and
    /// timeouts are logged and collected in the returned [`DispatchReport`].
    ///
    /// Fails only with [`BrokerError::Closed`].
    pub async fn fire_event(&self, event: impl Into<Event>) -> Result<DispatchReport, BrokerError> {
        let event = event.into();
        let kind = event.kind();
        let handlers = self.call(|reply| Command::Snapshot { kind, reply }).await?;

        let mut report = DispatchReport::new(&event);
        for sub in &handlers {
            match listener::invoke(sub, &event, self.listener_timeout).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(
                        service = %sub.service,
                        kind = kind.as_label(),
                        seq = event.seq(),
                        error = %e,
                        label = e.as_label(),
                        "error during event dispatch"
                    );
                    report.failures.push(ListenerFailure {
                        service: sub.service.name().to_string(),
                        error: e,
                    });
                }
            }
        }

        debug!(
            kind = kind.as_label(),
            seq = report.seq,
            delivered = report.delivered,
            failed = report.failures.len(),
            "event dispatched"
        );
        Ok(report)
    }

    /// Returns the registered services in registration order.
    pub async fn services(&self) -> Result<Vec<ServiceHandle>, BrokerError> {
        self.call(|reply| Command::Services { reply }).await
    }

    /// Stops the registry worker. Every later operation returns [`BrokerError::Closed`].
    pub fn close(&self) {
        if !self.token.is_cancelled() {
            info!("shutdown event broker");
            self.token.cancel();
        }
    }

    /// True once [`Broker::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Hands one command to the registry worker and waits for its reply.
    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, BrokerError> {
        if self.token.is_cancelled() {
            return Err(BrokerError::Closed);
        }
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(make(tx))
            .await
            .map_err(|_| BrokerError::Closed)?;
        rx.await.map_err(|_| BrokerError::Closed)
    }
}

/// Discards a reserved service if `register_service` is dropped before it
/// reached a decision, e.g. when the caller wraps it in a timeout.
struct PendingGuard {
    tx: mpsc::Sender<Command>,
    service: Option<ServiceHandle>,
}

impl PendingGuard {
    fn new(tx: mpsc::Sender<Command>, service: &ServiceHandle) -> Self {
        Self {
            tx,
            service: Some(service.clone()),
        }
    }

    fn defuse(&mut self) {
        self.service = None;
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let Some(service) = self.service.take() else {
            return;
        };
        warn!(service = %service, "registration abandoned before admission; discarding");
        let cmd = Command::Discard {
            service: service.id(),
        };
        match self.tx.try_send(cmd) {
            Ok(()) | Err(mpsc::error::TrySendError::Closed(_)) => {}
            Err(mpsc::error::TrySendError::Full(cmd)) => {
                if let Ok(rt) = tokio::runtime::Handle::try_current() {
                    let tx = self.tx.clone();
                    rt.spawn(async move {
                        let _ = tx.send(cmd).await;
                    });
                }
            }
        }
    }
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("closed", &self.is_closed())
            .field("listener_timeout", &self.listener_timeout)
            .finish()
    }
}
