//! # Type-erased listeners and per-listener invocation.
//!
//! A listener is written against a concrete payload type (`Fn(E) -> Fut`).
//! [`erase`] turns it into an [`ErasedListener`] taking `&Event`: it extracts
//! the payload with [`EventType::from_event`], so no cast is involved, and
//! defers the call into the returned future so that panics in the listener
//! body are caught by [`invoke`].
//!
//! ## Failure isolation
//! ```text
//! invoke(sub, &event)
//!     ├─► Ok(())                   → delivered
//!     ├─► Err(ListenerError)       → failure (listener_failed)
//!     ├─► panic → catch_unwind     → failure (listener_panicked)
//!     └─► deadline elapsed         → failure (listener_timeout)
//! ```
//!
//! **Warning**: `AssertUnwindSafe` is used; a listener that panics while holding
//! a lock on shared state may leave that state inconsistent.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::time;

use crate::broker::ServiceHandle;
use crate::error::{ListenerError, panic_message};
use crate::events::{Event, EventKind, EventType};

pub(crate) type ListenerFuture = BoxFuture<'static, Result<(), ListenerError>>;

/// Listener keyed by [`EventKind`], callable with any [`Event`].
pub(crate) type ErasedListener = Arc<dyn Fn(&Event) -> ListenerFuture + Send + Sync>;

/// One (kind, callback) pair owned by a service.
#[derive(Clone)]
pub(crate) struct Subscription {
    pub(crate) service: ServiceHandle,
    pub(crate) kind: EventKind,
    pub(crate) listener: ErasedListener,
}

/// Erases a typed listener.
pub(crate) fn erase<E, F, Fut>(listener: F) -> ErasedListener
where
    E: EventType,
    F: Fn(E) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ListenerError>> + Send + 'static,
{
    let listener = Arc::new(listener);
    Arc::new(move |event: &Event| {
        let listener = Arc::clone(&listener);
        let payload = E::from_event(event).cloned();
        let got = event.kind();
        async move {
            match payload {
                Some(payload) => listener(payload).await,
                None => Err(ListenerError::failed(format!(
                    "expected {} event, got {}",
                    E::KIND.as_label(),
                    got.as_label()
                ))),
            }
        }
        .boxed()
    })
}

/// Runs one listener to completion, converting panics and timeouts into errors.
pub(crate) async fn invoke(
    sub: &Subscription,
    event: &Event,
    deadline: Option<Duration>,
) -> Result<(), ListenerError> {
    let fut = AssertUnwindSafe((sub.listener)(event)).catch_unwind();

    let outcome = match deadline {
        Some(timeout) => match time::timeout(timeout, fut).await {
            Ok(outcome) => outcome,
            Err(_elapsed) => return Err(ListenerError::Timeout { timeout }),
        },
        None => fut.await,
    };

    match outcome {
        Ok(res) => res,
        Err(panic_err) => Err(ListenerError::Panicked {
            info: panic_message(&*panic_err),
        }),
    }
}

/// A listener that did not complete successfully during one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerFailure {
    /// Name of the service owning the listener.
    pub service: String,
    /// What went wrong.
    pub error: ListenerError,
}

/// Outcome of one [`Broker::fire_event`](crate::Broker::fire_event) call.
///
/// `fire_event` never fails because of a listener; failures are collected here
/// (and logged) instead.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    /// Kind of the dispatched event.
    pub kind: EventKind,
    /// Sequence number of the dispatched event.
    pub seq: u64,
    /// Listeners that completed successfully.
    pub delivered: usize,
    /// Listeners that failed, panicked or timed out, in invocation order.
    pub failures: Vec<ListenerFailure>,
}

impl DispatchReport {
    pub(crate) fn new(event: &Event) -> Self {
        Self {
            kind: event.kind(),
            seq: event.seq(),
            delivered: 0,
            failures: Vec::new(),
        }
    }

    /// Number of listeners selected by the snapshot.
    pub fn matched(&self) -> usize {
        self.delivered + self.failures.len()
    }

    /// True if every selected listener succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::ServiceId;
    use crate::events::{ApplicationShutdown, ApplicationStartup, ShutdownReason};

    fn sub(listener: ErasedListener) -> Subscription {
        Subscription {
            service: ServiceHandle::new(ServiceId(1), "watcher".into()),
            kind: EventKind::ApplicationStartup,
            listener,
        }
    }

    #[tokio::test]
    async fn panic_in_listener_body_is_caught() {
        let s = sub(erase(|_ev: ApplicationStartup| async move {
            let explode = true;
            if explode {
                panic!("listener exploded");
            }
            Ok::<_, ListenerError>(())
        }));
        let ev: Event = ApplicationStartup::now().into();

        let err = invoke(&s, &ev, None).await.unwrap_err();
        assert_eq!(
            err,
            ListenerError::Panicked {
                info: "listener exploded".into()
            }
        );
    }

    #[tokio::test]
    async fn mismatched_event_is_rejected_without_calling() {
        let s = sub(erase(|_ev: ApplicationStartup| async move {
            let called = true;
            assert!(!called, "must not be called");
            Ok::<_, ListenerError>(())
        }));
        let ev: Event = ApplicationShutdown::now(ShutdownReason::Requested).into();

        let err = invoke(&s, &ev, None).await.unwrap_err();
        assert_eq!(err.as_label(), "listener_failed");
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_turns_into_timeout() {
        let s = sub(erase(|_ev: ApplicationStartup| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, ListenerError>(())
        }));
        let ev: Event = ApplicationStartup::now().into();

        let err = invoke(&s, &ev, Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ListenerError::Timeout {
                timeout: Duration::from_millis(50)
            }
        );
    }
}
