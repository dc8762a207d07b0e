//! # Event log service.
//!
//! [`EventLog`] subscribes to every event kind and writes one structured
//! `tracing` record per event. Install a subscriber (e.g. `tracing-subscriber`
//! with `EnvFilter`) to see them.
//!
//! ## Output (fmt layer)
//! ```text
//! INFO arachne::services::log: [startup] seq=0
//! INFO arachne::services::log: [resource-added] seq=1 file=lib.jar/A.class bytes=512
//! INFO arachne::services::log: [resource-updated] seq=2 file=A.class bytes=640
//! INFO arachne::services::log: [shutdown] seq=3 reason=Signal
//! ```
//!
//! Enabled via the `logging` feature (on by default).

use async_trait::async_trait;
use futures::future::{Ready, ready};
use tracing::info;

use crate::broker::{Registration, Service};
use crate::error::{ListenerError, ServiceError};
use crate::events::{ApplicationShutdown, ApplicationStartup, ResourceAdded, ResourceUpdated};

/// Built-in service logging every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EventLog;

impl EventLog {
    /// Creates the event log service.
    pub fn new() -> Self {
        Self
    }
}

fn done() -> Ready<Result<(), ListenerError>> {
    ready(Ok(()))
}

#[async_trait]
impl Service for EventLog {
    fn name(&self) -> &str {
        "event-log"
    }

    async fn initialize(&self, reg: &Registration) -> Result<(), ServiceError> {
        reg.listen(|e: ApplicationStartup| {
            info!(seq = e.seq, "[startup]");
            done()
        })
        .await?;
        reg.listen(|e: ApplicationShutdown| {
            info!(seq = e.seq, reason = ?e.reason, "[shutdown]");
            done()
        })
        .await?;
        reg.listen(|e: ResourceAdded| {
            info!(seq = e.seq, file = %e.file.name, bytes = e.content.len(), "[resource-added]");
            done()
        })
        .await?;
        reg.listen(|e: ResourceUpdated| {
            info!(seq = e.seq, file = %e.file.name, bytes = e.content.len(), "[resource-updated]");
            done()
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tracing_test::traced_test;

    use super::*;
    use crate::broker::Broker;
    use crate::config::Config;
    use crate::events::ShutdownReason;
    use crate::workspace::{FileEntry, FileId};

    #[tokio::test]
    #[traced_test]
    async fn every_event_kind_is_logged() {
        let broker = Broker::new(&Config::default());
        broker.register_service(Arc::new(EventLog::new())).await.unwrap();
        let file = FileEntry {
            id: FileId::new(7),
            name: "A.class".into(),
            parent: None,
            is_directory: false,
            archive: false,
        };

        let reports = [
            broker.fire_event(ApplicationStartup::now()).await,
            broker
                .fire_event(ResourceAdded::new(file.clone(), Arc::from(&b"\xca\xfe\xba\xbe"[..])))
                .await,
            broker
                .fire_event(ResourceUpdated::new(file, Arc::from(&b"\xca\xfe"[..])))
                .await,
            broker
                .fire_event(ApplicationShutdown::now(ShutdownReason::Signal))
                .await,
        ];
        for report in reports {
            assert_eq!(report.unwrap().delivered, 1);
        }

        assert!(logs_contain("[startup]"));
        assert!(logs_contain("[resource-added]"));
        assert!(logs_contain("file=A.class bytes=4"));
        assert!(logs_contain("[resource-updated]"));
        assert!(logs_contain("reason=Signal"));
    }
}
