//! # arachne
//!
//! **Arachne** is the event broker and service lifecycle core of a
//! binary-analysis workspace server.
//!
//! Independent subsystems (the workspace, analysis features, outer servers)
//! never reference each other directly. They are registered as services at
//! a [`Broker`], subscribe to typed events during their one-time
//! initialization and communicate by firing events through it.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  Workspace   │   │    Mapper    │   │   EventLog   │
//!     │   Service    │   │   Service    │   │  (logging)   │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            │ initialize(&Registration) → listen::<E>(..)
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Broker (cloneable handle)                                        │
//! │   ── mpsc<Command> ──► registry worker (single owner of state)    │
//! │        Reserve / Subscribe / Admit / Discard / Snapshot           │
//! └──────┬────────────────────────────────────────────────────────────┘
//!        │ fire_event(ev): snapshot(kind) then, on the caller's task,
//!        ▼
//!   listener1(ev) ─► listener2(ev) ─► ... ─► listenerN(ev)   (commit order)
//!        │ error / panic / timeout → logged, isolated, in DispatchReport
//!        ▼
//!   heavy work ──► WorkerPool::submit / submit_blocking  (tracked jobs)
//! ```
//!
//! ### Lifecycle
//! ```text
//! Runtime::builder(cfg).build()
//!   └─► run(services)
//!         ├─► register_service(s) in order   (failed init → logged, skipped)
//!         ├─► fire ApplicationStartup
//!         ├─► wait: OS signal | request_shutdown()
//!         ├─► fire ApplicationShutdown { reason }
//!         ├─► WorkerPool::shutdown(grace)    (GraceExceeded lists stuck jobs)
//!         └─► Broker::close()
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                              |
//! |-------------------|--------------------------------------------------------------|-------------------------------------------------|
//! | **Broker**        | Service registry and typed, isolated event dispatch.         | [`Broker`], [`Service`], [`Registration`]       |
//! | **Events**        | Closed set of immutable event payloads.                      | [`Event`], [`EventKind`], [`EventType`]         |
//! | **Worker pool**   | Tracked background jobs with cap, timeout and grace.         | [`WorkerPool`], [`Job`], [`JobFn`]              |
//! | **Runtime**       | Bootstrap, startup/shutdown sequence, OS signals.            | [`Runtime`], [`RuntimeBuilder`]                 |
//! | **Workspace**     | In-memory file tree, contents, representations.              | [`WorkspaceService`], [`FileEntry`]             |
//! | **Features**      | Mapping generation and view generation.                      | [`MapperService`], [`ViewFeature`]              |
//! | **Errors**        | Typed errors with stable labels.                             | [`BrokerError`], [`ListenerError`], [`RuntimeError`] |
//! | **Configuration** | Centralized runtime settings.                                | [`Config`]                                      |
//!
//! ## Optional features
//! - `logging` (default): exports the built-in [`EventLog`] service.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use arachne::{
//!     ApplicationStartup, Config, ListenerError, Registration, Runtime, Service, ServiceError,
//!     WorkspaceService,
//! };
//! use async_trait::async_trait;
//!
//! struct Greeter;
//!
//! #[async_trait]
//! impl Service for Greeter {
//!     fn name(&self) -> &str { "greeter" }
//!
//!     async fn initialize(&self, reg: &Registration) -> Result<(), ServiceError> {
//!         reg.listen(|ev: ApplicationStartup| async move {
//!             println!("started (event #{})", ev.seq);
//!             Ok::<_, ListenerError>(())
//!         })
//!         .await?;
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = Runtime::builder(Config::default()).build();
//!     let workspace = WorkspaceService::new(runtime.broker().clone(), runtime.pool().clone());
//!
//!     // Usually triggered by a quit command or an OS signal.
//!     runtime.request_shutdown();
//!
//!     let services: Vec<Arc<dyn Service>> = vec![Arc::new(workspace.clone()), Arc::new(Greeter)];
//!     runtime.run(services).await?;
//!     assert!(workspace.is_closed().await);
//!     Ok(())
//! }
//! ```

mod broker;
mod config;
mod core;
mod error;
mod events;
mod features;
mod pool;
mod services;
mod workspace;

// ---- Public re-exports ----

pub use broker::{Broker, DispatchReport, ListenerFailure, Registration, Service, ServiceHandle, ServiceId};
pub use config::Config;
pub use core::{Runtime, RuntimeBuilder};
pub use error::{BrokerError, JobError, ListenerError, RuntimeError, ServiceError};
pub use events::{
    ApplicationShutdown, ApplicationStartup, Event, EventKind, EventType, ResourceAdded,
    ResourceUpdated, ShutdownReason,
};
pub use features::{
    GeneratorError, MapperService, MappingError, MappingFactory, ReferenceType, SymbolType,
    ViewError, ViewFeature, ViewGenerator,
};
pub use pool::{Job, JobFn, JobHandle, JobId, JobRef, WorkerPool};
pub use workspace::{
    ClassParser, FileEntry, FileId, Representation, Revision, TreeNode, WorkspaceError,
    WorkspaceService,
};

// Optional: built-in service writing every event through `tracing`.
// Enabled by default; disable with `default-features = false`.
#[cfg(feature = "logging")]
pub use services::EventLog;
