//! Built-in services.
//!
//! - [`EventLog`] (feature `logging`) writes every event through `tracing`

#[cfg(feature = "logging")]
mod log;

#[cfg(feature = "logging")]
pub use log::EventLog;
