//! Runtime core: bootstrap and lifecycle.
//!
//! The public API of this module is [`Runtime`] and its [`RuntimeBuilder`].
//!
//! Internal modules:
//! - `runtime`: registers services, fires startup/shutdown, drains the pool;
//! - `builder`: assembles broker, pool and preset services;
//! - `shutdown`: cross-platform termination signal handling.

mod builder;
mod runtime;
mod shutdown;

pub use builder::RuntimeBuilder;
pub use runtime::Runtime;
