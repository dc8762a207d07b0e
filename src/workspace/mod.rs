//! In-memory workspace: file tree, contents and cached representations.
//!
//! - [`WorkspaceService`] the facade, registered at the broker as a service
//! - [`FileEntry`], [`FileId`], [`Revision`], [`Representation`], [`TreeNode`] data model
//! - [`ClassParser`] hook for importing class files in the background
//! - [`WorkspaceError`] failures of workspace operations

mod error;
mod model;
mod service;

pub use error::WorkspaceError;
pub use model::{FileEntry, FileId, Representation, Revision, TreeNode};
pub use service::{ClassParser, WorkspaceService};
