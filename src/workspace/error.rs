use thiserror::Error;

use crate::error::BrokerError;
use crate::workspace::{FileId, Revision};

/// # Errors produced by the workspace.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum WorkspaceError {
    /// The workspace was closed by the application shutdown.
    #[error("workspace is closed")]
    Closed,

    /// Entry names must be non-empty and must not contain `/`.
    #[error("invalid entry name '{name}'")]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// No entry with this id.
    #[error("file {id} does not exist")]
    UnknownFile { id: FileId },

    /// The entry was used as a parent but is a plain file.
    #[error("file {id} is not a directory")]
    NotADirectory { id: FileId },

    /// The entry has no content because it is a directory or an archive.
    #[error("file {id} is a directory")]
    IsADirectory { id: FileId },

    /// No entry matches the (partial) path.
    #[error("file with path '{path}' does not exist")]
    NotFound {
        /// The path as queried.
        path: String,
    },

    /// More than one entry matches the partial path.
    #[error("{matches} files match the partial path '{path}', please specify")]
    Ambiguous {
        /// The path as queried.
        path: String,
        /// Number of matching entries.
        matches: usize,
    },

    /// The representation is gone (never stored, or dropped by an update).
    #[error("no '{view_type}' representation for file {file}")]
    UnknownRepresentation {
        /// File the representation belonged to.
        file: FileId,
        /// Requested view type.
        view_type: String,
    },

    /// The file changed after the representation's data was generated.
    #[error("file {file} changed since {revision} (now {current})")]
    StaleRevision {
        /// File the representation was generated from.
        file: FileId,
        /// Revision the data was generated from.
        revision: Revision,
        /// Current revision of the file.
        current: Revision,
    },

    /// Writing exported data failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Firing a resource event failed.
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

impl WorkspaceError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkspaceError::Closed => "workspace_closed",
            WorkspaceError::InvalidName { .. } => "workspace_invalid_name",
            WorkspaceError::UnknownFile { .. } => "workspace_unknown_file",
            WorkspaceError::NotADirectory { .. } => "workspace_not_a_directory",
            WorkspaceError::IsADirectory { .. } => "workspace_is_a_directory",
            WorkspaceError::NotFound { .. } => "workspace_not_found",
            WorkspaceError::Ambiguous { .. } => "workspace_ambiguous_path",
            WorkspaceError::UnknownRepresentation { .. } => "workspace_unknown_representation",
            WorkspaceError::StaleRevision { .. } => "workspace_stale_revision",
            WorkspaceError::Io(_) => "workspace_io",
            WorkspaceError::Broker(e) => e.as_label(),
        }
    }
}
