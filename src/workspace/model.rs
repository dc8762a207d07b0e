//! Workspace data model: file tree entries, cached representations and
//! listing nodes.

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

/// Workspace-assigned file identity. Ids grow monotonically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(u64);

impl FileId {
    /// Wraps a raw id.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw id value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content revision of a file. Starts at 1 when the file is added and grows
/// with every update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Revision(u64);

impl Revision {
    pub(crate) const INITIAL: Revision = Revision(1);

    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Raw revision number.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// One node of the workspace file tree.
///
/// Archives are directories with `archive = true`: they hold the entries
/// extracted from them and carry no content of their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Entry id.
    pub id: FileId,
    /// Simple name (no path separators).
    pub name: Arc<str>,
    /// Parent directory, `None` at the workspace root.
    pub parent: Option<FileId>,
    /// True for directories and archives.
    pub is_directory: bool,
    /// True for archive entries.
    pub archive: bool,
}

/// Cached alternate view of a file (disassembly, decompiled source, ...).
///
/// Valid until the file's content changes; updating the file drops it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Representation {
    /// File the view was generated from.
    pub file: FileId,
    /// View type identifier, e.g. `"disassembly"`.
    pub view_type: Arc<str>,
    /// Content revision the view was generated from.
    pub revision: Revision,
    /// When the view was stored.
    pub created: SystemTime,
}

/// Entry of a recursive listing together with its children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    /// The listed entry.
    pub entry: FileEntry,
    /// Children ordered by id; empty for plain files.
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Depth-first pre-order walk over this node and its descendants.
    pub fn flatten(&self) -> Vec<&FileEntry> {
        let mut out = vec![&self.entry];
        for child in &self.children {
            out.extend(child.flatten());
        }
        out
    }
}
