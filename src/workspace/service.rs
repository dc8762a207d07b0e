//! # Workspace service: the in-memory file tree facade.
//!
//! Everything related to stored data goes through [`WorkspaceService`]: the
//! file tree (directories, archives, files), file contents and cached
//! representations.
//!
//! ## Events
//! ```text
//! add_file_entry / add_class_entry ──► ResourceAdded   { file, content }
//! update_file_entry                ──► ResourceUpdated { file, content }
//! ApplicationShutdown              ──► workspace closes (mutations → Closed)
//! ```
//!
//! ## Rules
//! - The state lock is never held while an event is fired.
//! - Updating a file bumps its [`Revision`] and drops every representation
//!   derived from it.
//! - A representation is only stored if the file is still at the revision
//!   its data was generated from.
//! - Queries keep working after the workspace closed.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::RwLock;
use tracing::{debug, info, trace, warn};

use crate::broker::{Broker, Registration, Service};
use crate::error::{JobError, ListenerError, ServiceError};
use crate::events::{ApplicationShutdown, ResourceAdded, ResourceUpdated};
use crate::pool::WorkerPool;
use crate::workspace::{FileEntry, FileId, Representation, Revision, TreeNode, WorkspaceError};

/// Parses class files added through [`WorkspaceService::add_class_entry`].
///
/// Runs on the worker pool's blocking threads.
pub trait ClassParser: Send + Sync + 'static {
    /// Imports the members of the class file `file` with bytecode `content`.
    fn import(&self, file: &FileEntry, content: &[u8]) -> Result<(), JobError>;
}

struct StoredContent {
    data: Arc<[u8]>,
    revision: Revision,
}

struct StoredView {
    representation: Representation,
    data: Arc<[u8]>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    files: BTreeMap<FileId, FileEntry>,
    content: HashMap<FileId, StoredContent>,
    views: HashMap<FileId, HashMap<Arc<str>, StoredView>>,
    closed: bool,
}

impl State {
    fn ensure_open(&self) -> Result<(), WorkspaceError> {
        if self.closed {
            Err(WorkspaceError::Closed)
        } else {
            Ok(())
        }
    }

    fn entry(&self, id: FileId) -> Result<&FileEntry, WorkspaceError> {
        self.files.get(&id).ok_or(WorkspaceError::UnknownFile { id })
    }

    fn directory(&self, id: Option<FileId>) -> Result<(), WorkspaceError> {
        let Some(id) = id else {
            return Ok(());
        };
        if self.entry(id)?.is_directory {
            Ok(())
        } else {
            Err(WorkspaceError::NotADirectory { id })
        }
    }

    fn file(&self, id: FileId) -> Result<&FileEntry, WorkspaceError> {
        let entry = self.entry(id)?;
        if entry.is_directory {
            return Err(WorkspaceError::IsADirectory { id });
        }
        Ok(entry)
    }

    fn snapshot(&self, id: FileId) -> Result<(Arc<[u8]>, Revision), WorkspaceError> {
        self.file(id)?;
        Ok(match self.content.get(&id) {
            Some(stored) => (Arc::clone(&stored.data), stored.revision),
            None => (Arc::from(&[][..]), Revision::INITIAL),
        })
    }

    fn insert(
        &mut self,
        name: &str,
        parent: Option<FileId>,
        is_directory: bool,
        archive: bool,
    ) -> Result<FileEntry, WorkspaceError> {
        self.ensure_open()?;
        if name.is_empty() || name.contains('/') {
            return Err(WorkspaceError::InvalidName {
                name: name.to_string(),
            });
        }
        self.directory(parent)?;

        self.next_id += 1;
        let entry = FileEntry {
            id: FileId::new(self.next_id),
            name: name.into(),
            parent,
            is_directory,
            archive,
        };
        self.files.insert(entry.id, entry.clone());
        Ok(entry)
    }

    fn path_of(&self, entry: &FileEntry) -> String {
        let mut parts = vec![entry.name.as_ref()];
        let mut parent = entry.parent;
        while let Some(p) = parent.and_then(|id| self.files.get(&id)) {
            parts.push(p.name.as_ref());
            parent = p.parent;
        }
        parts.reverse();
        parts.join("/")
    }

    fn children(&self, parent: Option<FileId>) -> Vec<FileEntry> {
        self.files
            .values()
            .filter(|e| e.parent == parent)
            .cloned()
            .collect()
    }

    fn tree(&self, parent: Option<FileId>) -> Vec<TreeNode> {
        self.children(parent)
            .into_iter()
            .map(|entry| {
                let children = if entry.is_directory {
                    self.tree(Some(entry.id))
                } else {
                    Vec::new()
                };
                TreeNode { entry, children }
            })
            .collect()
    }
}

struct Inner {
    state: RwLock<State>,
    broker: Broker,
    pool: WorkerPool,
    parser: Option<Arc<dyn ClassParser>>,
}

/// Facade over the workspace. Cloning shares the same workspace.
#[derive(Clone)]
pub struct WorkspaceService {
    inner: Arc<Inner>,
}

impl WorkspaceService {
    /// Creates an empty workspace firing resource events through `broker`
    /// and scheduling background imports on `pool`.
    pub fn new(broker: Broker, pool: WorkerPool) -> Self {
        Self::build(broker, pool, None)
    }

    /// Same as [`WorkspaceService::new`], with a parser for class entries.
    pub fn with_class_parser(broker: Broker, pool: WorkerPool, parser: Arc<dyn ClassParser>) -> Self {
        Self::build(broker, pool, Some(parser))
    }

    fn build(broker: Broker, pool: WorkerPool, parser: Option<Arc<dyn ClassParser>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(State::default()),
                broker,
                pool,
                parser,
            }),
        }
    }

    /// The worker pool shared by the workspace and the features.
    pub fn pool(&self) -> &WorkerPool {
        &self.inner.pool
    }

    /// True once the application shutdown closed the workspace.
    pub async fn is_closed(&self) -> bool {
        self.inner.state.read().await.closed
    }

    /// Adds a directory entry to the file tree.
    pub async fn add_directory_entry(
        &self,
        name: &str,
        parent: Option<FileId>,
    ) -> Result<FileEntry, WorkspaceError> {
        trace!(entry = name, "creating directory entry in file tree");
        self.inner.state.write().await.insert(name, parent, true, false)
    }

    /// Adds an archive entry. Archives are only parents of their content and
    /// carry no data themselves.
    pub async fn add_archive_entry(
        &self,
        name: &str,
        parent: Option<FileId>,
    ) -> Result<FileEntry, WorkspaceError> {
        trace!(entry = name, "creating archive entry in file tree");
        self.inner.state.write().await.insert(name, parent, true, true)
    }

    /// Adds a file with its content and fires [`ResourceAdded`].
    pub async fn add_file_entry(
        &self,
        name: &str,
        parent: Option<FileId>,
        content: impl Into<Arc<[u8]>>,
    ) -> Result<FileEntry, WorkspaceError> {
        let content = content.into();
        trace!(entry = name, bytes = content.len(), "creating file entry in file tree");

        let entry = {
            let mut state = self.inner.state.write().await;
            let entry = state.insert(name, parent, false, false)?;
            state.content.insert(
                entry.id,
                StoredContent {
                    data: Arc::clone(&content),
                    revision: Revision::INITIAL,
                },
            );
            entry
        };

        self.inner
            .broker
            .fire_event(ResourceAdded::new(entry.clone(), content))
            .await?;
        Ok(entry)
    }

    /// Adds a Java class file and schedules its import on the worker pool.
    ///
    /// The import job is not awaited; the pool keeps track of it until
    /// shutdown.
    pub async fn add_class_entry(
        &self,
        name: &str,
        parent: Option<FileId>,
        content: impl Into<Arc<[u8]>>,
    ) -> Result<FileEntry, WorkspaceError> {
        let content = content.into();
        let entry = self.add_file_entry(name, parent, Arc::clone(&content)).await?;

        let Some(parser) = self.inner.parser.clone() else {
            warn!(file = %entry.name, "no class parser configured; import skipped");
            return Ok(entry);
        };

        trace!(file = %entry.name, "scheduling class parsing");
        let file = entry.clone();
        self.inner
            .pool
            .submit_blocking(format!("class-import:{}", entry.name), move |ctx| {
                if ctx.is_cancelled() {
                    return Err(JobError::Canceled);
                }
                parser.import(&file, &content)
            });
        Ok(entry)
    }

    /// Replaces the content of a file, bumps its revision, drops its
    /// representations and fires [`ResourceUpdated`].
    pub async fn update_file_entry(
        &self,
        id: FileId,
        content: impl Into<Arc<[u8]>>,
    ) -> Result<FileEntry, WorkspaceError> {
        let content = content.into();
        let entry = {
            let mut state = self.inner.state.write().await;
            state.ensure_open()?;
            let entry = state.file(id)?.clone();
            let revision = state
                .content
                .get(&id)
                .map_or(Revision::INITIAL, |c| c.revision)
                .next();
            state.content.insert(
                id,
                StoredContent {
                    data: Arc::clone(&content),
                    revision,
                },
            );
            if let Some(stale) = state.views.remove(&id) {
                debug!(file = %entry.name, dropped = stale.len(), "representations invalidated");
            }
            trace!(file = %entry.name, bytes = content.len(), %revision, "updated file content");
            entry
        };

        self.inner
            .broker
            .fire_event(ResourceUpdated::new(entry.clone(), content))
            .await?;
        Ok(entry)
    }

    /// Finds the single entry whose path is `path` or ends with `/path`.
    ///
    /// Leading and trailing `/` are ignored.
    pub async fn query_path(&self, path: &str) -> Result<FileEntry, WorkspaceError> {
        let needle = path.trim_matches('/');
        let suffix = format!("/{needle}");
        let state = self.inner.state.read().await;

        let mut found: Vec<&FileEntry> = state
            .files
            .values()
            .filter(|e| {
                let full = state.path_of(e);
                full == needle || full.ends_with(&suffix)
            })
            .collect();

        match found.len() {
            0 => Err(WorkspaceError::NotFound {
                path: path.to_string(),
            }),
            1 => Ok(found.remove(0).clone()),
            matches => Err(WorkspaceError::Ambiguous {
                path: path.to_string(),
                matches,
            }),
        }
    }

    /// Looks an entry up by id.
    pub async fn query_id(&self, id: FileId) -> Result<FileEntry, WorkspaceError> {
        self.inner.state.read().await.entry(id).cloned()
    }

    /// Full `/`-separated path of an entry, relative to the workspace root.
    pub async fn path_of(&self, id: FileId) -> Result<String, WorkspaceError> {
        let state = self.inner.state.read().await;
        let entry = state.entry(id)?;
        Ok(state.path_of(entry))
    }

    /// Direct children of `directory` (the root if `None`), ordered by id.
    pub async fn directory_content(
        &self,
        directory: Option<FileId>,
    ) -> Result<Vec<FileEntry>, WorkspaceError> {
        let state = self.inner.state.read().await;
        state.directory(directory)?;
        Ok(state.children(directory))
    }

    /// The tree below `root` (the workspace root if `None`). Siblings are
    /// ordered by id.
    pub async fn list_files_recursively(
        &self,
        root: Option<FileId>,
    ) -> Result<Vec<TreeNode>, WorkspaceError> {
        let state = self.inner.state.read().await;
        state.directory(root)?;
        Ok(state.tree(root))
    }

    /// Content of a file.
    pub async fn file_content(&self, id: FileId) -> Result<Arc<[u8]>, WorkspaceError> {
        Ok(self.file_snapshot(id).await?.0)
    }

    /// Content of a file together with its current revision, read atomically.
    ///
    /// Pass the revision to [`WorkspaceService::add_file_representation`] when
    /// storing data derived from this content.
    pub async fn file_snapshot(&self, id: FileId) -> Result<(Arc<[u8]>, Revision), WorkspaceError> {
        self.inner.state.read().await.snapshot(id)
    }

    /// Writes the content of a file into `out`. Returns the number of bytes
    /// written; `out` is flushed but not shut down.
    pub async fn export_file<W>(&self, id: FileId, out: &mut W) -> Result<u64, WorkspaceError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let content = self.file_content(id).await?;
        out.write_all(&content).await?;
        out.flush().await?;
        Ok(content.len() as u64)
    }

    /// Stores the data of a view generated from `revision` of `file`,
    /// replacing an older one of the same type.
    ///
    /// Fails with [`WorkspaceError::StaleRevision`] if the file was updated
    /// since; the data is not stored then.
    pub async fn add_file_representation(
        &self,
        file: FileId,
        revision: Revision,
        view_type: &str,
        data: impl Into<Arc<[u8]>>,
    ) -> Result<Representation, WorkspaceError> {
        let mut state = self.inner.state.write().await;
        state.ensure_open()?;
        let name = Arc::clone(&state.file(file)?.name);
        let (_, current) = state.snapshot(file)?;
        if current != revision {
            debug!(file = %name, view_type, %revision, %current, "discarding stale file view");
            return Err(WorkspaceError::StaleRevision {
                file,
                revision,
                current,
            });
        }
        trace!(file = %name, view_type, %revision, "creating file view");

        let view_type: Arc<str> = view_type.into();
        let representation = Representation {
            file,
            view_type: Arc::clone(&view_type),
            revision,
            created: SystemTime::now(),
        };
        state.views.entry(file).or_default().insert(
            view_type,
            StoredView {
                representation: representation.clone(),
                data: data.into(),
            },
        );
        Ok(representation)
    }

    /// The cached representation of `file` of `view_type`, if present.
    pub async fn query_representation(
        &self,
        file: FileId,
        view_type: &str,
    ) -> Result<Option<Representation>, WorkspaceError> {
        let state = self.inner.state.read().await;
        state.entry(file)?;
        Ok(state
            .views
            .get(&file)
            .and_then(|views| views.get(view_type))
            .map(|v| v.representation.clone()))
    }

    /// The stored data of a representation.
    pub async fn representation_content(
        &self,
        representation: &Representation,
    ) -> Result<Arc<[u8]>, WorkspaceError> {
        let state = self.inner.state.read().await;
        state
            .views
            .get(&representation.file)
            .and_then(|views| views.get(representation.view_type.as_ref()))
            .filter(|v| v.representation.created == representation.created)
            .map(|v| Arc::clone(&v.data))
            .ok_or_else(|| WorkspaceError::UnknownRepresentation {
                file: representation.file,
                view_type: representation.view_type.to_string(),
            })
    }
}

#[async_trait]
impl Service for WorkspaceService {
    fn name(&self) -> &str {
        "workspace-service"
    }

    async fn initialize(&self, registration: &Registration) -> Result<(), ServiceError> {
        let inner = Arc::clone(&self.inner);
        registration
            .listen(move |_ev: ApplicationShutdown| {
                let inner = Arc::clone(&inner);
                async move {
                    let mut state = inner.state.write().await;
                    state.closed = true;
                    info!(files = state.files.len(), "workspace closed");
                    Ok::<_, ListenerError>(())
                }
            })
            .await?;
        debug!("workspace ready");
        Ok(())
    }
}
