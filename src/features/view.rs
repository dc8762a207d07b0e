//! # View generation: human-readable interpretations of binary files.
//!
//! A [`ViewGenerator`] turns file contents into a view (a disassembly, a
//! decompiled class, rendered image data, ...). [`ViewFeature`] keeps one
//! generator per view type and caches generated views as workspace
//! representations until the file changes.
//!
//! ```text
//! generate_view(file, view_type)
//!   ├─ cached representation?           → return it
//!   ├─ no generator for view_type       → Err(UnknownGenerator)
//!   ├─ generator does not handle file   → Ok(None)
//!   └─ (content, revision) = file_snapshot(file)
//!      pool.submit_blocking(generate)   → store at revision → Ok(Some(repr))
//!                                          └─ file updated meanwhile → start over
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{RwLock, oneshot};
use tracing::{debug, info};

use crate::error::JobError;
use crate::workspace::{FileEntry, FileId, Representation, WorkspaceError, WorkspaceService};

/// Generation attempts before a file that keeps changing is given up on.
const MAX_GENERATE_ATTEMPTS: usize = 3;

/// Boxed error returned by generators.
pub type GeneratorError = Box<dyn std::error::Error + Send + Sync>;

/// Strategy producing one type of view.
pub trait ViewGenerator: Send + Sync + 'static {
    /// View type identifier, e.g. `"disassembly"`.
    fn view_type(&self) -> &str;

    /// True if this generator can produce a view of `file`.
    fn handles(&self, file: &FileEntry) -> bool;

    /// Produces the view data. Runs on a blocking thread.
    fn generate(&self, file: &FileEntry, content: &[u8]) -> Result<Vec<u8>, GeneratorError>;
}

/// # Errors produced by view generation.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ViewError {
    /// No generator is registered for the requested view type.
    #[error("view generator '{view_type}' does not exist")]
    UnknownGenerator {
        /// The requested view type.
        view_type: String,
    },

    /// The generation job failed, panicked, timed out or was cancelled.
    #[error("view generation failed: {0}")]
    Job(#[from] JobError),

    /// Reading the file or storing the view failed.
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}

impl ViewError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ViewError::UnknownGenerator { .. } => "view_unknown_generator",
            ViewError::Job(e) => e.as_label(),
            ViewError::Workspace(e) => e.as_label(),
        }
    }
}

/// Registry of view generators on top of the workspace.
#[derive(Clone)]
pub struct ViewFeature {
    workspace: WorkspaceService,
    generators: Arc<RwLock<HashMap<String, Arc<dyn ViewGenerator>>>>,
}

impl ViewFeature {
    /// Creates a view feature without generators, storing views in `workspace`.
    pub fn new(workspace: WorkspaceService) -> Self {
        Self {
            workspace,
            generators: Arc::default(),
        }
    }

    /// Registers a generator, replacing any earlier one of the same view type.
    pub async fn register_view_generator(&self, generator: Arc<dyn ViewGenerator>) {
        let view_type = generator.view_type().to_string();
        debug!(view_type, "registered view generator");
        self.generators.write().await.insert(view_type, generator);
    }

    /// Returns the `view_type` view of `file`, generating and caching it if
    /// needed. `Ok(None)` means the generator does not handle this file.
    ///
    /// A view whose file was updated while it was being generated is thrown
    /// away and generated again from the new content.
    pub async fn generate_view(
        &self,
        file: FileId,
        view_type: &str,
    ) -> Result<Option<Representation>, ViewError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            if let Some(existing) = self.workspace.query_representation(file, view_type).await? {
                debug!(file = %file, view_type, created = ?existing.created, "reusing existing representation");
                return Ok(Some(existing));
            }

            let generator = self
                .generators
                .read()
                .await
                .get(view_type)
                .cloned()
                .ok_or_else(|| ViewError::UnknownGenerator {
                    view_type: view_type.to_string(),
                })?;

            let entry = self.workspace.query_id(file).await?;
            if !generator.handles(&entry) {
                return Ok(None);
            }

            let (content, revision) = self.workspace.file_snapshot(file).await?;
            info!(file = %entry.name, view_type, %revision, "creating representation");
            let data = self.render(generator, entry, content, view_type).await?;

            match self
                .workspace
                .add_file_representation(file, revision, view_type, data)
                .await
            {
                Ok(representation) => return Ok(Some(representation)),
                Err(WorkspaceError::StaleRevision { current, .. })
                    if attempt < MAX_GENERATE_ATTEMPTS =>
                {
                    debug!(file = %file, view_type, %revision, %current, attempt, "file changed during generation");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Runs `generator` on the worker pool's blocking threads.
    async fn render(
        &self,
        generator: Arc<dyn ViewGenerator>,
        entry: FileEntry,
        content: Arc<[u8]>,
        view_type: &str,
    ) -> Result<Vec<u8>, ViewError> {
        let (tx, rx) = oneshot::channel();
        let name = format!("view:{view_type}:{}", entry.name);
        self.workspace
            .pool()
            .submit_blocking(name, move |_ctx| {
                let data = generator
                    .generate(&entry, &content)
                    .map_err(|e| JobError::fail(e.to_string()))?;
                let _ = tx.send(data);
                Ok(())
            })
            .wait()
            .await?;
        Ok(rx.await.map_err(|_| JobError::Canceled)?)
    }

    /// Writes the data of `representation` into `out`. `out` is flushed but
    /// not shut down.
    pub async fn export_view<W>(
        &self,
        representation: &Representation,
        out: &mut W,
    ) -> Result<(), ViewError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let data = self.workspace.representation_content(representation).await?;
        out.write_all(&data)
            .await
            .map_err(WorkspaceError::from)?;
        out.flush().await.map_err(WorkspaceError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc as std_mpsc;

    use tokio::sync::mpsc;

    use super::*;
    use crate::broker::Broker;
    use crate::config::Config;
    use crate::pool::WorkerPool;

    /// "Disassembles" `.class` files by hex-encoding them.
    struct HexDump(AtomicUsize);

    impl ViewGenerator for HexDump {
        fn view_type(&self) -> &str {
            "hexdump"
        }

        fn handles(&self, file: &FileEntry) -> bool {
            file.name.ends_with(".class")
        }

        fn generate(&self, _file: &FileEntry, content: &[u8]) -> Result<Vec<u8>, GeneratorError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            if content.is_empty() {
                return Err("empty class file".into());
            }
            Ok(content
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect::<String>()
                .into_bytes())
        }
    }

    async fn setup() -> (ViewFeature, WorkspaceService, Arc<HexDump>) {
        let cfg = Config::default();
        let broker = Broker::new(&cfg);
        let ws = WorkspaceService::new(broker, WorkerPool::new(&cfg));
        let views = ViewFeature::new(ws.clone());
        let hex = Arc::new(HexDump(AtomicUsize::new(0)));
        views
            .register_view_generator(hex.clone() as Arc<dyn ViewGenerator>)
            .await;
        (views, ws, hex)
    }

    #[tokio::test]
    async fn generated_view_is_cached_until_the_file_changes() {
        let (views, ws, hex) = setup().await;
        let file = ws.add_file_entry("A.class", None, &b"\xca\xfe"[..]).await.unwrap();

        let first = views.generate_view(file.id, "hexdump").await.unwrap().unwrap();
        let again = views.generate_view(file.id, "hexdump").await.unwrap().unwrap();
        assert_eq!(first, again);
        assert_eq!(hex.0.load(Ordering::SeqCst), 1);

        let mut out: Vec<u8> = Vec::new();
        views.export_view(&first, &mut out).await.unwrap();
        assert_eq!(out, b"cafe");

        ws.update_file_entry(file.id, &b"\xba\xbe"[..]).await.unwrap();
        let fresh = views.generate_view(file.id, "hexdump").await.unwrap().unwrap();
        assert_eq!(hex.0.load(Ordering::SeqCst), 2);
        let mut out: Vec<u8> = Vec::new();
        views.export_view(&fresh, &mut out).await.unwrap();
        assert_eq!(out, b"babe");
    }

    /// Echoes the content; the first call blocks until released.
    struct Gated {
        calls: AtomicUsize,
        started: mpsc::UnboundedSender<()>,
        release: Mutex<Option<std_mpsc::Receiver<()>>>,
    }

    impl ViewGenerator for Gated {
        fn view_type(&self) -> &str {
            "echo"
        }

        fn handles(&self, _file: &FileEntry) -> bool {
            true
        }

        fn generate(&self, _file: &FileEntry, content: &[u8]) -> Result<Vec<u8>, GeneratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _ = self.started.send(());
            let gate = self.release.lock().unwrap().take();
            if let Some(gate) = gate {
                let _ = gate.recv();
            }
            Ok(content.to_vec())
        }
    }

    #[tokio::test]
    async fn update_during_generation_is_not_cached_as_current() {
        let (views, ws, _) = setup().await;
        let (started_tx, mut started_rx) = mpsc::unbounded_channel();
        let (release_tx, release_rx) = std_mpsc::channel();
        let gated = Arc::new(Gated {
            calls: AtomicUsize::new(0),
            started: started_tx,
            release: Mutex::new(Some(release_rx)),
        });
        views
            .register_view_generator(gated.clone() as Arc<dyn ViewGenerator>)
            .await;
        let id = ws.add_file_entry("A.class", None, &b"v1"[..]).await.unwrap().id;

        let in_flight = tokio::spawn({
            let views = views.clone();
            async move { views.generate_view(id, "echo").await }
        });
        started_rx.recv().await.unwrap();
        ws.update_file_entry(id, &b"v2"[..]).await.unwrap();
        release_tx.send(()).unwrap();

        let view = in_flight.await.unwrap().unwrap().unwrap();
        assert_eq!(gated.calls.load(Ordering::SeqCst), 2);
        assert_eq!(view.revision, ws.file_snapshot(id).await.unwrap().1);

        let cached = views.generate_view(id, "echo").await.unwrap().unwrap();
        assert_eq!(cached, view);
        let mut out: Vec<u8> = Vec::new();
        views.export_view(&cached, &mut out).await.unwrap();
        assert_eq!(out, ws.file_content(id).await.unwrap().to_vec());
        assert_eq!(out, b"v2");
        assert_eq!(gated.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unknown_type_unhandled_file_and_failing_generator() {
        let (views, ws, _) = setup().await;
        let text = ws.add_file_entry("notes.txt", None, &b"hi"[..]).await.unwrap();
        let empty = ws.add_file_entry("Empty.class", None, &b""[..]).await.unwrap();

        let err = views.generate_view(text.id, "decompiled").await.unwrap_err();
        assert_eq!(err.as_label(), "view_unknown_generator");

        assert_eq!(views.generate_view(text.id, "hexdump").await.unwrap(), None);

        let err = views.generate_view(empty.id, "hexdump").await.unwrap_err();
        assert_eq!(err.as_label(), "job_failed");
        assert_eq!(ws.query_representation(empty.id, "hexdump").await.unwrap(), None);
    }
}
