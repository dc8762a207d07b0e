//! # Example: Workspace bootstrap
//!
//! Boots the runtime with the workspace, the mapper and the event log, imports
//! a few files, renders a view and shuts down (after 2s, or on Ctrl-C).
//!
//! ```text
//! RUST_LOG=arachne=debug cargo run --example bootstrap
//! ```

use std::sync::Arc;
use std::time::Duration;

use arachne::{
    ClassParser, Config, FileEntry, GeneratorError, JobError, MapperService, MappingFactory,
    Runtime, Service, ShutdownReason, SymbolType, ViewFeature, ViewGenerator, WorkspaceService,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const MAGIC: &[u8] = b"\xca\xfe\xba\xbe";

/// Accepts anything that starts with the class file magic.
struct MagicCheck;

impl ClassParser for MagicCheck {
    fn import(&self, file: &FileEntry, content: &[u8]) -> Result<(), JobError> {
        if !content.starts_with(MAGIC) {
            return Err(JobError::fail(format!("{} is not a class file", file.name)));
        }
        tracing::info!(file = %file.name, "class imported");
        Ok(())
    }
}

/// Pretends to extract class symbols.
struct ClassSymbols;

impl MappingFactory for ClassSymbols {
    fn name(&self) -> &str {
        "class-symbols"
    }

    fn handles(&self, file: &FileEntry, content: &[u8]) -> bool {
        file.name.ends_with(".class") && content.starts_with(MAGIC)
    }

    fn generate_mappings(
        &self,
        file: &FileEntry,
        content: &[u8],
        ctx: &CancellationToken,
    ) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Canceled);
        }
        tracing::info!(file = %file.name, bytes = content.len(), "symbols mapped");
        Ok(())
    }
}

/// Hex view of any file.
struct HexView;

impl ViewGenerator for HexView {
    fn view_type(&self) -> &str {
        "hex"
    }

    fn handles(&self, _file: &FileEntry) -> bool {
        true
    }

    fn generate(&self, _file: &FileEntry, content: &[u8]) -> Result<Vec<u8>, GeneratorError> {
        Ok(content
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(" ")
            .into_bytes())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("arachne=info")),
        )
        .init();

    let cfg = Config {
        grace: Duration::from_secs(5),
        listener_timeout: Duration::from_secs(1),
        max_concurrent_jobs: 4,
        ..Config::default()
    };
    let runtime = Runtime::builder(cfg).with_event_log().build();

    let workspace = WorkspaceService::with_class_parser(
        runtime.broker().clone(),
        runtime.pool().clone(),
        Arc::new(MagicCheck),
    );
    let mapper = MapperService::new(runtime.pool().clone());
    mapper.register_symbol_type(SymbolType::new("java-class")).await?;
    mapper.register_mapping_factory(Arc::new(ClassSymbols)).await;
    let views = ViewFeature::new(workspace.clone());
    views.register_view_generator(Arc::new(HexView)).await;

    let services: Vec<Arc<dyn Service>> = vec![Arc::new(workspace.clone()), Arc::new(mapper)];
    runtime.start(services).await?;

    let jar = workspace.add_archive_entry("demo.jar", None).await?;
    let pkg = workspace.add_directory_entry("demo", Some(jar.id)).await?;
    let main = workspace
        .add_class_entry("Main.class", Some(pkg.id), &b"\xca\xfe\xba\xbe\x00\x00\x00\x41"[..])
        .await?;
    workspace
        .add_file_entry("MANIFEST.MF", Some(jar.id), &b"Main-Class: demo.Main\n"[..])
        .await?;

    if let Some(view) = views.generate_view(main.id, "hex").await? {
        let mut out: Vec<u8> = Vec::new();
        views.export_view(&view, &mut out).await?;
        println!("{}: {}", workspace.path_of(main.id).await?, String::from_utf8_lossy(&out));
    }
    for node in workspace.list_files_recursively(None).await? {
        for entry in node.flatten() {
            println!("  {}", workspace.path_of(entry.id).await?);
        }
    }

    let stopper = runtime.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        stopper.request_shutdown();
    });
    let reason = tokio::select! {
        _ = tokio::signal::ctrl_c() => ShutdownReason::Signal,
        _ = runtime.shutdown_requested() => ShutdownReason::Requested,
    };
    runtime.stop(reason).await?;
    Ok(())
}
