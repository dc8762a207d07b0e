//! # Mapper: symbol/reference type registry and mapping generation.
//!
//! Mapping factories extract symbols and references (class names, method
//! calls, ...) from file contents. The mapper listens for
//! [`ResourceAdded`] and hands every factory that accepts the new file a
//! blocking job on the worker pool. The jobs are not awaited.
//!
//! ```text
//! ResourceAdded { file, content }
//!   └─► for factory in factories (registration order):
//!          factory.handles(file, content)?  ──► pool.submit_blocking("mapping:<factory>:<file>")
//! ```
//!
//! A reference type always points at a symbol type, so the symbol type has
//! to be registered first. Registering a type twice is an error.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::broker::{Registration, Service};
use crate::error::{JobError, ListenerError, ServiceError};
use crate::events::ResourceAdded;
use crate::pool::WorkerPool;
use crate::workspace::FileEntry;

/// Kind of symbol a mapping can define, e.g. `"java-class"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolType(Arc<str>);

impl SymbolType {
    /// Creates a symbol type identified by `name`.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    /// The identifying name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SymbolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of reference to a symbol, e.g. `"java-method-call"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReferenceType(Arc<str>);

impl ReferenceType {
    /// Creates a reference type identified by `name`.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    /// The identifying name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReferenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// # Errors raised by type registration at the mapper.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    /// The symbol type is already registered.
    #[error("symbol type '{symbol}' has been registered before")]
    SymbolTypeRegistered {
        /// The duplicate symbol type.
        symbol: SymbolType,
    },

    /// A reference type points at a symbol type nobody registered.
    #[error("symbol type '{symbol}' has not been registered yet")]
    SymbolTypeNotRegistered {
        /// The missing symbol type.
        symbol: SymbolType,
    },

    /// The reference type is already registered.
    #[error("reference type '{reference}' has been registered before")]
    ReferenceTypeRegistered {
        /// The duplicate reference type.
        reference: ReferenceType,
    },
}

impl MappingError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            MappingError::SymbolTypeRegistered { .. } => "mapping_symbol_type_registered",
            MappingError::SymbolTypeNotRegistered { .. } => "mapping_symbol_type_not_registered",
            MappingError::ReferenceTypeRegistered { .. } => "mapping_reference_type_registered",
        }
    }
}

/// Generates mappings for the files it handles.
///
/// Runs on the worker pool's blocking threads; `ctx` is cancelled on
/// shutdown or when the job times out.
pub trait MappingFactory: Send + Sync + 'static {
    /// Name used in job names and logs.
    fn name(&self) -> &str;

    /// True if this factory can map `file`.
    fn handles(&self, file: &FileEntry, content: &[u8]) -> bool;

    /// Extracts the mappings of `file`.
    fn generate_mappings(
        &self,
        file: &FileEntry,
        content: &[u8],
        ctx: &CancellationToken,
    ) -> Result<(), JobError>;
}

#[derive(Default)]
struct Types {
    symbols: HashSet<SymbolType>,
    references: HashMap<ReferenceType, SymbolType>,
}

struct Inner {
    pool: WorkerPool,
    factories: RwLock<Vec<Arc<dyn MappingFactory>>>,
    types: RwLock<Types>,
}

/// The mapper feature. Cloning shares the same registry.
#[derive(Clone)]
pub struct MapperService {
    inner: Arc<Inner>,
}

impl MapperService {
    /// Creates a mapper scheduling its jobs on `pool`.
    pub fn new(pool: WorkerPool) -> Self {
        Self {
            inner: Arc::new(Inner {
                pool,
                factories: RwLock::new(Vec::new()),
                types: RwLock::new(Types::default()),
            }),
        }
    }

    /// Registers a factory. Factories are consulted in registration order.
    pub async fn register_mapping_factory(&self, factory: Arc<dyn MappingFactory>) {
        debug!(factory = factory.name(), "registered mapping factory");
        self.inner.factories.write().await.push(factory);
    }

    /// Registers a symbol type.
    pub async fn register_symbol_type(&self, symbol: SymbolType) -> Result<(), MappingError> {
        let mut types = self.inner.types.write().await;
        if types.symbols.contains(&symbol) {
            return Err(MappingError::SymbolTypeRegistered { symbol });
        }
        types.symbols.insert(symbol);
        Ok(())
    }

    /// Registers a reference type pointing at the already registered `symbol`.
    pub async fn register_reference_type(
        &self,
        reference: ReferenceType,
        symbol: &SymbolType,
    ) -> Result<(), MappingError> {
        let mut types = self.inner.types.write().await;
        if !types.symbols.contains(symbol) {
            return Err(MappingError::SymbolTypeNotRegistered {
                symbol: symbol.clone(),
            });
        }
        if types.references.contains_key(&reference) {
            return Err(MappingError::ReferenceTypeRegistered { reference });
        }
        types.references.insert(reference, symbol.clone());
        Ok(())
    }

    /// The symbol type a reference type points at.
    pub async fn referenced_symbol(&self, reference: &ReferenceType) -> Option<SymbolType> {
        self.inner.types.read().await.references.get(reference).cloned()
    }

    /// Registered symbol types, sorted.
    pub async fn symbol_types(&self) -> Vec<SymbolType> {
        let mut out: Vec<_> = self.inner.types.read().await.symbols.iter().cloned().collect();
        out.sort();
        out
    }

    /// Schedules mapping jobs for `file`. Returns how many were scheduled.
    pub async fn generate_mappings(&self, file: &FileEntry, content: &Arc<[u8]>) -> usize {
        let factories = self.inner.factories.read().await.clone();
        let mut scheduled = 0;
        for factory in factories.into_iter().filter(|f| f.handles(file, content)) {
            debug!(factory = factory.name(), file = %file.name, "generating mappings");
            let (file, content) = (file.clone(), Arc::clone(content));
            let name = format!("mapping:{}:{}", factory.name(), file.name);
            self.inner.pool.submit_blocking(name, move |ctx| {
                factory.generate_mappings(&file, &content, &ctx)
            });
            scheduled += 1;
        }
        scheduled
    }
}

#[async_trait]
impl Service for MapperService {
    fn name(&self) -> &str {
        "mapper-feature"
    }

    async fn initialize(&self, registration: &Registration) -> Result<(), ServiceError> {
        let mapper = self.clone();
        registration
            .listen(move |ev: ResourceAdded| {
                let mapper = mapper.clone();
                async move {
                    mapper.generate_mappings(&ev.file, &ev.content).await;
                    Ok::<_, ListenerError>(())
                }
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::broker::Broker;
    use crate::config::Config;
    use crate::workspace::WorkspaceService;

    /// Records the files it mapped; handles `.class` files only.
    struct ClassFactory(Mutex<Vec<String>>);

    impl MappingFactory for ClassFactory {
        fn name(&self) -> &str {
            "class"
        }

        fn handles(&self, file: &FileEntry, _content: &[u8]) -> bool {
            file.name.ends_with(".class")
        }

        fn generate_mappings(
            &self,
            file: &FileEntry,
            _content: &[u8],
            _ctx: &CancellationToken,
        ) -> Result<(), JobError> {
            self.0.lock().unwrap().push(file.name.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn symbol_and_reference_registration_rules() {
        let mapper = MapperService::new(WorkerPool::new(&Config::default()));
        let class = SymbolType::new("java-class");
        let call = ReferenceType::new("java-method-call");

        assert_eq!(
            mapper.register_reference_type(call.clone(), &class).await,
            Err(MappingError::SymbolTypeNotRegistered {
                symbol: class.clone()
            })
        );

        mapper.register_symbol_type(class.clone()).await.unwrap();
        assert_eq!(
            mapper
                .register_symbol_type(class.clone())
                .await
                .unwrap_err()
                .as_label(),
            "mapping_symbol_type_registered"
        );

        mapper.register_reference_type(call.clone(), &class).await.unwrap();
        assert_eq!(
            mapper.register_reference_type(call.clone(), &class).await,
            Err(MappingError::ReferenceTypeRegistered {
                reference: call.clone()
            })
        );
        assert_eq!(mapper.referenced_symbol(&call).await, Some(class.clone()));
        assert_eq!(mapper.symbol_types().await, [class]);
    }

    #[tokio::test]
    async fn added_resources_are_mapped_in_the_background() {
        let cfg = Config::default();
        let broker = Broker::new(&cfg);
        let pool = WorkerPool::new(&cfg);
        let mapper = MapperService::new(pool.clone());
        let factory = Arc::new(ClassFactory(Mutex::new(Vec::new())));
        mapper
            .register_mapping_factory(factory.clone() as Arc<dyn MappingFactory>)
            .await;

        let ws = WorkspaceService::new(broker.clone(), pool.clone());
        broker.register_service(Arc::new(ws.clone())).await.unwrap();
        broker.register_service(Arc::new(mapper)).await.unwrap();

        ws.add_file_entry("A.class", None, &b"\xca\xfe"[..]).await.unwrap();
        ws.add_file_entry("notes.txt", None, &b"hi"[..]).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while factory.0.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        pool.shutdown(Duration::from_secs(5)).await.unwrap();

        assert_eq!(*factory.0.lock().unwrap(), ["A.class"]);
    }
}
