//! Facade wiring the registry, query engine and loader to one provider.

use std::sync::Arc;

use tracing::info;

use crate::access::{ContentChangeSink, FolderPathExpander, RelationalAccess};
use crate::catalog::{BatchOutcome, DescriptorRegistry, SchemaBatch};
use crate::config::RepositoryConfig;
use crate::loader::{ContentLoader, LoadOptions, Node};
use crate::query::{NodeQuery, QueryEngine, QueryResult};
use crate::schema::{DefinitionSource, TypeDescriptor};
use crate::synth::Synthesizer;
use crate::types::{Guid, Result, TypeKey};

/// Content repository over one relational provider.
pub struct ContentRepository {
    registry: Arc<DescriptorRegistry>,
    engine: QueryEngine,
    loader: ContentLoader,
}

impl ContentRepository {
    /// Wires the components. Nothing is registered until [`Self::initialize`]
    /// or [`Self::register_batch`] runs.
    pub fn new<A>(
        config: &RepositoryConfig,
        access: Arc<A>,
        folders: Arc<dyn FolderPathExpander>,
        sink: Arc<dyn ContentChangeSink>,
    ) -> Self
    where
        A: RelationalAccess + 'static,
    {
        let registry = Arc::new(DescriptorRegistry::new(
            Synthesizer::new(config.dialect()),
            access.clone(),
        ));
        let access: Arc<dyn RelationalAccess> = access;
        let system = Arc::new(config.system_fields());
        let engine = QueryEngine::new(
            Arc::clone(&registry),
            Arc::clone(&access),
            folders,
            Arc::clone(&system),
            config.query_options(),
        );
        let loader = ContentLoader::new(
            Arc::clone(&registry),
            access,
            sink,
            system,
            config.loader.summary_cache_capacity,
        );
        Self {
            registry,
            engine,
            loader,
        }
    }

    /// Registers every definition of `source`.
    pub fn initialize(&self, source: &dyn DefinitionSource) -> Result<BatchOutcome> {
        let outcome = self.registry.register_all(source)?;
        info!(?outcome, "repository.initialize");
        Ok(outcome)
    }

    /// Applies a schema batch.
    pub fn register_batch(&self, batch: &SchemaBatch) -> Result<BatchOutcome> {
        self.registry.register_batch(batch)
    }

    /// Looks up a descriptor.
    pub fn lookup(&self, key: &TypeKey) -> Option<Arc<TypeDescriptor>> {
        self.registry.lookup(key)
    }

    /// Executes a node query.
    pub fn execute(&self, query: &NodeQuery) -> Result<QueryResult> {
        self.engine.execute(query)
    }

    /// Loads items by identity.
    pub fn load_by_guids(&self, guids: &[Guid], options: LoadOptions) -> Result<Vec<Node>> {
        self.loader.load_by_guids(guids, options)
    }

    /// Loads deferred fields.
    pub fn load_lazy(&self, nodes: &mut [Node], options: LoadOptions) -> Result<usize> {
        self.loader.load_lazy(nodes, options)
    }

    /// Evicts cached state.
    pub fn evict(&self, guids: &[Guid]) -> Result<()> {
        self.loader.evict(guids)
    }

    /// Underlying registry.
    pub fn registry(&self) -> &Arc<DescriptorRegistry> {
        &self.registry
    }

    /// Underlying loader.
    pub fn loader(&self) -> &ContentLoader {
        &self.loader
    }
}
