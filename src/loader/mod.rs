//! Content loading and eviction.
//!
//! Nodes are assembled from summaries, main rows, simple-child collections and
//! optionally complex children. Large fields stay deferred until
//! [`ContentLoader::load_lazy`] fetches them. Every operation holds the
//! registry's shared lock for its duration.

mod node;

pub use node::{ChildCollection, LazyState, Node, Property, PropertyValue};

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, info, trace, warn};

use crate::access::{ContentChangeEvent, ContentChangeSink, ContentSummary, RelationalAccess};
use crate::catalog::{DescriptorRegistry, RegistryView};
use crate::schema::{
    PropertyType, SystemFields, SystemSource, TypeDescriptor, CONTENT_ID_COLUMN,
    REVISION_COLUMN,
};
use crate::synth::{RowClass, RowHandle};
use crate::query::Value;
use crate::types::{ContentTypeId, Guid, RepoError, Result};

/// What a load materializes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LoadOptions {
    /// Load complex children.
    pub children: bool,
    /// Omit lazy fields entirely instead of deferring them.
    pub minimal: bool,
    /// Allow binary fields in lazy loads.
    pub binary_access: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            children: true,
            minimal: false,
            binary_access: false,
        }
    }
}

/// Loads and evicts content items.
pub struct ContentLoader {
    registry: Arc<DescriptorRegistry>,
    access: Arc<dyn RelationalAccess>,
    sink: Arc<dyn ContentChangeSink>,
    system: Arc<SystemFields>,
    summaries: Option<Mutex<LruCache<i64, Arc<ContentSummary>>>>,
}

impl ContentLoader {
    /// Creates a loader; a zero `summary_cache_capacity` disables the cache.
    pub fn new(
        registry: Arc<DescriptorRegistry>,
        access: Arc<dyn RelationalAccess>,
        sink: Arc<dyn ContentChangeSink>,
        system: Arc<SystemFields>,
        summary_cache_capacity: usize,
    ) -> Self {
        Self {
            registry,
            access,
            sink,
            system,
            summaries: NonZeroUsize::new(summary_cache_capacity)
                .map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    /// Number of cached summaries.
    pub fn cached_summaries(&self) -> usize {
        self.summaries.as_ref().map_or(0, |c| c.lock().len())
    }

    fn summaries(&self, content_ids: &[i64]) -> Result<FxHashMap<i64, Arc<ContentSummary>>> {
        let mut found = FxHashMap::default();
        let mut missing = Vec::new();
        match &self.summaries {
            Some(cache) => {
                let mut cache = cache.lock();
                for cid in content_ids {
                    match cache.get(cid) {
                        Some(summary) => {
                            found.insert(*cid, Arc::clone(summary));
                        }
                        None => missing.push(*cid),
                    }
                }
            }
            None => missing.extend_from_slice(content_ids),
        }
        if !missing.is_empty() {
            let loaded = self.access.load_summaries(&missing)?;
            let mut cache = self.summaries.as_ref().map(|c| c.lock());
            for summary in loaded {
                let summary = Arc::new(summary);
                if let Some(cache) = cache.as_mut() {
                    cache.put(summary.content_id, Arc::clone(&summary));
                }
                found.insert(summary.content_id, summary);
            }
        }
        trace!(
            requested = content_ids.len(),
            found = found.len(),
            "loader.summaries"
        );
        Ok(found)
    }

    /// Loads items in request order; unknown identities are skipped.
    pub fn load_by_guids(&self, guids: &[Guid], options: LoadOptions) -> Result<Vec<Node>> {
        let view = self.registry.view();
        let mut content_ids: Vec<i64> = guids.iter().map(|g| g.content_id).collect();
        content_ids.sort_unstable();
        content_ids.dedup();
        let summaries = self.summaries(&content_ids)?;

        let mut groups: FxHashMap<ContentTypeId, Vec<Guid>> = FxHashMap::default();
        let mut order: Vec<ContentTypeId> = Vec::new();
        for guid in guids {
            if guid.is_child_row() {
                debug!(guid = %guid, "loader.skip.child_row");
                continue;
            }
            let Some(summary) = summaries.get(&guid.content_id) else {
                debug!(guid = %guid, "loader.skip.no_summary");
                continue;
            };
            let group = groups.entry(summary.content_type).or_insert_with(|| {
                order.push(summary.content_type);
                Vec::new()
            });
            if !group.contains(guid) {
                group.push(*guid);
            }
        }

        let mut loaded: FxHashMap<Guid, Node> = FxHashMap::default();
        for content_type in order {
            let Some(desc) = view.parent(content_type) else {
                warn!(content_type = %content_type, "loader.skip.no_descriptor");
                continue;
            };
            let class = main_class(desc)?;
            let ids = &groups[&content_type];
            let rows = self.access.load_rows(&class, ids, None)?;
            debug!(content_type = %content_type, requested = ids.len(), rows = rows.len(), "loader.batch");
            let mut nodes = Vec::with_capacity(rows.len());
            for row in &rows {
                let Some(summary) = summaries.get(&row.content_id()) else {
                    continue;
                };
                nodes.push(self.assemble_item(desc, &class, summary, row, options)?);
            }
            if options.children {
                self.attach_children(&view, desc, &mut nodes, options)?;
            }
            for node in nodes {
                loaded.insert(node.guid(), node);
            }
        }
        Ok(guids.iter().filter_map(|g| loaded.remove(g)).collect())
    }

    fn assemble_item(
        &self,
        desc: &TypeDescriptor,
        class: &RowClass,
        summary: &ContentSummary,
        row: &RowHandle,
        options: LoadOptions,
    ) -> Result<Node> {
        let guid = row.identity();
        let mut node = Node::new(guid, desc.key(), desc.type_name());
        for field in self.system.iter() {
            let value = match field.source {
                SystemSource::Summary => node::summary_value(summary, &field.column),
                SystemSource::Row if field.column == CONTENT_ID_COLUMN => {
                    Some(Value::Long(guid.content_id))
                }
                SystemSource::Row if field.column == REVISION_COLUMN => {
                    Some(Value::Long(i64::from(guid.revision)))
                }
                SystemSource::Row => None,
            };
            match value {
                Some(value) => node.set(&field.name, PropertyValue::Single(value)),
                None => trace!(field = %field.name, "loader.system.unmapped"),
            }
        }
        node.apply_row(row);
        for child in desc.simple_children() {
            let values = self.access.load_collection(class, &child.name, guid)?;
            node.set(&child.name, PropertyValue::Multi(values));
        }
        if !options.minimal {
            for name in desc.lazy_properties() {
                node.defer(name);
            }
        }
        Ok(node)
    }

    fn attach_children(
        &self,
        view: &RegistryView<'_>,
        desc: &TypeDescriptor,
        nodes: &mut [Node],
        options: LoadOptions,
    ) -> Result<()> {
        let owners: Vec<Guid> = nodes.iter().map(Node::guid).collect();
        let mut collections: FxHashMap<Guid, Vec<ChildCollection>> = FxHashMap::default();
        for child in desc.children() {
            if view.lookup(&child.key()).is_none() {
                continue;
            }
            let Some(class) = child.main_class().and_then(|c| c.class()).cloned() else {
                warn!(child = %child.type_name(), "loader.skip.dead_child");
                continue;
            };
            let rows = self.access.load_children(&class, &owners, None)?;
            let mut by_owner: FxHashMap<Guid, Vec<Node>> = FxHashMap::default();
            for row in &rows {
                let mut node = Node::new(row.identity(), child.key(), child.type_name());
                node.apply_row(row);
                if !options.minimal {
                    for name in child.lazy_properties() {
                        node.defer(name);
                    }
                }
                by_owner.entry(row.identity().owner()).or_default().push(node);
            }
            for owner in &owners {
                collections.entry(*owner).or_default().push(ChildCollection {
                    name: child.type_name().to_string(),
                    key: child.key(),
                    nodes: by_owner.remove(owner).unwrap_or_default(),
                });
            }
        }
        for node in nodes.iter_mut() {
            node.set_children(collections.remove(&node.guid()).unwrap_or_default());
        }
        Ok(())
    }

    /// Fetches deferred fields. Item nodes take one query each; the child nodes
    /// of one parent share a single query per child descriptor. Returns the
    /// number of nodes updated.
    pub fn load_lazy(&self, nodes: &mut [Node], options: LoadOptions) -> Result<usize> {
        let view = self.registry.view();
        let mut updated = 0;
        for node in nodes.iter_mut() {
            let parent_guid = node.guid();
            if wants_lazy(node, options) {
                if let Some(class) = view.lookup(&node.key()).and_then(|d| lazy_class(d)) {
                    let fields = lazy_fields(&class, options);
                    let rows =
                        self.access
                            .load_rows(&class, &[parent_guid], fields.as_deref())?;
                    if let Some(row) = rows.first() {
                        if node.apply_lazy(row, options.binary_access) {
                            updated += 1;
                        }
                    }
                }
            }
            for collection in node.children_mut() {
                if !collection.nodes.iter().any(|n| wants_lazy(n, options)) {
                    continue;
                }
                let Some(child) = view.lookup(&collection.key) else {
                    continue;
                };
                if child.is_dead() {
                    warn!(child = %child.type_name(), "loader.skip.dead_child");
                    continue;
                }
                let Some(class) = lazy_class(child) else {
                    continue;
                };
                let fields = lazy_fields(&class, options);
                let rows =
                    self.access
                        .load_children(&class, &[parent_guid], fields.as_deref())?;
                let by_id: FxHashMap<Guid, &RowHandle> =
                    rows.iter().map(|r| (r.identity(), r)).collect();
                for child in collection.nodes.iter_mut() {
                    if !wants_lazy(child, options) {
                        continue;
                    }
                    if let Some(row) = by_id.get(&child.guid()) {
                        if child.apply_lazy(row, options.binary_access) {
                            updated += 1;
                        }
                    }
                }
            }
        }
        debug!(updated, "loader.lazy");
        Ok(updated)
    }

    /// Evicts cached state of `guids` and publishes a change event.
    pub fn evict(&self, guids: &[Guid]) -> Result<()> {
        let view = self.registry.view();
        let mut content_ids: Vec<i64> = guids.iter().map(|g| g.content_id).collect();
        content_ids.sort_unstable();
        content_ids.dedup();
        let summaries = self.summaries(&content_ids)?;
        for guid in guids {
            let item = guid.owner();
            self.access.evict_summary(item.content_id);
            if let Some(cache) = &self.summaries {
                cache.lock().pop(&item.content_id);
            }
            let Some(desc) = summaries
                .get(&item.content_id)
                .and_then(|s| view.parent(s.content_type))
            else {
                debug!(guid = %guid, "loader.evict.no_descriptor");
                continue;
            };
            let mut main_name = None;
            for layout in desc.row_classes() {
                if let Some(class) = layout.class() {
                    self.access.evict_entity(&class.name, item);
                    if !class.lazy {
                        main_name = Some(class.name.clone());
                    }
                }
            }
            let Some(main_name) = main_name else {
                continue;
            };
            for child in desc.simple_children() {
                self.access
                    .evict_collection(&format!("{main_name}.{}", child.name), item);
            }
            for child in desc.children() {
                self.access
                    .evict_collection(&format!("{main_name}.{}", child.type_name()), item);
                for layout in child.row_classes() {
                    if let Some(class) = layout.class() {
                        self.access.evict_class(&class.name);
                    }
                }
            }
        }
        self.sink.publish(&ContentChangeEvent {
            items: guids.to_vec(),
        });
        info!(items = guids.len(), "loader.evict");
        Ok(())
    }
}

fn wants_lazy(node: &Node, options: LoadOptions) -> bool {
    match node.lazy_state() {
        LazyState::Pending => true,
        LazyState::PartiallyLoaded => options.binary_access,
        LazyState::None | LazyState::Loaded => false,
    }
}

fn main_class(desc: &TypeDescriptor) -> Result<Arc<RowClass>> {
    desc.main_class()
        .and_then(|c| c.class())
        .cloned()
        .ok_or(RepoError::UnknownContentType(desc.key().content_type))
}

fn lazy_class(desc: &Arc<TypeDescriptor>) -> Option<Arc<RowClass>> {
    desc.lazy_class().and_then(|c| c.class()).cloned()
}

/// Lazy columns to fetch; binary columns only with `binary_access`.
fn lazy_fields(class: &RowClass, options: LoadOptions) -> Option<Vec<&str>> {
    if options.binary_access {
        return None;
    }
    Some(
        class
            .fields
            .iter()
            .filter(|f| f.ty != PropertyType::LargeBinary)
            .map(|f| f.name.as_str())
            .collect(),
    )
}
