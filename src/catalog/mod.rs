//! Descriptor registry.
//!
//! Maps [`TypeKey`]s to linked [`TypeDescriptor`]s. Lookups take the shared side
//! of the schema lock; [`DescriptorRegistry::register_batch`] holds the
//! exclusive side for the whole rebuild, mapping installation included. A
//! rebuild works on a private copy of the map and publishes it only once every
//! step has succeeded, so a failing batch leaves the previous state in place.

mod batch;

pub use batch::{SchemaBatch, SchemaChange};

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::access::MappingInstaller;
use crate::primitives::concurrency::{LockSnapshot, ReadGuard, SchemaLock};
use crate::schema::{DefinitionSource, ObjectKind, TypeDescriptor};
use crate::synth::{RowClass, Synthesizer};
use crate::types::{ContentTypeId, RepoError, Result, TypeKey};

/// Result of applying a batch.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BatchOutcome {
    /// Nothing to do.
    Unchanged,
    /// Descriptors removed; they are remembered for a later restore.
    Removed(usize),
    /// Previously removed descriptors were reinstated without synthesis.
    Restored(usize),
    /// Row classes were resynthesized and installed for this many descriptors.
    Rebuilt(usize),
}

/// Registry counters.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RegistryStats {
    /// Registered descriptors.
    pub descriptors: usize,
    /// Full rebuilds performed.
    pub rebuilds: u64,
    /// Restores performed.
    pub restores: u64,
    /// Descriptors remembered from the last unregister-only batch.
    pub remembered: usize,
    /// Incremented on every published change.
    pub epoch: u64,
}

#[derive(Default)]
struct RegistryState {
    descriptors: FxHashMap<TypeKey, Arc<TypeDescriptor>>,
    last_removed: Vec<Arc<TypeDescriptor>>,
    epoch: u64,
}

/// Registry of type descriptors guarded by a fair reader/writer lock.
pub struct DescriptorRegistry {
    state: SchemaLock<RegistryState>,
    synthesizer: Synthesizer,
    installer: Arc<dyn MappingInstaller>,
    rebuilds: AtomicU64,
    restores: AtomicU64,
}

impl DescriptorRegistry {
    /// Creates an empty registry installing mappings through `installer`.
    pub fn new(synthesizer: Synthesizer, installer: Arc<dyn MappingInstaller>) -> Self {
        Self {
            state: SchemaLock::new(RegistryState::default()),
            synthesizer,
            installer,
            rebuilds: AtomicU64::new(0),
            restores: AtomicU64::new(0),
        }
    }

    /// Registers every definition of `source` in one batch.
    pub fn register_all(&self, source: &dyn DefinitionSource) -> Result<BatchOutcome> {
        let mut batch = SchemaBatch::new();
        for def in source.definitions() {
            batch.register(def);
        }
        self.register_batch(&batch)
    }

    /// Applies `batch` under the exclusive lock.
    pub fn register_batch(&self, batch: &SchemaBatch) -> Result<BatchOutcome> {
        if batch.is_empty() {
            return Ok(BatchOutcome::Unchanged);
        }
        let mut state = self.state.write();
        let touched = batch.content_type_ids();
        let mut next = state.descriptors.clone();
        let mut removed: Vec<Arc<TypeDescriptor>> = Vec::new();
        next.retain(|key, desc| {
            if touched.contains(&key.content_type) {
                removed.push(Arc::clone(desc));
                false
            } else {
                true
            }
        });
        removed.sort_by_key(|d| d.key());

        if batch.is_unregister_only() {
            let count = removed.len();
            state.descriptors = next;
            if !removed.is_empty() {
                state.last_removed = removed;
            }
            state.epoch += 1;
            info!(removed = count, epoch = state.epoch, "registry.batch.removed");
            return Ok(BatchOutcome::Removed(count));
        }

        let mut built = Vec::new();
        for def in batch.registrations() {
            built.extend(TypeDescriptor::build_all(&def)?);
        }

        let from_batch = !removed.is_empty();
        let reference = if from_batch {
            &removed
        } else {
            &state.last_removed
        };
        if !reference.is_empty() && Self::matches_removed(&built, reference) {
            let restored = reference.clone();
            let count = restored.len();
            for desc in restored {
                next.insert(desc.key(), desc);
            }
            state.descriptors = next;
            if !from_batch {
                state.last_removed.clear();
            }
            state.epoch += 1;
            self.restores.fetch_add(1, Ordering::AcqRel);
            info!(restored = count, epoch = state.epoch, "registry.batch.restore");
            return Ok(BatchOutcome::Restored(count));
        }

        for desc in built {
            next.insert(desc.key(), Arc::new(desc));
        }
        let rebuilt = self.rebuild(&next).and_then(|(descriptors, classes)| {
            self.installer.install(&classes)?;
            Ok((descriptors, classes))
        });
        let (descriptors, classes) = match rebuilt {
            Ok(rebuilt) => rebuilt,
            Err(err) => {
                let live = class_names(state.descriptors.values().chain(&state.last_removed));
                self.synthesizer.naming().retain(live);
                return Err(err);
            }
        };
        self.synthesizer
            .naming()
            .retain(classes.iter().map(|c| c.name.as_str()));
        let count = descriptors.len();
        state.descriptors = descriptors;
        state.last_removed.clear();
        state.epoch += 1;
        self.rebuilds.fetch_add(1, Ordering::AcqRel);
        info!(
            descriptors = count,
            classes = classes.len(),
            epoch = state.epoch,
            "registry.batch.rebuild"
        );
        Ok(BatchOutcome::Rebuilt(count))
    }

    fn matches_removed(built: &[TypeDescriptor], removed: &[Arc<TypeDescriptor>]) -> bool {
        if built.len() != removed.len() {
            return false;
        }
        let mut linker = Linker::default();
        for desc in built {
            linker.add(desc.clone());
        }
        let fresh = linker.finish();
        removed.iter().all(|old| {
            fresh
                .get(&old.key())
                .is_some_and(|new| new.metadata_equal(old))
        })
    }

    fn rebuild(
        &self,
        descriptors: &FxHashMap<TypeKey, Arc<TypeDescriptor>>,
    ) -> Result<(FxHashMap<TypeKey, Arc<TypeDescriptor>>, Vec<Arc<RowClass>>)> {
        let ordered: BTreeMap<TypeKey, &Arc<TypeDescriptor>> =
            descriptors.iter().map(|(k, v)| (*k, v)).collect();
        let mut linker = Linker::default();
        let mut all_classes = Vec::new();
        for desc in ordered.values() {
            let classes = self.synthesizer.synthesize(desc)?;
            linker.add(desc.with_classes(&classes));
            all_classes.extend(classes);
        }
        Ok((linker.finish(), all_classes))
    }

    /// Looks up a descriptor under the shared lock.
    pub fn lookup(&self, key: &TypeKey) -> Option<Arc<TypeDescriptor>> {
        let found = self.state.read().descriptors.get(key).cloned();
        if found.is_none() {
            debug!(key = %key, "registry.lookup.miss");
        }
        found
    }

    /// Holds the shared lock for a multi-step read.
    pub fn view(&self) -> RegistryView<'_> {
        RegistryView {
            guard: self.state.read(),
        }
    }

    /// Registry counters.
    pub fn stats(&self) -> RegistryStats {
        let state = self.state.read();
        RegistryStats {
            descriptors: state.descriptors.len(),
            rebuilds: self.rebuilds.load(Ordering::Acquire),
            restores: self.restores.load(Ordering::Acquire),
            remembered: state.last_removed.len(),
            epoch: state.epoch,
        }
    }

    /// Current lock holders.
    pub fn lock_snapshot(&self) -> LockSnapshot {
        self.state.snapshot()
    }

    /// Synthesizer used by rebuilds.
    pub fn synthesizer(&self) -> &Synthesizer {
        &self.synthesizer
    }
}

/// Names of the classes synthesized for `descriptors`.
fn class_names<'a>(descriptors: impl Iterator<Item = &'a Arc<TypeDescriptor>>) -> Vec<String> {
    descriptors
        .flat_map(|d| d.row_classes().iter().filter_map(|c| c.class()))
        .map(|class| class.name.clone())
        .collect()
}

/// Shared-lock view over the registry.
///
/// Every read operation (planning, loading, eviction) holds a view for its whole
/// duration; schema changes wait until it is dropped.
pub struct RegistryView<'a> {
    guard: ReadGuard<'a, RegistryState>,
}

impl RegistryView<'_> {
    /// Looks up a descriptor.
    pub fn lookup(&self, key: &TypeKey) -> Option<&Arc<TypeDescriptor>> {
        self.guard.descriptors.get(key)
    }

    /// Looks up the parent descriptor of a content type.
    pub fn parent(&self, id: ContentTypeId) -> Option<&Arc<TypeDescriptor>> {
        self.lookup(&TypeKey::parent(id))
    }

    /// Parent descriptors of `kind`, ordered by content type id.
    pub fn parents(&self, kind: ObjectKind) -> Vec<&Arc<TypeDescriptor>> {
        let mut out: Vec<&Arc<TypeDescriptor>> = self
            .guard
            .descriptors
            .values()
            .filter(|d| d.is_parent() && d.kind() == kind)
            .collect();
        out.sort_by_key(|d| d.key());
        out
    }

    /// Finds a parent descriptor by type name.
    pub fn find_parent_by_name(&self, name: &str) -> Option<&Arc<TypeDescriptor>> {
        self.guard
            .descriptors
            .values()
            .filter(|d| d.is_parent() && d.type_name() == name)
            .min_by_key(|d| d.key())
    }

    /// Number of registered descriptors.
    pub fn len(&self) -> usize {
        self.guard.descriptors.len()
    }

    /// Returns `true` when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.guard.descriptors.is_empty()
    }

    /// Epoch of the state this view observes.
    pub fn epoch(&self) -> u64 {
        self.guard.epoch
    }
}

/// Linking pass: attaches complex children to their parents.
#[derive(Default)]
pub struct Linker {
    parents: BTreeMap<TypeKey, (TypeDescriptor, Vec<Arc<TypeDescriptor>>)>,
    children: Vec<TypeDescriptor>,
}

impl Linker {
    /// Stages a descriptor; children are linked in [`Linker::finish`].
    pub fn add(&mut self, desc: TypeDescriptor) {
        if desc.is_parent() {
            self.parents.insert(desc.key(), (desc, Vec::new()));
        } else {
            self.children.push(desc);
        }
    }

    /// Attaches `child` to the staged parent `parent`.
    pub fn add_child_configuration(
        &mut self,
        parent: TypeKey,
        child: Arc<TypeDescriptor>,
    ) -> Result<()> {
        match self.parents.get_mut(&parent) {
            Some((_, kids)) => {
                kids.push(child);
                Ok(())
            }
            None => Err(RepoError::MissingParent(parent)),
        }
    }

    /// Links every staged child and returns the linked map.
    pub fn finish(mut self) -> FxHashMap<TypeKey, Arc<TypeDescriptor>> {
        let mut linked = FxHashMap::default();
        let children = std::mem::take(&mut self.children);
        for child in children {
            let child = Arc::new(child);
            let key = child.key();
            if let Err(err) = self.add_child_configuration(key.parent_key(), Arc::clone(&child)) {
                warn!(child = %key, error = %err, "registry.link.missing_parent");
            }
            linked.insert(key, child);
        }
        for (key, (parent, kids)) in self.parents {
            linked.insert(key, Arc::new(parent.with_children(kids)));
        }
        linked
    }
}
