//! Collaborators the engine drives: the relational provider, folder path
//! expansion and change notification.

mod memory;

pub use memory::{
    AccessStats, CollectingSink, Eviction, InMemoryAccess, InMemoryFolders, RowRequest,
};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::query::statement::SelectStatement;
use crate::query::Value;
use crate::schema::ObjectKind;
use crate::synth::{RowClass, RowHandle};
use crate::types::{ContentTypeId, FolderId, Guid, Result};

/// Handle of a provider-side temporary id set.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct IdSetHandle(pub u64);

/// Summary row of a content item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContentSummary {
    /// Content id.
    pub content_id: i64,
    /// Content type.
    pub content_type: ContentTypeId,
    /// Title.
    pub title: String,
    /// Object kind.
    pub object_kind: ObjectKind,
    /// Revision queries and loads target.
    pub current_revision: i32,
    /// Containing folder, if any.
    pub folder_id: Option<FolderId>,
}

/// Receives the row classes of a rebuilt schema.
pub trait MappingInstaller: Send + Sync {
    /// Replaces the installed mappings with `classes`.
    fn install(&self, classes: &[Arc<RowClass>]) -> Result<()>;
}

/// Relational data access used by the planner and the loader.
pub trait RelationalAccess: MappingInstaller {
    /// Executes a select statement, returning rows in projection order.
    fn query(&self, statement: &SelectStatement) -> Result<Vec<Vec<Value>>>;

    /// Loads rows of `class` by identity; missing rows are omitted. `fields`
    /// restricts the columns fetched; `None` fetches every field of the class.
    fn load_rows(
        &self,
        class: &RowClass,
        ids: &[Guid],
        fields: Option<&[&str]>,
    ) -> Result<Vec<RowHandle>>;

    /// Loads the child rows of `class` owned by `owners`, ordered by owner then by
    /// sort rank (or surrogate id when unsorted). `fields` as in
    /// [`RelationalAccess::load_rows`].
    fn load_children(
        &self,
        class: &RowClass,
        owners: &[Guid],
        fields: Option<&[&str]>,
    ) -> Result<Vec<RowHandle>>;

    /// Loads the values of the multi-valued property `property` of `owner`.
    fn load_collection(&self, class: &RowClass, property: &str, owner: Guid)
        -> Result<Vec<Value>>;

    /// Loads summaries; unknown ids are omitted.
    fn load_summaries(&self, content_ids: &[i64]) -> Result<Vec<ContentSummary>>;

    /// Stores `ids` in a temporary set.
    fn create_id_set(&self, ids: &[FolderId]) -> Result<IdSetHandle>;

    /// Drops a temporary set.
    fn release_id_set(&self, handle: IdSetHandle) -> Result<()>;

    /// Evicts one cached entity.
    fn evict_entity(&self, class: &str, id: Guid);

    /// Evicts every cached entity of a class.
    fn evict_class(&self, class: &str);

    /// Evicts a cached collection.
    fn evict_collection(&self, role: &str, owner: Guid);

    /// Evicts a cached summary.
    fn evict_summary(&self, content_id: i64);
}

/// Expands folder path patterns.
pub trait FolderPathExpander: Send + Sync {
    /// Folder ids matching `pattern`; `%` matches any run of characters.
    fn expand(&self, pattern: &str) -> Result<Vec<FolderId>>;
}

/// Invalidation notice published after eviction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentChangeEvent {
    /// Evicted items.
    pub items: Vec<Guid>,
}

/// Receives content change notices.
pub trait ContentChangeSink: Send + Sync {
    /// Publishes `event`.
    fn publish(&self, event: &ContentChangeEvent);
}

/// Sink discarding every event.
#[derive(Debug, Default)]
pub struct NullChangeSink;

impl ContentChangeSink for NullChangeSink {
    fn publish(&self, _event: &ContentChangeEvent) {}
}
