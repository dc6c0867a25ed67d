use std::collections::BTreeSet;
use std::sync::Arc;

use crate::schema::ContentTypeDef;
use crate::types::ContentTypeId;

/// One pending schema notification.
#[derive(Clone, Debug)]
pub enum SchemaChange {
    /// A content type was created or modified.
    Register(Arc<ContentTypeDef>),
    /// A content type was deleted.
    Unregister(ContentTypeId),
}

impl SchemaChange {
    /// Content type the change touches.
    pub fn content_type(&self) -> ContentTypeId {
        match self {
            SchemaChange::Register(def) => def.id,
            SchemaChange::Unregister(id) => *id,
        }
    }
}

/// Caller-owned accumulator of schema changes applied in one registry pass.
#[derive(Clone, Debug, Default)]
pub struct SchemaBatch {
    changes: Vec<SchemaChange>,
}

impl SchemaBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a registration.
    pub fn register(&mut self, def: impl Into<Arc<ContentTypeDef>>) -> &mut Self {
        self.changes.push(SchemaChange::Register(def.into()));
        self
    }

    /// Queues an unregistration.
    pub fn unregister(&mut self, id: ContentTypeId) -> &mut Self {
        self.changes.push(SchemaChange::Unregister(id));
        self
    }

    /// Returns `true` when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Queued changes in arrival order.
    pub fn changes(&self) -> &[SchemaChange] {
        &self.changes
    }

    /// Every content type touched by the batch.
    pub fn content_type_ids(&self) -> BTreeSet<ContentTypeId> {
        self.changes.iter().map(SchemaChange::content_type).collect()
    }

    /// Returns `true` when the batch only removes types.
    pub fn is_unregister_only(&self) -> bool {
        self.changes
            .iter()
            .all(|c| matches!(c, SchemaChange::Unregister(_)))
    }

    /// Effective registrations: the last registration per content type, unless a
    /// later unregistration of the same type supersedes it.
    pub fn registrations(&self) -> Vec<Arc<ContentTypeDef>> {
        let mut out: Vec<Arc<ContentTypeDef>> = Vec::new();
        for change in &self.changes {
            match change {
                SchemaChange::Register(def) => {
                    out.retain(|d| d.id != def.id);
                    out.push(Arc::clone(def));
                }
                SchemaChange::Unregister(id) => out.retain(|d| d.id != *id),
            }
        }
        out
    }
}
