use std::collections::BTreeMap;
use std::sync::Arc;

use super::RowClass;
use crate::query::Value;
use crate::types::Guid;

/// A loaded row of a synthesized class.
#[derive(Clone, Debug)]
pub struct RowHandle {
    class: Arc<RowClass>,
    identity: Guid,
    values: BTreeMap<String, Value>,
}

impl RowHandle {
    /// Creates an empty row for `identity`.
    pub fn new(class: Arc<RowClass>, identity: Guid) -> Self {
        Self {
            class,
            identity,
            values: BTreeMap::new(),
        }
    }

    /// Class of the row.
    pub fn class(&self) -> &Arc<RowClass> {
        &self.class
    }

    /// Row identity; carries the surrogate id for child rows.
    pub fn identity(&self) -> Guid {
        self.identity
    }

    /// Content id of the owning item.
    pub fn content_id(&self) -> i64 {
        self.identity.content_id
    }

    /// Revision of the owning item.
    pub fn revision(&self) -> i32 {
        self.identity.revision
    }

    /// Surrogate row id, present for child rows.
    pub fn sys_id(&self) -> Option<i64> {
        self.identity.sys_id
    }

    /// Value of `field`, if set.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Sets `field`, returning the previous value.
    pub fn set(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(field.into(), value)
    }

    /// Iterates set fields in name order.
    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}
