use std::collections::BTreeMap;

use serde::Serialize;

use crate::access::ContentSummary;
use crate::query::ast::PROPERTY_PREFIX;
use crate::query::Value;
use crate::schema::PropertyType;
use crate::synth::RowHandle;
use crate::types::{Guid, TypeKey};

/// Value of a loaded property.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum PropertyValue {
    /// Single-valued property.
    Single(Value),
    /// Multi-valued property backed by a simple child.
    Multi(Vec<Value>),
}

/// Property slot of a node.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Property {
    /// Loaded value.
    Value(PropertyValue),
    /// Large field not loaded yet.
    Deferred,
}

/// Progress of lazy field loading.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub enum LazyState {
    /// The node has no lazy fields, or they were not requested.
    #[default]
    None,
    /// Lazy fields are deferred.
    Pending,
    /// Text fields loaded, binary fields still deferred.
    PartiallyLoaded,
    /// Every lazy field is loaded.
    Loaded,
}

/// Complex child rows of one child descriptor.
#[derive(Clone, Debug, Serialize)]
pub struct ChildCollection {
    /// Child name.
    pub name: String,
    /// Child descriptor key.
    #[serde(skip)]
    pub key: TypeKey,
    /// Child nodes in sort order.
    pub nodes: Vec<Node>,
}

/// A loaded content item or child row.
#[derive(Clone, Debug, Serialize)]
pub struct Node {
    guid: Guid,
    #[serde(skip)]
    key: TypeKey,
    type_name: String,
    properties: BTreeMap<String, Property>,
    children: Vec<ChildCollection>,
    children_loaded: bool,
    lazy: LazyState,
}

fn prefixed(name: &str) -> String {
    format!("{PROPERTY_PREFIX}{name}")
}

impl Node {
    pub(crate) fn new(guid: Guid, key: TypeKey, type_name: &str) -> Self {
        Self {
            guid,
            key,
            type_name: type_name.to_string(),
            properties: BTreeMap::new(),
            children: Vec::new(),
            children_loaded: false,
            lazy: LazyState::None,
        }
    }

    pub(crate) fn set(&mut self, name: &str, value: PropertyValue) {
        self.properties.insert(prefixed(name), Property::Value(value));
    }

    pub(crate) fn defer(&mut self, name: &str) {
        self.properties.insert(prefixed(name), Property::Deferred);
        self.lazy = LazyState::Pending;
    }

    pub(crate) fn apply_row(&mut self, row: &RowHandle) {
        for (name, value) in row.values() {
            self.set(name, PropertyValue::Single(value.clone()));
        }
    }

    pub(crate) fn set_children(&mut self, children: Vec<ChildCollection>) {
        self.children = children;
        self.children_loaded = true;
    }

    pub(crate) fn children_mut(&mut self) -> &mut [ChildCollection] {
        &mut self.children
    }

    /// Applies a lazy row. Fields already loaded are kept; binary fields are
    /// filled only with `binary_access`. Returns `false` when nothing was pending.
    pub(crate) fn apply_lazy(&mut self, row: &RowHandle, binary_access: bool) -> bool {
        if !self.lazy_pending() {
            return false;
        }
        let mut remaining = false;
        for field in &row.class().fields {
            let key = prefixed(&field.name);
            if !matches!(self.properties.get(&key), Some(Property::Deferred)) {
                continue;
            }
            if field.ty == PropertyType::LargeBinary && !binary_access {
                remaining = true;
                continue;
            }
            let value = row.get(&field.name).cloned().unwrap_or(Value::Null);
            self.properties
                .insert(key, Property::Value(PropertyValue::Single(value)));
        }
        self.lazy = if remaining {
            LazyState::PartiallyLoaded
        } else {
            LazyState::Loaded
        };
        true
    }

    /// Row identity.
    pub fn guid(&self) -> Guid {
        self.guid
    }

    /// Descriptor key.
    pub fn key(&self) -> TypeKey {
        self.key
    }

    /// Content type or child name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Property slot by name; the `rx:` prefix is optional.
    pub fn property(&self, name: &str) -> Option<&Property> {
        match self.properties.get(name) {
            Some(p) => Some(p),
            None => self.properties.get(&prefixed(name)),
        }
    }

    /// Single value of a loaded property.
    pub fn value(&self, name: &str) -> Option<&Value> {
        match self.property(name)? {
            Property::Value(PropertyValue::Single(v)) => Some(v),
            _ => None,
        }
    }

    /// Values of a multi-valued property.
    pub fn values(&self, name: &str) -> Option<&[Value]> {
        match self.property(name)? {
            Property::Value(PropertyValue::Multi(v)) => Some(v),
            _ => None,
        }
    }

    /// Returns `true` when `name` is deferred.
    pub fn is_deferred(&self, name: &str) -> bool {
        matches!(self.property(name), Some(Property::Deferred))
    }

    /// Every property slot.
    pub fn properties(&self) -> impl Iterator<Item = (&str, &Property)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Complex child collections.
    pub fn children(&self) -> &[ChildCollection] {
        &self.children
    }

    /// Child collection by name.
    pub fn child(&self, name: &str) -> Option<&ChildCollection> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Whether children were loaded.
    pub fn children_loaded(&self) -> bool {
        self.children_loaded
    }

    /// Lazy loading state.
    pub fn lazy_state(&self) -> LazyState {
        self.lazy
    }

    /// Returns `true` while lazy fields remain deferred.
    pub fn lazy_pending(&self) -> bool {
        matches!(self.lazy, LazyState::Pending | LazyState::PartiallyLoaded)
    }
}

/// Value of a summary column.
pub(crate) fn summary_value(summary: &ContentSummary, column: &str) -> Option<Value> {
    Some(match column {
        "CONTENTID" => Value::Long(summary.content_id),
        "CONTENTTYPEID" => Value::Long(summary.content_type.0),
        "TITLE" => Value::String(summary.title.clone()),
        "OBJECTTYPE" => Value::Long(summary.object_kind.code()),
        "CURRENTREVISION" => Value::Long(i64::from(summary.current_revision)),
        "FOLDERID" => summary.folder_id.map_or(Value::Null, |f| Value::Long(f.0)),
        _ => return None,
    })
}
