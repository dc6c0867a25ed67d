//! Raw content type definitions supplied by the definition source.
//!
//! The engine does not own definitions; it is notified of registrations and
//! derives [`TypeDescriptor`](super::TypeDescriptor)s from them.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::types::{ChildId, ContentTypeId, TypeKey};

/// Object kind recorded in the content summary.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    /// Regular content item.
    #[default]
    Item,
    /// Folder object.
    Folder,
}

impl ObjectKind {
    /// Numeric code stored in the summary table.
    pub fn code(self) -> i64 {
        match self {
            ObjectKind::Item => 1,
            ObjectKind::Folder => 2,
        }
    }

    /// Decodes a summary object type code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(ObjectKind::Item),
            2 => Some(ObjectKind::Folder),
            _ => None,
        }
    }
}

/// Where a field's storage is declared.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldSource {
    /// Declared by the content type itself; lives in the type's own table.
    #[default]
    Local,
    /// Declared by a shared field group with its own table.
    Shared,
    /// Provided by the content summary; mapped through the system field registry.
    System,
}

/// Single physical column backing a field.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ColumnLocator {
    /// Physical table name.
    pub table: String,
    /// Physical column name.
    pub column: String,
}

/// One field of a content type or child.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Submit name; becomes the property name `rx:<submit_name>`.
    pub submit_name: String,
    /// Declared data type (`text`, `integer`, `float`, `boolean`, `date`, `binary`, ...).
    pub data_type: String,
    /// Optional format qualifier; `max` marks unbounded text.
    #[serde(default)]
    pub format: Option<String>,
    /// Backing column; fields without a single-column locator are not mapped.
    #[serde(default)]
    pub locator: Option<ColumnLocator>,
    /// Declaring source of the field.
    #[serde(default)]
    pub source: FieldSource,
    /// Field content carries inline links that need expansion.
    #[serde(default)]
    pub inline_link: bool,
    /// Field content is cleaned up (tidied) on save.
    #[serde(default)]
    pub cleanup: bool,
}

impl FieldDef {
    /// Creates a local field mapped to `table.column`.
    pub fn new(
        submit_name: impl Into<String>,
        data_type: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self {
            submit_name: submit_name.into(),
            data_type: data_type.into(),
            format: None,
            locator: Some(ColumnLocator {
                table: table.into(),
                column: column.into(),
            }),
            source: FieldSource::Local,
            inline_link: false,
            cleanup: false,
        }
    }

    /// Creates a field with no resolvable column.
    pub fn unmapped(submit_name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            submit_name: submit_name.into(),
            data_type: data_type.into(),
            format: None,
            locator: None,
            source: FieldSource::Local,
            inline_link: false,
            cleanup: false,
        }
    }

    /// Sets the format qualifier.
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Marks the field as coming from a shared field group.
    pub fn shared(mut self) -> Self {
        self.source = FieldSource::Shared;
        self
    }

    /// Marks the field as a system field.
    pub fn system(mut self) -> Self {
        self.source = FieldSource::System;
        self
    }

    /// Marks the field as carrying inline links.
    pub fn inline_link(mut self) -> Self {
        self.inline_link = true;
        self
    }

    /// Marks the field as cleaned up on save.
    pub fn cleanup(mut self) -> Self {
        self.cleanup = true;
        self
    }
}

/// Repeating field set attached to a content type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChildDef {
    /// Child identifier, unique within the content type.
    pub child_id: ChildId,
    /// Child name; the child collection is exposed under this name.
    pub name: String,
    /// Table holding the child rows.
    pub table: String,
    /// Rows carry an explicit sort rank.
    #[serde(default)]
    pub sorted: bool,
    /// Declared as a simple (single-column, multi-valued) child.
    #[serde(default)]
    pub simple: bool,
    /// Fields of the child.
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

impl ChildDef {
    /// Creates an unsorted complex child stored in `table`.
    pub fn new(child_id: ChildId, name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            child_id,
            name: name.into(),
            table: table.into(),
            sorted: false,
            simple: false,
            fields: Vec::new(),
        }
    }

    /// Marks the child as explicitly ordered.
    pub fn sorted(mut self) -> Self {
        self.sorted = true;
        self
    }

    /// Marks the child as a simple child.
    pub fn simple(mut self) -> Self {
        self.simple = true;
        self
    }

    /// Appends a field.
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Returns `true` when the child becomes a multi-valued parent property.
    pub fn is_simple(&self) -> bool {
        self.simple && self.fields.len() == 1
    }
}

/// Definition of one content type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContentTypeDef {
    /// Content type identifier.
    pub id: ContentTypeId,
    /// Content type name.
    pub name: String,
    /// Object kind of items of this type.
    #[serde(default)]
    pub kind: ObjectKind,
    /// Parent fields.
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    /// Child field sets.
    #[serde(default)]
    pub children: Vec<ChildDef>,
}

impl ContentTypeDef {
    /// Creates an item type with no fields.
    pub fn new(id: ContentTypeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: ObjectKind::Item,
            fields: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Sets the object kind.
    pub fn kind(mut self, kind: ObjectKind) -> Self {
        self.kind = kind;
        self
    }

    /// Appends a parent field.
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Appends a child.
    pub fn child(mut self, child: ChildDef) -> Self {
        self.children.push(child);
        self
    }

    /// Registry key of the parent type.
    pub fn key(&self) -> TypeKey {
        TypeKey::parent(self.id)
    }
}

/// Supplies the raw definitions that drive descriptor construction.
pub trait DefinitionSource: Send + Sync {
    /// Returns every known definition.
    fn definitions(&self) -> Vec<Arc<ContentTypeDef>>;

    /// Returns the definition of a single content type.
    fn definition(&self, id: ContentTypeId) -> Option<Arc<ContentTypeDef>> {
        self.definitions().into_iter().find(|def| def.id == id)
    }
}

/// Definition source backed by a fixed list.
#[derive(Clone, Debug, Default)]
pub struct StaticDefinitions {
    defs: Vec<Arc<ContentTypeDef>>,
}

impl StaticDefinitions {
    /// Creates a source over the supplied definitions.
    pub fn new(defs: impl IntoIterator<Item = ContentTypeDef>) -> Self {
        Self {
            defs: defs.into_iter().map(Arc::new).collect(),
        }
    }
}

impl DefinitionSource for StaticDefinitions {
    fn definitions(&self) -> Vec<Arc<ContentTypeDef>> {
        self.defs.clone()
    }
}

#[derive(Debug, Default, Deserialize)]
struct DefinitionFile {
    #[serde(default)]
    types: Vec<ContentTypeDef>,
}

/// Definition source read from a TOML file with `[[types]]` tables.
#[derive(Clone, Debug, Default)]
pub struct FileDefinitions {
    inner: StaticDefinitions,
}

impl FileDefinitions {
    /// Reads and parses the definition file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: DefinitionFile =
            toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: Some(path.to_path_buf()),
                source,
            })?;
        Ok(Self {
            inner: StaticDefinitions::new(file.types),
        })
    }
}

impl DefinitionSource for FileDefinitions {
    fn definitions(&self) -> Vec<Arc<ContentTypeDef>> {
        self.inner.definitions()
    }
}
