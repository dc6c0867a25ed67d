#![forbid(unsafe_code)]

//! Identifiers shared by every layer plus the crate-wide error type.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::query::errors::QueryError;

/// Identifier of a content type definition.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ContentTypeId(pub i64);

/// Identifier of a child (repeating field set) within a content type.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ChildId(pub i64);

/// Identifier of a folder returned by path expansion.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct FolderId(pub i64);

impl fmt::Display for ContentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ChildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for FolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a schema unit: a parent content type or one of its complex children.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct TypeKey {
    /// Owning content type.
    pub content_type: ContentTypeId,
    /// Child identifier, `None` for the parent type itself.
    pub child: Option<ChildId>,
}

impl TypeKey {
    /// Key of a parent content type.
    pub const fn parent(content_type: ContentTypeId) -> Self {
        Self {
            content_type,
            child: None,
        }
    }

    /// Key of a complex child collection.
    pub const fn child(content_type: ContentTypeId, child: ChildId) -> Self {
        Self {
            content_type,
            child: Some(child),
        }
    }

    /// Returns `true` when the key names a parent type.
    pub const fn is_parent(&self) -> bool {
        self.child.is_none()
    }

    /// Key of the parent type owning this key (itself for parents).
    pub const fn parent_key(&self) -> Self {
        Self::parent(self.content_type)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.child {
            Some(child) => write!(f, "ct:{}/child:{}", self.content_type, child),
            None => write!(f, "ct:{}", self.content_type),
        }
    }
}

/// Identity of a loaded row: `(content id, revision)` for items, extended with
/// the surrogate row id for child rows.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize,
)]
pub struct Guid {
    /// Content item identifier.
    pub content_id: i64,
    /// Revision of the item.
    pub revision: i32,
    /// Surrogate row identifier for child rows.
    pub sys_id: Option<i64>,
}

impl Guid {
    /// Identity of a content item revision.
    pub const fn item(content_id: i64, revision: i32) -> Self {
        Self {
            content_id,
            revision,
            sys_id: None,
        }
    }

    /// Identity of a child row owned by an item revision.
    pub const fn child_row(content_id: i64, revision: i32, sys_id: i64) -> Self {
        Self {
            content_id,
            revision,
            sys_id: Some(sys_id),
        }
    }

    /// Identity of the owning item (itself for items).
    pub const fn owner(&self) -> Self {
        Self::item(self.content_id, self.revision)
    }

    /// Returns `true` for child row identities.
    pub const fn is_child_row(&self) -> bool {
        self.sys_id.is_some()
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sys_id {
            Some(sys_id) => write!(f, "{}-{}-{}", self.content_id, self.revision, sys_id),
            None => write!(f, "{}-{}", self.content_id, self.revision),
        }
    }
}

/// Errors surfaced by the mapping and query engine.
#[derive(Debug, Error)]
pub enum RepoError {
    /// Underlying I/O failure.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// A field declared a data type the engine cannot map.
    #[error("field '{field}' declares unknown data type '{data_type}'")]
    UnknownDataType {
        /// Submit name of the offending field.
        field: String,
        /// Declared data type.
        data_type: String,
    },
    /// A child configuration referenced a parent that is not registered.
    #[error("no parent configuration registered for {0}")]
    MissingParent(TypeKey),
    /// Row class synthesis rejected a descriptor.
    #[error("row class synthesis failed: {0}")]
    Synthesis(String),
    /// The content type is not registered or has no implementing classes.
    #[error("unknown content type {0}")]
    UnknownContentType(ContentTypeId),
    /// The query is malformed.
    #[error("invalid query: {0}")]
    InvalidQuery(#[from] QueryError),
    /// The requested item does not exist.
    #[error("item not found: {0}")]
    NotFound(Guid),
    /// The relational access provider failed.
    #[error("repository failure: {0}")]
    Repository(String),
    /// Configuration could not be loaded or is invalid.
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Caller-facing category of a [`RepoError`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Schema or configuration problem; the previous registry state stays authoritative.
    Configuration,
    /// The query could not be translated and was not executed.
    InvalidQuery,
    /// A requested item or content type does not exist.
    NotFound,
    /// Data access failed.
    Repository,
}

impl RepoError {
    /// Returns the category callers should branch on.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RepoError::UnknownDataType { .. }
            | RepoError::MissingParent(_)
            | RepoError::Synthesis(_)
            | RepoError::Config(_) => ErrorKind::Configuration,
            RepoError::InvalidQuery(_) => ErrorKind::InvalidQuery,
            RepoError::UnknownContentType(_) | RepoError::NotFound(_) => ErrorKind::NotFound,
            RepoError::Io(_) | RepoError::Repository(_) => ErrorKind::Repository,
        }
    }

    /// Wraps a provider failure message.
    pub fn repository(message: impl Into<String>) -> Self {
        RepoError::Repository(message.into())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RepoError>;
