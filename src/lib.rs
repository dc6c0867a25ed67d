//! Typeforge maps content types declared at runtime onto relational tables
//! and serves node queries and content loads against them.
//!
//! The [`catalog::DescriptorRegistry`] owns the linked
//! [`schema::TypeDescriptor`]s and the row classes synthesized for them. The
//! [`query::QueryEngine`] plans node queries per content type, and the
//! [`loader::ContentLoader`] materializes items with their children and
//! deferred large fields. [`ContentRepository`] wires them to one provider.

#![warn(missing_docs)]

/// Provider collaborators and in-memory implementations.
pub mod access;
/// Descriptor registry and schema batches.
pub mod catalog;
/// Repository configuration.
pub mod config;
/// Content loading and eviction.
pub mod loader;
pub mod primitives;
pub mod query;
/// Repository facade.
pub mod repository;
/// Content type definitions and descriptors.
pub mod schema;
/// Row-class synthesis.
pub mod synth;
/// Log output setup.
pub mod telemetry;
/// Identifiers and the crate error type.
pub mod types;

pub use catalog::{BatchOutcome, DescriptorRegistry, SchemaBatch};
pub use config::{ConfigError, RepositoryConfig};
pub use loader::{ContentLoader, LoadOptions, Node};
pub use query::{NodeQuery, QueryBuilder, QueryEngine, QueryResult, Value};
pub use repository::ContentRepository;
pub use types::{ContentTypeId, Guid, RepoError, Result, TypeKey};
