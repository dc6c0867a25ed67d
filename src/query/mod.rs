#![forbid(unsafe_code)]

//! Node query translation and execution.
//!
//! A [`NodeQuery`] is reduced once (parameters bound, folder paths expanded,
//! constants folded), then planned per target content type against the
//! registered descriptors. Per-type rows are concatenated and truncated.

/// Node query model.
///
/// Types, where-expressions, projections and sort keys over `rx:` properties.
pub mod ast;

/// Fluent construction of node queries.
pub mod builder;

/// Structured query errors.
pub mod errors;

/// Query execution pipeline.
///
/// Resolves targets, runs per-type statements under the registry's shared lock
/// and merges their rows.
pub mod executor;

/// Per-type planning.
pub mod planner;

/// Predicate reduction and folding.
pub mod predicate;

/// Relational statements and their rendering.
pub mod statement;

/// Scalar values.
pub mod value;

pub use ast::{CompareOp, Expr, NodeQuery, Operand, SortDirection, SortField};
pub use builder::QueryBuilder;
pub use errors::QueryError;
pub use executor::{PlanInfo, QueryEngine, QueryOptions, QueryResult, QueryRow};
pub use value::Value;
