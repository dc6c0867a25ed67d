#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::fmt;

use thiserror::Error;

/// Structured errors emitted while translating a node query.
///
/// A query failing with one of these is never executed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// A literal used as a predicate is not boolean.
    #[error("literal {value} cannot be used as a predicate")]
    NonBooleanLiteral { value: String },
    /// A `$name` bind parameter has no value.
    #[error("bind parameter '{name}' has no value")]
    UnboundParameter { name: String },
    /// Path predicates only support `=` and `like` against text.
    #[error("path predicate supports '=' and 'like' with a text pattern (got {op})")]
    InvalidPathPredicate { op: String },
    /// `like` requires a text operand.
    #[error("like on '{property}' requires a text pattern")]
    LikeRequiresString { property: String },
    /// The operand cannot be converted to the property type.
    #[error("'{property}' expects {expected} (got {found})")]
    TypeMismatch {
        property: String,
        expected: &'static str,
        found: &'static str,
    },
    /// Comparison against a null literal; `IsNull` expresses this.
    #[error("comparison of '{property}' with null; use an is-null test")]
    NullComparison { property: String },
    /// Binary properties cannot be compared or sorted.
    #[error("binary property '{property}' cannot be used in {context}")]
    BinaryProperty {
        property: String,
        context: &'static str,
    },
    /// The locale is not a plain collation name.
    #[error("locale '{locale}' is not a valid collation name")]
    InvalidCollation { locale: String },
    /// The predicate nests deeper than the supported limit.
    #[error("predicate nests {depth} levels (max {max})")]
    PredicateTooDeep { depth: usize, max: usize },
}

/// Display adapter prefixing the message with its code.
pub struct QueryErrorWithCode<'a>(pub &'a QueryError);

impl fmt::Display for QueryErrorWithCode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.0.code(), self.0)
    }
}

impl QueryError {
    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::NonBooleanLiteral { .. } => "NonBooleanLiteral",
            QueryError::UnboundParameter { .. } => "UnboundParameter",
            QueryError::InvalidPathPredicate { .. } => "InvalidPathPredicate",
            QueryError::LikeRequiresString { .. } => "LikeRequiresString",
            QueryError::TypeMismatch { .. } => "TypeMismatch",
            QueryError::NullComparison { .. } => "NullComparison",
            QueryError::BinaryProperty { .. } => "BinaryProperty",
            QueryError::InvalidCollation { .. } => "InvalidCollation",
            QueryError::PredicateTooDeep { .. } => "PredicateTooDeep",
        }
    }
}
