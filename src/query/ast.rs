//! Node-oriented query model.
//!
//! Queries name node types and `rx:`-prefixed properties; the planner maps them
//! onto the registered descriptors. Property names are accepted with or without
//! the prefix.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::query::Value;

/// Wildcard node type matching every registered item type.
pub const ANY_TYPE: &str = "nt:base";
/// Pseudo-property addressing the folder path of an item.
pub const PATH_PROPERTY: &str = "jcr:path";
/// Prefix of content properties.
pub const PROPERTY_PREFIX: &str = "rx:";

/// Strips the `rx:` prefix from a property name.
pub fn field_name(property: &str) -> &str {
    property.strip_prefix(PROPERTY_PREFIX).unwrap_or(property)
}

/// Comparison operator.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `LIKE` with `%` and `_` wildcards.
    Like,
}

impl CompareOp {
    /// SQL spelling.
    pub fn sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Like => "LIKE",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql())
    }
}

/// Right-hand side of a comparison.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operand {
    /// Inline literal.
    Literal(Value),
    /// Named bind parameter resolved from [`NodeQuery::params`].
    Param(String),
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Operand::Literal(value)
    }
}

/// Boolean where-expression.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// Conjunction; empty is true.
    And(Vec<Expr>),
    /// Disjunction; empty is false.
    Or(Vec<Expr>),
    /// Negation.
    Not(Box<Expr>),
    /// Property comparison.
    Compare {
        /// Property name.
        property: String,
        /// Operator.
        op: CompareOp,
        /// Operand.
        value: Operand,
    },
    /// Property is null.
    IsNull {
        /// Property name.
        property: String,
    },
    /// Literal; must be boolean.
    Literal(Value),
}

impl Expr {
    /// Builds a comparison.
    pub fn compare(property: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Expr::Compare {
            property: property.into(),
            op,
            value: Operand::Literal(value.into()),
        }
    }

    /// Builds a comparison against a bind parameter.
    pub fn compare_param(
        property: impl Into<String>,
        op: CompareOp,
        param: impl Into<String>,
    ) -> Self {
        Expr::Compare {
            property: property.into(),
            op,
            value: Operand::Param(param.into()),
        }
    }

    /// Nesting depth of the expression.
    pub fn depth(&self) -> usize {
        match self {
            Expr::And(items) | Expr::Or(items) => {
                1 + items.iter().map(Expr::depth).max().unwrap_or(0)
            }
            Expr::Not(inner) => 1 + inner.depth(),
            _ => 1,
        }
    }
}

/// Sort direction.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

/// One sort key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    /// Property name.
    pub property: String,
    /// Direction.
    #[serde(default)]
    pub direction: SortDirection,
}

/// A node query.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeQuery {
    /// Node type names; empty or `nt:base` targets every item type.
    #[serde(default)]
    pub types: Vec<String>,
    /// Optional where-expression.
    #[serde(default)]
    pub filter: Option<Expr>,
    /// Projected properties; empty selects the default projection.
    #[serde(default)]
    pub columns: Vec<String>,
    /// Sort keys.
    #[serde(default)]
    pub order_by: Vec<SortField>,
    /// Caps the number of returned rows.
    #[serde(default)]
    pub max_results: Option<usize>,
    /// Bind parameter values.
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
    /// Locale enabling collation-aware sorting.
    #[serde(default)]
    pub locale: Option<String>,
}

impl NodeQuery {
    /// Returns `true` when the query targets every item type.
    pub fn is_wildcard(&self) -> bool {
        self.types.is_empty() || self.types.iter().any(|t| t == ANY_TYPE)
    }
}
