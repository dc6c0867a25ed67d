//! Fluent construction of [`NodeQuery`] values.

use crate::query::ast::{
    CompareOp, Expr, NodeQuery, SortDirection, SortField, ANY_TYPE, PATH_PROPERTY,
};
use crate::query::Value;

/// Fluent builder; where-clauses added with [`QueryBuilder::filter`] are
/// combined with `AND`.
#[derive(Clone, Debug, Default)]
pub struct QueryBuilder {
    query: NodeQuery,
    conditions: Vec<Expr>,
}

impl QueryBuilder {
    /// Query over every item type.
    pub fn any() -> Self {
        Self::of_type(ANY_TYPE)
    }

    /// Query over one node type.
    pub fn of_type(name: impl Into<String>) -> Self {
        let mut builder = Self::default();
        builder.query.types.push(name.into());
        builder
    }

    /// Adds another node type.
    pub fn or_type(mut self, name: impl Into<String>) -> Self {
        self.query.types.push(name.into());
        self
    }

    /// Adds a where-condition.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.conditions.push(expr);
        self
    }

    /// Adds `property op value`.
    pub fn where_cmp(self, property: &str, op: CompareOp, value: impl Into<Value>) -> Self {
        self.filter(Expr::compare(property, op, value))
    }

    /// Restricts to folders matching a path pattern.
    pub fn under_path(self, pattern: &str) -> Self {
        self.filter(Expr::compare(PATH_PROPERTY, CompareOp::Like, pattern))
    }

    /// Projects `column`.
    pub fn select(mut self, column: impl Into<String>) -> Self {
        self.query.columns.push(column.into());
        self
    }

    /// Sorts by `property`.
    pub fn order_by(mut self, property: impl Into<String>, direction: SortDirection) -> Self {
        self.query.order_by.push(SortField {
            property: property.into(),
            direction,
        });
        self
    }

    /// Caps the result size.
    pub fn max_results(mut self, max: usize) -> Self {
        self.query.max_results = Some(max);
        self
    }

    /// Binds a parameter.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.params.insert(name.into(), value.into());
        self
    }

    /// Enables collation-aware sorting for `locale`.
    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.query.locale = Some(locale.into());
        self
    }

    /// Finishes the query.
    pub fn build(mut self) -> NodeQuery {
        self.query.filter = match self.conditions.len() {
            0 => None,
            1 => self.conditions.pop(),
            _ => Some(Expr::And(self.conditions)),
        };
        self.query
    }
}
