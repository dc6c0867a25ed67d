//! Per-type planning: pruning, annotation, joins and projection.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use smallvec::smallvec;
use tracing::{debug, warn};

use crate::query::ast::{field_name, CompareOp, SortField};
use crate::query::errors::QueryError;
use crate::query::predicate::Predicate;
use crate::query::statement::{
    ColumnRef, Filter, Join, OrderItem, SelectExpr, SelectItem, SelectStatement, TableRef,
};
use crate::schema::{
    PropertyType, SystemFields, SystemSource, TypeDescriptor, CONTENT_ID_COLUMN,
    CURRENT_REVISION_COLUMN, FOLDER_ID_FIELD, REVISION_COLUMN, SUMMARY_TABLE,
};
use crate::synth::RowClass;
use crate::types::{ContentTypeId, RepoError, Result};

const PRIMARY_ALIAS: &str = "t0";
const SUMMARY_ALIAS: &str = "s";

/// Plan of one query against one content type.
#[derive(Clone, Debug)]
pub struct TypePlan {
    /// Target content type.
    pub type_id: ContentTypeId,
    /// Predicate after pruning.
    pub predicate: Predicate,
    /// Row classes the statement reads.
    pub classes_in_use: Vec<Arc<RowClass>>,
    /// Statement to execute.
    pub statement: SelectStatement,
    /// The predicate excludes every row of the type.
    pub degenerate: bool,
}

/// Query-wide inputs shared by every per-type plan.
#[derive(Clone, Debug)]
pub struct PlanRequest<'a> {
    /// Output column names; resolved with the `rx:` prefix stripped.
    pub columns: &'a [String],
    /// Sort keys.
    pub order_by: &'a [SortField],
    /// Collation for text sorting.
    pub collation: Option<&'a str>,
    /// Per-type row limit hint.
    pub limit: Option<usize>,
}

#[derive(Clone, Debug)]
enum Resolved {
    Column {
        table: Option<String>,
        column: String,
        ty: PropertyType,
    },
    MultiValued,
    Unknown,
}

/// Plans per-type statements against descriptors.
pub struct TypePlanner<'a> {
    system: &'a SystemFields,
}

impl<'a> TypePlanner<'a> {
    /// Creates a planner resolving system fields through `system`.
    pub fn new(system: &'a SystemFields) -> Self {
        Self { system }
    }

    /// Resolves a field: `table` is `None` for summary columns.
    fn resolve(&self, desc: &TypeDescriptor, name: &str) -> Resolved {
        if let Some(field) = self.system.get(name) {
            let table = match field.source {
                SystemSource::Row => desc.primary_table().map(str::to_string),
                SystemSource::Summary => None,
            };
            return Resolved::Column {
                table,
                column: field.column.clone(),
                ty: field.ty,
            };
        }
        if let Some(field) = desc.field(name) {
            return Resolved::Column {
                table: Some(field.table.clone()),
                column: field.column.clone(),
                ty: field.ty,
            };
        }
        if desc.is_multi_valued(name) {
            return Resolved::MultiValued;
        }
        Resolved::Unknown
    }

    /// Replaces comparisons on fields the type lacks so that they are never
    /// satisfied, whatever their polarity.
    fn prune(&self, desc: &TypeDescriptor, pred: &Predicate, negated: bool) -> Predicate {
        match pred {
            Predicate::And(items) => {
                Predicate::And(items.iter().map(|p| self.prune(desc, p, negated)).collect())
            }
            Predicate::Or(items) => {
                Predicate::Or(items.iter().map(|p| self.prune(desc, p, negated)).collect())
            }
            Predicate::Not(inner) => Predicate::Not(Box::new(self.prune(desc, inner, !negated))),
            Predicate::Compare { property, .. } | Predicate::IsNull { property } => {
                match self.resolve(desc, property) {
                    Resolved::Column { .. } => pred.clone(),
                    Resolved::MultiValued => {
                        warn!(
                            content_type = %desc.key(),
                            property = %property,
                            "query.prune.multi_valued"
                        );
                        Predicate::Trivial(negated)
                    }
                    Resolved::Unknown => {
                        debug!(content_type = %desc.key(), property = %property, "query.prune.unknown");
                        Predicate::Trivial(negated)
                    }
                }
            }
            Predicate::InFolders(_) | Predicate::Trivial(_) => pred.clone(),
        }
    }

    /// Plans `predicate` against `desc`.
    pub fn plan(
        &self,
        desc: &TypeDescriptor,
        predicate: &Predicate,
        request: &PlanRequest<'_>,
    ) -> Result<TypePlan> {
        let type_id = desc.key().content_type;
        let (Some(primary), Some(main)) = (desc.primary_table(), desc.main_class()) else {
            return Err(RepoError::UnknownContentType(type_id));
        };
        let main_class = main
            .class()
            .cloned()
            .ok_or_else(|| RepoError::Synthesis(format!("{} has no synthesized class", desc.key())))?;
        let pruned = self.prune(desc, predicate, false).simplify();

        if pruned.as_trivial() == Some(false) {
            let statement = self.degenerate(desc, primary, request);
            debug!(content_type = %type_id, "query.plan.degenerate");
            return Ok(TypePlan {
                type_id,
                predicate: pruned,
                classes_in_use: vec![main_class],
                statement,
                degenerate: true,
            });
        }

        let mut referenced = BTreeSet::new();
        collect_fields(&pruned, &mut referenced);
        referenced.extend(request.columns.iter().map(|c| field_name(c).to_string()));
        referenced.extend(request.order_by.iter().map(|s| field_name(&s.property).to_string()));
        let mut classes_in_use = vec![main_class];
        if let Some(lobs) = desc.lazy_class().and_then(|c| c.class()) {
            if referenced.iter().any(|f| desc.lazy_properties().contains(f)) {
                classes_in_use.push(Arc::clone(lobs));
            }
        }

        let mut aliases: BTreeMap<String, String> = BTreeMap::new();
        aliases.insert(primary.to_string(), PRIMARY_ALIAS.to_string());
        let secondary: BTreeSet<&str> = classes_in_use
            .iter()
            .flat_map(|c| c.tables())
            .filter(|t| *t != primary)
            .collect();
        let mut joins = Vec::new();
        for (i, table) in secondary.into_iter().enumerate() {
            let alias = format!("t{}", i + 1);
            joins.push(Join {
                table: TableRef {
                    table: table.to_string(),
                    alias: alias.clone(),
                },
                on: smallvec![
                    (
                        ColumnRef::new(&alias, CONTENT_ID_COLUMN),
                        ColumnRef::new(PRIMARY_ALIAS, CONTENT_ID_COLUMN)
                    ),
                    (
                        ColumnRef::new(&alias, REVISION_COLUMN),
                        ColumnRef::new(PRIMARY_ALIAS, REVISION_COLUMN)
                    ),
                ],
            });
            aliases.insert(table.to_string(), alias);
        }
        joins.push(Join {
            table: TableRef {
                table: SUMMARY_TABLE.to_string(),
                alias: SUMMARY_ALIAS.to_string(),
            },
            on: smallvec![
                (
                    ColumnRef::new(SUMMARY_ALIAS, CONTENT_ID_COLUMN),
                    ColumnRef::new(PRIMARY_ALIAS, CONTENT_ID_COLUMN)
                ),
                (
                    ColumnRef::new(SUMMARY_ALIAS, CURRENT_REVISION_COLUMN),
                    ColumnRef::new(PRIMARY_ALIAS, REVISION_COLUMN)
                ),
            ],
        });

        let mut lowering = Lowering {
            planner: self,
            desc,
            aliases: &aliases,
            params: Vec::new(),
        };
        let filter = lowering.lower(&pruned)?;

        let projection = request
            .columns
            .iter()
            .map(|name| SelectItem {
                expr: match lowering.column(field_name(name)) {
                    Some((column, _)) => SelectExpr::Column(column),
                    None => SelectExpr::Null,
                },
                alias: name.clone(),
            })
            .collect();

        let mut order_by = Vec::new();
        for sort in request.order_by {
            let name = field_name(&sort.property);
            match lowering.column(name) {
                Some((_, PropertyType::LargeBinary)) => {
                    return Err(QueryError::BinaryProperty {
                        property: sort.property.clone(),
                        context: "sort",
                    }
                    .into())
                }
                Some((column, _)) => order_by.push(OrderItem {
                    column,
                    direction: sort.direction,
                }),
                None => debug!(content_type = %type_id, property = %sort.property, "query.sort.skip"),
            }
        }

        let statement = SelectStatement {
            type_id,
            from: TableRef {
                table: primary.to_string(),
                alias: PRIMARY_ALIAS.to_string(),
            },
            joins,
            filter,
            projection,
            order_by,
            collation: request.collation.map(str::to_string),
            limit: request.limit,
            params: lowering.params,
        };
        Ok(TypePlan {
            type_id,
            predicate: pruned,
            classes_in_use,
            statement,
            degenerate: false,
        })
    }

    /// Always-false statement over the primary table with the same output shape.
    fn degenerate(
        &self,
        desc: &TypeDescriptor,
        primary: &str,
        request: &PlanRequest<'_>,
    ) -> SelectStatement {
        let projection = request
            .columns
            .iter()
            .map(|name| {
                let expr = match self.resolve(desc, field_name(name)) {
                    Resolved::Column {
                        table: Some(table),
                        column,
                        ..
                    } if table == primary => {
                        SelectExpr::Column(ColumnRef::new(PRIMARY_ALIAS, column))
                    }
                    _ => SelectExpr::Null,
                };
                SelectItem {
                    expr,
                    alias: name.clone(),
                }
            })
            .collect();
        SelectStatement {
            type_id: desc.key().content_type,
            from: TableRef {
                table: primary.to_string(),
                alias: PRIMARY_ALIAS.to_string(),
            },
            joins: Vec::new(),
            filter: Filter::Constant(false),
            projection,
            order_by: Vec::new(),
            collation: None,
            limit: request.limit,
            params: Vec::new(),
        }
    }
}

fn collect_fields(pred: &Predicate, out: &mut BTreeSet<String>) {
    match pred {
        Predicate::And(items) | Predicate::Or(items) => {
            items.iter().for_each(|p| collect_fields(p, out))
        }
        Predicate::Not(inner) => collect_fields(inner, out),
        Predicate::Compare { property, .. } | Predicate::IsNull { property } => {
            out.insert(property.clone());
        }
        Predicate::InFolders(_) => {
            out.insert(FOLDER_ID_FIELD.to_string());
        }
        Predicate::Trivial(_) => {}
    }
}

struct Lowering<'p, 'a> {
    planner: &'p TypePlanner<'a>,
    desc: &'p TypeDescriptor,
    aliases: &'p BTreeMap<String, String>,
    params: Vec<(String, crate::query::Value)>,
}

impl Lowering<'_, '_> {
    /// Column of `name` when the type has it and its table is joined.
    fn column(&self, name: &str) -> Option<(ColumnRef, PropertyType)> {
        match self.planner.resolve(self.desc, name) {
            Resolved::Column {
                table: None,
                column,
                ty,
            } => Some((ColumnRef::new(SUMMARY_ALIAS, column), ty)),
            Resolved::Column {
                table: Some(table),
                column,
                ty,
            } => self
                .aliases
                .get(&table)
                .map(|alias| (ColumnRef::new(alias.clone(), column), ty)),
            Resolved::MultiValued | Resolved::Unknown => None,
        }
    }

    fn lower(&mut self, pred: &Predicate) -> Result<Filter> {
        Ok(match pred {
            Predicate::And(items) => Filter::And(
                items
                    .iter()
                    .map(|p| self.lower(p))
                    .collect::<Result<_>>()?,
            ),
            Predicate::Or(items) => Filter::Or(
                items
                    .iter()
                    .map(|p| self.lower(p))
                    .collect::<Result<_>>()?,
            ),
            Predicate::Not(inner) => Filter::Not(Box::new(self.lower(inner)?)),
            Predicate::Trivial(truth) => Filter::Constant(*truth),
            Predicate::IsNull { property } => match self.column(property) {
                Some((column, _)) => Filter::IsNull(column),
                None => Filter::Constant(false),
            },
            Predicate::InFolders(set) => {
                let column = self
                    .column(FOLDER_ID_FIELD)
                    .map(|(c, _)| c)
                    .unwrap_or_else(|| ColumnRef::new(SUMMARY_ALIAS, "FOLDERID"));
                Filter::InFolders {
                    column,
                    set: set.clone(),
                }
            }
            Predicate::Compare {
                property,
                op,
                value,
            } => {
                let Some((column, ty)) = self.column(property) else {
                    return Ok(Filter::Constant(false));
                };
                if ty == PropertyType::LargeBinary {
                    return Err(QueryError::BinaryProperty {
                        property: property.clone(),
                        context: "a comparison",
                    }
                    .into());
                }
                let bound = if *op == CompareOp::Like {
                    if !matches!(ty, PropertyType::String | PropertyType::LargeText) {
                        return Err(QueryError::TypeMismatch {
                            property: property.clone(),
                            expected: "text",
                            found: ty.name(),
                        }
                        .into());
                    }
                    value.clone()
                } else {
                    value.coerce(ty).ok_or_else(|| QueryError::TypeMismatch {
                        property: property.clone(),
                        expected: ty.name(),
                        found: value.type_name(),
                    })?
                };
                let param = format!("p{}", self.params.len());
                self.params.push((param.clone(), bound));
                Filter::Compare {
                    column,
                    op: *op,
                    param,
                }
            }
        })
    }
}
