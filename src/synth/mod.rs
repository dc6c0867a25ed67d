//! Dynamic row-class synthesis.
//!
//! Each [`RowClassDescriptor`](crate::schema::RowClassDescriptor) becomes a
//! [`RowClass`]: a uniquely named, declarative description of one relational row
//! shape (fields, identity strategy, secondary joins and associations). Rows are
//! carried generically as [`RowHandle`]s; no per-type code is generated.

mod row;

pub use row::RowHandle;

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::{smallvec, SmallVec};
use tracing::{debug, trace};

use crate::schema::{
    LoadPolicy, PropertyType, RowClassDescriptor, TypeDescriptor, CONTENT_ID_COLUMN,
    REVISION_COLUMN, SORT_RANK_COLUMN, SUMMARY_TABLE, SYS_ID_COLUMN,
};
use crate::types::{RepoError, Result, TypeKey};

/// Database capabilities that change the synthesized mapping.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Dialect {
    /// Whether large columns can be streamed; otherwise they are materialized inline.
    pub lob_streaming: bool,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            lob_streaming: true,
        }
    }
}

/// How a column value is transferred.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ColumnForm {
    /// Materialized with the row.
    Inline,
    /// Streamed on access.
    Streamed,
}

/// One field of a synthesized class.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RowField {
    /// Field name.
    pub name: String,
    /// Physical table.
    pub table: String,
    /// Physical column.
    pub column: String,
    /// Semantic type.
    pub ty: PropertyType,
    /// Transfer form.
    pub form: ColumnForm,
}

/// Identity columns of a row class.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum IdStrategy {
    /// Composite `(content id, revision)` key.
    Composite {
        /// Content id column.
        content_id: String,
        /// Revision column.
        revision: String,
    },
    /// Surrogate key with a foreign key to the owning item revision.
    Surrogate {
        /// Surrogate column.
        column: String,
        /// Content id column.
        content_id: String,
        /// Revision column.
        revision: String,
    },
}

/// Join from the primary table to a secondary table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JoinMapping {
    /// Secondary table.
    pub table: String,
    /// Join key columns, equal on both sides.
    pub key: SmallVec<[String; 2]>,
}

/// Association declared by a row class.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Association {
    /// Many-to-one reference to the summary row.
    SummaryRef {
        /// Summary table.
        table: String,
        /// Referencing column.
        column: String,
    },
    /// Multi-valued property backed by a simple child table.
    Bag {
        /// Property name.
        property: String,
        /// Table holding the values.
        table: String,
        /// Value column.
        column: String,
        /// Key columns back to the owner.
        key: SmallVec<[String; 2]>,
    },
}

/// Declarative relational mapping of a row class.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RowMapping {
    /// Primary table.
    pub table: String,
    /// Identity strategy.
    pub id: IdStrategy,
    /// Secondary-table joins.
    pub joins: Vec<JoinMapping>,
    /// Associations.
    pub associations: Vec<Association>,
    /// Sort rank column of ordered child rows.
    pub sort_rank: Option<String>,
}

/// A synthesized row class.
#[derive(Clone, Debug)]
pub struct RowClass {
    /// Unique class name.
    pub name: String,
    /// Base name before collision suffixing.
    pub base_name: String,
    /// Owning descriptor.
    pub type_key: TypeKey,
    /// Holds lazy fields only.
    pub lazy: bool,
    /// Fields in declaration order.
    pub fields: Vec<RowField>,
    /// Relational mapping.
    pub mapping: RowMapping,
}

impl RowClass {
    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&RowField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Tables touched by the class, primary table first.
    pub fn tables(&self) -> Vec<&str> {
        let mut out = vec![self.mapping.table.as_str()];
        out.extend(self.mapping.joins.iter().map(|j| j.table.as_str()));
        out
    }
}

/// Issues unique class names.
///
/// The base name is used unchanged while unused; collisions append a suffix
/// drawn from a counter that only grows. Names of classes that are no longer
/// installed are released with [`NamingPolicy::retain`].
#[derive(Debug, Default)]
pub struct NamingPolicy {
    counter: AtomicU64,
    issued: Mutex<HashSet<String>>,
}

impl NamingPolicy {
    /// Creates an empty policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a fresh name derived from `base`.
    pub fn issue(&self, base: &str) -> Result<String> {
        let base = sanitize(base)?;
        let mut issued = self.issued.lock();
        if issued.insert(base.clone()) {
            return Ok(base);
        }
        loop {
            let n = self.counter.fetch_add(1, Ordering::AcqRel) + 1;
            if n == u64::MAX {
                return Err(RepoError::Synthesis(format!(
                    "class names exhausted for '{base}'"
                )));
            }
            let candidate = format!("{base}_{n}");
            if issued.insert(candidate.clone()) {
                trace!(base = %base, name = %candidate, "synth.name.suffixed");
                return Ok(candidate);
            }
        }
    }

    /// Number of names currently held.
    pub fn issued(&self) -> usize {
        self.issued.lock().len()
    }

    /// Releases every held name not in `live`. The counter keeps growing, so a
    /// released suffixed name is never issued again.
    pub fn retain<S: AsRef<str>>(&self, live: impl IntoIterator<Item = S>) {
        let live: HashSet<String> = live.into_iter().map(|s| s.as_ref().to_string()).collect();
        let mut issued = self.issued.lock();
        let before = issued.len();
        issued.retain(|name| live.contains(name));
        trace!(released = before - issued.len(), held = issued.len(), "synth.name.release");
    }
}

fn sanitize(base: &str) -> Result<String> {
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    match cleaned.chars().next() {
        None => Err(RepoError::Synthesis("empty class name".into())),
        Some(c) if c.is_ascii_digit() => Ok(format!("T{cleaned}")),
        Some(_) => Ok(cleaned),
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Turns descriptors into row classes.
#[derive(Debug, Default)]
pub struct Synthesizer {
    naming: NamingPolicy,
    dialect: Dialect,
}

impl Synthesizer {
    /// Creates a synthesizer for `dialect`.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            naming: NamingPolicy::new(),
            dialect,
        }
    }

    /// Dialect in use.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Naming policy shared by every synthesized class.
    pub fn naming(&self) -> &NamingPolicy {
        &self.naming
    }

    /// Synthesizes the row classes of `desc` in row-class order.
    pub fn synthesize(&self, desc: &TypeDescriptor) -> Result<Vec<Arc<RowClass>>> {
        desc.row_classes()
            .iter()
            .map(|layout| self.synthesize_class(desc, layout).map(Arc::new))
            .collect()
    }

    fn synthesize_class(&self, desc: &TypeDescriptor, layout: &RowClassDescriptor) -> Result<RowClass> {
        let mut fields = Vec::with_capacity(layout.fields.len());
        let mut seen: HashSet<(&str, &str)> = HashSet::new();
        for field in &layout.fields {
            for ident in [&field.name, &field.table, &field.column] {
                if !is_identifier(ident) {
                    return Err(RepoError::Synthesis(format!(
                        "invalid identifier '{ident}' in {}",
                        desc.key()
                    )));
                }
            }
            if !seen.insert((field.table.as_str(), field.column.as_str())) {
                return Err(RepoError::Synthesis(format!(
                    "column {}.{} mapped twice in {}",
                    field.table,
                    field.column,
                    desc.key()
                )));
            }
            let form = if field.ty.is_lazy() && self.dialect.lob_streaming {
                ColumnForm::Streamed
            } else {
                ColumnForm::Inline
            };
            fields.push(RowField {
                name: field.name.clone(),
                table: field.table.clone(),
                column: field.column.clone(),
                ty: field.ty,
                form,
            });
        }
        let mapping = self.mapping(desc, layout)?;
        let name = self.naming.issue(&layout.base_name)?;
        debug!(key = %desc.key(), class = %name, lazy = layout.lazy, "synth.class");
        Ok(RowClass {
            name,
            base_name: layout.base_name.clone(),
            type_key: desc.key(),
            lazy: layout.lazy,
            fields,
            mapping,
        })
    }

    fn mapping(&self, desc: &TypeDescriptor, layout: &RowClassDescriptor) -> Result<RowMapping> {
        if !is_identifier(&layout.primary_table) {
            return Err(RepoError::Synthesis(format!(
                "invalid table name '{}'",
                layout.primary_table
            )));
        }
        let key: SmallVec<[String; 2]> =
            smallvec![CONTENT_ID_COLUMN.to_string(), REVISION_COLUMN.to_string()];
        let secondary: BTreeSet<&str> = layout
            .fields
            .iter()
            .map(|f| f.table.as_str())
            .filter(|t| *t != layout.primary_table)
            .collect();
        let joins = secondary
            .into_iter()
            .map(|table| JoinMapping {
                table: table.to_string(),
                key: key.clone(),
            })
            .collect();
        let (id, sort_rank) = match desc.policy() {
            LoadPolicy::Revisioned => (
                IdStrategy::Composite {
                    content_id: CONTENT_ID_COLUMN.to_string(),
                    revision: REVISION_COLUMN.to_string(),
                },
                None,
            ),
            LoadPolicy::Surrogate => (
                IdStrategy::Surrogate {
                    column: SYS_ID_COLUMN.to_string(),
                    content_id: CONTENT_ID_COLUMN.to_string(),
                    revision: REVISION_COLUMN.to_string(),
                },
                desc.sorted_child().then(|| SORT_RANK_COLUMN.to_string()),
            ),
        };
        let mut associations = Vec::new();
        if desc.is_parent() && !layout.lazy {
            associations.push(Association::SummaryRef {
                table: SUMMARY_TABLE.to_string(),
                column: CONTENT_ID_COLUMN.to_string(),
            });
            for child in desc.simple_children() {
                associations.push(Association::Bag {
                    property: child.name.clone(),
                    table: child.table.clone(),
                    column: child.column.clone(),
                    key: key.clone(),
                });
            }
        }
        Ok(RowMapping {
            table: layout.primary_table.clone(),
            id,
            joins,
            associations,
            sort_rank,
        })
    }
}
