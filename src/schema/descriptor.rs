//! Type descriptors: the mapping metadata of one content type or complex child.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::definition::{ChildDef, ContentTypeDef, FieldDef, FieldSource, ObjectKind};
use crate::synth::RowClass;
use crate::types::{ChildId, RepoError, Result, TypeKey};

/// Semantic type of a mapped field.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    /// Bounded text.
    String,
    /// 64-bit integer.
    Long,
    /// Floating point number.
    Double,
    /// Boolean flag.
    Boolean,
    /// Date or timestamp.
    Date,
    /// Unbounded text, loaded lazily.
    LargeText,
    /// Binary payload, loaded lazily.
    LargeBinary,
}

impl PropertyType {
    /// Classifies a declared data type and format.
    ///
    /// Returns `None` for data types the engine does not recognize.
    pub fn classify(data_type: &str, format: Option<&str>) -> Option<Self> {
        let unbounded = format.is_some_and(|f| f.trim().eq_ignore_ascii_case("max"));
        match data_type.trim().to_ascii_lowercase().as_str() {
            "text" | "string" if unbounded => Some(PropertyType::LargeText),
            "text" | "string" => Some(PropertyType::String),
            "integer" | "long" => Some(PropertyType::Long),
            "float" | "double" | "decimal" => Some(PropertyType::Double),
            "boolean" => Some(PropertyType::Boolean),
            "date" | "datetime" | "time" | "timestamp" => Some(PropertyType::Date),
            "binary" | "blob" => Some(PropertyType::LargeBinary),
            _ => None,
        }
    }

    /// Large fields are deferred from the eager load path.
    pub fn is_lazy(self) -> bool {
        matches!(self, PropertyType::LargeText | PropertyType::LargeBinary)
    }

    /// Short name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            PropertyType::String => "string",
            PropertyType::Long => "long",
            PropertyType::Double => "double",
            PropertyType::Boolean => "boolean",
            PropertyType::Date => "date",
            PropertyType::LargeText => "large-text",
            PropertyType::LargeBinary => "large-binary",
        }
    }
}

/// How rows of a descriptor are identified.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LoadPolicy {
    /// Identified by `(content id, revision)`.
    Revisioned,
    /// Identified by a generated surrogate `(content id, revision, sys id)`.
    Surrogate,
}

/// Logical field mapped to one physical column.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldMapping {
    /// Field name (submit name).
    pub name: String,
    /// Physical table.
    pub table: String,
    /// Physical column.
    pub column: String,
    /// Semantic type.
    pub ty: PropertyType,
}

/// Repeating single-column child exposed as a multi-valued parent property.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SimpleChild {
    /// Child identifier.
    pub child_id: ChildId,
    /// Property name.
    pub name: String,
    /// Table holding the values.
    pub table: String,
    /// Column holding the values.
    pub column: String,
    /// Semantic type of each value.
    pub ty: PropertyType,
}

/// Layout of one implementing row class before and after synthesis.
#[derive(Clone, Debug)]
pub struct RowClassDescriptor {
    /// Base name; the synthesized class name is this plus an optional suffix.
    pub base_name: String,
    /// Whether the class holds only lazy fields.
    pub lazy: bool,
    /// Table carrying the row identity.
    pub primary_table: String,
    /// Projected fields in declaration order.
    pub fields: Vec<FieldMapping>,
    class: Option<Arc<RowClass>>,
}

impl RowClassDescriptor {
    fn new(base_name: String, lazy: bool, primary_table: String, fields: Vec<FieldMapping>) -> Self {
        Self {
            base_name,
            lazy,
            primary_table,
            fields,
            class: None,
        }
    }

    /// The synthesized class, present once the registry has rebuilt mappings.
    pub fn class(&self) -> Option<&Arc<RowClass>> {
        self.class.as_ref()
    }

    /// Tables this class touches, primary table included.
    pub fn tables(&self) -> BTreeSet<&str> {
        let mut tables: BTreeSet<&str> = self.fields.iter().map(|f| f.table.as_str()).collect();
        tables.insert(self.primary_table.as_str());
        tables
    }

    fn same_layout(&self, other: &Self) -> bool {
        self.base_name == other.base_name
            && self.lazy == other.lazy
            && self.primary_table == other.primary_table
            && self.fields == other.fields
    }
}

/// Mapping metadata of one content type or complex child.
#[derive(Clone, Debug)]
pub struct TypeDescriptor {
    key: TypeKey,
    type_name: String,
    kind: ObjectKind,
    policy: LoadPolicy,
    primary_table: Option<String>,
    tables: BTreeSet<String>,
    fields: Vec<FieldMapping>,
    body_properties: BTreeSet<String>,
    lazy_properties: BTreeSet<String>,
    simple_children: Vec<SimpleChild>,
    row_classes: Vec<RowClassDescriptor>,
    children: Vec<Arc<TypeDescriptor>>,
    sorted_child: bool,
}

struct FieldLayout {
    fields: Vec<FieldMapping>,
    body: BTreeSet<String>,
    local_table: Option<String>,
}

impl FieldLayout {
    fn collect(owner: &str, defs: &[FieldDef]) -> Result<Self> {
        let mut fields: Vec<FieldMapping> = Vec::with_capacity(defs.len());
        let mut body = BTreeSet::new();
        let mut local_table = None;
        for def in defs {
            let ty = PropertyType::classify(&def.data_type, def.format.as_deref()).ok_or_else(
                || RepoError::UnknownDataType {
                    field: def.submit_name.clone(),
                    data_type: def.data_type.clone(),
                },
            )?;
            if def.source == FieldSource::System {
                debug!(owner, field = %def.submit_name, "descriptor.field.system");
                continue;
            }
            let Some(locator) = def.locator.as_ref() else {
                warn!(owner, field = %def.submit_name, "descriptor.field.unmapped");
                continue;
            };
            if fields.iter().any(|f| f.name == def.submit_name) {
                warn!(owner, field = %def.submit_name, "descriptor.field.duplicate");
                continue;
            }
            if def.source == FieldSource::Local && local_table.is_none() {
                local_table = Some(locator.table.clone());
            }
            if def.inline_link || def.cleanup {
                body.insert(def.submit_name.clone());
            }
            fields.push(FieldMapping {
                name: def.submit_name.clone(),
                table: locator.table.clone(),
                column: locator.column.clone(),
                ty,
            });
        }
        Ok(Self {
            fields,
            body,
            local_table,
        })
    }
}

impl TypeDescriptor {
    /// Builds the parent descriptor and one descriptor per complex child.
    pub fn build_all(def: &ContentTypeDef) -> Result<Vec<TypeDescriptor>> {
        let mut out = vec![Self::build_parent(def)?];
        for child in def.children.iter().filter(|c| !c.is_simple()) {
            out.push(Self::build_child(def, child)?);
        }
        Ok(out)
    }

    /// Builds the descriptor of a parent type; complex children are linked later.
    pub fn build_parent(def: &ContentTypeDef) -> Result<TypeDescriptor> {
        let layout = FieldLayout::collect(&def.name, &def.fields)?;
        let mut simple_children = Vec::new();
        for child in def.children.iter().filter(|c| c.is_simple()) {
            simple_children.push(simple_child(child)?);
        }
        let primary = layout.local_table.clone();
        Ok(Self::assemble(
            def.key(),
            def.name.clone(),
            sanitize_base(&def.name),
            def.kind,
            LoadPolicy::Revisioned,
            primary,
            layout,
            simple_children,
            false,
        ))
    }

    /// Builds the descriptor of a complex child.
    pub fn build_child(def: &ContentTypeDef, child: &ChildDef) -> Result<TypeDescriptor> {
        let layout = FieldLayout::collect(&child.name, &child.fields)?;
        let primary = if layout.fields.iter().any(|f| f.table == child.table) {
            Some(child.table.clone())
        } else {
            layout.local_table.clone()
        };
        Ok(Self::assemble(
            TypeKey::child(def.id, child.child_id),
            child.name.clone(),
            format!("{}_{}", sanitize_base(&def.name), sanitize_base(&child.name)),
            def.kind,
            LoadPolicy::Surrogate,
            primary,
            layout,
            Vec::new(),
            child.sorted,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        key: TypeKey,
        type_name: String,
        base_name: String,
        kind: ObjectKind,
        policy: LoadPolicy,
        primary_table: Option<String>,
        layout: FieldLayout,
        simple_children: Vec<SimpleChild>,
        sorted_child: bool,
    ) -> Self {
        let FieldLayout { fields, body, .. } = layout;
        let mut tables: BTreeSet<String> = fields.iter().map(|f| f.table.clone()).collect();
        let lazy_properties: BTreeSet<String> = fields
            .iter()
            .filter(|f| f.ty.is_lazy())
            .map(|f| f.name.clone())
            .collect();
        let row_classes = match primary_table.as_ref() {
            Some(primary) => {
                tables.insert(primary.clone());
                let (lazy, eager): (Vec<FieldMapping>, Vec<FieldMapping>) =
                    fields.iter().cloned().partition(|f| f.ty.is_lazy());
                let mut classes = vec![RowClassDescriptor::new(
                    base_name.clone(),
                    false,
                    primary.clone(),
                    eager,
                )];
                if !lazy.is_empty() {
                    classes.push(RowClassDescriptor::new(
                        format!("{base_name}Lobs"),
                        true,
                        primary.clone(),
                        lazy,
                    ));
                }
                classes
            }
            None => {
                warn!(key = %key, type_name = %type_name, "descriptor.dead");
                Vec::new()
            }
        };
        Self {
            key,
            type_name,
            kind,
            policy,
            primary_table,
            tables,
            fields,
            body_properties: body,
            lazy_properties,
            simple_children,
            row_classes,
            children: Vec::new(),
            sorted_child,
        }
    }

    /// Registry key.
    pub fn key(&self) -> TypeKey {
        self.key
    }

    /// Content type or child name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Whether this descriptor is a parent type.
    pub fn is_parent(&self) -> bool {
        self.key.is_parent()
    }

    /// Object kind of the owning content type.
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Identity policy of the rows.
    pub fn policy(&self) -> LoadPolicy {
        self.policy
    }

    /// Primary table, absent for dead types.
    pub fn primary_table(&self) -> Option<&str> {
        self.primary_table.as_deref()
    }

    /// All tables the type spans.
    pub fn tables(&self) -> &BTreeSet<String> {
        &self.tables
    }

    /// Mapped fields in declaration order.
    pub fn fields(&self) -> &[FieldMapping] {
        &self.fields
    }

    /// Looks up a mapped field.
    pub fn field(&self, name: &str) -> Option<&FieldMapping> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields requiring body expansion.
    pub fn body_properties(&self) -> &BTreeSet<String> {
        &self.body_properties
    }

    /// Fields deferred from the eager load path.
    pub fn lazy_properties(&self) -> &BTreeSet<String> {
        &self.lazy_properties
    }

    /// Simple children exposed as multi-valued properties.
    pub fn simple_children(&self) -> &[SimpleChild] {
        &self.simple_children
    }

    /// Returns `true` when `name` is a multi-valued property.
    pub fn is_multi_valued(&self, name: &str) -> bool {
        self.simple_children.iter().any(|c| c.name == name)
    }

    /// Implementing row classes: main first, then lobs when present.
    pub fn row_classes(&self) -> &[RowClassDescriptor] {
        &self.row_classes
    }

    /// The eager row class.
    pub fn main_class(&self) -> Option<&RowClassDescriptor> {
        self.row_classes.iter().find(|c| !c.lazy)
    }

    /// The lazy row class, present only when lazy fields exist.
    pub fn lazy_class(&self) -> Option<&RowClassDescriptor> {
        self.row_classes.iter().find(|c| c.lazy)
    }

    /// A dead type has no implementing classes.
    pub fn is_dead(&self) -> bool {
        self.row_classes.is_empty()
    }

    /// Linked complex children ordered by key.
    pub fn children(&self) -> &[Arc<TypeDescriptor>] {
        &self.children
    }

    /// Child rows keep an explicit sort rank.
    pub fn sorted_child(&self) -> bool {
        self.sorted_child
    }

    /// Returns a copy with the children list replaced.
    pub fn with_children(&self, mut children: Vec<Arc<TypeDescriptor>>) -> TypeDescriptor {
        children.sort_by_key(|c| c.key());
        let mut next = self.clone();
        next.children = children;
        next
    }

    /// Returns a copy with synthesized classes attached, in row-class order.
    pub fn with_classes(&self, classes: &[Arc<RowClass>]) -> TypeDescriptor {
        let mut next = self.clone();
        next.children.clear();
        for (slot, class) in next.row_classes.iter_mut().zip(classes) {
            slot.class = Some(Arc::clone(class));
        }
        next
    }

    /// Structural equality ignoring generated class names.
    pub fn metadata_equal(&self, other: &TypeDescriptor) -> bool {
        self.key == other.key
            && self.type_name == other.type_name
            && self.kind == other.kind
            && self.policy == other.policy
            && self.primary_table == other.primary_table
            && self.tables == other.tables
            && self.fields == other.fields
            && self.body_properties == other.body_properties
            && self.lazy_properties == other.lazy_properties
            && self.simple_children == other.simple_children
            && self.sorted_child == other.sorted_child
            && self.row_classes.len() == other.row_classes.len()
            && self
                .row_classes
                .iter()
                .zip(&other.row_classes)
                .all(|(a, b)| a.same_layout(b))
            && self.children.len() == other.children.len()
            && self
                .children
                .iter()
                .zip(&other.children)
                .all(|(a, b)| a.metadata_equal(b))
    }
}

fn simple_child(child: &ChildDef) -> Result<SimpleChild> {
    let field = &child.fields[0];
    let ty = PropertyType::classify(&field.data_type, field.format.as_deref()).ok_or_else(|| {
        RepoError::UnknownDataType {
            field: field.submit_name.clone(),
            data_type: field.data_type.clone(),
        }
    })?;
    let (table, column) = match field.locator.as_ref() {
        Some(locator) => (locator.table.clone(), locator.column.clone()),
        None => (child.table.clone(), field.submit_name.to_ascii_uppercase()),
    };
    Ok(SimpleChild {
        child_id: child.child_id,
        name: child.name.clone(),
        table,
        column,
        ty,
    })
}

/// Reduces a type name to identifier characters for class naming.
fn sanitize_base(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
