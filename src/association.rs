//! Association (link table) synthesis
//!
//! Every many-to-many relationship needs a link entity with one primary/foreign key
//! column per side. Missing link entities are synthesized and inserted under a PascalCase
//! name derived from the link table; a user-declared entity with that table name is
//! completed instead of duplicated.

use indexmap::IndexMap;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::error::{Result, SchemaError};
use crate::foreign_key::{single_primary_key, tablename_of, ColumnShape};
use crate::graph::all_of::flatten;
use crate::graph::inheritance::is_single_table_child;
use crate::graph::iterate::{constructables, context, many_to_many, ScopedRelationship};
use crate::graph::peek::Peek;
use crate::graph::{SchemaName, SchemaSet};
use crate::schema::{Extension, SchemaNode};

// =============================================================================
// Candidates
// =============================================================================

/// One side of a link table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationColumn {
    pub name: String,
    pub foreign_key: String,
    pub shape: ColumnShape,
}

impl AssociationColumn {
    /// Column pointing at an entity's single primary key
    fn for_entity(entity: &str, schemas: &SchemaSet) -> Result<Self> {
        let table = tablename_of(entity, schemas)?;
        let (pk, pk_schema) = single_primary_key(entity, schemas)?;
        Ok(Self {
            name: format!("{}_{}", table, pk),
            foreign_key: format!("{}.{}", table, pk),
            shape: ColumnShape::of(&pk_schema, schemas)?,
        })
    }

    pub fn to_node(&self) -> SchemaNode {
        self.shape
            .to_node()
            .with_extension(Extension::PrimaryKey, Value::Bool(true))
            .with_extension(Extension::ForeignKey, Value::from(self.foreign_key.as_str()))
    }
}

/// Link entity a many-to-many relationship expects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    /// Link table name
    pub secondary: String,
    /// `Entity.property` declaring the relationship
    pub source: String,
    /// Owning side first
    pub columns: [AssociationColumn; 2],
}

impl Association {
    /// Link entity expected for a many-to-many relationship
    pub fn expected(scoped: &ScopedRelationship<'_>, schemas: &SchemaSet) -> Result<Self> {
        let rel = &scoped.relationship;
        let secondary = Peek::prefer_local(schemas)
            .secondary(rel.object())?
            .ok_or_else(|| SchemaError::malformed("many-to-many relationship has no secondary"))?;

        let owner = AssociationColumn::for_entity(scoped.entity, schemas)?;
        let target = AssociationColumn::for_entity(&rel.target, schemas)?;
        if owner.name == target.name {
            return Err(SchemaError::malformed(format!(
                "self-referential many-to-many would generate column '{}' twice; declare the {} association entity explicitly",
                owner.name, secondary
            )));
        }

        Ok(Self {
            secondary: secondary.to_string(),
            source: scoped.path(),
            columns: [owner, target],
        })
    }

    /// Schema of a fresh link entity
    pub fn to_node(&self) -> SchemaNode {
        let mut node = SchemaNode::object()
            .with_extension(Extension::Tablename, Value::from(self.secondary.as_str()))
            .with_required(self.columns.iter().map(|c| c.name.clone()).collect());
        for column in &self.columns {
            node = node.with_property(column.name.clone(), column.to_node());
        }
        node
    }

    /// Column with the given foreign key, if any
    pub fn column_for(&self, foreign_key: &str) -> Option<&AssociationColumn> {
        self.columns.iter().find(|c| c.foreign_key == foreign_key)
    }
}

/// Link entities expected by every many-to-many relationship, in entity order
pub fn expected_associations(schemas: &SchemaSet) -> Result<Vec<Association>> {
    many_to_many(schemas)?
        .iter()
        .map(|scoped| Association::expected(scoped, schemas).map_err(|e| context(&scoped.path(), e)))
        .collect()
}

// =============================================================================
// Names and lookup
// =============================================================================

/// PascalCase name for a link table, prefixed until it does not collide
pub fn association_name(secondary: &str, schemas: &SchemaSet) -> String {
    let mut name: String = secondary
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect();
    let prefix = &schemas.config().synthesis.autogen_prefix;
    while schemas.contains(&name) {
        name = format!("{}{}", prefix, name);
    }
    name
}

/// Entity storing the given link table. Single-table children share a parent's table and
/// never count.
pub fn find_link_entity<'a>(secondary: &str, schemas: &'a SchemaSet) -> Result<Option<&'a SchemaName>> {
    let peek = Peek::prefer_local(schemas);
    for (name, node) in constructables(schemas)? {
        if peek.tablename(node)? != Some(secondary) {
            continue;
        }
        if is_single_table_child(node, schemas).map_err(|e| context(name, e))? {
            continue;
        }
        return Ok(Some(name));
    }
    Ok(None)
}

// =============================================================================
// Pass
// =============================================================================

/// Insert or complete the link entity of every many-to-many relationship
pub fn process(schemas: &SchemaSet) -> Result<SchemaSet> {
    let mut groups: BTreeMap<String, Vec<Association>> = BTreeMap::new();
    for association in expected_associations(schemas)? {
        groups
            .entry(association.secondary.clone())
            .or_default()
            .push(association);
    }

    let mut current = schemas.clone();
    let mut inserted = 0;
    let mut merged = 0;

    for (secondary, group) in groups {
        for association in group {
            let existing = find_link_entity(&secondary, &current)?.cloned();
            match existing {
                Some(name) => {
                    if let Some(node) = merge(&name, &association, &current)? {
                        debug!(entity = %name, secondary = %secondary, "completed declared association");
                        current = current.with_schema(name, node);
                        merged += 1;
                    }
                }
                None => {
                    let name = association_name(&secondary, &current);
                    debug!(entity = %name, secondary = %secondary, source = %association.source, "synthesized association");
                    current = current.with_schema(name, association.to_node());
                    inserted += 1;
                }
            }
        }
    }

    info!(inserted, merged, "association pass complete");
    Ok(current)
}

/// Complete a user-declared link entity with the columns it lacks.
///
/// Returns `None` when every expected column is already covered by a property with the
/// same foreign key.
fn merge(existing: &str, association: &Association, schemas: &SchemaSet) -> Result<Option<SchemaNode>> {
    let node = schemas
        .get(existing)
        .ok_or_else(|| SchemaError::malformed(format!("unknown entity {}", existing)))?;
    let flat = flatten(node, schemas, None)?;
    let peek = Peek::plain(schemas);

    let mut missing = IndexMap::new();
    for column in &association.columns {
        let mut covering = None;
        if let Some(properties) = &flat.properties {
            for (name, property) in properties {
                if peek.foreign_key(property)? == Some(column.foreign_key.as_str()) {
                    covering = Some((name, property));
                    break;
                }
            }
        }

        match covering {
            Some((name, property)) => {
                let shape = ColumnShape::of(property, schemas)?;
                if shape != column.shape {
                    return Err(SchemaError::validation(format!(
                        "{}.{} covers {} for {} but its type {:?}/{:?}/{:?} differs from {:?}/{:?}/{:?}",
                        existing,
                        name,
                        column.foreign_key,
                        association.source,
                        shape.schema_type,
                        shape.format,
                        shape.max_length,
                        column.shape.schema_type,
                        column.shape.format,
                        column.shape.max_length
                    )));
                }
            }
            None => {
                missing.insert(column.name.clone(), column.to_node());
            }
        }
    }

    if missing.is_empty() {
        return Ok(None);
    }

    let mut partial = SchemaNode::object();
    partial.properties = Some(missing);
    Ok(Some(SchemaNode {
        all_of: Some(vec![partial, node.clone()]),
        ..SchemaNode::default()
    }))
}
