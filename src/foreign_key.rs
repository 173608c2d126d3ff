//! Foreign-key synthesis
//!
//! Writes the foreign-key column behind every many-to-one, one-to-one and one-to-many
//! relationship into the schema set, plus the primary key a joined-table child shares with
//! its parent. Running the pass on its own output changes nothing.
//!
//! | Cardinality            | Column lives on | Column name                 | Foreign key      |
//! |------------------------|-----------------|-----------------------------|------------------|
//! | ManyToOne / OneToOne   | owner           | `<property>_<col>`          | `<target>.<col>` |
//! | OneToMany              | target          | `<owner>_<property>_<col>`  | `<owner>.<col>`  |

use indexmap::IndexMap;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::error::{Result, SchemaError};
use crate::graph::all_of::flatten;
use crate::graph::classify::{Cardinality, Relationship};
use crate::graph::inheritance::{get_parent, strategy, InheritanceStrategy};
use crate::graph::iterate::{constructables, context, relationships};
use crate::graph::peek::Peek;
use crate::graph::{SchemaName, SchemaSet};
use crate::schema::{Extension, SchemaNode};

// =============================================================================
// Column shape
// =============================================================================

/// The parts of a column definition copied onto columns that reference it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnShape {
    pub schema_type: String,
    pub format: Option<String>,
    pub max_length: Option<u64>,
}

impl ColumnShape {
    /// Read the shape of a column schema
    pub fn of(column: &SchemaNode, schemas: &SchemaSet) -> Result<Self> {
        let peek = Peek::plain(schemas);
        let schema_type = peek
            .schema_type(column)?
            .ok_or_else(|| SchemaError::malformed("referenced column has no type"))?;
        Ok(Self {
            schema_type: schema_type.to_string(),
            format: peek.format(column)?.map(String::from),
            max_length: peek.max_length(column)?,
        })
    }

    /// Column schema with this shape
    pub fn to_node(&self) -> SchemaNode {
        let mut node = SchemaNode::default().with_keyword("type", Value::from(self.schema_type.as_str()));
        if let Some(format) = &self.format {
            node = node.with_keyword("format", Value::from(format.as_str()));
        }
        if let Some(max_length) = self.max_length {
            node = node.with_keyword("maxLength", Value::from(max_length));
        }
        node
    }
}

/// Primary-key columns of an already flattened entity, in declared order
pub fn primary_keys(flat: &SchemaNode, schemas: &SchemaSet) -> Result<Vec<(String, SchemaNode)>> {
    let peek = Peek::plain(schemas);
    let mut keys = Vec::new();
    if let Some(properties) = &flat.properties {
        for (name, property) in properties {
            if peek.primary_key(property)? == Some(true) {
                keys.push((name.clone(), property.clone()));
            }
        }
    }
    Ok(keys)
}

/// The single primary key of an entity
pub fn single_primary_key(entity: &str, schemas: &SchemaSet) -> Result<(String, SchemaNode)> {
    let node = schemas.get(entity).ok_or_else(|| SchemaError::SchemaNotFound {
        reference: schemas.pointer(entity),
        suggestion: schemas.suggest(entity),
    })?;
    let flat = flatten(node, schemas, None)?;
    let mut keys = primary_keys(&flat, schemas)?;
    if keys.len() != 1 {
        return Err(SchemaError::malformed(format!(
            "{} must have exactly one primary key, found {}",
            entity,
            keys.len()
        )));
    }
    Ok(keys.remove(0))
}

/// Table name of a named entity
pub(crate) fn tablename_of(entity: &str, schemas: &SchemaSet) -> Result<String> {
    let node = schemas
        .get(entity)
        .ok_or_else(|| SchemaError::malformed(format!("unknown entity {}", entity)))?;
    Peek::prefer_local(schemas)
        .tablename(node)?
        .map(String::from)
        .ok_or_else(|| SchemaError::malformed(format!("{} has no tablename", entity)))
}

fn referenced_column(entity: &str, column: &str, schemas: &SchemaSet) -> Result<SchemaNode> {
    let node = schemas
        .get(entity)
        .ok_or_else(|| SchemaError::malformed(format!("unknown entity {}", entity)))?;
    let flat = flatten(node, schemas, None)?;
    flat.properties
        .as_ref()
        .and_then(|p| p.get(column))
        .cloned()
        .ok_or_else(|| {
            SchemaError::malformed(format!(
                "foreign key column '{}' not found on {}",
                column, entity
            ))
        })
}

// =============================================================================
// Synthesis
// =============================================================================

/// A foreign-key column to be written into an entity
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyColumn {
    /// Entity the column lives on
    pub entity: SchemaName,
    pub name: String,
    pub foreign_key: String,
    pub shape: ColumnShape,
    pub schema: SchemaNode,
    /// Ancestor excluded when checking for an existing declaration
    scope_skip: Option<SchemaName>,
}

/// Foreign-key column implied by a relationship; many-to-many relationships have none
pub fn synthesize(
    entity: &str,
    entity_node: &SchemaNode,
    property: &str,
    rel: &Relationship<'_>,
    schemas: &SchemaSet,
) -> Result<Option<ForeignKeyColumn>> {
    let default_column = schemas.config().synthesis.default_foreign_key_column.as_str();

    let (owner, name, foreign_key, referenced) = match rel.cardinality {
        Cardinality::ManyToMany => return Ok(None),
        Cardinality::ManyToOne | Cardinality::OneToOne => {
            let column = Peek::prefer_local(schemas)
                .foreign_key_column(rel.node)?
                .unwrap_or(default_column);
            let target_table = tablename_of(&rel.target, schemas)?;
            (
                entity.to_string(),
                format!("{}_{}", property, column),
                format!("{}.{}", target_table, column),
                referenced_column(&rel.target, column, schemas)?,
            )
        }
        Cardinality::OneToMany => {
            let scoped_peek = Peek::scoped(schemas);
            let column = match scoped_peek.foreign_key_column(rel.object())? {
                Some(column) => column,
                None => scoped_peek
                    .foreign_key_column(entity_node)?
                    .unwrap_or(default_column),
            };
            let owner_table = tablename_of(entity, schemas)?;
            (
                rel.target.clone(),
                format!("{}_{}_{}", owner_table, property, column),
                format!("{}.{}", owner_table, column),
                referenced_column(entity, column, schemas)?,
            )
        }
    };

    let shape = ColumnShape::of(&referenced, schemas)?;
    let mut schema = shape
        .to_node()
        .with_extension(Extension::ForeignKey, Value::from(foreign_key.as_str()))
        .with_extension(Extension::DictIgnore, Value::Bool(true));
    if let Some(nullable) = Peek::plain(schemas).nullable(rel.node)? {
        schema = schema.with_keyword("nullable", Value::Bool(nullable));
    }

    Ok(Some(ForeignKeyColumn {
        entity: owner,
        name,
        foreign_key,
        shape,
        schema,
        scope_skip: None,
    }))
}

/// Primary key a joined-table child re-declares, referencing its parent's
pub fn joined_primary_key(entity: &str, schemas: &SchemaSet) -> Result<Option<ForeignKeyColumn>> {
    let node = schemas
        .get(entity)
        .ok_or_else(|| SchemaError::malformed(format!("unknown entity {}", entity)))?;
    if strategy(node, schemas)? != Some(InheritanceStrategy::JoinedTable) {
        return Ok(None);
    }
    let parent = get_parent(node, schemas)?;
    let (pk, pk_schema) = single_primary_key(&parent, schemas)?;
    let parent_table = tablename_of(&parent, schemas)?;

    let shape = ColumnShape::of(&pk_schema, schemas)?;
    let foreign_key = format!("{}.{}", parent_table, pk);
    let schema = shape
        .to_node()
        .with_extension(Extension::PrimaryKey, Value::Bool(true))
        .with_extension(Extension::ForeignKey, Value::from(foreign_key.as_str()));

    Ok(Some(ForeignKeyColumn {
        entity: entity.to_string(),
        name: pk,
        foreign_key,
        shape,
        schema,
        scope_skip: Some(parent),
    }))
}

// =============================================================================
// Pass
// =============================================================================

/// Write every synthesized foreign-key column into a copy of the set
pub fn process(schemas: &SchemaSet) -> Result<SchemaSet> {
    let mut staged: BTreeMap<SchemaName, IndexMap<String, SchemaNode>> = BTreeMap::new();

    for (entity, _) in constructables(schemas)? {
        if let Some(column) = joined_primary_key(entity, schemas).map_err(|e| context(entity, e))? {
            stage(schemas, &mut staged, column)?;
        }
    }

    for scoped in relationships(schemas)? {
        let column = synthesize(
            scoped.entity,
            scoped.entity_node,
            &scoped.property,
            &scoped.relationship,
            schemas,
        )
        .map_err(|e| context(&scoped.path(), e))?;
        if let Some(column) = column {
            stage(schemas, &mut staged, column)?;
        }
    }

    let mut changes = Vec::new();
    let mut added = 0;
    for (entity, columns) in staged {
        if columns.is_empty() {
            continue;
        }
        let mut node = schemas
            .get(&entity)
            .cloned()
            .ok_or_else(|| SchemaError::malformed(format!("unknown entity {}", entity)))?;
        added += columns.len();
        node.extend_properties(columns);
        changes.push((entity, node));
    }

    info!(columns = added, entities = changes.len(), "foreign key pass complete");
    Ok(schemas.with_schemas(changes))
}

fn stage(
    schemas: &SchemaSet,
    staged: &mut BTreeMap<SchemaName, IndexMap<String, SchemaNode>>,
    column: ForeignKeyColumn,
) -> Result<()> {
    let node = schemas
        .get(&column.entity)
        .ok_or_else(|| SchemaError::malformed(format!("unknown entity {}", column.entity)))?;
    let flat = flatten(node, schemas, column.scope_skip.as_deref())?;

    if let Some(existing) = flat.properties.as_ref().and_then(|p| p.get(&column.name)) {
        return check_declared(existing, &column, schemas);
    }

    let columns = staged.entry(column.entity.clone()).or_default();
    match columns.get(&column.name) {
        Some(previous) if previous != &column.schema => Err(SchemaError::validation(format!(
            "{}.{} is synthesized twice with different definitions",
            column.entity, column.name
        ))),
        Some(_) => Ok(()),
        None => {
            debug!(
                entity = %column.entity,
                column = %column.name,
                foreign_key = %column.foreign_key,
                "synthesized foreign key column"
            );
            columns.insert(column.name, column.schema);
            Ok(())
        }
    }
}

/// A user-declared column must agree with the synthesized one
fn check_declared(existing: &SchemaNode, column: &ForeignKeyColumn, schemas: &SchemaSet) -> Result<()> {
    let peek = Peek::plain(schemas);
    let foreign_key = peek.foreign_key(existing)?;
    if foreign_key != Some(column.foreign_key.as_str()) {
        return Err(SchemaError::validation(format!(
            "{}.{} must have foreign key {}, found {}",
            column.entity,
            column.name,
            column.foreign_key,
            foreign_key.unwrap_or("none")
        )));
    }
    let schema_type = peek.schema_type(existing)?;
    if schema_type != Some(column.shape.schema_type.as_str()) {
        return Err(SchemaError::validation(format!(
            "{}.{} must have type {}, found {}",
            column.entity,
            column.name,
            column.shape.schema_type,
            schema_type.unwrap_or("none")
        )));
    }
    Ok(())
}
