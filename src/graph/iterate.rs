//! Entity and property iteration
//!
//! Property iteration here is entity-scoped: it walks the entity's own composition and
//! follows `$ref` only into non-constructable schemas (mixins, aliases), never into
//! another entity's property set.

use indexmap::IndexMap;

use super::classify::{is_constructable, property_kind, relationship, Cardinality, PropertyKind, Relationship};
use super::reference;
use super::{SchemaName, SchemaSet};
use crate::error::{Result, SchemaError};
use crate::schema::SchemaNode;

/// Constructable entities in name order
pub fn constructables(schemas: &SchemaSet) -> Result<Vec<(&SchemaName, &SchemaNode)>> {
    let mut entities = Vec::new();
    for (name, node) in schemas.iter() {
        if is_constructable(node, schemas).map_err(|e| context(name, e))? {
            entities.push((name, node));
        }
    }
    Ok(entities)
}

/// Properties declared within an entity's own scope, in declared order
pub fn properties<'a>(
    node: &'a SchemaNode,
    schemas: &'a SchemaSet,
) -> Result<IndexMap<String, &'a SchemaNode>> {
    let mut found = IndexMap::new();
    collect_properties(node, schemas, &mut found)?;
    Ok(found)
}

fn collect_properties<'a>(
    node: &'a SchemaNode,
    schemas: &'a SchemaSet,
    found: &mut IndexMap<String, &'a SchemaNode>,
) -> Result<()> {
    if let Some(pointer) = &node.reference {
        let (_, target) = reference::resolve(pointer, schemas)?;
        if !is_constructable(target, schemas)? {
            collect_properties(target, schemas, found)?;
        }
    }
    if let Some(all_of) = &node.all_of {
        for element in all_of {
            collect_properties(element, schemas, found)?;
        }
    }
    if let Some(properties) = &node.properties {
        for (name, property) in properties {
            found.insert(name.clone(), property);
        }
    }
    Ok(())
}

/// A relationship declared within an entity's scope
#[derive(Debug, Clone)]
pub struct ScopedRelationship<'a> {
    /// Entity declaring the relationship
    pub entity: &'a SchemaName,
    pub entity_node: &'a SchemaNode,
    pub property: String,
    pub relationship: Relationship<'a>,
}

impl ScopedRelationship<'_> {
    /// `Entity.property`, for messages
    pub fn path(&self) -> String {
        format!("{}.{}", self.entity, self.property)
    }
}

/// Every entity-scoped relationship across the set, entity name order then declared order
pub fn relationships(schemas: &SchemaSet) -> Result<Vec<ScopedRelationship<'_>>> {
    let mut found = Vec::new();
    for (entity, entity_node) in constructables(schemas)? {
        let scoped = properties(entity_node, schemas).map_err(|e| context(entity, e))?;
        for (property, node) in scoped {
            let kind = property_kind(node, schemas)
                .map_err(|e| context(&format!("{}.{}", entity, property), e))?;
            if kind != PropertyKind::Relationship {
                continue;
            }
            let relationship = relationship(node, schemas)
                .map_err(|e| context(&format!("{}.{}", entity, property), e))?;
            found.push(ScopedRelationship {
                entity,
                entity_node,
                property,
                relationship,
            });
        }
    }
    Ok(found)
}

/// Entity-scoped many-to-many relationships
pub fn many_to_many(schemas: &SchemaSet) -> Result<Vec<ScopedRelationship<'_>>> {
    Ok(relationships(schemas)?
        .into_iter()
        .filter(|r| r.relationship.cardinality == Cardinality::ManyToMany)
        .collect())
}

/// Prefix a malformed-schema message with where it happened
pub(crate) fn context(location: &str, error: SchemaError) -> SchemaError {
    match error {
        SchemaError::MalformedSchema(message) if !message.starts_with(location) => {
            SchemaError::MalformedSchema(format!("{}: {}", location, message))
        }
        other => other,
    }
}
