//! Schema Classification
//!
//! Structural questions about a node (is it a real entity, does it inherit) and the
//! property-level classification every later pass dispatches on.

use serde::{Deserialize, Serialize};

use super::peek::Peek;
use super::reference;
use super::{SchemaName, SchemaSet};
use crate::error::{Result, SchemaError};
use crate::schema::SchemaNode;

/// Kind of an entity property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyKind {
    /// Scalar column
    Simple,
    /// Untyped passthrough value
    OpaqueBlob,
    /// Reference to another entity
    Relationship,
    /// Read-only view of an inverse relationship
    Inverse,
}

/// Relationship shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    ManyToOne,
    OneToOne,
    OneToMany,
    ManyToMany,
}

impl Cardinality {
    /// Does the owning side hold a collection?
    pub fn is_collection(&self) -> bool {
        matches!(self, Self::OneToMany | Self::ManyToMany)
    }
}

// =============================================================================
// Structural
// =============================================================================

/// Does the node denote a real entity rather than a pass-through reference?
pub fn is_constructable(node: &SchemaNode, schemas: &SchemaSet) -> Result<bool> {
    if node.reference.is_some() {
        return Ok(false);
    }
    if let Some(all_of) = &node.all_of {
        if all_of.len() < 2 {
            return Ok(false);
        }
    }
    if Peek::prefer_local(schemas).tablename(node)?.is_some() {
        return Ok(true);
    }
    Ok(inherits(node, schemas)?.unwrap_or(false))
}

/// Reads the inherits marker within the node's own composition.
///
/// `Some(true)` for a parent name or `true`, `Some(false)` for `false`, `None` if absent.
pub fn inherits(node: &SchemaNode, schemas: &SchemaSet) -> Result<Option<bool>> {
    Ok(Peek::scoped(schemas)
        .inherits(node)?
        .map(|value| value.is_inheriting()))
}

/// Nearest constructable schema reachable through `$ref` and `allOf`
pub fn nearest_constructable<'a>(
    node: &'a SchemaNode,
    schemas: &'a SchemaSet,
) -> Result<Option<&'a SchemaName>> {
    if let Some(pointer) = &node.reference {
        let (name, target) = reference::resolve(pointer, schemas)?;
        if is_constructable(target, schemas)? {
            return Ok(Some(name));
        }
        return nearest_constructable(target, schemas);
    }
    if let Some(all_of) = &node.all_of {
        for element in all_of {
            if let Some(found) = nearest_constructable(element, schemas)? {
                return Ok(Some(found));
            }
        }
    }
    Ok(None)
}

// =============================================================================
// Properties
// =============================================================================

/// Classify a property schema
pub fn property_kind(node: &SchemaNode, schemas: &SchemaSet) -> Result<PropertyKind> {
    let peek = Peek::plain(schemas);

    if peek.json(node)? == Some(true) {
        return Ok(PropertyKind::OpaqueBlob);
    }

    let schema_type = peek
        .schema_type(node)?
        .ok_or_else(|| SchemaError::malformed("property has no type"))?;
    if matches!(schema_type, "integer" | "number" | "string" | "boolean") {
        return Ok(PropertyKind::Simple);
    }

    if peek.read_only(node)? == Some(true) {
        return Ok(PropertyKind::Inverse);
    }

    match schema_type {
        "object" | "array" => Ok(PropertyKind::Relationship),
        other => Err(SchemaError::malformed(format!(
            "unsupported property type '{}'",
            other
        ))),
    }
}

/// Cardinality of a relationship property
pub fn cardinality(node: &SchemaNode, schemas: &SchemaSet) -> Result<Cardinality> {
    let peek = Peek::plain(schemas);
    let schema_type = peek
        .schema_type(node)?
        .ok_or_else(|| SchemaError::malformed("relationship has no type"))?;

    match schema_type {
        "object" => match Peek::prefer_local(schemas).uselist(node)? {
            Some(false) => Ok(Cardinality::OneToOne),
            _ => Ok(Cardinality::ManyToOne),
        },
        "array" => {
            let items = peek
                .items(node)?
                .ok_or_else(|| SchemaError::malformed("array relationship has no items"))?;
            match Peek::prefer_local(schemas).secondary(items)? {
                Some(_) => Ok(Cardinality::ManyToMany),
                None => Ok(Cardinality::OneToMany),
            }
        }
        other => Err(SchemaError::malformed(format!(
            "relationship must be an object or an array, found '{}'",
            other
        ))),
    }
}

/// A classified relationship property
#[derive(Debug, Clone)]
pub struct Relationship<'a> {
    pub cardinality: Cardinality,
    /// Referenced entity
    pub target: SchemaName,
    /// The property schema
    pub node: &'a SchemaNode,
    /// `items` of a collection relationship
    pub items: Option<&'a SchemaNode>,
}

impl<'a> Relationship<'a> {
    /// Schema describing one related object: `items` for collections, else the property
    pub fn object(&self) -> &'a SchemaNode {
        self.items.unwrap_or(self.node)
    }
}

/// Classify a relationship property and find the entity it references
pub fn relationship<'a>(node: &'a SchemaNode, schemas: &'a SchemaSet) -> Result<Relationship<'a>> {
    let cardinality = cardinality(node, schemas)?;
    let items = if cardinality.is_collection() {
        Peek::plain(schemas).items(node)?
    } else {
        None
    };
    let object = items.unwrap_or(node);
    let target = nearest_constructable(object, schemas)?
        .cloned()
        .ok_or_else(|| SchemaError::malformed("relationship does not reference an entity"))?;

    Ok(Relationship {
        cardinality,
        target,
        node,
        items,
    })
}
