//! Model artifacts
//!
//! The intermediate representation handed to downstream generators: one flattened,
//! fully classified description per constructable entity. Artifacts are plain data with
//! no references back into the schema set.
//!
//! Extraction is read-only. Run it on a set that already went through
//! [`crate::pipeline::prepare`], otherwise synthesized columns and link entities are
//! missing from the output.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::backref::backref_name;
use crate::checksum::Checksum;
use crate::error::Result;
use crate::foreign_key::{self, tablename_of};
use crate::graph::all_of::flatten;
use crate::graph::classify::{property_kind, relationship, Cardinality, PropertyKind};
use crate::graph::inheritance::{get_parent, get_parents, strategy, InheritanceStrategy};
use crate::graph::iterate::{constructables, context, properties};
use crate::graph::peek::Peek;
use crate::graph::{SchemaName, SchemaSet};
use crate::schema::SchemaNode;

// =============================================================================
// Artifact types
// =============================================================================

/// Every entity of a schema set, sorted by name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifacts {
    pub entities: Vec<EntityArtifacts>,
}

impl ModelArtifacts {
    pub fn get(&self, name: &str) -> Option<&EntityArtifacts> {
        self.entities.iter().find(|e| e.name == name)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Checksum of the canonical JSON form
    pub fn checksum(&self) -> Result<Checksum> {
        Checksum::from_serializable(self)
    }
}

/// One constructable entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityArtifacts {
    pub name: SchemaName,
    pub tablename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inheritance: Option<InheritanceArtifacts>,
    #[serde(default)]
    pub required: Vec<String>,
    pub properties: IndexMap<String, PropertyArtifacts>,
    /// Inverse relationships registered by other entities
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub backrefs: IndexMap<String, InverseArtifacts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kwargs: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite_index: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite_unique: Option<Value>,
}

impl EntityArtifacts {
    pub fn property(&self, name: &str) -> Option<&PropertyArtifacts> {
        self.properties.get(name)
    }

    pub fn parent(&self) -> Option<&str> {
        self.inheritance.as_ref().map(|i| i.parent.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InheritanceArtifacts {
    /// Nearest constructable ancestor
    pub parent: SchemaName,
    /// Every constructable ancestor, nearest first
    pub parents: Vec<SchemaName>,
    pub strategy: InheritanceStrategy,
}

/// A classified property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PropertyArtifacts {
    Simple(SimpleArtifacts),
    OpaqueBlob(OpaqueBlobArtifacts),
    Relationship(RelationshipArtifacts),
    Inverse(InverseArtifacts),
}

impl PropertyArtifacts {
    pub fn kind(&self) -> PropertyKind {
        match self {
            Self::Simple(_) => PropertyKind::Simple,
            Self::OpaqueBlob(_) => PropertyKind::OpaqueBlob,
            Self::Relationship(_) => PropertyKind::Relationship,
            Self::Inverse(_) => PropertyKind::Inverse,
        }
    }

    pub fn as_simple(&self) -> Option<&SimpleArtifacts> {
        match self {
            Self::Simple(simple) => Some(simple),
            _ => None,
        }
    }

    pub fn as_relationship(&self) -> Option<&RelationshipArtifacts> {
        match self {
            Self::Relationship(rel) => Some(rel),
            _ => None,
        }
    }

    pub fn as_inverse(&self) -> Option<&InverseArtifacts> {
        match self {
            Self::Inverse(inverse) => Some(inverse),
            _ => None,
        }
    }
}

/// Scalar column
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimpleArtifacts {
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub primary_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoincrement: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kwargs: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key_kwargs: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_default: Option<String>,
    pub read_only: bool,
    pub write_only: bool,
    pub dict_ignore: bool,
}

/// Untyped passthrough value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpaqueBlobArtifacts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub read_only: bool,
    pub write_only: bool,
}

/// Reference to another entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipArtifacts {
    pub cardinality: Cardinality,
    pub target: SchemaName,
    /// `<table>.<column>` the foreign-key column points at; none for many-to-many
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<String>,
    /// Name of the foreign-key column, on the owner or the target depending on cardinality
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key_property: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uselist: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kwargs: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub write_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InverseShape {
    Object,
    Collection,
}

/// Read-only view of a relationship declared elsewhere
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InverseArtifacts {
    pub shape: InverseShape,
    /// Entity on the other side (`x-de-$ref`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<SchemaName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Sub-properties exposed on the related object
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<String>,
}

// =============================================================================
// Extraction
// =============================================================================

/// Artifacts for every constructable entity
pub fn extract(schemas: &SchemaSet) -> Result<ModelArtifacts> {
    let mut entities = Vec::new();
    for (name, node) in constructables(schemas)? {
        let entity = extract_entity(name, node, schemas).map_err(|e| context(name, e))?;
        entities.push(entity);
    }
    entities.sort_by(|a, b| a.name.cmp(&b.name));
    debug!(entities = entities.len(), "extracted model artifacts");
    Ok(ModelArtifacts { entities })
}

/// Artifacts for one constructable entity
pub fn extract_entity(name: &str, node: &SchemaNode, schemas: &SchemaSet) -> Result<EntityArtifacts> {
    let tablename = tablename_of(name, schemas)?;

    let inheritance = match strategy(node, schemas)? {
        Some(strategy) => Some(InheritanceArtifacts {
            parent: get_parent(node, schemas)?,
            parents: get_parents(node, schemas)?,
            strategy,
        }),
        None => None,
    };
    let parent = inheritance.as_ref().map(|i| i.parent.as_str());
    let joined_parent = match &inheritance {
        Some(i) if i.strategy == InheritanceStrategy::JoinedTable => Some(i.parent.as_str()),
        _ => None,
    };

    let flat = flatten(node, schemas, joined_parent)?;
    let required = flat.required.clone().unwrap_or_default();
    let ancestors = inheritance
        .as_ref()
        .map(|i| i.parents.clone())
        .unwrap_or_default();
    let own = properties(node, schemas)?;

    let mut extracted = IndexMap::new();
    if let Some(declared) = &flat.properties {
        for (property, property_node) in declared {
            let artifact = declaring_entity(name, node, &own, property, &ancestors, schemas)
                .and_then(|(owner, owner_node)| {
                    extract_property(owner, owner_node, property, property_node, &required, schemas)
                })
                .map_err(|e| context(&format!("{}.{}", name, property), e))?;
            extracted.insert(property.clone(), artifact);
        }
    }
    if extracted.is_empty() {
        warn!(entity = name, "entity has no properties");
    }

    let mut backrefs = IndexMap::new();
    if let Some(declared) = &flat.backrefs {
        for (backref, backref_node) in declared {
            let artifact = extract_inverse(backref_node, schemas)
                .map_err(|e| context(&format!("{}.{}", name, backref), e))?;
            backrefs.insert(backref.clone(), artifact);
        }
    }

    let table_peek = Peek::plain(schemas).skipping(parent);
    let kwargs = table_peek.kwargs(node)?.cloned();
    let composite_index = table_peek.composite_index(node)?.cloned();
    let composite_unique = table_peek.composite_unique(node)?.cloned();

    debug!(
        entity = name,
        tablename = %tablename,
        properties = extracted.len(),
        backrefs = backrefs.len(),
        "extracted entity"
    );

    Ok(EntityArtifacts {
        name: name.to_string(),
        tablename,
        description: Peek::plain(schemas).description(&flat)?.map(String::from),
        inheritance,
        required,
        properties: extracted,
        backrefs,
        kwargs,
        composite_index,
        composite_unique,
    })
}

/// Entity whose own scope declares a property.
///
/// A single-table child inherits its ancestors' properties through flattening, but the
/// columns they imply were synthesized for the ancestor that declares them.
fn declaring_entity<'a>(
    name: &'a str,
    node: &'a SchemaNode,
    own: &IndexMap<String, &SchemaNode>,
    property: &str,
    ancestors: &'a [SchemaName],
    schemas: &'a SchemaSet,
) -> Result<(&'a str, &'a SchemaNode)> {
    if own.contains_key(property) {
        return Ok((name, node));
    }
    for ancestor in ancestors {
        let Some(ancestor_node) = schemas.get(ancestor) else {
            continue;
        };
        if properties(ancestor_node, schemas)?.contains_key(property) {
            return Ok((ancestor.as_str(), ancestor_node));
        }
    }
    Ok((name, node))
}

fn extract_property(
    entity: &str,
    entity_node: &SchemaNode,
    property: &str,
    node: &SchemaNode,
    required: &[String],
    schemas: &SchemaSet,
) -> Result<PropertyArtifacts> {
    let is_required = required.iter().any(|r| r == property);
    let peek = Peek::plain(schemas);

    match property_kind(node, schemas)? {
        PropertyKind::Simple => {
            let schema_type = peek.schema_type(node)?.unwrap_or_default().to_string();
            Ok(PropertyArtifacts::Simple(SimpleArtifacts {
                schema_type,
                format: peek.format(node)?.map(String::from),
                max_length: peek.max_length(node)?,
                nullable: peek.nullable(node)?,
                required: is_required,
                default: peek.default_value(node)?.cloned(),
                description: peek.description(node)?.map(String::from),
                primary_key: peek.primary_key(node)?.unwrap_or(false),
                autoincrement: peek.autoincrement(node)?,
                index: peek.index(node)?,
                unique: peek.unique(node)?,
                foreign_key: peek.foreign_key(node)?.map(String::from),
                kwargs: peek.kwargs(node)?.cloned(),
                foreign_key_kwargs: peek.foreign_key_kwargs(node)?.cloned(),
                server_default: peek.server_default(node)?.map(String::from),
                read_only: peek.read_only(node)?.unwrap_or(false),
                write_only: peek.write_only(node)?.unwrap_or(false),
                dict_ignore: peek.dict_ignore(node)?.unwrap_or(false),
            }))
        }
        PropertyKind::OpaqueBlob => Ok(PropertyArtifacts::OpaqueBlob(OpaqueBlobArtifacts {
            nullable: peek.nullable(node)?,
            required: is_required,
            description: peek.description(node)?.map(String::from),
            read_only: peek.read_only(node)?.unwrap_or(false),
            write_only: peek.write_only(node)?.unwrap_or(false),
        })),
        PropertyKind::Relationship => {
            let rel = relationship(node, schemas)?;
            let column = foreign_key::synthesize(entity, entity_node, property, &rel, schemas)?;
            let (foreign_key, foreign_key_property) = match column {
                Some(column) => (Some(column.foreign_key), Some(column.name)),
                None => (None, None),
            };
            let secondary = match rel.cardinality {
                Cardinality::ManyToMany => Peek::prefer_local(schemas)
                    .secondary(rel.object())?
                    .map(String::from),
                _ => None,
            };
            // Relationship-level values must not leak in from the referenced entity
            let local = Peek::scoped(schemas);
            Ok(PropertyArtifacts::Relationship(RelationshipArtifacts {
                cardinality: rel.cardinality,
                target: rel.target.clone(),
                foreign_key,
                foreign_key_property,
                secondary,
                backref: backref_name(&rel, schemas)?.map(String::from),
                uselist: Peek::prefer_local(schemas).uselist(node)?,
                kwargs: local.kwargs(node)?.cloned(),
                nullable: peek.nullable(node)?,
                required: is_required,
                description: local.description(node)?.map(String::from),
                write_only: local.write_only(node)?.unwrap_or(false),
            }))
        }
        PropertyKind::Inverse => Ok(PropertyArtifacts::Inverse(extract_inverse(node, schemas)?)),
    }
}

fn extract_inverse(node: &SchemaNode, schemas: &SchemaSet) -> Result<InverseArtifacts> {
    let peek = Peek::plain(schemas);
    let shape = match peek.schema_type(node)? {
        Some("array") => InverseShape::Collection,
        _ => InverseShape::Object,
    };
    let object = match shape {
        InverseShape::Collection => peek.items(node)?.unwrap_or(node),
        InverseShape::Object => node,
    };
    let flat = flatten(object, schemas, None)?;
    let properties = flat
        .properties
        .as_ref()
        .map(|p| p.keys().cloned().collect())
        .unwrap_or_default();

    Ok(InverseArtifacts {
        shape,
        target: peek.de_ref(object)?.map(String::from),
        description: peek.description(node)?.map(String::from),
        properties,
    })
}
