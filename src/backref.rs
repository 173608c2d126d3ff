//! Inverse relationships
//!
//! Every relationship that names a backref registers an inverse entry on the entity it
//! points at, under that entity's `x-backrefs` map.

use indexmap::IndexMap;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::error::{Result, SchemaError};
use crate::graph::all_of::flatten;
use crate::graph::classify::{Cardinality, Relationship};
use crate::graph::iterate::{context, relationships};
use crate::graph::peek::Peek;
use crate::graph::{SchemaName, SchemaSet};
use crate::schema::{Extension, SchemaNode};

/// Backref name declared for a relationship: on the property first, then on `items`
pub fn backref_name<'a>(rel: &Relationship<'a>, schemas: &'a SchemaSet) -> Result<Option<&'a str>> {
    let peek = Peek::prefer_local(schemas);
    if let Some(name) = peek.backref(rel.node)? {
        return Ok(Some(name));
    }
    match rel.items {
        Some(items) => peek.backref(items),
        None => Ok(None),
    }
}

/// Inverse entry registered on the target of a relationship
pub fn inverse_schema(owner: &str, cardinality: Cardinality) -> SchemaNode {
    let object = SchemaNode::object().with_extension(Extension::DeRef, Value::from(owner));
    match cardinality {
        Cardinality::ManyToOne | Cardinality::ManyToMany => SchemaNode::default()
            .with_keyword("type", Value::from("array"))
            .with_items(object),
        Cardinality::OneToOne | Cardinality::OneToMany => object,
    }
}

/// Register every inverse relationship on a copy of the set
pub fn process(schemas: &SchemaSet) -> Result<SchemaSet> {
    let mut staged: BTreeMap<SchemaName, IndexMap<String, SchemaNode>> = BTreeMap::new();

    for scoped in relationships(schemas)? {
        let name = backref_name(&scoped.relationship, schemas).map_err(|e| context(&scoped.path(), e))?;
        let Some(name) = name else {
            continue;
        };
        let target = &scoped.relationship.target;
        let entry = inverse_schema(scoped.entity, scoped.relationship.cardinality);

        let target_node = schemas
            .get(target)
            .ok_or_else(|| SchemaError::malformed(format!("unknown entity {}", target)))?;
        let flat = flatten(target_node, schemas, None)?;
        let declared = flat.backrefs.as_ref().and_then(|b| b.get(name));
        let pending = staged.get(target).and_then(|b| b.get(name));

        match declared.or(pending) {
            Some(existing) if existing != &entry => {
                return Err(SchemaError::malformed(format!(
                    "{}: backref '{}' on {} conflicts with an existing definition",
                    scoped.path(),
                    name,
                    target
                )));
            }
            Some(_) => {}
            None => {
                debug!(entity = %target, backref = name, owner = %scoped.entity, "registered backref");
                staged
                    .entry(target.clone())
                    .or_default()
                    .insert(name.to_string(), entry);
            }
        }
    }

    let mut changes = Vec::with_capacity(staged.len());
    for (entity, entries) in staged {
        let mut node = schemas
            .get(&entity)
            .cloned()
            .ok_or_else(|| SchemaError::malformed(format!("unknown entity {}", entity)))?;
        node.extend_backrefs(entries);
        changes.push((entity, node));
    }

    info!(entities = changes.len(), "backref pass complete");
    Ok(schemas.with_schemas(changes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::graph::test_support::set;
    use serde_json::json;

    fn model() -> SchemaSet {
        set(json!({
            "Customer": {
                "type": "object",
                "x-tablename": "customer",
                "properties": {"id": {"type": "integer", "x-primary-key": true}}
            },
            "Order": {
                "type": "object",
                "x-tablename": "order",
                "properties": {
                    "id": {"type": "integer", "x-primary-key": true},
                    "customer": {"allOf": [{"$ref": "#/components/schemas/Customer"}, {"x-backref": "orders"}]},
                    "lines": {"type": "array", "items": {"$ref": "#/components/schemas/Line", "x-backref": "order"}}
                }
            },
            "Line": {
                "type": "object",
                "x-tablename": "line",
                "properties": {"id": {"type": "integer", "x-primary-key": true}}
            }
        }))
    }

    #[test]
    fn test_backrefs_registered_on_targets() {
        let schemas = process(&model()).unwrap();

        let customer = schemas.get("Customer").unwrap().backrefs.as_ref().unwrap();
        assert_eq!(customer["orders"].keyword("type"), Some(&json!("array")));
        let items = customer["orders"].items.as_ref().unwrap();
        assert_eq!(items.extension(Extension::DeRef), Some(&json!("Order")));

        let line = schemas.get("Line").unwrap().backrefs.as_ref().unwrap();
        assert_eq!(line["order"].keyword("type"), Some(&json!("object")));
        assert_eq!(line["order"].extension(Extension::DeRef), Some(&json!("Order")));
    }

    #[test]
    fn test_process_is_idempotent() {
        let once = process(&model()).unwrap();
        let twice = process(&once).unwrap();
        assert_eq!(once.checksum(), twice.checksum());
    }

    #[test]
    fn test_conflicting_backref_rejected() {
        let mut raw = model().to_value();
        raw["Customer"]["x-backrefs"] = json!({"orders": {"type": "object"}});
        let schemas = SchemaSet::from_value(&raw).unwrap();
        let err = process(&schemas).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedSchema);
        assert!(err.to_string().contains("Order.customer"));
    }
}
