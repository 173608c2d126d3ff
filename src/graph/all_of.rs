//! Composition Flattening
//!
//! Folds an `allOf` list into a single schema. Elements are folded left to right:
//! `required` is unioned, `properties` and backrefs are merged by name with later entries
//! winning, and every other key is overwritten. Keys declared next to `allOf` on the node
//! itself are folded in last.

use indexmap::IndexMap;

use super::reference;
use super::SchemaSet;
use crate::error::Result;
use crate::schema::SchemaNode;

/// Flatten a node's composition. Nodes without `allOf` are returned unchanged.
pub fn flatten(node: &SchemaNode, schemas: &SchemaSet, skip: Option<&str>) -> Result<SchemaNode> {
    let Some(all_of) = &node.all_of else {
        return Ok(node.clone());
    };

    let mut merged = SchemaNode::default();
    for element in all_of {
        let part = flatten_element(element, schemas, skip)?;
        fold(&mut merged, part);
    }

    let mut local = node.clone();
    local.all_of = None;
    fold(&mut merged, local);

    Ok(merged)
}

fn flatten_element(element: &SchemaNode, schemas: &SchemaSet, skip: Option<&str>) -> Result<SchemaNode> {
    if element.reference.is_none() {
        return flatten(element, schemas, skip);
    }

    let target = reference::resolve_chain(element, schemas, skip)?;
    let mut resolved = flatten(&target, schemas, skip)?;

    let mut siblings = element.clone();
    siblings.reference = None;
    if siblings != SchemaNode::default() {
        let siblings = flatten(&siblings, schemas, skip)?;
        fold(&mut resolved, siblings);
    }
    Ok(resolved)
}

/// Fold `part` into `acc`
pub fn fold(acc: &mut SchemaNode, part: SchemaNode) {
    let SchemaNode {
        reference,
        all_of,
        properties,
        items,
        required,
        backrefs,
        extensions,
        keywords,
    } = part;

    if reference.is_some() {
        acc.reference = reference;
    }
    if all_of.is_some() {
        acc.all_of = all_of;
    }
    if items.is_some() {
        acc.items = items;
    }
    if let Some(required) = required {
        let names = acc.required.get_or_insert_with(Vec::new);
        for name in required {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    if let Some(properties) = properties {
        merge_map(&mut acc.properties, properties);
    }
    if let Some(backrefs) = backrefs {
        merge_map(&mut acc.backrefs, backrefs);
    }
    acc.extensions.extend(extensions);
    acc.keywords.extend(keywords);
}

fn merge_map(acc: &mut Option<IndexMap<String, SchemaNode>>, incoming: IndexMap<String, SchemaNode>) {
    acc.get_or_insert_with(IndexMap::new).extend(incoming);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::test_support::set;
    use crate::schema::Extension;
    use serde_json::json;

    fn scenario_b() -> SchemaSet {
        set(json!({
            "Parent": {
                "type": "object",
                "x-tablename": "parent",
                "required": ["id"],
                "properties": {
                    "id": {"type": "integer", "x-primary-key": true},
                    "name": {"type": "string", "maxLength": 10}
                }
            },
            "Child": {
                "allOf": [
                    {"$ref": "#/components/schemas/Parent"},
                    {
                        "x-inherits": true,
                        "required": ["x", "id"],
                        "properties": {
                            "name": {"type": "string", "maxLength": 20},
                            "x": {"type": "integer"}
                        }
                    }
                ]
            }
        }))
    }

    #[test]
    fn test_flatten_unions_and_overrides() {
        let schemas = scenario_b();
        let flat = flatten(schemas.get("Child").unwrap(), &schemas, None).unwrap();

        let properties = flat.properties.as_ref().unwrap();
        let names: Vec<&str> = properties.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["id", "name", "x"]);
        assert_eq!(properties["name"].keyword("maxLength"), Some(&json!(20)));
        assert_eq!(flat.required, Some(vec!["id".to_string(), "x".to_string()]));
        assert_eq!(flat.extension(Extension::Tablename), Some(&json!("parent")));
        assert_eq!(flat.extension(Extension::Inherits), Some(&json!(true)));
        assert!(flat.all_of.is_none());
    }

    #[test]
    fn test_flatten_is_idempotent() {
        let schemas = scenario_b();
        let once = flatten(schemas.get("Child").unwrap(), &schemas, None).unwrap();
        let twice = flatten(&once, &schemas, None).unwrap();
        assert_eq!(once, twice);

        let flat = schemas.get("Parent").unwrap();
        assert_eq!(&flatten(flat, &schemas, None).unwrap(), flat);
    }

    #[test]
    fn test_flatten_skip_excludes_ancestor() {
        let schemas = scenario_b();
        let flat = flatten(schemas.get("Child").unwrap(), &schemas, Some("Parent")).unwrap();
        let names: Vec<&str> = flat.properties.as_ref().unwrap().keys().map(String::as_str).collect();
        assert_eq!(names, vec!["name", "x"]);
        assert_eq!(flat.extension(Extension::Tablename), None);
    }

    #[test]
    fn test_flatten_nested_and_siblings() {
        let schemas = set(json!({
            "Base": {"allOf": [{"properties": {"a": {"type": "integer"}}}, {"description": "base"}]},
            "Wrapped": {
                "allOf": [
                    {"$ref": "#/components/schemas/Base", "description": "wrapped"},
                    {"properties": {"b": {"type": "string"}}}
                ],
                "x-tablename": "wrapped"
            }
        }));
        let flat = flatten(schemas.get("Wrapped").unwrap(), &schemas, None).unwrap();
        assert_eq!(flat.keyword("description"), Some(&json!("wrapped")));
        assert_eq!(flat.properties.as_ref().unwrap().len(), 2);
        assert_eq!(flat.extension(Extension::Tablename), Some(&json!("wrapped")));
    }

    #[test]
    fn test_flatten_propagates_unresolved() {
        let schemas = set(json!({"A": {"allOf": [{"$ref": "#/components/schemas/Gone"}]}}));
        assert!(flatten(schemas.get("A").unwrap(), &schemas, None).is_err());
    }
}
