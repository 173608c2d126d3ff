//! Inheritance Resolution
//!
//! Walks composition chains to find constructable ancestors and decides how a child is
//! stored: sharing its parent's table, or in its own table joined on the primary key.

use serde::{Deserialize, Serialize};

use super::classify::{inherits, nearest_constructable};
use super::peek::Peek;
use super::{SchemaName, SchemaSet};
use crate::error::{Result, SchemaError};
use crate::schema::SchemaNode;

/// How an inheriting entity is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InheritanceStrategy {
    /// Shares the parent's table
    SingleTable,
    /// Own table, joined to the parent's on its primary key
    JoinedTable,
}

/// Nearest constructable ancestor.
///
/// An explicit parent name on the inherits marker selects that ancestor, which must be on
/// the chain.
pub fn get_parent(node: &SchemaNode, schemas: &SchemaSet) -> Result<SchemaName> {
    if let Some(named) = Peek::scoped(schemas).inherits(node)? {
        if let Some(wanted) = named.parent() {
            let chain = ancestor_chain(node, schemas)?;
            return chain
                .into_iter()
                .find(|name| name == wanted)
                .ok_or_else(|| {
                    SchemaError::malformed(format!(
                        "inherits names '{}' which is not an ancestor",
                        wanted
                    ))
                });
        }
    }

    nearest_constructable(node, schemas)?
        .cloned()
        .ok_or_else(|| SchemaError::malformed("no parent found for inheriting schema"))
}

/// Every constructable ancestor, nearest first, up to the parent the node names
pub fn get_parents(node: &SchemaNode, schemas: &SchemaSet) -> Result<Vec<SchemaName>> {
    let mut chain = ancestor_chain(node, schemas)?;
    if let Some(named) = Peek::scoped(schemas).inherits(node)? {
        if let Some(wanted) = named.parent() {
            match chain.iter().position(|name| name == wanted) {
                Some(idx) => chain.truncate(idx + 1),
                None => {
                    return Err(SchemaError::malformed(format!(
                        "inherits names '{}' which is not an ancestor",
                        wanted
                    )))
                }
            }
        }
    }
    Ok(chain)
}

/// Follow parents for as long as each ancestor itself inherits
fn ancestor_chain(node: &SchemaNode, schemas: &SchemaSet) -> Result<Vec<SchemaName>> {
    let mut chain = Vec::new();
    let mut current = node;
    loop {
        let Some(parent) = nearest_constructable(current, schemas)? else {
            break;
        };
        // composition is acyclic once the set passed its cycle check
        if chain.contains(parent) {
            return Err(SchemaError::malformed(format!(
                "circular inheritance through {}",
                parent
            )));
        }
        chain.push(parent.clone());

        let Some(parent_node) = schemas.get(parent) else {
            break;
        };
        if inherits(parent_node, schemas)? != Some(true) {
            break;
        }
        current = parent_node;
    }
    Ok(chain)
}

/// Storage strategy of an inheriting entity, `None` if it does not inherit
pub fn strategy(node: &SchemaNode, schemas: &SchemaSet) -> Result<Option<InheritanceStrategy>> {
    if inherits(node, schemas)? != Some(true) {
        return Ok(None);
    }
    let parent = get_parent(node, schemas)?;
    let parent_node = schemas
        .get(&parent)
        .ok_or_else(|| SchemaError::malformed(format!("parent {} disappeared", parent)))?;

    let peek = Peek::prefer_local(schemas);
    let own = peek.tablename(node)?;
    let inherited = peek.tablename(parent_node)?;

    Ok(Some(if own == inherited {
        InheritanceStrategy::SingleTable
    } else {
        InheritanceStrategy::JoinedTable
    }))
}

/// True for single-table inheritance children, which share their parent's table
pub fn is_single_table_child(node: &SchemaNode, schemas: &SchemaSet) -> Result<bool> {
    Ok(strategy(node, schemas)? == Some(InheritanceStrategy::SingleTable))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::graph::test_support::set;
    use serde_json::json;

    fn hierarchy() -> SchemaSet {
        set(json!({
            "Employee": {
                "type": "object",
                "x-tablename": "employee",
                "properties": {"id": {"type": "integer", "x-primary-key": true}}
            },
            "Manager": {
                "allOf": [
                    {"$ref": "#/components/schemas/Employee"},
                    {"x-inherits": true, "properties": {"reports": {"type": "integer"}}}
                ]
            },
            "Director": {
                "allOf": [
                    {"$ref": "#/components/schemas/Manager"},
                    {"x-inherits": "Employee", "properties": {"budget": {"type": "number"}}}
                ]
            },
            "Engineer": {
                "allOf": [
                    {"$ref": "#/components/schemas/Employee"},
                    {"x-inherits": true, "x-tablename": "engineer"}
                ]
            },
            "Intern": {
                "allOf": [
                    {"$ref": "#/components/schemas/Employee"},
                    {"x-inherits": "Manager"}
                ]
            }
        }))
    }

    fn node<'a>(schemas: &'a SchemaSet, name: &str) -> &'a SchemaNode {
        schemas.get(name).unwrap()
    }

    #[test]
    fn test_get_parent() {
        let schemas = hierarchy();
        assert_eq!(get_parent(node(&schemas, "Manager"), &schemas).unwrap(), "Employee");
        assert_eq!(get_parent(node(&schemas, "Director"), &schemas).unwrap(), "Employee");
        assert_eq!(
            get_parent(node(&schemas, "Intern"), &schemas).unwrap_err().kind(),
            ErrorKind::MalformedSchema
        );
    }

    #[test]
    fn test_get_parent_without_parent_is_malformed() {
        let schemas = hierarchy();
        let err = get_parent(node(&schemas, "Employee"), &schemas).unwrap_err();
        assert!(err.to_string().contains("no parent"));
    }

    #[test]
    fn test_get_parents_chain() {
        let schemas = hierarchy();
        let director = node(&schemas, "Director");
        assert_eq!(get_parents(director, &schemas).unwrap(), vec!["Manager", "Employee"]);
        let manager = node(&schemas, "Manager");
        assert_eq!(get_parents(manager, &schemas).unwrap(), vec!["Employee"]);
    }

    #[test]
    fn test_strategies() {
        let schemas = hierarchy();
        let of = |name| strategy(node(&schemas, name), &schemas).unwrap();
        assert_eq!(of("Employee"), None);
        assert_eq!(of("Manager"), Some(InheritanceStrategy::SingleTable));
        assert_eq!(of("Director"), Some(InheritanceStrategy::SingleTable));
        assert_eq!(of("Engineer"), Some(InheritanceStrategy::JoinedTable));
    }

    #[test]
    fn test_multi_level_single_table() {
        let mut raw = hierarchy().to_value();
        raw["Lead"] = json!({
            "allOf": [
                {"$ref": "#/components/schemas/Director"},
                {"x-inherits": true, "properties": {"team": {"type": "string"}}}
            ]
        });
        let schemas = SchemaSet::from_value(&raw).unwrap();
        let lead = node(&schemas, "Lead");
        assert_eq!(
            strategy(lead, &schemas).unwrap(),
            Some(InheritanceStrategy::SingleTable)
        );
        assert_eq!(
            get_parents(lead, &schemas).unwrap(),
            vec!["Director", "Manager", "Employee"]
        );
    }
}
