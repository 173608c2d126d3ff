//! Reference Resolution
//!
//! Single-hop `$ref` resolution against a [`SchemaSet`]. Cycle detection is not threaded
//! through callers: the set already knows which schemas sit on a composition cycle, and
//! following a reference into one of them is an error.

use std::borrow::Cow;

use super::{parse_pointer, SchemaName, SchemaSet};
use crate::error::{Result, SchemaError};
use crate::schema::SchemaNode;

/// Extract the target name of a pointer, failing if it does not match the grammar
pub fn parse<'r>(reference: &'r str, schemas: &SchemaSet) -> Result<&'r str> {
    parse_pointer(schemas.ref_pattern(), reference).ok_or_else(|| SchemaError::SchemaNotFound {
        reference: reference.to_string(),
        suggestion: None,
    })
}

/// Resolve one `$ref` to its named schema
pub fn resolve<'a>(reference: &str, schemas: &'a SchemaSet) -> Result<(&'a SchemaName, &'a SchemaNode)> {
    let name = parse(reference, schemas)?;
    let Some((name, node)) = schemas.get_entry(name) else {
        return Err(SchemaError::SchemaNotFound {
            reference: reference.to_string(),
            suggestion: schemas.suggest(name),
        });
    };
    if schemas.is_cyclic(name) {
        let members = schemas
            .cycle_analysis()
            .group(name)
            .map(|g| g.members.join(" -> "))
            .unwrap_or_else(|| name.clone());
        return Err(SchemaError::malformed(format!(
            "circular reference through {} ({})",
            name, members
        )));
    }
    Ok((name, node))
}

/// Follow a `$ref` chain until reaching a schema without one.
///
/// Siblings of each followed `$ref` are dropped. A link named `skip` resolves to the empty
/// schema so callers can exclude a known ancestor.
pub fn resolve_chain<'a>(
    node: &'a SchemaNode,
    schemas: &'a SchemaSet,
    skip: Option<&str>,
) -> Result<Cow<'a, SchemaNode>> {
    let mut current = node;
    while let Some(reference) = &current.reference {
        let (name, target) = resolve(reference, schemas)?;
        if skip == Some(name.as_str()) {
            return Ok(Cow::Owned(SchemaNode::default()));
        }
        current = target;
    }
    Ok(Cow::Borrowed(current))
}

/// Name at the end of a `$ref` chain, if the node starts with one
pub fn chain_target<'a>(node: &'a SchemaNode, schemas: &'a SchemaSet) -> Result<Option<&'a SchemaName>> {
    let mut found = None;
    let mut current = node;
    while let Some(reference) = &current.reference {
        let (name, target) = resolve(reference, schemas)?;
        found = Some(name);
        current = target;
    }
    Ok(found)
}
