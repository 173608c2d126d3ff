//! Global validation
//!
//! Consistency rules that only make sense across the whole schema set:
//!
//! 1. **Unique tablenames** - no two entities share a table, except single-table
//!    inheritance children, which share their parent's.
//! 2. **Unique secondaries** - every many-to-many relationship has its own link table.
//! 3. **Association conformance** - a declared link entity has at most two primary keys,
//!    each with a distinct foreign key, each matching a column the association synthesizer
//!    would generate.
//!
//! [`validate`] fails on the first violation (or on all of them with `collect_all`).
//! [`diagnose`] never fails and reports everything it finds, plus a warning for every
//! entity without properties.

pub mod diagnostics;

pub use diagnostics::{DiagnosticCode, DiagnosticItem, Diagnostics, Severity};

use std::collections::BTreeMap;
use tracing::debug;

use crate::association::{expected_associations, find_link_entity};
use crate::error::{Result, SchemaError};
use crate::foreign_key::{primary_keys, ColumnShape};
use crate::graph::all_of::flatten;
use crate::graph::inheritance::is_single_table_child;
use crate::graph::iterate::{constructables, context, many_to_many};
use crate::graph::peek::Peek;
use crate::graph::{SchemaName, SchemaSet};

/// Fail on global inconsistencies.
///
/// Structural problems met on the way propagate with their own kind.
pub fn validate(schemas: &SchemaSet) -> Result<()> {
    let mut diagnostics = Diagnostics::new();
    check_unique_tablenames(schemas, &mut diagnostics)?;
    check_unique_secondaries(schemas, &mut diagnostics)?;
    check_associations(schemas, &mut diagnostics)?;

    let messages: Vec<String> = diagnostics.errors().map(|item| item.message.clone()).collect();
    if messages.is_empty() {
        return Ok(());
    }
    if schemas.config().validation.collect_all {
        Err(SchemaError::validation(messages.join("; ")))
    } else {
        Err(SchemaError::validation(messages[0].clone()))
    }
}

/// Collect every violation, including structural failures
pub fn diagnose(schemas: &SchemaSet) -> Diagnostics {
    let mut diagnostics = Diagnostics::new();

    if let Err(error) = schemas.check_cycles() {
        let first = schemas
            .cycle_analysis()
            .groups
            .first()
            .and_then(|g| g.members.first().cloned())
            .unwrap_or_default();
        diagnostics.failure(first, &error);
        return diagnostics;
    }

    let checks: [(&str, fn(&SchemaSet, &mut Diagnostics) -> Result<()>); 4] = [
        ("tablenames", check_unique_tablenames),
        ("secondaries", check_unique_secondaries),
        ("associations", check_associations),
        ("empty entities", check_empty_entities),
    ];
    for (name, check) in checks {
        let mut found = Diagnostics::new();
        match check(schemas, &mut found) {
            Ok(()) => diagnostics.merge(found),
            Err(error) => {
                debug!(check = name, %error, "check stopped early");
                diagnostics.merge(found);
                diagnostics.failure(location_of(&error), &error);
            }
        }
    }

    debug!(
        errors = diagnostics.error_count(),
        warnings = diagnostics.warning_count(),
        "diagnosis complete"
    );
    diagnostics
}

/// Schema named at the start of an error message, if any
fn location_of(error: &SchemaError) -> String {
    match error {
        SchemaError::MalformedSchema(message) => message
            .split(|c: char| c == ':' || c == '.')
            .next()
            .filter(|s| !s.contains(' '))
            .unwrap_or_default()
            .to_string(),
        SchemaError::SchemaNotFound { reference, .. } => reference.clone(),
        _ => String::new(),
    }
}

// =============================================================================
// Checks
// =============================================================================

/// Tablenames are unique among entities that are not single-table children
pub fn check_unique_tablenames(schemas: &SchemaSet, diagnostics: &mut Diagnostics) -> Result<()> {
    let peek = Peek::prefer_local(schemas);
    let mut seen: BTreeMap<&str, &SchemaName> = BTreeMap::new();

    for (name, node) in constructables(schemas)? {
        if is_single_table_child(node, schemas).map_err(|e| context(name, e))? {
            continue;
        }
        let Some(tablename) = peek.tablename(node)? else {
            continue;
        };
        match seen.get(tablename) {
            Some(first) => diagnostics.duplicate_tablename(tablename, first, name),
            None => {
                seen.insert(tablename, name);
            }
        }
    }
    Ok(())
}

/// Entities whose flattened composition declares no properties
pub fn check_empty_entities(schemas: &SchemaSet, diagnostics: &mut Diagnostics) -> Result<()> {
    for (name, node) in constructables(schemas)? {
        let flat = flatten(node, schemas, None).map_err(|e| context(name, e))?;
        if flat.properties.as_ref().map_or(true, |p| p.is_empty()) {
            diagnostics.empty_entity(name);
        }
    }
    Ok(())
}

/// Every many-to-many relationship has its own link table
pub fn check_unique_secondaries(schemas: &SchemaSet, diagnostics: &mut Diagnostics) -> Result<()> {
    let peek = Peek::prefer_local(schemas);
    let mut seen: BTreeMap<String, String> = BTreeMap::new();

    for scoped in many_to_many(schemas)? {
        let Some(secondary) = peek.secondary(scoped.relationship.object())? else {
            continue;
        };
        let path = scoped.path();
        match seen.get(secondary) {
            Some(first) => diagnostics.duplicate_secondary(secondary, first, &path),
            None => {
                seen.insert(secondary.to_string(), path);
            }
        }
    }
    Ok(())
}

/// Declared link entities match what their relationships expect
pub fn check_associations(schemas: &SchemaSet, diagnostics: &mut Diagnostics) -> Result<()> {
    for association in expected_associations(schemas)? {
        let Some(entity) = find_link_entity(&association.secondary, schemas)? else {
            continue;
        };
        let node = schemas
            .get(entity)
            .ok_or_else(|| SchemaError::malformed(format!("unknown entity {}", entity)))?;
        let flat = flatten(node, schemas, None)?;
        let keys = primary_keys(&flat, schemas)?;

        if keys.len() > 2 {
            diagnostics.push(
                DiagnosticItem::new(
                    entity.as_str(),
                    DiagnosticCode::AssociationPrimaryKeyCount,
                    format!(
                        "association {} may have at most 2 primary keys, found {}",
                        entity,
                        keys.len()
                    ),
                )
                .with_context(format!("link table for {}", association.source)),
            );
        }

        let mut foreign_keys: Vec<&str> = Vec::with_capacity(keys.len());
        for (key, schema) in &keys {
            let Some(foreign_key) = Peek::plain(schemas).foreign_key(schema)? else {
                diagnostics.error(
                    entity.as_str(),
                    DiagnosticCode::AssociationMissingForeignKey,
                    format!("association primary key {}.{} has no foreign key", entity, key),
                );
                continue;
            };
            if foreign_keys.contains(&foreign_key) {
                diagnostics.error(
                    entity.as_str(),
                    DiagnosticCode::AssociationDuplicateForeignKey,
                    format!(
                        "association {} has more than one primary key with foreign key {}",
                        entity, foreign_key
                    ),
                );
                continue;
            }
            foreign_keys.push(foreign_key);

            let Some(expected) = association.column_for(foreign_key) else {
                let [first, second] = &association.columns;
                diagnostics.push(
                    DiagnosticItem::new(
                        entity.as_str(),
                        DiagnosticCode::AssociationColumnMismatch,
                        format!(
                            "association primary key {}.{} has foreign key {}, expected {} or {}",
                            entity, key, foreign_key, first.foreign_key, second.foreign_key
                        ),
                    )
                    .with_context(format!("link table for {}", association.source)),
                );
                continue;
            };
            let shape = ColumnShape::of(schema, schemas)?;
            if shape != expected.shape {
                diagnostics.push(
                    DiagnosticItem::new(
                        entity.as_str(),
                        DiagnosticCode::AssociationColumnMismatch,
                        format!(
                            "association primary key {}.{} does not match the {} column it references",
                            entity, key, expected.foreign_key
                        ),
                    )
                    .with_context(format!("expected {:?}", expected.shape))
                    .with_context(format!("found {:?}", shape)),
                );
            }
        }
    }
    Ok(())
}
