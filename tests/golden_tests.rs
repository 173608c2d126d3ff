//! Golden Tests for Relational Resolution
//!
//! End-to-end runs of the pipeline over the JSON fixtures in `tests/fixtures/`.

use serde_json::{json, Value};

use familiar_relations::graph::inheritance::{get_parent, strategy};
use familiar_relations::graph::classify::is_constructable;
use familiar_relations::graph::peek::Peek;
use familiar_relations::graph::reference;
use familiar_relations::validation::DiagnosticCode;
use familiar_relations::{
    build, diagnose, extract, prepare, Cardinality, ErrorKind, InheritanceStrategy, InverseShape,
    RelationsConfig, SchemaNode, SchemaSet,
};

fn fixture(text: &str) -> Value {
    serde_json::from_str(text).unwrap()
}

fn load(text: &str) -> SchemaSet {
    SchemaSet::from_value(&fixture(text)).unwrap()
}

fn property<'a>(schemas: &'a SchemaSet, entity: &str, name: &str) -> &'a SchemaNode {
    &schemas.get(entity).unwrap().properties.as_ref().unwrap()[name]
}

// =============================================================================
// Association Synthesis
// =============================================================================

#[test]
fn test_order_tag_link_entity() {
    let schemas = load(include_str!("fixtures/order_tag.json"));
    let prepared = prepare(&schemas).unwrap();
    let artifacts = extract(&prepared).unwrap();

    let link = artifacts.get("OrderTag").expect("link entity inserted");
    assert_eq!(link.tablename, "order_tag");
    assert_eq!(link.required, vec!["order_id".to_string(), "tag_id".to_string()]);

    let order_id = link.property("order_id").unwrap().as_simple().unwrap();
    assert!(order_id.primary_key);
    assert!(order_id.required);
    assert_eq!(order_id.foreign_key.as_deref(), Some("order.id"));
    assert_eq!(order_id.schema_type, "integer");

    let tag_id = link.property("tag_id").unwrap().as_simple().unwrap();
    assert!(tag_id.primary_key);
    assert_eq!(tag_id.foreign_key.as_deref(), Some("tag.id"));

    let tags = artifacts
        .get("Order")
        .unwrap()
        .property("tags")
        .unwrap()
        .as_relationship()
        .unwrap();
    assert_eq!(tags.cardinality, Cardinality::ManyToMany);
    assert_eq!(tags.target, "Tag");
    assert_eq!(tags.secondary.as_deref(), Some("order_tag"));
    assert!(tags.foreign_key.is_none());
}

#[test]
fn test_autogen_prefix_per_collision() {
    let mut raw = fixture(include_str!("fixtures/order_tag.json"));
    raw["OrderTag"] = json!({"type": "string"});
    raw["AutogenOrderTag"] = json!({"type": "string"});
    let schemas = SchemaSet::from_value(&raw).unwrap();

    let prepared = prepare(&schemas).unwrap();
    assert!(prepared.contains("AutogenAutogenOrderTag"));
    assert_eq!(prepared.get("OrderTag"), schemas.get("OrderTag"));

    let artifacts = extract(&prepared).unwrap();
    assert_eq!(
        artifacts.get("AutogenAutogenOrderTag").unwrap().tablename,
        "order_tag"
    );
}

#[test]
fn test_declared_link_entity_is_completed() {
    let schemas = load(include_str!("fixtures/order_tag_declared.json"));
    let prepared = prepare(&schemas).unwrap();

    assert!(!prepared.contains("OrderTag"));
    assert_eq!(prepared.len(), schemas.len());

    let artifacts = extract(&prepared).unwrap();
    let link = artifacts.get("OrderTagLink").unwrap();
    let tag_id = link.property("tag_id").unwrap().as_simple().unwrap();
    assert!(tag_id.primary_key);
    assert_eq!(tag_id.foreign_key.as_deref(), Some("tag.id"));
    assert!(link.property("order_id").is_some());
    assert!(link.property("added_at").is_some());

    let again = prepare(&prepared).unwrap();
    assert_eq!(again.checksum(), prepared.checksum());
}

#[test]
fn test_synthesis_independent_of_input_order() {
    let raw = fixture(include_str!("fixtures/order_tag.json"));
    let mut reversed = serde_json::Map::new();
    if let Value::Object(entries) = &raw {
        for (name, schema) in entries.iter().rev() {
            reversed.insert(name.clone(), schema.clone());
        }
    }

    let forward = build(&SchemaSet::from_value(&raw).unwrap()).unwrap();
    let backward = build(&SchemaSet::from_value(&Value::Object(reversed)).unwrap()).unwrap();
    assert_eq!(forward.checksum().unwrap(), backward.checksum().unwrap());
}

// =============================================================================
// Inheritance
// =============================================================================

#[test]
fn test_single_table_child_merges_parent() {
    let schemas = load(include_str!("fixtures/inheritance.json"));
    let child = schemas.get("Child").unwrap();

    assert_eq!(get_parent(child, &schemas).unwrap(), "Parent");
    assert!(is_constructable(child, &schemas).unwrap());
    assert_eq!(
        strategy(child, &schemas).unwrap(),
        Some(InheritanceStrategy::SingleTable)
    );

    let artifacts = build(&schemas).unwrap();
    let child = artifacts.get("Child").unwrap();
    assert_eq!(child.tablename, "parent");
    assert_eq!(child.parent(), Some("Parent"));

    let names: Vec<&str> = child.properties.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["id", "name", "x"]);

    let x = child.property("x").unwrap().as_simple().unwrap();
    assert_eq!(x.max_length, Some(10));
    assert!(x.description.is_none());
}

#[test]
fn test_company_hierarchy() {
    let artifacts = build(&load(include_str!("fixtures/company.json"))).unwrap();

    let company = artifacts.get("Company").unwrap();
    let employees = company.property("employees").unwrap().as_relationship().unwrap();
    assert_eq!(employees.cardinality, Cardinality::OneToMany);
    assert_eq!(employees.foreign_key.as_deref(), Some("company.code"));
    assert_eq!(
        employees.foreign_key_property.as_deref(),
        Some("company_employees_code")
    );
    assert_eq!(employees.backref.as_deref(), Some("company"));

    let employee = artifacts.get("Employee").unwrap();
    let column = employee
        .property("company_employees_code")
        .unwrap()
        .as_simple()
        .unwrap();
    assert_eq!(column.schema_type, "string");
    assert_eq!(column.max_length, Some(12));
    assert_eq!(column.foreign_key.as_deref(), Some("company.code"));

    let mentor = employee.property("mentor").unwrap().as_relationship().unwrap();
    assert_eq!(mentor.cardinality, Cardinality::ManyToOne);
    assert_eq!(mentor.foreign_key.as_deref(), Some("employee.id"));
    assert_eq!(mentor.nullable, Some(true));
    let mentor_id = employee.property("mentor_id").unwrap().as_simple().unwrap();
    assert_eq!(mentor_id.nullable, Some(true));

    assert_eq!(employee.backrefs["company"].shape, InverseShape::Object);
    assert_eq!(employee.backrefs["mentees"].shape, InverseShape::Collection);
    assert_eq!(
        employee.composite_unique,
        Some(json!([["name", "company_employees_code"]]))
    );

    let manager = artifacts.get("Manager").unwrap();
    let inheritance = manager.inheritance.as_ref().unwrap();
    assert_eq!(inheritance.strategy, InheritanceStrategy::JoinedTable);
    assert_eq!(inheritance.parents, vec!["Employee".to_string()]);
    assert!(manager.property("name").is_none());
    let id = manager.property("id").unwrap().as_simple().unwrap();
    assert_eq!(id.foreign_key.as_deref(), Some("employee.id"));

    let intern = artifacts.get("Intern").unwrap();
    assert_eq!(intern.tablename, "employee");
    assert_eq!(
        intern.inheritance.as_ref().unwrap().strategy,
        InheritanceStrategy::SingleTable
    );
    assert!(intern.property("name").is_some());
    assert!(intern.property("school").is_some());
    assert!(intern.composite_unique.is_none());
}

#[test]
fn test_single_table_child_shares_parent_relationships() {
    let mut raw = fixture(include_str!("fixtures/company.json"));
    raw["Holding"] = json!({
        "allOf": [
            {"$ref": "#/components/schemas/Company"},
            {"x-inherits": true, "properties": {"region": {"type": "string"}}}
        ]
    });
    let artifacts = build(&SchemaSet::from_value(&raw).unwrap()).unwrap();

    let holding = artifacts.get("Holding").unwrap();
    assert_eq!(holding.tablename, "company");
    let inherited = holding.property("employees").unwrap().as_relationship().unwrap();
    let declared = artifacts
        .get("Company")
        .unwrap()
        .property("employees")
        .unwrap()
        .as_relationship()
        .unwrap();
    assert_eq!(inherited, declared);
    assert_eq!(inherited.foreign_key.as_deref(), Some("company.code"));

    let employee = artifacts.get("Employee").unwrap();
    let column = inherited.foreign_key_property.as_deref().unwrap();
    assert!(employee.property(column).is_some());
    assert!(employee.property("company_employees_id").is_none());
}

// =============================================================================
// Lookup Strategies
// =============================================================================

#[test]
fn test_local_backref_beats_referenced() {
    let schemas = load(include_str!("fixtures/backref_precedence.json"));
    let plain = Peek::plain(&schemas);
    let local = Peek::prefer_local(&schemas);

    let first = property(&schemas, "Holder", "local_first");
    assert_eq!(local.backref(first).unwrap(), Some("a"));
    assert_eq!(plain.backref(first).unwrap(), Some("a"));

    let last = property(&schemas, "Holder", "local_last");
    assert_eq!(local.backref(last).unwrap(), Some("a"));
    assert_eq!(plain.backref(last).unwrap(), Some("b"));

    assert_eq!(plain.nullable(first).unwrap(), None);
}

#[test]
fn test_alias_prefix_spellings_match() {
    let canonical = fixture(include_str!("fixtures/order_tag.json"));
    let aliased_text = include_str!("fixtures/order_tag.json")
        .replace("\"x-tablename\"", "\"x-familiar-tablename\"")
        .replace("\"x-primary-key\"", "\"x-familiar-primary-key\"");
    let aliased = fixture(&aliased_text);

    let first = build(&SchemaSet::from_value(&canonical).unwrap()).unwrap();
    let second = build(&SchemaSet::from_value(&aliased).unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_configured_pointer_prefix() {
    let text = include_str!("fixtures/order_tag.json").replace("#/components/schemas/", "#/definitions/");
    let raw = fixture(&text);

    let default_err = build(&SchemaSet::from_value(&raw).unwrap()).unwrap_err();
    assert_eq!(default_err.kind(), ErrorKind::SchemaNotFound);

    let mut config = RelationsConfig::default();
    config.references.pointer_prefixes = vec!["#/definitions/".to_string()];
    let schemas = SchemaSet::from_value_with_config(&raw, config).unwrap();
    let artifacts = build(&schemas).unwrap();
    assert!(artifacts.get("OrderTag").is_some());
}

// =============================================================================
// Cycles
// =============================================================================

#[test]
fn test_cycle_rejected_then_resolved() {
    let mut raw = fixture(include_str!("fixtures/cycle.json"));
    let schemas = SchemaSet::from_value(&raw).unwrap();

    let err = reference::resolve("#/components/schemas/Node", &schemas).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedSchema);
    assert!(err.to_string().contains("circular reference"));

    let err = build(&schemas).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedSchema);

    raw["Wrapper"] = json!({"type": "object", "description": "wraps nothing"});
    let schemas = SchemaSet::from_value(&raw).unwrap();
    let (name, _) = reference::resolve("#/components/schemas/Node", &schemas).unwrap();
    assert_eq!(name, "Node");

    let artifacts = build(&schemas).unwrap();
    let node = artifacts
        .get("Holder")
        .unwrap()
        .property("node")
        .unwrap()
        .as_relationship()
        .unwrap();
    assert_eq!(node.foreign_key.as_deref(), Some("node.id"));
    assert!(artifacts.get("Wrapper").is_none());
}

// =============================================================================
// Validation
// =============================================================================

#[test]
fn test_duplicate_tablename_rejected() {
    let schemas = load(include_str!("fixtures/duplicate_tablename.json"));

    let err = build(&schemas).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailure);
    let message = err.to_string();
    assert!(message.contains("Account"));
    assert!(message.contains("Profile"));

    let diagnostics = diagnose(&schemas);
    assert_eq!(diagnostics.error_count(), 1);
    let item = diagnostics.errors().next().unwrap();
    assert_eq!(item.code, DiagnosticCode::DuplicateTablename);
    assert_eq!(item.schema_id, "Profile");
}

// =============================================================================
// Round Trip
// =============================================================================

#[test]
fn test_extraction_is_repeatable() {
    for text in [
        include_str!("fixtures/order_tag.json"),
        include_str!("fixtures/order_tag_declared.json"),
        include_str!("fixtures/company.json"),
    ] {
        let prepared = prepare(&load(text)).unwrap();
        let first = extract(&prepared).unwrap();
        let second = extract(&prepared).unwrap();
        assert_eq!(first.checksum().unwrap(), second.checksum().unwrap());

        let reprepared = prepare(&prepared).unwrap();
        assert_eq!(reprepared.checksum(), prepared.checksum());
        assert_eq!(extract(&reprepared).unwrap(), first);
    }
}
