//! Attribute Lookup
//!
//! Finds the effective value of an attribute across a node, its `$ref` target and its
//! `allOf` elements. Three strategies:
//!
//! - [`Lookup::Plain`]: local keys, then the `$ref` target, then `allOf` elements in
//!   declared order. First hit wins.
//! - [`Lookup::PreferLocal`]: local keys, then the `$ref` target, then `allOf` elements
//!   with every element carrying a `$ref` moved after those that do not. A value declared
//!   in the composition itself beats one inherited through a reference, and keys declared
//!   next to `allOf` count as declared in the composition.
//! - [`Lookup::Scoped`]: local keys and `allOf` elements only; never crosses a `$ref`.
//!
//! A missing attribute is `Ok(None)` at any depth. Only grammar violations, unresolved
//! references, cycles and wrongly typed values are errors.

use serde_json::{Map, Value};

use super::reference;
use super::SchemaSet;
use crate::error::{Result, SchemaError};
use crate::schema::{describe, Extension, SchemaNode};

/// Lookup strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Plain,
    PreferLocal,
    Scoped,
}

/// Value of the inherits marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inherits {
    Flag(bool),
    Parent(String),
}

impl Inherits {
    /// A parent name or `true`
    pub fn is_inheriting(&self) -> bool {
        match self {
            Self::Flag(flag) => *flag,
            Self::Parent(_) => true,
        }
    }

    pub fn parent(&self) -> Option<&str> {
        match self {
            Self::Parent(name) => Some(name),
            Self::Flag(_) => None,
        }
    }
}

/// Plain first-hit lookup
pub fn peek<'a, T, F>(
    node: &'a SchemaNode,
    schemas: &'a SchemaSet,
    skip: Option<&str>,
    extract: &F,
) -> Result<Option<T>>
where
    F: Fn(&'a SchemaNode) -> Result<Option<T>>,
{
    if let Some(value) = extract(node)? {
        return Ok(Some(value));
    }
    if let Some(reference) = &node.reference {
        let (name, target) = reference::resolve(reference, schemas)?;
        if skip != Some(name.as_str()) {
            if let Some(value) = peek(target, schemas, skip, extract)? {
                return Ok(Some(value));
            }
        }
    }
    if let Some(all_of) = &node.all_of {
        for element in all_of {
            if let Some(value) = peek(element, schemas, skip, extract)? {
                return Ok(Some(value));
            }
        }
    }
    Ok(None)
}

/// Lookup where values declared in the composition beat referenced ones
pub fn prefer_local<'a, T, F>(
    node: &'a SchemaNode,
    schemas: &'a SchemaSet,
    skip: Option<&str>,
    extract: &F,
) -> Result<Option<T>>
where
    F: Fn(&'a SchemaNode) -> Result<Option<T>>,
{
    if let Some(value) = extract(node)? {
        return Ok(Some(value));
    }
    if let Some(reference) = &node.reference {
        let (name, target) = reference::resolve(reference, schemas)?;
        if skip != Some(name.as_str()) {
            if let Some(value) = prefer_local(target, schemas, skip, extract)? {
                return Ok(Some(value));
            }
        }
    }
    if let Some(all_of) = &node.all_of {
        // stable: declared order is kept within each group
        let mut ordered: Vec<&'a SchemaNode> = all_of.iter().collect();
        ordered.sort_by_key(|element| element.reference.is_some());
        for element in ordered {
            if let Some(value) = prefer_local(element, schemas, skip, extract)? {
                return Ok(Some(value));
            }
        }
    }
    Ok(None)
}

/// Lookup that stays inside the node's own composition
pub fn scoped<'a, T, F>(node: &'a SchemaNode, extract: &F) -> Result<Option<T>>
where
    F: Fn(&'a SchemaNode) -> Result<Option<T>>,
{
    if let Some(value) = extract(node)? {
        return Ok(Some(value));
    }
    if let Some(all_of) = &node.all_of {
        for element in all_of {
            if let Some(value) = scoped(element, extract)? {
                return Ok(Some(value));
            }
        }
    }
    Ok(None)
}

// =============================================================================
// Typed accessors
// =============================================================================

/// Typed attribute lookups bound to a strategy
#[derive(Debug, Clone, Copy)]
pub struct Peek<'a> {
    schemas: &'a SchemaSet,
    lookup: Lookup,
    skip: Option<&'a str>,
}

impl<'a> Peek<'a> {
    pub fn new(schemas: &'a SchemaSet, lookup: Lookup) -> Self {
        Self {
            schemas,
            lookup,
            skip: None,
        }
    }

    pub fn plain(schemas: &'a SchemaSet) -> Self {
        Self::new(schemas, Lookup::Plain)
    }

    pub fn prefer_local(schemas: &'a SchemaSet) -> Self {
        Self::new(schemas, Lookup::PreferLocal)
    }

    pub fn scoped(schemas: &'a SchemaSet) -> Self {
        Self::new(schemas, Lookup::Scoped)
    }

    /// Ignore the named schema whenever a `$ref` reaches it
    pub fn skipping(mut self, name: Option<&'a str>) -> Self {
        self.skip = name;
        self
    }

    /// Run an arbitrary extractor with this strategy
    pub fn find<T, F>(&self, node: &'a SchemaNode, extract: F) -> Result<Option<T>>
    where
        F: Fn(&'a SchemaNode) -> Result<Option<T>>,
    {
        match self.lookup {
            Lookup::Plain => peek(node, self.schemas, self.skip, &extract),
            Lookup::PreferLocal => prefer_local(node, self.schemas, self.skip, &extract),
            Lookup::Scoped => scoped(node, &extract),
        }
    }

    // ========== Keywords ==========

    pub fn schema_type(&self, node: &'a SchemaNode) -> Result<Option<&'a str>> {
        self.find(node, |n| keyword_str(n, "type"))
    }

    pub fn format(&self, node: &'a SchemaNode) -> Result<Option<&'a str>> {
        self.find(node, |n| keyword_str(n, "format"))
    }

    pub fn description(&self, node: &'a SchemaNode) -> Result<Option<&'a str>> {
        self.find(node, |n| keyword_str(n, "description"))
    }

    pub fn max_length(&self, node: &'a SchemaNode) -> Result<Option<u64>> {
        self.find(node, |n| match n.keyword("maxLength") {
            None => Ok(None),
            Some(value) => value.as_u64().map(Some).ok_or_else(|| {
                SchemaError::malformed(format!(
                    "maxLength must be a non-negative integer, found {}",
                    describe(value)
                ))
            }),
        })
    }

    pub fn nullable(&self, node: &'a SchemaNode) -> Result<Option<bool>> {
        self.find(node, |n| keyword_bool(n, "nullable"))
    }

    pub fn read_only(&self, node: &'a SchemaNode) -> Result<Option<bool>> {
        self.find(node, |n| keyword_bool(n, "readOnly"))
    }

    pub fn write_only(&self, node: &'a SchemaNode) -> Result<Option<bool>> {
        self.find(node, |n| keyword_bool(n, "writeOnly"))
    }

    pub fn default_value(&self, node: &'a SchemaNode) -> Result<Option<&'a Value>> {
        self.find(node, |n| Ok(n.keyword("default")))
    }

    pub fn items(&self, node: &'a SchemaNode) -> Result<Option<&'a SchemaNode>> {
        self.find(node, |n| Ok(n.items.as_deref()))
    }

    // ========== Extensions ==========

    pub fn tablename(&self, node: &'a SchemaNode) -> Result<Option<&'a str>> {
        self.find(node, |n| extension_str(n, Extension::Tablename))
    }

    pub fn inherits(&self, node: &'a SchemaNode) -> Result<Option<Inherits>> {
        self.find(node, |n| match n.extension(Extension::Inherits) {
            None => Ok(None),
            Some(Value::Bool(flag)) => Ok(Some(Inherits::Flag(*flag))),
            Some(Value::String(parent)) => Ok(Some(Inherits::Parent(parent.clone()))),
            Some(other) => Err(wrong_shape(Extension::Inherits, "a boolean or a string", other)),
        })
    }

    pub fn primary_key(&self, node: &'a SchemaNode) -> Result<Option<bool>> {
        self.find(node, |n| extension_bool(n, Extension::PrimaryKey))
    }

    pub fn autoincrement(&self, node: &'a SchemaNode) -> Result<Option<bool>> {
        self.find(node, |n| extension_bool(n, Extension::Autoincrement))
    }

    pub fn index(&self, node: &'a SchemaNode) -> Result<Option<bool>> {
        self.find(node, |n| extension_bool(n, Extension::Index))
    }

    pub fn unique(&self, node: &'a SchemaNode) -> Result<Option<bool>> {
        self.find(node, |n| extension_bool(n, Extension::Unique))
    }

    pub fn json(&self, node: &'a SchemaNode) -> Result<Option<bool>> {
        self.find(node, |n| extension_bool(n, Extension::Json))
    }

    pub fn uselist(&self, node: &'a SchemaNode) -> Result<Option<bool>> {
        self.find(node, |n| extension_bool(n, Extension::Uselist))
    }

    pub fn dict_ignore(&self, node: &'a SchemaNode) -> Result<Option<bool>> {
        self.find(node, |n| extension_bool(n, Extension::DictIgnore))
    }

    pub fn foreign_key(&self, node: &'a SchemaNode) -> Result<Option<&'a str>> {
        self.find(node, |n| extension_str(n, Extension::ForeignKey))
    }

    pub fn foreign_key_column(&self, node: &'a SchemaNode) -> Result<Option<&'a str>> {
        self.find(node, |n| extension_str(n, Extension::ForeignKeyColumn))
    }

    pub fn secondary(&self, node: &'a SchemaNode) -> Result<Option<&'a str>> {
        self.find(node, |n| extension_str(n, Extension::Secondary))
    }

    pub fn backref(&self, node: &'a SchemaNode) -> Result<Option<&'a str>> {
        self.find(node, |n| extension_str(n, Extension::Backref))
    }

    pub fn server_default(&self, node: &'a SchemaNode) -> Result<Option<&'a str>> {
        self.find(node, |n| extension_str(n, Extension::ServerDefault))
    }

    pub fn de_ref(&self, node: &'a SchemaNode) -> Result<Option<&'a str>> {
        self.find(node, |n| extension_str(n, Extension::DeRef))
    }

    pub fn kwargs(&self, node: &'a SchemaNode) -> Result<Option<&'a Map<String, Value>>> {
        self.find(node, |n| extension_object(n, Extension::Kwargs))
    }

    pub fn foreign_key_kwargs(&self, node: &'a SchemaNode) -> Result<Option<&'a Map<String, Value>>> {
        self.find(node, |n| extension_object(n, Extension::ForeignKeyKwargs))
    }

    pub fn composite_index(&self, node: &'a SchemaNode) -> Result<Option<&'a Value>> {
        self.find(node, |n| Ok(n.extension(Extension::CompositeIndex)))
    }

    pub fn composite_unique(&self, node: &'a SchemaNode) -> Result<Option<&'a Value>> {
        self.find(node, |n| Ok(n.extension(Extension::CompositeUnique)))
    }
}

fn keyword_str<'a>(node: &'a SchemaNode, key: &str) -> Result<Option<&'a str>> {
    match node.keyword(key) {
        None => Ok(None),
        Some(Value::String(value)) => Ok(Some(value)),
        Some(other) => Err(SchemaError::malformed(format!(
            "{} must be a string, found {}",
            key,
            describe(other)
        ))),
    }
}

fn keyword_bool(node: &SchemaNode, key: &str) -> Result<Option<bool>> {
    match node.keyword(key) {
        None => Ok(None),
        Some(Value::Bool(value)) => Ok(Some(*value)),
        Some(other) => Err(SchemaError::malformed(format!(
            "{} must be a boolean, found {}",
            key,
            describe(other)
        ))),
    }
}

fn extension_str(node: &SchemaNode, extension: Extension) -> Result<Option<&str>> {
    match node.extension(extension) {
        None => Ok(None),
        Some(Value::String(value)) => Ok(Some(value)),
        Some(other) => Err(wrong_shape(extension, "a string", other)),
    }
}

fn extension_bool(node: &SchemaNode, extension: Extension) -> Result<Option<bool>> {
    match node.extension(extension) {
        None => Ok(None),
        Some(Value::Bool(value)) => Ok(Some(*value)),
        Some(other) => Err(wrong_shape(extension, "a boolean", other)),
    }
}

fn extension_object(node: &SchemaNode, extension: Extension) -> Result<Option<&Map<String, Value>>> {
    match node.extension(extension) {
        None => Ok(None),
        Some(Value::Object(value)) => Ok(Some(value)),
        Some(other) => Err(wrong_shape(extension, "an object", other)),
    }
}

fn wrong_shape(extension: Extension, expected: &str, found: &Value) -> SchemaError {
    SchemaError::malformed(format!(
        "{} must be {}, found {}",
        extension.suffix(),
        expected,
        describe(found)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::graph::test_support::{pointer, set};
    use serde_json::json;

    fn scenario_d() -> SchemaSet {
        set(json!({
            "RefSchema": {"type": "object", "x-backref": "b", "x-tablename": "ref_schema"},
            "Holder": {
                "type": "object",
                "properties": {
                    "first": {"allOf": [{"x-backref": "a"}, {"$ref": "#/components/schemas/RefSchema"}]},
                    "last": {"allOf": [{"$ref": "#/components/schemas/RefSchema"}, {"x-backref": "a"}]}
                }
            }
        }))
    }

    fn property<'a>(schemas: &'a SchemaSet, name: &str) -> &'a SchemaNode {
        &schemas.get("Holder").unwrap().properties.as_ref().unwrap()[name]
    }

    #[test]
    fn test_local_first_declared() {
        let schemas = scenario_d();
        let node = property(&schemas, "first");
        assert_eq!(Peek::prefer_local(&schemas).backref(node).unwrap(), Some("a"));
        assert_eq!(Peek::plain(&schemas).backref(node).unwrap(), Some("a"));
    }

    #[test]
    fn test_prefer_local_reorders_references_last() {
        let schemas = scenario_d();
        let node = property(&schemas, "last");
        assert_eq!(Peek::prefer_local(&schemas).backref(node).unwrap(), Some("a"));
        assert_eq!(Peek::plain(&schemas).backref(node).unwrap(), Some("b"));
    }

    #[test]
    fn test_prefer_local_composition_siblings_win() {
        let schemas = set(json!({
            "Employee": {"type": "object", "x-tablename": "employee"},
            "Manager": {
                "allOf": [{"$ref": "#/components/schemas/Employee"}, {"x-inherits": true}],
                "x-tablename": "manager"
            }
        }));
        let manager = schemas.get("Manager").unwrap();
        assert_eq!(Peek::prefer_local(&schemas).tablename(manager).unwrap(), Some("manager"));
        assert_eq!(Peek::scoped(&schemas).tablename(manager).unwrap(), Some("manager"));
    }

    #[test]
    fn test_missing_key_is_none_at_any_depth() {
        let schemas = scenario_d();
        let node = property(&schemas, "last");
        for lookup in [Lookup::Plain, Lookup::PreferLocal, Lookup::Scoped] {
            let peek = Peek::new(&schemas, lookup);
            assert_eq!(peek.secondary(node).unwrap(), None);
            assert_eq!(peek.max_length(node).unwrap(), None);
        }
    }

    #[test]
    fn test_scoped_never_crosses_reference() {
        let schemas = scenario_d();
        let node = property(&schemas, "last");
        assert_eq!(Peek::scoped(&schemas).tablename(node).unwrap(), None);
        assert_eq!(Peek::plain(&schemas).tablename(node).unwrap(), Some("ref_schema"));
    }

    #[test]
    fn test_skip_reference() {
        let schemas = scenario_d();
        let node = SchemaNode::default().with_reference(pointer("RefSchema"));
        let peek = Peek::plain(&schemas).skipping(Some("RefSchema"));
        assert_eq!(peek.backref(&node).unwrap(), None);
    }

    #[test]
    fn test_unresolved_and_wrong_type_raise() {
        let schemas = set(json!({
            "Bad": {"type": 1},
            "Dangling": {"allOf": [{"$ref": "#/components/schemas/Missing"}]}
        }));
        let bad = schemas.get("Bad").unwrap();
        let err = Peek::plain(&schemas).schema_type(bad).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedSchema);

        let dangling = schemas.get("Dangling").unwrap();
        let err = Peek::prefer_local(&schemas).tablename(dangling).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaNotFound);
    }

    #[test]
    fn test_inherits_shapes() {
        let schemas = set(json!({
            "A": {"x-inherits": "Parent"},
            "B": {"x-inherits": false}
        }));
        let peek = Peek::plain(&schemas);
        let a = peek.inherits(schemas.get("A").unwrap()).unwrap().unwrap();
        assert!(a.is_inheriting());
        assert_eq!(a.parent(), Some("Parent"));
        let b = peek.inherits(schemas.get("B").unwrap()).unwrap().unwrap();
        assert!(!b.is_inheriting());
    }
}
