//! Schema nodes and the extension vocabulary
//!
//! A [`SchemaNode`] is the typed form of one JSON Schema object. Structural keywords
//! (`$ref`, `allOf`, `properties`, `items`, `required`, the backref map) get their own
//! fields, relational extensions are keyed by [`Extension`], and everything else passes
//! through untouched in `keywords`.
//!
//! Extension keys may be spelled with any configured prefix (`x-tablename`,
//! `x-familiar-tablename`, ...). The [`Vocabulary`] folds those spellings together once,
//! at ingestion, so lookups never compare strings against alias sets.

use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::config::RelationsConfig;
use crate::error::{Result, SchemaError};

pub const REF: &str = "$ref";
pub const ALL_OF: &str = "allOf";
pub const PROPERTIES: &str = "properties";
pub const ITEMS: &str = "items";
pub const REQUIRED: &str = "required";
pub const BACKREFS_SUFFIX: &str = "backrefs";

// =============================================================================
// Extensions
// =============================================================================

/// Relational extension markers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Extension {
    Tablename,
    Inherits,
    PrimaryKey,
    Autoincrement,
    Index,
    Unique,
    Json,
    Uselist,
    DictIgnore,
    ForeignKey,
    ForeignKeyColumn,
    Secondary,
    Backref,
    ServerDefault,
    DeRef,
    Kwargs,
    ForeignKeyKwargs,
    CompositeIndex,
    CompositeUnique,
}

/// JSON shape an extension value must have
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueShape {
    Bool,
    Str,
    BoolOrStr,
    Object,
    ArrayOrObject,
}

impl Extension {
    pub const ALL: [Extension; 19] = [
        Extension::Tablename,
        Extension::Inherits,
        Extension::PrimaryKey,
        Extension::Autoincrement,
        Extension::Index,
        Extension::Unique,
        Extension::Json,
        Extension::Uselist,
        Extension::DictIgnore,
        Extension::ForeignKey,
        Extension::ForeignKeyColumn,
        Extension::Secondary,
        Extension::Backref,
        Extension::ServerDefault,
        Extension::DeRef,
        Extension::Kwargs,
        Extension::ForeignKeyKwargs,
        Extension::CompositeIndex,
        Extension::CompositeUnique,
    ];

    /// Key suffix after the extension prefix
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Tablename => "tablename",
            Self::Inherits => "inherits",
            Self::PrimaryKey => "primary-key",
            Self::Autoincrement => "autoincrement",
            Self::Index => "index",
            Self::Unique => "unique",
            Self::Json => "json",
            Self::Uselist => "uselist",
            Self::DictIgnore => "dict-ignore",
            Self::ForeignKey => "foreign-key",
            Self::ForeignKeyColumn => "foreign-key-column",
            Self::Secondary => "secondary",
            Self::Backref => "backref",
            Self::ServerDefault => "server-default",
            Self::DeRef => "de-$ref",
            Self::Kwargs => "kwargs",
            Self::ForeignKeyKwargs => "foreign-key-kwargs",
            Self::CompositeIndex => "composite-index",
            Self::CompositeUnique => "composite-unique",
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|e| e.suffix() == suffix)
    }

    fn shape(&self) -> ValueShape {
        match self {
            Self::PrimaryKey
            | Self::Autoincrement
            | Self::Index
            | Self::Unique
            | Self::Json
            | Self::Uselist
            | Self::DictIgnore => ValueShape::Bool,
            Self::Tablename
            | Self::ForeignKey
            | Self::ForeignKeyColumn
            | Self::Secondary
            | Self::Backref
            | Self::ServerDefault
            | Self::DeRef => ValueShape::Str,
            Self::Inherits => ValueShape::BoolOrStr,
            Self::Kwargs | Self::ForeignKeyKwargs => ValueShape::Object,
            Self::CompositeIndex | Self::CompositeUnique => ValueShape::ArrayOrObject,
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self.shape() {
            ValueShape::Bool => value.is_boolean(),
            ValueShape::Str => value.is_string(),
            ValueShape::BoolOrStr => value.is_boolean() || value.is_string(),
            ValueShape::Object => value.is_object(),
            ValueShape::ArrayOrObject => value.is_array() || value.is_object(),
        }
    }

    fn expected(&self) -> &'static str {
        match self.shape() {
            ValueShape::Bool => "a boolean",
            ValueShape::Str => "a string",
            ValueShape::BoolOrStr => "a boolean or a string",
            ValueShape::Object => "an object",
            ValueShape::ArrayOrObject => "an array or an object",
        }
    }
}

// =============================================================================
// Vocabulary
// =============================================================================

/// How a mapping key is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyClass {
    Extension(Extension),
    Backrefs,
    Other,
}

/// Recognized extension spellings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    canonical: String,
    prefixes: Vec<String>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::from_config(&RelationsConfig::default())
    }
}

impl Vocabulary {
    pub fn from_config(config: &RelationsConfig) -> Self {
        Self {
            canonical: config.extensions.canonical_prefix.clone(),
            prefixes: config
                .extension_prefixes()
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }

    /// Classify a raw key, folding every prefix spelling together
    pub fn classify(&self, key: &str) -> KeyClass {
        for prefix in &self.prefixes {
            let Some(suffix) = key.strip_prefix(prefix.as_str()) else {
                continue;
            };
            if suffix == BACKREFS_SUFFIX {
                return KeyClass::Backrefs;
            }
            if let Some(extension) = Extension::from_suffix(suffix) {
                return KeyClass::Extension(extension);
            }
        }
        KeyClass::Other
    }

    /// Canonical spelling of an extension key
    pub fn key(&self, extension: Extension) -> String {
        format!("{}{}", self.canonical, extension.suffix())
    }

    pub fn backrefs_key(&self) -> String {
        format!("{}{}", self.canonical, BACKREFS_SUFFIX)
    }
}

// =============================================================================
// Schema Node
// =============================================================================

/// One JSON Schema object with relational extensions resolved
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchemaNode {
    /// `$ref` pointer, validated against the grammar only when followed
    pub reference: Option<String>,
    /// `allOf` elements in declared order
    pub all_of: Option<Vec<SchemaNode>>,
    /// `properties` in declared order
    pub properties: Option<IndexMap<String, SchemaNode>>,
    /// `items` of an array schema
    pub items: Option<Box<SchemaNode>>,
    /// `required` names, unique, declared order
    pub required: Option<Vec<String>>,
    /// Inverse relationships pointing at this schema
    pub backrefs: Option<IndexMap<String, SchemaNode>>,
    /// Relational extension markers
    pub extensions: BTreeMap<Extension, Value>,
    /// Every other keyword, passed through unexamined
    pub keywords: IndexMap<String, Value>,
}

impl SchemaNode {
    /// Ingest a JSON value
    pub fn from_value(value: &Value, vocabulary: &Vocabulary) -> Result<Self> {
        let Value::Object(object) = value else {
            return Err(SchemaError::malformed(format!(
                "schema must be an object, found {}",
                describe(value)
            )));
        };
        Self::from_object(object, vocabulary)
    }

    fn from_object(object: &Map<String, Value>, vocabulary: &Vocabulary) -> Result<Self> {
        let mut node = SchemaNode::default();

        for (key, value) in object {
            match key.as_str() {
                REF => {
                    let reference = value.as_str().ok_or_else(|| {
                        SchemaError::malformed(format!(
                            "$ref must be a string, found {}",
                            describe(value)
                        ))
                    })?;
                    node.reference = Some(reference.to_string());
                }
                ALL_OF => {
                    let elements = value.as_array().ok_or_else(|| {
                        SchemaError::malformed(format!(
                            "allOf must be a list, found {}",
                            describe(value)
                        ))
                    })?;
                    node.all_of = Some(
                        elements
                            .iter()
                            .map(|e| Self::from_value(e, vocabulary))
                            .collect::<Result<_>>()?,
                    );
                }
                PROPERTIES => {
                    node.properties = Some(node_map(key, value, vocabulary)?);
                }
                ITEMS => {
                    node.items = Some(Box::new(Self::from_value(value, vocabulary).map_err(
                        |e| SchemaError::malformed(format!("invalid items: {}", strip(&e))),
                    )?));
                }
                REQUIRED => {
                    let names = value
                        .as_array()
                        .and_then(|arr| {
                            arr.iter()
                                .map(|v| v.as_str().map(String::from))
                                .collect::<Option<Vec<_>>>()
                        })
                        .ok_or_else(|| {
                            SchemaError::malformed("required must be a list of strings")
                        })?;
                    let mut unique: Vec<String> = Vec::with_capacity(names.len());
                    for name in names {
                        if !unique.contains(&name) {
                            unique.push(name);
                        }
                    }
                    node.required = Some(unique);
                }
                _ => match vocabulary.classify(key) {
                    KeyClass::Backrefs => {
                        let incoming = node_map(key, value, vocabulary)?;
                        let backrefs = node.backrefs.get_or_insert_with(IndexMap::new);
                        for (name, schema) in incoming {
                            backrefs.insert(name, schema);
                        }
                    }
                    KeyClass::Extension(extension) => {
                        if !extension.accepts(value) {
                            return Err(SchemaError::malformed(format!(
                                "{} must be {}, found {}",
                                key,
                                extension.expected(),
                                describe(value)
                            )));
                        }
                        if let Some(existing) = node.extensions.get(&extension) {
                            if existing != value {
                                return Err(SchemaError::malformed(format!(
                                    "conflicting values for {} under different spellings",
                                    vocabulary.key(extension)
                                )));
                            }
                        }
                        node.extensions.insert(extension, value.clone());
                    }
                    KeyClass::Other => {
                        node.keywords.insert(key.clone(), value.clone());
                    }
                },
            }
        }

        Ok(node)
    }

    /// Serialize back to JSON using canonical extension spellings
    pub fn to_value(&self, vocabulary: &Vocabulary) -> Value {
        let mut object = Map::new();

        if let Some(reference) = &self.reference {
            object.insert(REF.to_string(), Value::String(reference.clone()));
        }
        for (key, value) in &self.keywords {
            object.insert(key.clone(), value.clone());
        }
        if let Some(all_of) = &self.all_of {
            object.insert(
                ALL_OF.to_string(),
                Value::Array(all_of.iter().map(|e| e.to_value(vocabulary)).collect()),
            );
        }
        if let Some(properties) = &self.properties {
            object.insert(PROPERTIES.to_string(), map_to_value(properties, vocabulary));
        }
        if let Some(items) = &self.items {
            object.insert(ITEMS.to_string(), items.to_value(vocabulary));
        }
        if let Some(required) = &self.required {
            object.insert(
                REQUIRED.to_string(),
                Value::Array(required.iter().cloned().map(Value::String).collect()),
            );
        }
        for (extension, value) in &self.extensions {
            object.insert(vocabulary.key(*extension), value.clone());
        }
        if let Some(backrefs) = &self.backrefs {
            object.insert(vocabulary.backrefs_key(), map_to_value(backrefs, vocabulary));
        }

        Value::Object(object)
    }

    // ========== Builders ==========

    /// Empty object-typed schema
    pub fn object() -> Self {
        Self::default().with_keyword("type", Value::String("object".to_string()))
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_keyword(mut self, key: impl Into<String>, value: Value) -> Self {
        self.keywords.insert(key.into(), value);
        self
    }

    pub fn with_extension(mut self, extension: Extension, value: Value) -> Self {
        self.extensions.insert(extension, value);
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, schema: SchemaNode) -> Self {
        self.properties
            .get_or_insert_with(IndexMap::new)
            .insert(name.into(), schema);
        self
    }

    pub fn with_backref(mut self, name: impl Into<String>, schema: SchemaNode) -> Self {
        self.backrefs
            .get_or_insert_with(IndexMap::new)
            .insert(name.into(), schema);
        self
    }

    pub fn with_items(mut self, items: SchemaNode) -> Self {
        self.items = Some(Box::new(items));
        self
    }

    pub fn with_required(mut self, names: Vec<String>) -> Self {
        self.required = Some(names);
        self
    }

    // ========== Accessors ==========

    pub fn extension(&self, extension: Extension) -> Option<&Value> {
        self.extensions.get(&extension)
    }

    pub fn keyword(&self, key: &str) -> Option<&Value> {
        self.keywords.get(key)
    }

    /// True when the node holds nothing but a `$ref`
    pub fn is_bare_reference(&self) -> bool {
        self.reference.is_some()
            && self.all_of.is_none()
            && self.properties.is_none()
            && self.items.is_none()
            && self.required.is_none()
            && self.backrefs.is_none()
            && self.extensions.is_empty()
            && self.keywords.is_empty()
    }

    /// Add a property at the node's own composition level.
    ///
    /// Composed nodes get a new trailing `allOf` element so earlier elements stay intact.
    pub fn add_property(&mut self, name: impl Into<String>, schema: SchemaNode) {
        self.extend_properties([(name.into(), schema)]);
    }

    /// Add several properties at once; a composed node gets a single trailing element
    pub fn extend_properties(&mut self, entries: impl IntoIterator<Item = (String, SchemaNode)>) {
        let entries: IndexMap<String, SchemaNode> = entries.into_iter().collect();
        if entries.is_empty() {
            return;
        }
        if let Some(all_of) = &mut self.all_of {
            let mut element = SchemaNode::object();
            element.properties = Some(entries);
            all_of.push(element);
            return;
        }
        self.properties.get_or_insert_with(IndexMap::new).extend(entries);
    }

    /// Add an inverse relationship entry at the node's own composition level
    pub fn add_backref(&mut self, name: impl Into<String>, schema: SchemaNode) {
        self.extend_backrefs([(name.into(), schema)]);
    }

    pub fn extend_backrefs(&mut self, entries: impl IntoIterator<Item = (String, SchemaNode)>) {
        let entries: IndexMap<String, SchemaNode> = entries.into_iter().collect();
        if entries.is_empty() {
            return;
        }
        if let Some(all_of) = &mut self.all_of {
            all_of.push(SchemaNode {
                backrefs: Some(entries),
                ..SchemaNode::default()
            });
            return;
        }
        self.backrefs.get_or_insert_with(IndexMap::new).extend(entries);
    }
}

fn node_map(
    key: &str,
    value: &Value,
    vocabulary: &Vocabulary,
) -> Result<IndexMap<String, SchemaNode>> {
    let object = value.as_object().ok_or_else(|| {
        SchemaError::malformed(format!("{} must be an object, found {}", key, describe(value)))
    })?;
    object
        .iter()
        .map(|(name, schema)| {
            SchemaNode::from_value(schema, vocabulary)
                .map(|node| (name.clone(), node))
                .map_err(|e| SchemaError::malformed(format!("{} '{}': {}", key, name, strip(&e))))
        })
        .collect()
}

fn map_to_value(map: &IndexMap<String, SchemaNode>, vocabulary: &Vocabulary) -> Value {
    Value::Object(
        map.iter()
            .map(|(name, node)| (name.clone(), node.to_value(vocabulary)))
            .collect(),
    )
}

/// Short description of a JSON value's type for error messages
pub(crate) fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

fn strip(error: &SchemaError) -> String {
    match error {
        SchemaError::MalformedSchema(message) => message.clone(),
        other => other.to_string(),
    }
}
