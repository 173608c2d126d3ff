//! Schema Set and Composition Graph
//!
//! The [`SchemaSet`] is the single source of truth every pass resolves against: named
//! schema nodes plus a petgraph graph of their composition edges (`$ref` and `allOf`
//! reachable without descending into `properties` or `items`).
//!
//! Property and item references are deliberately not edges. A parent that lists its
//! children and a child that points at its parent is ordinary relational modelling; only a
//! schema that is composed from itself can never be resolved.

pub mod all_of;
pub mod analysis;
pub mod classify;
pub mod inheritance;
pub mod iterate;
pub mod peek;
pub mod reference;

pub use analysis::{compute_cycle_analysis, CycleAnalysis};
pub use classify::{Cardinality, PropertyKind};
pub use inheritance::InheritanceStrategy;
pub use peek::Inherits;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::checksum::Checksum;
use crate::config::RelationsConfig;
use crate::error::{Result, SchemaError};
use crate::schema::{SchemaNode, Vocabulary};

/// Entity name (the key a schema is registered under)
pub type SchemaName = String;

/// Settings shared by every pass over one SchemaSet
#[derive(Debug)]
pub(crate) struct Settings {
    pub config: RelationsConfig,
    pub vocabulary: Vocabulary,
    pub ref_pattern: Regex,
}

impl Settings {
    fn new(config: RelationsConfig) -> Result<Self> {
        let alternatives: Vec<String> = config
            .references
            .pointer_prefixes
            .iter()
            .map(|p| regex::escape(p))
            .collect();
        if alternatives.is_empty() {
            return Err(SchemaError::malformed(
                "at least one $ref pointer prefix must be configured",
            ));
        }
        let pattern = format!(r"^(?:{})(\w+)$", alternatives.join("|"));
        let ref_pattern = Regex::new(&pattern)
            .map_err(|e| SchemaError::malformed(format!("invalid $ref grammar: {}", e)))?;
        Ok(Self {
            vocabulary: Vocabulary::from_config(&config),
            config,
            ref_pattern,
        })
    }
}

/// Named schemas plus their composition graph
#[derive(Debug, Clone)]
pub struct SchemaSet {
    /// Schemas by name, sorted so every pass iterates deterministically
    schemas: BTreeMap<SchemaName, SchemaNode>,

    /// Composition graph
    graph: DiGraph<SchemaName, ()>,

    /// Node index lookup: name -> NodeIndex
    node_indices: HashMap<SchemaName, NodeIndex>,

    /// Cycle membership
    cycles: CycleAnalysis,

    settings: Arc<Settings>,
}

impl SchemaSet {
    /// Build from already ingested nodes
    pub fn new(
        schemas: impl IntoIterator<Item = (SchemaName, SchemaNode)>,
        config: RelationsConfig,
    ) -> Result<Self> {
        let settings = Arc::new(Settings::new(config)?);
        Ok(Self::assemble(schemas.into_iter().collect(), settings))
    }

    /// Ingest a JSON object mapping names to schemas, with default configuration
    pub fn from_value(value: &Value) -> Result<Self> {
        Self::from_value_with_config(value, RelationsConfig::default())
    }

    /// Ingest a JSON object mapping names to schemas
    pub fn from_value_with_config(value: &Value, config: RelationsConfig) -> Result<Self> {
        let settings = Arc::new(Settings::new(config)?);
        let object = value.as_object().ok_or_else(|| {
            SchemaError::malformed("schema set must be an object mapping names to schemas")
        })?;

        let mut schemas = BTreeMap::new();
        for (name, raw) in object {
            let node = SchemaNode::from_value(raw, &settings.vocabulary).map_err(|e| match e {
                SchemaError::MalformedSchema(message) => {
                    SchemaError::malformed(format!("{}: {}", name, message))
                }
                other => other,
            })?;
            schemas.insert(name.clone(), node);
        }

        Ok(Self::assemble(schemas, settings))
    }

    fn assemble(schemas: BTreeMap<SchemaName, SchemaNode>, settings: Arc<Settings>) -> Self {
        let mut graph = DiGraph::with_capacity(schemas.len(), schemas.len() * 2);
        let mut node_indices = HashMap::with_capacity(schemas.len());

        for name in schemas.keys() {
            let idx = graph.add_node(name.clone());
            node_indices.insert(name.clone(), idx);
        }

        for (name, node) in &schemas {
            let mut pending = Vec::new();
            collect_composition_refs(node, &mut pending);
            for reference in pending {
                let Some(target) = parse_pointer(&settings.ref_pattern, &reference) else {
                    continue;
                };
                if let (Some(&from), Some(&to)) = (node_indices.get(name), node_indices.get(target))
                {
                    graph.add_edge(from, to, ());
                }
            }
        }

        let cycles = compute_cycle_analysis(&graph);

        Self {
            schemas,
            graph,
            node_indices,
            cycles,
            settings,
        }
    }

    // ========== Public API ==========

    /// Get schema count
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Get a schema by name
    pub fn get(&self, name: &str) -> Option<&SchemaNode> {
        self.schemas.get(name)
    }

    /// Get a schema together with the name it is stored under
    pub fn get_entry(&self, name: &str) -> Option<(&SchemaName, &SchemaNode)> {
        self.schemas.get_key_value(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    /// All schemas in name order
    pub fn iter(&self) -> impl Iterator<Item = (&SchemaName, &SchemaNode)> {
        self.schemas.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &SchemaName> {
        self.schemas.keys()
    }

    pub fn config(&self) -> &RelationsConfig {
        &self.settings.config
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.settings.vocabulary
    }

    pub(crate) fn ref_pattern(&self) -> &Regex {
        &self.settings.ref_pattern
    }

    /// Pointer referencing a named schema, using the first configured prefix
    pub fn pointer(&self, name: &str) -> String {
        let prefix = self
            .settings
            .config
            .references
            .pointer_prefixes
            .first()
            .map(String::as_str)
            .unwrap_or_default();
        format!("{}{}", prefix, name)
    }

    /// Names a schema is composed from directly
    pub fn composition_refs(&self, name: &str) -> Vec<&SchemaName> {
        let Some(&node_idx) = self.node_indices.get(name) else {
            return Vec::new();
        };
        let mut refs: Vec<&SchemaName> = self
            .graph
            .edges_directed(node_idx, Direction::Outgoing)
            .filter_map(|e| self.graph.node_weight(e.target()))
            .collect();
        refs.sort();
        refs.dedup();
        refs
    }

    /// Does the named schema sit on a composition cycle?
    pub fn is_cyclic(&self, name: &str) -> bool {
        self.cycles.is_cyclic(name)
    }

    pub fn cycle_analysis(&self) -> &CycleAnalysis {
        &self.cycles
    }

    /// Fail on the first composition cycle, if any
    pub fn check_cycles(&self) -> Result<()> {
        match self.cycles.groups.first() {
            Some(group) => Err(SchemaError::malformed(group.describe())),
            None => Ok(()),
        }
    }

    /// A copy of this set with one schema inserted or replaced
    pub fn with_schema(&self, name: impl Into<SchemaName>, node: SchemaNode) -> SchemaSet {
        let mut schemas = self.schemas.clone();
        schemas.insert(name.into(), node);
        Self::assemble(schemas, Arc::clone(&self.settings))
    }

    /// A copy of this set with several schemas inserted or replaced
    pub fn with_schemas(
        &self,
        changes: impl IntoIterator<Item = (SchemaName, SchemaNode)>,
    ) -> SchemaSet {
        let mut schemas = self.schemas.clone();
        let mut changed = false;
        for (name, node) in changes {
            schemas.insert(name, node);
            changed = true;
        }
        if !changed {
            return self.clone();
        }
        Self::assemble(schemas, Arc::clone(&self.settings))
    }

    /// Serialize every schema back to JSON using canonical spellings
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.schemas
                .iter()
                .map(|(name, node)| (name.clone(), node.to_value(self.vocabulary())))
                .collect(),
        )
    }

    /// Checksum of the canonical JSON form
    pub fn checksum(&self) -> Checksum {
        Checksum::from_json(&self.to_value())
    }

    /// Closest known schema name, for "did you mean" hints
    pub fn suggest(&self, query: &str) -> Option<String> {
        use fuzzy_matcher::skim::SkimMatcherV2;
        use fuzzy_matcher::FuzzyMatcher;

        let matcher = SkimMatcherV2::default();
        self.schemas
            .keys()
            .filter_map(|name| matcher.fuzzy_match(name, query).map(|score| (score, name)))
            .max_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(a.1)))
            .map(|(_, name)| name.clone())
    }
}

/// Extract the schema name from a pointer, if it matches the grammar
pub(crate) fn parse_pointer<'a>(pattern: &Regex, reference: &'a str) -> Option<&'a str> {
    pattern
        .captures(reference)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Collect `$ref`s reachable through `$ref`/`allOf` without entering properties or items
fn collect_composition_refs(node: &SchemaNode, refs: &mut Vec<String>) {
    if let Some(reference) = &node.reference {
        refs.push(reference.clone());
    }
    if let Some(all_of) = &node.all_of {
        for element in all_of {
            collect_composition_refs(element, refs);
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::SchemaSet;
    use serde_json::Value;

    pub fn set(value: Value) -> SchemaSet {
        SchemaSet::from_value(&value).unwrap()
    }

    pub fn pointer(name: &str) -> String {
        format!("#/components/schemas/{}", name)
    }
}
