//! Composition Cycle Analysis
//!
//! Computes strongly connected components (SCCs) of the composition graph. A schema
//! that sits in a multi-member SCC, or that composes itself directly, can never be
//! flattened or resolved; every pass treats following a `$ref` into one as malformed.

use petgraph::algo::kosaraju_scc;
use petgraph::graph::DiGraph;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::SchemaName;

// =============================================================================
// Cycle Group
// =============================================================================

/// A strongly connected component of the composition graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleGroup {
    /// Position in [`CycleAnalysis::groups`]
    pub id: usize,
    /// Members in name order
    pub members: Vec<SchemaName>,
    /// A single schema composing itself
    pub is_self_referential: bool,
}

impl CycleGroup {
    /// Message for errors raised on this cycle
    pub fn describe(&self) -> String {
        match self.members.as_slice() {
            [name] if self.is_self_referential => {
                format!("circular reference: {} composes itself", name)
            }
            members => format!("circular reference between {}", members.join(" -> ")),
        }
    }
}

// =============================================================================
// Analysis Result
// =============================================================================

/// Cycle membership for every schema in a set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleAnalysis {
    /// Cycle groups, ordered by their first member's name
    pub groups: Vec<CycleGroup>,
    /// Schema name -> group id
    membership: HashMap<SchemaName, usize>,
}

impl CycleAnalysis {
    /// Check if a schema is in a cycle
    pub fn is_cyclic(&self, name: &str) -> bool {
        self.membership.contains_key(name)
    }

    /// Get the cycle group for a schema
    pub fn group(&self, name: &str) -> Option<&CycleGroup> {
        let id = *self.membership.get(name)?;
        self.groups.get(id)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

// =============================================================================
// Analysis Functions
// =============================================================================

/// Compute cycle membership for a composition graph
pub fn compute_cycle_analysis(graph: &DiGraph<SchemaName, ()>) -> CycleAnalysis {
    let mut found: Vec<(Vec<SchemaName>, bool)> = Vec::new();

    for scc in kosaraju_scc(graph) {
        if scc.len() == 1 {
            let node_idx = scc[0];
            let has_self_ref = graph
                .edges_directed(node_idx, Direction::Outgoing)
                .any(|e| e.target() == node_idx);
            if !has_self_ref {
                continue;
            }
            if let Some(name) = graph.node_weight(node_idx) {
                found.push((vec![name.clone()], true));
            }
        } else {
            let mut members: Vec<SchemaName> = scc
                .iter()
                .filter_map(|idx| graph.node_weight(*idx).cloned())
                .collect();
            members.sort();
            found.push((members, false));
        }
    }

    // kosaraju order depends on insertion order; report cycles by name instead
    found.sort_by(|a, b| a.0.cmp(&b.0));

    let mut analysis = CycleAnalysis::default();
    for (id, (members, is_self_referential)) in found.into_iter().enumerate() {
        for member in &members {
            analysis.membership.insert(member.clone(), id);
        }
        analysis.groups.push(CycleGroup {
            id,
            members,
            is_self_referential,
        });
    }

    if !analysis.is_empty() {
        tracing::debug!(groups = analysis.groups.len(), "composition cycles detected");
    }

    analysis
}
