//! Familiar Relations
//!
//! Resolves a set of JSON-Schema-like entity declarations into a relational model.
//! Entities reference each other with `$ref`, compose with `allOf`, inherit through
//! single or joined tables and carry `x-` extension markers for keys, link tables and
//! cardinality hints. The engine flattens all of that into one classified description per
//! entity, synthesizing the foreign-key columns, inverse relationships and link entities
//! the declarations imply.
//!
//! ## Features
//!
//! - **Reference resolution**: `$ref` pointers resolved against the set, with cycle detection
//! - **Two lookup strategies**: plain first hit, or local declarations before referenced ones
//! - **Composition flattening**: `allOf` folded with union semantics for keys and properties
//! - **Association synthesis**: link entities for many-to-many relationships, merged with
//!   any user-declared one
//! - **Global validation**: unique tables, unique link tables, link entity conformance
//!
//! ## Architecture
//!
//! ```text
//! serde_json::Value
//!        |
//!    SchemaSet  (graph/)      names -> SchemaNode, composition graph, cycle analysis
//!        |
//!    pipeline::prepare        validation, association, foreign_key, backref passes
//!        |
//!    pipeline::extract        artifacts::ModelArtifacts
//! ```

pub mod artifacts;
pub mod association;
pub mod backref;
pub mod checksum;
pub mod config;
pub mod error;
pub mod foreign_key;
pub mod graph;
pub mod pipeline;
pub mod schema;
pub mod validation;

pub use artifacts::{
    EntityArtifacts, InheritanceArtifacts, InverseArtifacts, InverseShape, ModelArtifacts,
    OpaqueBlobArtifacts, PropertyArtifacts, RelationshipArtifacts, SimpleArtifacts,
};
pub use checksum::Checksum;
pub use config::RelationsConfig;
pub use error::{ErrorKind, Result, SchemaError};
pub use graph::{Cardinality, InheritanceStrategy, PropertyKind, SchemaName, SchemaSet};
pub use pipeline::{build, extract, prepare};
pub use schema::{Extension, SchemaNode, Vocabulary};
pub use validation::{diagnose, validate, Diagnostics};
