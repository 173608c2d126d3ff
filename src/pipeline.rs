//! Pipeline
//!
//! Runs the passes in order over a schema set:
//!
//! ```text
//! cycles -> validation -> associations -> foreign keys -> backrefs -> tablename re-check
//!                                                                         |
//!                                                                      extract
//! ```
//!
//! Every pass returns a new set. Extraction only reads, so entities of a prepared set can
//! be extracted independently.

use tracing::info;

use crate::artifacts::{self, ModelArtifacts};
use crate::error::{Result, SchemaError};
use crate::graph::SchemaSet;
use crate::validation::{self, check_unique_tablenames, Diagnostics};
use crate::{association, backref, foreign_key};

/// Validate the set and write in everything the model implies
pub fn prepare(schemas: &SchemaSet) -> Result<SchemaSet> {
    schemas.check_cycles()?;
    validation::validate(schemas)?;

    let with_associations = association::process(schemas)?;
    let with_keys = foreign_key::process(&with_associations)?;
    let prepared = backref::process(&with_keys)?;

    // Link entities inserted above must not collide with declared tables
    let mut diagnostics = Diagnostics::new();
    check_unique_tablenames(&prepared, &mut diagnostics)?;
    if let Some(item) = diagnostics.errors().next() {
        return Err(SchemaError::validation(item.message.clone()));
    }

    info!(
        schemas = prepared.len(),
        added = prepared.len() - schemas.len(),
        "schema set prepared"
    );
    Ok(prepared)
}

/// Artifacts for every entity of a prepared set
pub fn extract(schemas: &SchemaSet) -> Result<ModelArtifacts> {
    artifacts::extract(schemas)
}

/// Prepare and extract in one go
pub fn build(schemas: &SchemaSet) -> Result<ModelArtifacts> {
    extract(&prepare(schemas)?)
}
