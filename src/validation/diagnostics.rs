//! Diagnostics
//!
//! Collects every global-consistency violation found in a schema set, so callers can
//! report them all at once instead of stopping at the first.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ErrorKind, SchemaError};
use crate::graph::SchemaName;

// =============================================================================
// Diagnostic Codes
// =============================================================================

/// Diagnostic code for categorizing issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    // === Uniqueness ===
    /// Two entities store their rows in the same table
    DuplicateTablename,
    /// Two many-to-many relationships use the same link table
    DuplicateSecondary,

    // === Association conformance ===
    /// Link entity has more than two primary keys
    AssociationPrimaryKeyCount,
    /// Link entity primary key without a foreign key
    AssociationMissingForeignKey,
    /// Two link entity primary keys share a foreign key
    AssociationDuplicateForeignKey,
    /// Link entity primary key differs from the expected column
    AssociationColumnMismatch,

    // === Structure ===
    /// Structurally invalid schema
    MalformedSchema,
    /// $ref target not found in the schema set
    UnresolvedRef,

    // === General ===
    /// Entity without any properties
    EmptyEntity,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DuplicateTablename => "E001",
            Self::DuplicateSecondary => "E002",
            Self::AssociationPrimaryKeyCount => "E003",
            Self::AssociationMissingForeignKey => "E004",
            Self::AssociationDuplicateForeignKey => "E005",
            Self::AssociationColumnMismatch => "E006",
            Self::MalformedSchema => "E007",
            Self::UnresolvedRef => "E008",
            Self::EmptyEntity => "W001",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::DuplicateTablename
            | Self::DuplicateSecondary
            | Self::AssociationPrimaryKeyCount
            | Self::AssociationMissingForeignKey
            | Self::AssociationDuplicateForeignKey
            | Self::AssociationColumnMismatch
            | Self::MalformedSchema
            | Self::UnresolvedRef => Severity::Error,

            Self::EmptyEntity => Severity::Warning,
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Severity
// =============================================================================

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

// =============================================================================
// Diagnostic Item
// =============================================================================

/// A single diagnostic item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticItem {
    /// Schema that caused this diagnostic
    pub schema_id: SchemaName,
    pub code: DiagnosticCode,
    /// Human-readable message
    pub message: String,
    /// Related schemas and properties
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
}

impl DiagnosticItem {
    pub fn new(schema_id: impl Into<SchemaName>, code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            schema_id: schema_id.into(),
            code,
            message: message.into(),
            context: Vec::new(),
        }
    }

    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context.push(ctx.into());
        self
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }
}

impl fmt::Display for DiagnosticItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} ({})",
            self.code,
            self.code.severity(),
            self.message,
            self.schema_id
        )?;

        for ctx in &self.context {
            write!(f, "\n  - {}", ctx)?;
        }

        Ok(())
    }
}

// =============================================================================
// Diagnostics Collection
// =============================================================================

/// Collection of diagnostics from validation passes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    items: Vec<DiagnosticItem>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: DiagnosticItem) {
        self.items.push(item);
    }

    /// Add an error
    pub fn error(&mut self, schema_id: impl Into<SchemaName>, code: DiagnosticCode, message: impl Into<String>) {
        self.push(DiagnosticItem::new(schema_id, code, message));
    }

    /// Record a structural failure that stopped a check
    pub fn failure(&mut self, schema_id: impl Into<SchemaName>, error: &SchemaError) {
        let code = match error.kind() {
            ErrorKind::SchemaNotFound => DiagnosticCode::UnresolvedRef,
            _ => DiagnosticCode::MalformedSchema,
        };
        self.push(DiagnosticItem::new(schema_id, code, error.to_string()));
    }

    /// Add diagnostic for a duplicated table name
    pub fn duplicate_tablename(&mut self, tablename: &str, first: &str, second: &str) {
        self.push(
            DiagnosticItem::new(
                second,
                DiagnosticCode::DuplicateTablename,
                format!(
                    "tablename '{}' is used by both {} and {}",
                    tablename, first, second
                ),
            )
            .with_context(format!("first declared by {}", first)),
        );
    }

    /// Add diagnostic for a duplicated link table
    pub fn duplicate_secondary(&mut self, secondary: &str, first: &str, second: &str) {
        let entity = second.split('.').next().unwrap_or(second);
        self.push(
            DiagnosticItem::new(
                entity,
                DiagnosticCode::DuplicateSecondary,
                format!(
                    "secondary '{}' is used by both {} and {}",
                    secondary, first, second
                ),
            )
            .with_context(format!("first declared by {}", first)),
        );
    }

    /// Add warning for an entity that declares no columns
    pub fn empty_entity(&mut self, entity: &str) {
        self.push(DiagnosticItem::new(
            entity,
            DiagnosticCode::EmptyEntity,
            format!("entity {} has no properties", entity),
        ));
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|i| i.severity() == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(|i| i.severity() == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(|i| i.severity() == Severity::Warning)
    }

    pub fn all(&self) -> &[DiagnosticItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    /// Merge another Diagnostics into this one
    pub fn merge(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }

    /// Format all diagnostics for display
    pub fn format_all(&self) -> String {
        let mut output = String::new();

        for item in &self.items {
            output.push_str(&format!("{}\n", item));
        }

        if self.has_errors() {
            output.push_str(&format!(
                "\n{} error(s), {} warning(s)\n",
                self.error_count(),
                self.warning_count()
            ));
        } else if !self.is_empty() {
            output.push_str(&format!("\n{} warning(s)\n", self.warning_count()));
        }

        output
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_all())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_severity() {
        assert_eq!(DiagnosticCode::DuplicateTablename.severity(), Severity::Error);
        assert_eq!(DiagnosticCode::EmptyEntity.severity(), Severity::Warning);
    }

    #[test]
    fn test_diagnostics_collection() {
        let mut diags = Diagnostics::new();
        diags.duplicate_tablename("accounts", "Account", "Profile");
        diags.empty_entity("Empty");

        assert_eq!(diags.error_count(), 1);
        assert_eq!(diags.warning_count(), 1);
        assert!(diags.has_errors());
        assert!(diags.format_all().contains("1 error(s), 1 warning(s)"));
    }

    #[test]
    fn test_failure_maps_error_kind() {
        let mut diags = Diagnostics::new();
        diags.failure(
            "Order",
            &SchemaError::SchemaNotFound {
                reference: "#/components/schemas/Gone".to_string(),
                suggestion: None,
            },
        );
        diags.failure("Order", &SchemaError::malformed("bad"));
        let codes: Vec<DiagnosticCode> = diags.all().iter().map(|i| i.code).collect();
        assert_eq!(codes, vec![DiagnosticCode::UnresolvedRef, DiagnosticCode::MalformedSchema]);
    }

    #[test]
    fn test_duplicate_secondary_attributed_to_entity() {
        let mut diags = Diagnostics::new();
        diags.duplicate_secondary("order_tag", "Order.tags", "Shelf.tags");
        let item = &diags.all()[0];
        assert_eq!(item.schema_id, "Shelf");
        assert!(item.to_string().contains("Order.tags and Shelf.tags"));
    }
}
