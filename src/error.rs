//! Error types for relational model inference

use thiserror::Error;

/// Result type for schema operations
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Broad failure category, independent of the concrete variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A `$ref` did not resolve
    SchemaNotFound,
    /// Structurally invalid input
    MalformedSchema,
    /// Individually well-formed schemas that are globally inconsistent
    ValidationFailure,
    /// Configuration, IO or serialization problems outside the schema set
    Environment,
}

/// Schema resolution errors
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Schema not found: {reference}{}", suggestion.as_ref().map(|s| format!(" (did you mean '{}'?)", s)).unwrap_or_default())]
    SchemaNotFound {
        reference: String,
        suggestion: Option<String>,
    },

    #[error("Malformed schema: {0}")]
    MalformedSchema(String),

    #[error("Validation failed: {0}")]
    ValidationFailure(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SchemaError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedSchema(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailure(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SchemaNotFound { .. } => ErrorKind::SchemaNotFound,
            Self::MalformedSchema(_) => ErrorKind::MalformedSchema,
            Self::ValidationFailure(_) => ErrorKind::ValidationFailure,
            Self::Config(_) | Self::Io(_) | Self::Json(_) => ErrorKind::Environment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_with_suggestion() {
        let err = SchemaError::SchemaNotFound {
            reference: "#/components/schemas/Ordr".to_string(),
            suggestion: Some("Order".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Schema not found: #/components/schemas/Ordr (did you mean 'Order'?)"
        );
        assert_eq!(err.kind(), ErrorKind::SchemaNotFound);
    }

    #[test]
    fn test_kinds() {
        assert_eq!(SchemaError::malformed("x").kind(), ErrorKind::MalformedSchema);
        assert_eq!(SchemaError::validation("x").kind(), ErrorKind::ValidationFailure);
    }
}
