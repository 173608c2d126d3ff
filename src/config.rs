//! Configuration for relational model inference
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (relations.toml)
//! - Environment variables (RELATIONS__*)
//!
//! ## Example config file (relations.toml):
//! ```toml
//! [extensions]
//! canonical_prefix = "x-"
//! alias_prefixes = ["x-familiar-"]
//!
//! [references]
//! pointer_prefixes = ["#/components/schemas/"]
//!
//! [synthesis]
//! default_foreign_key_column = "id"
//! autogen_prefix = "Autogen"
//!
//! [validation]
//! collect_all = false
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RelationsConfig {
    /// Extension key spellings
    #[serde(default)]
    pub extensions: ExtensionConfig,

    /// `$ref` pointer grammar
    #[serde(default)]
    pub references: ReferenceConfig,

    /// Defaults used when synthesizing columns and entities
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    /// Global validation behaviour
    #[serde(default)]
    pub validation: ValidationConfig,
}

/// Extension key spellings. Every prefix is a synonym of the canonical one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionConfig {
    /// Prefix written back when serializing
    #[serde(default = "default_canonical_prefix")]
    pub canonical_prefix: String,

    /// Additional recognized prefixes
    #[serde(default = "default_alias_prefixes")]
    pub alias_prefixes: Vec<String>,
}

/// `$ref` pointer grammar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceConfig {
    /// Accepted pointer prefixes; the remainder must be a plain identifier
    #[serde(default = "default_pointer_prefixes")]
    pub pointer_prefixes: Vec<String>,
}

/// Defaults for synthesized columns and association entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Column referenced by a foreign key when no marker names one
    #[serde(default = "default_foreign_key_column")]
    pub default_foreign_key_column: String,

    /// Prefix prepended to a generated association name until it is unique
    #[serde(default = "default_autogen_prefix")]
    pub autogen_prefix: String,
}

/// Global validation behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ValidationConfig {
    /// Collect every violation before failing instead of stopping at the first
    #[serde(default)]
    pub collect_all: bool,
}

// Default value functions
fn default_canonical_prefix() -> String {
    "x-".to_string()
}

fn default_alias_prefixes() -> Vec<String> {
    vec!["x-familiar-".to_string()]
}

fn default_pointer_prefixes() -> Vec<String> {
    vec!["#/components/schemas/".to_string()]
}

fn default_foreign_key_column() -> String {
    "id".to_string()
}

fn default_autogen_prefix() -> String {
    "Autogen".to_string()
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            canonical_prefix: default_canonical_prefix(),
            alias_prefixes: default_alias_prefixes(),
        }
    }
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            pointer_prefixes: default_pointer_prefixes(),
        }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            default_foreign_key_column: default_foreign_key_column(),
            autogen_prefix: default_autogen_prefix(),
        }
    }
}

impl RelationsConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "relations.toml",
            ".relations.toml",
            "config/relations.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "relations") {
            let xdg_config = config_dir.config_dir().join("relations.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("RELATIONS")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// All recognized extension prefixes, canonical first
    pub fn extension_prefixes(&self) -> Vec<&str> {
        let mut prefixes = vec![self.extensions.canonical_prefix.as_str()];
        for alias in &self.extensions.alias_prefixes {
            if !prefixes.contains(&alias.as_str()) {
                prefixes.push(alias.as_str());
            }
        }
        prefixes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelationsConfig::default();
        assert_eq!(config.extensions.canonical_prefix, "x-");
        assert_eq!(config.synthesis.default_foreign_key_column, "id");
        assert_eq!(config.synthesis.autogen_prefix, "Autogen");
        assert!(!config.validation.collect_all);
    }

    #[test]
    fn test_serialize_config() {
        let config = RelationsConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[extensions]"));
        assert!(toml_str.contains("[synthesis]"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[synthesis]\ndefault_foreign_key_column = \"uuid\"\n\n[validation]\ncollect_all = true\n",
        )
        .unwrap();

        let config = RelationsConfig::load_from(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.synthesis.default_foreign_key_column, "uuid");
        assert_eq!(config.synthesis.autogen_prefix, "Autogen");
        assert!(config.validation.collect_all);
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.toml");
        let mut config = RelationsConfig::default();
        config.extensions.alias_prefixes.push("x-orm-".to_string());
        config.save(path.to_str().unwrap()).unwrap();

        let loaded = RelationsConfig::load_from(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(loaded.extensions, config.extensions);
    }

    #[test]
    fn test_extension_prefixes_dedup() {
        let mut config = RelationsConfig::default();
        config.extensions.alias_prefixes.push("x-".to_string());
        assert_eq!(config.extension_prefixes(), vec!["x-", "x-familiar-"]);
    }
}
