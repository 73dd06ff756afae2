//! Trellis Config - Configuration Structures
//!
//! Configuration types for the schema store and query engine. Supports
//! loading from TOML files and programmatic construction, with defaults
//! suitable for development.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use serde::{Deserialize, Serialize};
use std::path::Path;

// =============================================================================
// Schema Configuration
// =============================================================================

/// Configuration for the schema store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Name of the collection holding one schema row per class.
    pub schema_collection: String,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            schema_collection: "_SCHEMA".to_string(),
        }
    }
}

// =============================================================================
// Query Configuration
// =============================================================================

/// Configuration for the query engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Whether non-master callers may query classes that do not exist yet.
    pub allow_client_class_creation: bool,
    /// Deepest nesting the where-tree visitor will descend into.
    pub max_where_depth: usize,
    /// Upper bound on operator rewrites for a single where tree.
    pub max_desugar_passes: usize,
    /// Upper bound on nested query engines (sub-queries and includes).
    pub max_subquery_depth: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            allow_client_class_creation: true,
            max_where_depth: 64,
            max_desugar_passes: 1000,
            max_subquery_depth: 16,
        }
    }
}

// =============================================================================
// Top-level Configuration
// =============================================================================

/// Top-level Trellis configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TrellisConfig {
    pub schema: SchemaConfig,
    pub query: QueryConfig,
}

impl TrellisConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| crate::TrellisError::Configuration(e.to_string()))
    }
}
