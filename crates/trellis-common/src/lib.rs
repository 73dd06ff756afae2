//! Trellis Common - Shared Types and Utilities
//!
//! Foundational types, error handling and configuration used across the
//! Trellis schema engine and query engine.
//!
//! Key Features:
//! - Unified error taxonomy with user/schema/access classification
//! - JSON document and pointer value types
//! - Configuration structures loadable from TOML
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod config;
pub mod error;
pub mod types;

pub use config::{QueryConfig, SchemaConfig, TrellisConfig};
pub use error::{Result, TrellisError};
pub use types::*;
