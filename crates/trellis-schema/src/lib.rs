//! Trellis Schema - Schema Engine
//!
//! Authoritative type registry for document classes. Field types are
//! inferred from client payloads and committed once; class-level
//! permissions gate operations per class.
//!
//! Key Features:
//! - Storage type tokens and wire type conversion
//! - Class-level permission validation and authorization
//! - Class creation, update and field deletion
//! - First-writer-wins field type commitment
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod defaults;
pub mod permissions;
pub mod schema;
pub mod types;
pub mod validation;

pub use defaults::SchemaDefaults;
pub use permissions::{ClassLevelPermissions, ClpOperation};
pub use schema::{ApiSchema, SchemaStore};
pub use types::{ApiFieldType, StorageType};
pub use validation::{class_name_is_valid, field_name_is_valid, join_collection_name};
