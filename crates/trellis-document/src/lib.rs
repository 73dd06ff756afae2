//! Trellis Document - Storage Collaborator
//!
//! Contracts the schema and query engines use to reach the underlying
//! document store, plus an in-memory store implementing them.
//!
//! Key Features:
//! - Find / update-many / drop-collection primitives
//! - Persisted schema collection with guarded upsert
//! - Where-clause matching with comparison, set and logical operators
//! - Row-level read filtering by ACL group
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod adapter;
pub mod collection;
pub mod engine;
pub mod query;
pub mod types;
pub mod update;

pub use adapter::{DocumentStore, FindOptions, FindResult, SchemaCollection};
pub use collection::Collection;
pub use engine::MemoryStore;
pub use query::Filter;
pub use types::DocumentId;
pub use update::Update;
