//! Trellis Storage Adapter
//!
//! Contracts between the schema/query engines and the underlying document
//! store. The engines only ever talk to storage through these traits.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use trellis_common::{Object, Result};

// =============================================================================
// Find Options
// =============================================================================

/// Options for a find call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Read-permission group. `None` means unrestricted (master),
    /// `Some(vec![])` means publicly readable rows only.
    pub acl: Option<Vec<String>>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
    /// Field names, each optionally prefixed with `-` for descending order.
    pub sort: Vec<String>,
    /// Return the number of matching rows instead of the rows.
    pub count: bool,
}

impl FindOptions {
    /// Options for an unrestricted find.
    pub fn master() -> Self {
        Self::default()
    }

    /// Options restricted to rows readable by the given group.
    pub fn with_acl(acl: Vec<String>) -> Self {
        Self {
            acl: Some(acl),
            ..Default::default()
        }
    }
}

/// Outcome of a find call.
#[derive(Debug, Clone, PartialEq)]
pub enum FindResult {
    Rows(Vec<Object>),
    Count(u64),
}

impl FindResult {
    /// The rows of a non-count find; a count result yields no rows.
    pub fn into_rows(self) -> Vec<Object> {
        match self {
            Self::Rows(rows) => rows,
            Self::Count(_) => Vec::new(),
        }
    }

    /// The count of a count find; a row result yields its length.
    pub fn count(&self) -> u64 {
        match self {
            Self::Rows(rows) => rows.len() as u64,
            Self::Count(n) => *n,
        }
    }
}

// =============================================================================
// Collaborator Traits
// =============================================================================

/// Generic collection primitives.
pub trait DocumentStore: Send + Sync {
    /// Find rows of a class matching a where clause.
    fn find(&self, class_name: &str, filter: &Object, options: &FindOptions) -> Result<FindResult>;

    /// Apply an update (`$set` / `$unset`) to every matching row.
    /// Returns the number of rows touched.
    fn update_many(&self, class_name: &str, filter: &Object, update: &Object) -> Result<usize>;

    /// Drop a collection. Dropping a collection that does not exist succeeds.
    fn drop_collection(&self, name: &str) -> Result<()>;
}

/// The persisted schema collection: one row per class, keyed by `_id`.
pub trait SchemaCollection: Send + Sync {
    /// Every schema row.
    fn get_all_schemas(&self) -> Result<Vec<Object>>;

    /// Insert a new schema row for a class. Fails if the row exists.
    fn add_schema(&self, class_name: &str, row: Object) -> Result<()>;

    /// Apply an update to the row of a class.
    fn update_schema(&self, class_name: &str, update: &Object) -> Result<()>;

    /// Apply an update to the row of a class if it matches `query`; insert the
    /// row if it is absent. A present row failing `query` is left untouched.
    fn upsert_schema(&self, class_name: &str, query: &Object, update: &Object) -> Result<()>;
}
