//! Trellis Document Collection
//!
//! A named collection of stored rows, kept in insertion order.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::adapter::{FindOptions, FindResult};
use crate::query::{compare_values, Filter};
use crate::types::{decode_row, encode_row, DocumentId};
use crate::update::Update;
use serde_json::Value;
use std::cmp::Ordering;
use trellis_common::{Object, Result, TrellisError};

// =============================================================================
// Collection
// =============================================================================

/// A collection of rows.
#[derive(Debug, Clone)]
pub struct Collection {
    name: String,
    key_field: String,
    rows: Vec<Object>,
}

impl Collection {
    /// Create a collection keyed by `objectId`.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_key(name, "objectId")
    }

    /// Create a collection keyed by a custom field.
    pub fn with_key(name: impl Into<String>, key_field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_field: key_field.into(),
            rows: Vec::new(),
        }
    }

    /// Get the collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the number of rows.
    pub fn count(&self) -> usize {
        self.rows.len()
    }

    // -------------------------------------------------------------------------
    // Row Operations
    // -------------------------------------------------------------------------

    /// Insert a row, assigning a key when absent.
    pub fn insert(&mut self, mut row: Object) -> Result<DocumentId> {
        let id = match row.get(&self.key_field).and_then(Value::as_str) {
            Some(id) => DocumentId::new(id),
            None => {
                let id = DocumentId::generate();
                row.insert(self.key_field.clone(), Value::String(id.0.clone()));
                id
            }
        };

        if self.position(id.as_str()).is_some() {
            return Err(TrellisError::Storage(format!(
                "row {} already exists in {}",
                id, self.name
            )));
        }

        self.rows.push(encode_row(row));
        Ok(id)
    }

    /// Get a row by key, in API form.
    pub fn get(&self, id: &str) -> Option<Object> {
        self.position(id).map(|idx| decode_row(&self.rows[idx]))
    }

    /// All rows, in API form.
    pub fn all(&self) -> Vec<Object> {
        self.rows.iter().map(decode_row).collect()
    }

    /// Apply an update to the row with the given key. Returns false if the
    /// row is absent.
    pub fn update_one(&mut self, id: &str, update: &Update) -> bool {
        match self.position(id) {
            Some(idx) => {
                update.apply(&mut self.rows[idx]);
                true
            }
            None => false,
        }
    }

    /// Apply an update to every row matching a filter.
    pub fn update_many(&mut self, filter: &Filter, update: &Update) -> usize {
        let mut touched = 0;
        for row in self.rows.iter_mut() {
            if filter.matches(&decode_row(row)) {
                update.apply(row);
                touched += 1;
            }
        }
        touched
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.rows
            .iter()
            .position(|row| row.get(&self.key_field).and_then(Value::as_str) == Some(id))
    }

    // -------------------------------------------------------------------------
    // Query Operations
    // -------------------------------------------------------------------------

    /// Find rows matching a filter.
    pub fn find(&self, filter: &Filter, options: &FindOptions) -> FindResult {
        let mut matching: Vec<Object> = self
            .rows
            .iter()
            .map(decode_row)
            .filter(|row| is_readable(row, options.acl.as_deref()))
            .filter(|row| filter.matches(row))
            .collect();

        if options.count {
            return FindResult::Count(matching.len() as u64);
        }

        if !options.sort.is_empty() {
            matching.sort_by(|a, b| compare_rows(a, b, &options.sort));
        }

        let rows = matching
            .into_iter()
            .skip(options.skip.unwrap_or(0))
            .take(options.limit.unwrap_or(usize::MAX))
            .collect();

        FindResult::Rows(rows)
    }
}

/// Row visibility under an ACL group. `None` sees everything.
fn is_readable(row: &Object, group: Option<&[String]>) -> bool {
    let Some(group) = group else {
        return true;
    };
    let Some(Value::Object(acl)) = row.get("ACL") else {
        return true;
    };
    let grants_read = |subject: &str| {
        acl.get(subject)
            .and_then(|entry| entry.get("read"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    };
    grants_read("*") || group.iter().any(|subject| grants_read(subject))
}

fn compare_rows(a: &Object, b: &Object, sort: &[String]) -> Ordering {
    for key in sort {
        let (field, descending) = match key.strip_prefix('-') {
            Some(field) => (field, true),
            None => (key.as_str(), false),
        };
        let ordering = match (a.get(field), b.get(field)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
        };
        let ordering = if descending { ordering.reverse() } else { ordering };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

// =============================================================================
// Tests
// =============================================================================
