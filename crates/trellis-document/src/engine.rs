//! Trellis Document Engine
//!
//! In-memory document store implementing both storage collaborator
//! contracts. Schema rows live in a dedicated collection keyed by `_id`.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::adapter::{DocumentStore, FindOptions, FindResult, SchemaCollection};
use crate::collection::Collection;
use crate::query::Filter;
use crate::types::DocumentId;
use crate::update::Update;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use trellis_common::{Object, Result, SchemaConfig, TrellisError};

// =============================================================================
// Memory Store
// =============================================================================

/// The in-memory document store.
pub struct MemoryStore {
    schema_collection: String,
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryStore {
    /// Create a store with default configuration.
    pub fn new() -> Self {
        Self::with_config(&SchemaConfig::default())
    }

    /// Create a store with a custom schema collection name.
    pub fn with_config(config: &SchemaConfig) -> Self {
        Self {
            schema_collection: config.schema_collection.clone(),
            collections: RwLock::new(HashMap::new()),
        }
    }

    // -------------------------------------------------------------------------
    // Collection Management
    // -------------------------------------------------------------------------

    /// Insert a row into a class collection, creating the collection on
    /// first use.
    pub fn insert(&self, class_name: &str, row: Object) -> Result<DocumentId> {
        let mut collections = self.collections.write();
        collections
            .entry(class_name.to_string())
            .or_insert_with(|| Collection::new(class_name))
            .insert(row)
    }

    /// Check if a collection exists.
    pub fn collection_exists(&self, name: &str) -> bool {
        self.collections.read().contains_key(name)
    }

    /// Every row of a collection, in API form.
    pub fn rows(&self, name: &str) -> Vec<Object> {
        self.collections
            .read()
            .get(name)
            .map(Collection::all)
            .unwrap_or_default()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Document Store
// =============================================================================

impl DocumentStore for MemoryStore {
    fn find(&self, class_name: &str, filter: &Object, options: &FindOptions) -> Result<FindResult> {
        let filter = Filter::parse(filter)?;
        let collections = self.collections.read();

        Ok(match collections.get(class_name) {
            Some(collection) => collection.find(&filter, options),
            None if options.count => FindResult::Count(0),
            None => FindResult::Rows(Vec::new()),
        })
    }

    fn update_many(&self, class_name: &str, filter: &Object, update: &Object) -> Result<usize> {
        let filter = Filter::parse(filter)?;
        let update = Update::parse(update)?;
        let mut collections = self.collections.write();

        Ok(collections
            .get_mut(class_name)
            .map(|collection| collection.update_many(&filter, &update))
            .unwrap_or(0))
    }

    fn drop_collection(&self, name: &str) -> Result<()> {
        if self.collections.write().remove(name).is_some() {
            tracing::debug!("Dropped collection {}", name);
        }
        Ok(())
    }
}

// =============================================================================
// Schema Collection
// =============================================================================

impl SchemaCollection for MemoryStore {
    fn get_all_schemas(&self) -> Result<Vec<Object>> {
        Ok(self.rows(&self.schema_collection))
    }

    fn add_schema(&self, class_name: &str, mut row: Object) -> Result<()> {
        row.insert("_id".to_string(), Value::String(class_name.to_string()));
        let mut collections = self.collections.write();
        collections
            .entry(self.schema_collection.clone())
            .or_insert_with(|| Collection::with_key(&self.schema_collection, "_id"))
            .insert(row)
            .map(|_| ())
    }

    fn update_schema(&self, class_name: &str, update: &Object) -> Result<()> {
        let update = Update::parse(update)?;
        let mut collections = self.collections.write();
        let updated = collections
            .get_mut(&self.schema_collection)
            .map(|collection| collection.update_one(class_name, &update))
            .unwrap_or(false);

        if !updated {
            return Err(TrellisError::Storage(format!(
                "schema row for {} not found",
                class_name
            )));
        }
        Ok(())
    }

    fn upsert_schema(&self, class_name: &str, query: &Object, update: &Object) -> Result<()> {
        let guard = Filter::parse(query)?;
        let update = Update::parse(update)?;
        let mut collections = self.collections.write();
        let collection = collections
            .entry(self.schema_collection.clone())
            .or_insert_with(|| Collection::with_key(&self.schema_collection, "_id"));

        match collection.get(class_name) {
            Some(row) if guard.matches(&row) => {
                collection.update_one(class_name, &update);
            }
            Some(_) => {
                tracing::debug!("Schema upsert guard rejected for {}", class_name);
            }
            None => {
                let mut row = update.to_insert();
                row.insert("_id".to_string(), Value::String(class_name.to_string()));
                collection.insert(row)?;
            }
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Object {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_insert_and_find() {
        let store = MemoryStore::new();
        store.insert("Book", obj(json!({"title": "Dune"}))).unwrap();
        store.insert("Book", obj(json!({"title": "Emma"}))).unwrap();

        assert!(store.collection_exists("Book"));
        let rows = store
            .find("Book", &obj(json!({"title": "Emma"})), &FindOptions::master())
            .unwrap()
            .into_rows();
        assert_eq!(rows.len(), 1);

        let missing = store.find("Nope", &Object::new(), &FindOptions::master()).unwrap();
        assert_eq!(missing, FindResult::Rows(Vec::new()));
    }

    #[test]
    fn test_drop_collection() {
        let store = MemoryStore::new();
        store.insert("_Join:users:_Role", obj(json!({"owningId": "r1"}))).unwrap();
        store.drop_collection("_Join:users:_Role").unwrap();
        assert!(!store.collection_exists("_Join:users:_Role"));
        store.drop_collection("_Join:users:_Role").unwrap();
    }

    #[test]
    fn test_schema_rows() {
        let store = MemoryStore::new();
        store.add_schema("Book", obj(json!({"title": "string"}))).unwrap();
        assert!(store.add_schema("Book", Object::new()).is_err());

        store
            .update_schema("Book", &obj(json!({"$unset": {"title": ""}})))
            .unwrap();
        let rows = store.get_all_schemas().unwrap();
        assert_eq!(rows, vec![obj(json!({"_id": "Book"}))]);

        assert!(store
            .update_schema("Missing", &obj(json!({"$set": {"a": "string"}})))
            .is_err());
    }

    #[test]
    fn test_guarded_upsert() {
        let store = MemoryStore::new();
        let guard = obj(json!({"score": {"$exists": false}}));

        store
            .upsert_schema("Game", &guard, &obj(json!({"$set": {"score": "number"}})))
            .unwrap();
        store
            .upsert_schema("Game", &guard, &obj(json!({"$set": {"score": "string"}})))
            .unwrap();

        let rows = store.get_all_schemas().unwrap();
        assert_eq!(rows, vec![obj(json!({"score": "number", "_id": "Game"}))]);
    }
}
