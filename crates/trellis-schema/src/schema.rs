//! Trellis Schema Store
//!
//! Authoritative registry of class schemas, backed by the persisted schema
//! collection. Every mutation writes the persisted row first and then reloads
//! the whole cache, so readers see their own writes. Field types are
//! committed with a guarded upsert followed by a frozen verification, which
//! makes the first writer win when two requests race on the same field.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::defaults::{SchemaDefaults, NON_FIELD_KEYS, UNIVERSAL_COLUMNS};
use crate::permissions::{validate_clp_document, ClassLevelPermissions, ClpOperation};
use crate::types::{ApiFieldType, StorageType};
use crate::validation::{
    class_name_is_valid, field_name_is_valid, invalid_class_name_message, join_collection_name,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use trellis_common::{Object, Result, TrellisError};
use trellis_document::{DocumentStore, SchemaCollection};

const CLASS_PERMISSIONS_PATH: &str = "_metadata.class_permissions";

// =============================================================================
// Wire Schema
// =============================================================================

/// Externally visible schema of a class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSchema {
    pub class_name: String,
    pub fields: BTreeMap<String, ApiFieldType>,
    pub class_level_permissions: Value,
}

type ClassFields = BTreeMap<String, StorageType>;

#[derive(Debug, Default)]
struct SchemaCache {
    data: HashMap<String, ClassFields>,
    perms: HashMap<String, ClassLevelPermissions>,
}

// =============================================================================
// Schema Store
// =============================================================================

/// The schema registry.
pub struct SchemaStore {
    collection: Arc<dyn SchemaCollection>,
    documents: Arc<dyn DocumentStore>,
    defaults: Arc<SchemaDefaults>,
    cache: RwLock<SchemaCache>,
}

impl SchemaStore {
    /// Create a store and load the cache from the persisted collection.
    pub fn load(
        collection: Arc<dyn SchemaCollection>,
        documents: Arc<dyn DocumentStore>,
        defaults: Arc<SchemaDefaults>,
    ) -> Result<Self> {
        let store = Self {
            collection,
            documents,
            defaults,
            cache: RwLock::new(SchemaCache::default()),
        };
        store.reload()?;
        Ok(store)
    }

    pub fn defaults(&self) -> &SchemaDefaults {
        &self.defaults
    }

    /// Replace the cache with the current persisted rows.
    pub fn reload(&self) -> Result<()> {
        let rows = self.collection.get_all_schemas()?;
        let mut cache = SchemaCache::default();

        for row in &rows {
            let class_name = row
                .get("_id")
                .and_then(Value::as_str)
                .ok_or_else(|| TrellisError::Storage("schema row without _id".to_string()))?;

            let mut fields = ClassFields::new();
            for (key, token) in row {
                if NON_FIELD_KEYS.contains(&key.as_str()) {
                    continue;
                }
                let token = token.as_str().ok_or_else(|| {
                    TrellisError::Storage(format!(
                        "schema row {} has a non-string type for {}",
                        class_name, key
                    ))
                })?;
                let ty = StorageType::from_token(token).map_err(|e| {
                    TrellisError::Storage(format!("schema row {}: {}", class_name, e))
                })?;
                fields.insert(key.clone(), ty);
            }

            if let Some(document) = row
                .get("_metadata")
                .and_then(|metadata| metadata.get("class_permissions"))
                .filter(|document| !document.is_null())
            {
                let clp = ClassLevelPermissions::from_value(document).map_err(|e| {
                    TrellisError::Storage(format!("schema row {}: {}", class_name, e))
                })?;
                cache.perms.insert(class_name.to_string(), clp);
            }

            cache.data.insert(class_name.to_string(), fields);
        }

        tracing::debug!("Reloaded schema cache with {} classes", cache.data.len());
        *self.cache.write() = cache;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Class Lifecycle
    // -------------------------------------------------------------------------

    /// Create a class with the given wire field descriptions and CLP.
    pub fn add_class_if_not_exists(
        &self,
        class_name: &str,
        fields: &Object,
        clp: Option<&Value>,
    ) -> Result<ApiSchema> {
        if self.has_class(class_name)? {
            return Err(TrellisError::InvalidClassName(format!(
                "Class {} already exists.",
                class_name
            )));
        }

        let row = self.build_schema_row(class_name, fields, clp)?;
        self.collection.add_schema(class_name, row)?;
        self.reload()?;

        tracing::info!("Created class {} with {} fields", class_name, fields.len());
        self.get_schema(class_name)
    }

    /// Add and delete fields of an existing class and replace its CLP.
    pub fn update_class(
        &self,
        class_name: &str,
        submitted: &Object,
        clp: Option<&Value>,
    ) -> Result<ApiSchema> {
        self.reload()?;
        let existing = self
            .cache
            .read()
            .data
            .get(class_name)
            .cloned()
            .ok_or_else(|| {
                TrellisError::InvalidClassName(format!("Class {} does not exist.", class_name))
            })?;

        let mut deletions = Vec::new();
        let mut insertions = Vec::new();
        for (name, field) in submitted {
            let is_delete = is_delete_op(field);
            let exists = existing.contains_key(name);
            if exists && !is_delete {
                return Err(TrellisError::ClassNotEmpty(format!(
                    "Field {} exists, cannot update.",
                    name
                )));
            }
            if !exists && is_delete {
                return Err(TrellisError::ClassNotEmpty(format!(
                    "Field {} does not exist, cannot delete.",
                    name
                )));
            }
            if is_delete && self.defaults.is_default_column(class_name, name) {
                return Err(TrellisError::ChangedImmutableFieldError(format!(
                    "field {} cannot be changed",
                    name
                )));
            }
            if is_delete {
                deletions.push(name.as_str());
            } else {
                insertions.push((name.as_str(), field));
            }
        }

        // Validate the merged record before touching storage.
        let mut merged = Object::new();
        for (name, ty) in &existing {
            if self.defaults.is_default_column(class_name, name) || deletions.contains(&name.as_str())
            {
                continue;
            }
            let api = serde_json::to_value(ty.to_api())
                .map_err(|e| TrellisError::InvalidJson(e.to_string()))?;
            merged.insert(name.clone(), api);
        }
        for (name, field) in &insertions {
            merged.insert(name.to_string(), (*field).clone());
        }
        self.build_schema_row(class_name, &merged, clp)?;

        for name in &deletions {
            self.delete_field(name, class_name)?;
        }
        self.reload()?;

        for (name, field) in &insertions {
            let ty = StorageType::from_api(field)?;
            self.validate_field(class_name, name, &ty)?;
        }

        self.set_permissions(class_name, clp)?;
        tracing::info!(
            "Updated class {}: {} added, {} deleted",
            class_name,
            insertions.len(),
            deletions.len()
        );
        self.get_schema(class_name)
    }

    /// Remove a field from a class, its data and its schema entry.
    pub fn delete_field(&self, field_name: &str, class_name: &str) -> Result<()> {
        if !class_name_is_valid(class_name) {
            return Err(TrellisError::InvalidClassName(invalid_class_name_message(class_name)));
        }
        if !field_name_is_valid(field_name) {
            return Err(TrellisError::InvalidKeyName(format!(
                "invalid field name: {}",
                field_name
            )));
        }
        if self.defaults.is_default_column(class_name, field_name) {
            return Err(TrellisError::ChangedImmutableFieldError(format!(
                "field {} cannot be changed",
                field_name
            )));
        }

        self.reload()?;
        let ty = {
            let cache = self.cache.read();
            let fields = cache.data.get(class_name).ok_or_else(|| {
                TrellisError::InvalidClassName(format!("Class {} does not exist.", class_name))
            })?;
            fields.get(field_name).cloned().ok_or_else(|| {
                TrellisError::ClassNotEmpty(format!(
                    "Field {} does not exist, cannot delete.",
                    field_name
                ))
            })?
        };

        match &ty {
            StorageType::Relation(_) => {
                self.documents
                    .drop_collection(&join_collection_name(field_name, class_name))?;
            }
            _ => {
                let column = if ty.is_pointer() {
                    format!("_p_{}", field_name)
                } else {
                    field_name.to_string()
                };
                let update = to_object(json!({ "$unset": { column: "" } }));
                self.documents.update_many(class_name, &Object::new(), &update)?;
            }
        }

        let update = to_object(json!({ "$unset": { field_name: "" } }));
        self.collection.update_schema(class_name, &update)?;
        self.reload()?;

        tracing::info!("Deleted field {}.{} ({})", class_name, field_name, ty);
        Ok(())
    }

    /// Replace the CLP of a class. `None` removes it, reopening every
    /// operation.
    pub fn set_permissions(&self, class_name: &str, clp: Option<&Value>) -> Result<()> {
        let update = match clp.filter(|document| !document.is_null()) {
            Some(document) => {
                validate_clp_document(document)?;
                json!({ "$set": { CLASS_PERMISSIONS_PATH: document } })
            }
            None => json!({ "$unset": { CLASS_PERMISSIONS_PATH: "" } }),
        };
        self.collection.update_schema(class_name, &to_object(update))?;
        self.reload()
    }

    /// Build and validate the persisted row for a class.
    fn build_schema_row(&self, class_name: &str, fields: &Object, clp: Option<&Value>) -> Result<Object> {
        if !class_name_is_valid(class_name) {
            return Err(TrellisError::InvalidClassName(invalid_class_name_message(class_name)));
        }

        let mut row = Object::new();
        for (name, ty) in self.defaults.universal_columns() {
            row.insert(name.clone(), Value::String(ty.token()));
        }
        if let Some(columns) = self.defaults.system_columns(class_name) {
            for (name, ty) in columns {
                row.insert(name.clone(), Value::String(ty.token()));
            }
        }

        let mut geopoint: Option<&str> = None;
        for (name, api_type) in fields {
            if !self.defaults.field_name_is_valid_for_class(name, class_name) {
                if !field_name_is_valid(name) {
                    return Err(TrellisError::InvalidKeyName(format!("invalid field name: {}", name)));
                }
                return Err(TrellisError::ChangedImmutableFieldError(format!(
                    "field {} cannot be added",
                    name
                )));
            }

            let ty = StorageType::from_api(api_type)?;
            if ty == StorageType::GeoPoint {
                if let Some(existing) = geopoint {
                    return Err(TrellisError::IncorrectType(format!(
                        "currently, only one GeoPoint field may exist in an object. Adding {} when {} already exists.",
                        name, existing
                    )));
                }
                geopoint = Some(name.as_str());
            }
            row.insert(name.clone(), Value::String(ty.token()));
        }

        if let Some(document) = clp.filter(|document| !document.is_null()) {
            validate_clp_document(document)?;
            row.insert(
                "_metadata".to_string(),
                json!({ "class_permissions": document }),
            );
        }

        Ok(row)
    }

    // -------------------------------------------------------------------------
    // Field Commitment
    // -------------------------------------------------------------------------

    /// Commit a field type, or confirm it is already committed. A dotted key
    /// commits its first segment as an object.
    pub fn validate_field(&self, class_name: &str, key: &str, ty: &StorageType) -> Result<()> {
        let (key, ty) = commit_target(key, ty);

        if self.check_committed(class_name, key, &ty)? {
            return Ok(());
        }
        self.try_commit(class_name, key, &ty)?;
        self.verify_commit(class_name, key, &ty)
    }

    /// `Ok(true)` when the field already has this type, `Ok(false)` when it
    /// is free to commit.
    fn check_committed(&self, class_name: &str, key: &str, ty: &StorageType) -> Result<bool> {
        let cache = self.cache.read();
        let fields = cache.data.get(class_name);

        match fields.and_then(|fields| fields.get(key)) {
            Some(expected) if expected == ty => Ok(true),
            Some(expected) => Err(type_conflict(class_name, key, expected, ty)),
            None => {
                if *ty == StorageType::GeoPoint {
                    if let Some(existing) = fields.and_then(|fields| other_geopoint(fields, key)) {
                        return Err(TrellisError::IncorrectType(format!(
                            "there can only be one geopoint field in a class. Adding {} when {} already exists.",
                            key, existing
                        )));
                    }
                }
                Ok(false)
            }
        }
    }

    fn try_commit(&self, class_name: &str, key: &str, ty: &StorageType) -> Result<()> {
        let guard = to_object(json!({ key: { "$exists": false } }));
        let update = to_object(json!({ "$set": { key: ty.token() } }));
        self.collection.upsert_schema(class_name, &guard, &update)?;
        self.reload()
    }

    fn verify_commit(&self, class_name: &str, key: &str, ty: &StorageType) -> Result<()> {
        let cache = self.cache.read();
        let fields = cache.data.get(class_name);

        match fields.and_then(|fields| fields.get(key)) {
            Some(committed) if committed == ty => {
                if *ty == StorageType::GeoPoint {
                    if let Some(existing) = fields.and_then(|fields| other_geopoint(fields, key)) {
                        return Err(TrellisError::IncorrectType(format!(
                            "there can only be one geopoint field in a class. {} was committed alongside {}.",
                            key, existing
                        )));
                    }
                }
                tracing::info!("Committed field {}.{} as {}", class_name, key, ty);
                Ok(())
            }
            Some(committed) => {
                tracing::warn!(
                    "Lost commit race on {}.{}: wanted {}, found {}",
                    class_name,
                    key,
                    ty,
                    committed
                );
                Err(type_conflict(class_name, key, committed, ty))
            }
            None => Err(TrellisError::IncorrectType(format!(
                "field {}.{} could not be committed as {}",
                class_name, key, ty
            ))),
        }
    }

    // -------------------------------------------------------------------------
    // Object Validation
    // -------------------------------------------------------------------------

    /// Validate an object about to be written to a class, creating the class
    /// and committing new field types as needed. `query` carries the target
    /// `objectId` for updates.
    pub fn validate_object(&self, class_name: &str, object: &Object, query: Option<&Object>) -> Result<()> {
        let mut inferred = Vec::new();
        let mut geopoint: Option<&str> = None;

        for (key, value) in object {
            if value.is_null() || UNIVERSAL_COLUMNS.contains(&key.as_str()) {
                continue;
            }
            let top = key.split('.').next().unwrap_or(key);
            if !field_name_is_valid(top) {
                return Err(TrellisError::InvalidKeyName(format!("invalid field name: {}", key)));
            }
            let Some(ty) = StorageType::infer(value) else {
                continue;
            };
            if ty == StorageType::GeoPoint {
                if let Some(existing) = geopoint {
                    return Err(TrellisError::IncorrectType(format!(
                        "there can only be one geopoint field in a class. {} and {} are both geopoints.",
                        existing, key
                    )));
                }
                geopoint = Some(key.as_str());
            }
            inferred.push((key.as_str(), ty));
        }

        self.check_required_columns(class_name, object, query)?;

        // Every field is checked against the committed schema before the
        // class is created or any field is committed.
        self.reload()?;
        let mut pending: Vec<(&str, StorageType)> = Vec::new();
        for (key, ty) in &inferred {
            let (key, ty) = commit_target(key, ty);
            if self.check_committed(class_name, key, &ty)? {
                continue;
            }
            let queued = pending
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, other)| other.clone());
            match queued {
                Some(other) if other != ty => {
                    return Err(type_conflict(class_name, key, &other, &ty));
                }
                Some(_) => {}
                None => pending.push((key, ty)),
            }
        }

        self.ensure_class(class_name)?;
        for (key, ty) in &pending {
            self.validate_field(class_name, key, ty)?;
        }
        Ok(())
    }

    fn check_required_columns(&self, class_name: &str, object: &Object, query: Option<&Object>) -> Result<()> {
        let is_update = query.map(|q| q.contains_key("objectId")).unwrap_or(false);

        for column in self.defaults.required_columns(class_name) {
            let missing = match object.get(column) {
                Some(value) if is_update => is_delete_op(value),
                Some(value) => value.is_null(),
                None => !is_update,
            };
            if missing {
                return Err(TrellisError::ClassNotEmpty(format!("{} is required.", column)));
            }
        }
        Ok(())
    }

    /// Create an empty class row if the class is unknown.
    fn ensure_class(&self, class_name: &str) -> Result<()> {
        if self.has_class(class_name)? {
            return Ok(());
        }

        let row = self.build_schema_row(class_name, &Object::new(), None)?;
        if let Err(e) = self.collection.add_schema(class_name, row) {
            tracing::debug!("Auto-create of {} failed: {}", class_name, e);
            self.reload()?;
            if self.cache.read().data.contains_key(class_name) {
                return Ok(());
            }
            return Err(e);
        }
        self.reload()?;

        if !self.cache.read().data.contains_key(class_name) {
            return Err(TrellisError::InvalidClassName(format!(
                "Class {} could not be created.",
                class_name
            )));
        }
        tracing::info!("Auto-created class {}", class_name);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Check if a class exists, after reloading.
    pub fn has_class(&self, class_name: &str) -> Result<bool> {
        self.reload()?;
        Ok(self.cache.read().data.contains_key(class_name))
    }

    /// Check if a class has all of the given fields.
    pub fn has_keys(&self, class_name: &str, keys: &[&str]) -> bool {
        self.cache
            .read()
            .data
            .get(class_name)
            .map(|fields| keys.iter().all(|key| fields.contains_key(*key)))
            .unwrap_or(false)
    }

    /// Committed type of a field.
    pub fn get_expected_type(&self, class_name: &str, key: &str) -> Option<StorageType> {
        self.cache
            .read()
            .data
            .get(class_name)
            .and_then(|fields| fields.get(key))
            .cloned()
    }

    /// Authorize an operation on a class for an ACL group. Classes without
    /// a CLP are open.
    pub fn validate_permission(&self, class_name: &str, acl_group: &[String], operation: ClpOperation) -> Result<()> {
        match self.cache.read().perms.get(class_name) {
            Some(clp) => clp.authorize(class_name, acl_group, operation),
            None => Ok(()),
        }
    }

    /// The class a pointer or relation field targets, or the class itself.
    pub fn redirect_class_name_for_key(&self, class_name: &str, key: &str) -> Result<String> {
        self.reload()?;
        Ok(self
            .get_expected_type(class_name, key)
            .and_then(|ty| ty.target_class().map(str::to_string))
            .unwrap_or_else(|| class_name.to_string()))
    }

    /// Wire schema of a class.
    pub fn get_schema(&self, class_name: &str) -> Result<ApiSchema> {
        let cache = self.cache.read();
        let fields = cache.data.get(class_name).ok_or_else(|| {
            TrellisError::InvalidClassName(format!("Class {} does not exist.", class_name))
        })?;
        Ok(api_schema(class_name, fields, cache.perms.get(class_name)))
    }

    /// Wire schemas of every class, ordered by name.
    pub fn get_all_schemas(&self) -> Result<Vec<ApiSchema>> {
        self.reload()?;
        let cache = self.cache.read();
        let mut names: Vec<&String> = cache.data.keys().collect();
        names.sort();
        Ok(names
            .into_iter()
            .map(|name| api_schema(name, &cache.data[name], cache.perms.get(name)))
            .collect())
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn api_schema(class_name: &str, fields: &ClassFields, clp: Option<&ClassLevelPermissions>) -> ApiSchema {
    let mut api_fields: BTreeMap<String, ApiFieldType> = fields
        .iter()
        .map(|(name, ty)| (name.clone(), ty.to_api()))
        .collect();
    api_fields.insert("ACL".to_string(), ApiFieldType::acl());
    api_fields.insert("objectId".to_string(), StorageType::String.to_api());
    api_fields.insert("createdAt".to_string(), StorageType::Date.to_api());
    api_fields.insert("updatedAt".to_string(), StorageType::Date.to_api());

    ApiSchema {
        class_name: class_name.to_string(),
        fields: api_fields,
        class_level_permissions: clp.cloned().unwrap_or_default().to_value_with_defaults(),
    }
}

/// The column a key commits to. A dotted key commits its first segment as
/// an object.
fn commit_target<'k>(key: &'k str, ty: &StorageType) -> (&'k str, StorageType) {
    match key.split_once('.') {
        Some((prefix, _)) => (prefix, StorageType::Object),
        None => (key, ty.clone()),
    }
}

fn other_geopoint<'a>(fields: &'a ClassFields, key: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(name, ty)| name.as_str() != key && **ty == StorageType::GeoPoint)
        .map(|(name, _)| name.as_str())
}

fn type_conflict(class_name: &str, key: &str, expected: &StorageType, actual: &StorageType) -> TrellisError {
    TrellisError::IncorrectType(format!(
        "schema mismatch for {}.{}; expected {} but got {}",
        class_name, key, expected, actual
    ))
}

fn is_delete_op(value: &Value) -> bool {
    value.get("__op").and_then(Value::as_str) == Some("Delete")
}

fn to_object(value: Value) -> Object {
    match value {
        Value::Object(object) => object,
        _ => Object::new(),
    }
}

// =============================================================================
// Tests
// =============================================================================
