//! Trellis Schema Defaults
//!
//! Immutable tables of default columns and required columns. Built once
//! and shared by reference between the schema store and the query engine.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::types::StorageType;
use crate::validation::field_name_is_valid;
use std::collections::{BTreeMap, HashMap};
use trellis_common::{
    INSTALLATION_CLASS, PRODUCT_CLASS, ROLE_CLASS, SESSION_CLASS, USER_CLASS,
};

/// Columns every class has. `ACL` is reported but never persisted as a type.
pub const UNIVERSAL_COLUMNS: [&str; 4] = ["objectId", "createdAt", "updatedAt", "ACL"];

/// Row keys of a persisted schema row that are not fields.
pub const NON_FIELD_KEYS: [&str; 3] = ["_id", "_metadata", "_client_permissions"];

// =============================================================================
// Schema Defaults
// =============================================================================

/// Default and required column tables.
#[derive(Debug, Clone)]
pub struct SchemaDefaults {
    universal: BTreeMap<String, StorageType>,
    system: HashMap<String, BTreeMap<String, StorageType>>,
    required: HashMap<String, Vec<String>>,
}

impl SchemaDefaults {
    /// The standard tables for the five built-in classes.
    pub fn standard() -> Self {
        let universal = columns(&[
            ("objectId", StorageType::String),
            ("createdAt", StorageType::Date),
            ("updatedAt", StorageType::Date),
        ]);

        let mut system = HashMap::new();
        system.insert(
            USER_CLASS.to_string(),
            columns(&[
                ("username", StorageType::String),
                ("password", StorageType::String),
                ("authData", StorageType::Object),
                ("email", StorageType::String),
                ("emailVerified", StorageType::Boolean),
            ]),
        );
        system.insert(
            INSTALLATION_CLASS.to_string(),
            columns(&[
                ("installationId", StorageType::String),
                ("deviceToken", StorageType::String),
                ("channels", StorageType::Array),
                ("deviceType", StorageType::String),
                ("pushType", StorageType::String),
                ("GCMSenderId", StorageType::String),
                ("timeZone", StorageType::String),
                ("localeIdentifier", StorageType::String),
                ("badge", StorageType::Number),
            ]),
        );
        system.insert(
            ROLE_CLASS.to_string(),
            columns(&[
                ("name", StorageType::String),
                ("users", StorageType::Relation(USER_CLASS.to_string())),
                ("roles", StorageType::Relation(ROLE_CLASS.to_string())),
            ]),
        );
        system.insert(
            SESSION_CLASS.to_string(),
            columns(&[
                ("restricted", StorageType::Boolean),
                ("user", StorageType::Pointer(USER_CLASS.to_string())),
                ("installationId", StorageType::String),
                ("sessionToken", StorageType::String),
                ("expiresAt", StorageType::Date),
                ("createdWith", StorageType::Object),
            ]),
        );
        system.insert(
            PRODUCT_CLASS.to_string(),
            columns(&[
                ("productIdentifier", StorageType::String),
                ("download", StorageType::File),
                ("downloadName", StorageType::String),
                ("icon", StorageType::File),
                ("order", StorageType::Number),
                ("title", StorageType::String),
                ("subtitle", StorageType::String),
            ]),
        );

        let mut required = HashMap::new();
        required.insert(
            PRODUCT_CLASS.to_string(),
            ["productIdentifier", "icon", "order", "title", "subtitle"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        required.insert(
            ROLE_CLASS.to_string(),
            ["name", "ACL"].iter().map(|s| s.to_string()).collect(),
        );

        Self {
            universal,
            system,
            required,
        }
    }

    /// Persisted universal columns (`objectId`, `createdAt`, `updatedAt`).
    pub fn universal_columns(&self) -> &BTreeMap<String, StorageType> {
        &self.universal
    }

    /// Check if a class is built in, that is, carries system columns.
    pub fn is_system_class(&self, class_name: &str) -> bool {
        self.system.contains_key(class_name)
    }

    /// System columns of a built-in class.
    pub fn system_columns(&self, class_name: &str) -> Option<&BTreeMap<String, StorageType>> {
        self.system.get(class_name)
    }

    /// Columns that must be present when creating an object of a class.
    pub fn required_columns(&self, class_name: &str) -> &[String] {
        self.required
            .get(class_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Check if a field is a universal or class system column.
    pub fn is_default_column(&self, class_name: &str, field_name: &str) -> bool {
        UNIVERSAL_COLUMNS.contains(&field_name)
            || self
                .system
                .get(class_name)
                .map(|cols| cols.contains_key(field_name))
                .unwrap_or(false)
    }

    /// A field may be added to a class if its name is valid and it does not
    /// shadow a default column.
    pub fn field_name_is_valid_for_class(&self, field_name: &str, class_name: &str) -> bool {
        field_name_is_valid(field_name) && !self.is_default_column(class_name, field_name)
    }
}

impl Default for SchemaDefaults {
    fn default() -> Self {
        Self::standard()
    }
}

fn columns(entries: &[(&str, StorageType)]) -> BTreeMap<String, StorageType> {
    entries
        .iter()
        .map(|(name, ty)| (name.to_string(), ty.clone()))
        .collect()
}
