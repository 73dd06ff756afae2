//! Trellis Class-Level Permissions
//!
//! Per-class, per-operation allow-lists of subjects. A subject is a
//! 24-character user id, a `role:<name>` pattern or the public wildcard `*`.
//! An operation without an entry is open to everyone.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use trellis_common::{Result, TrellisError};

/// The public wildcard subject.
pub const PUBLIC_SUBJECT: &str = "*";

// =============================================================================
// Operations
// =============================================================================

/// An operation a class-level permission can restrict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClpOperation {
    Find,
    Get,
    Create,
    Update,
    Delete,
    AddField,
}

impl ClpOperation {
    pub const ALL: [ClpOperation; 6] = [
        ClpOperation::Find,
        ClpOperation::Get,
        ClpOperation::Create,
        ClpOperation::Update,
        ClpOperation::Delete,
        ClpOperation::AddField,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Find => "find",
            Self::Get => "get",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::AddField => "addField",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == name)
    }
}

impl fmt::Display for ClpOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Class-Level Permissions
// =============================================================================

/// A validated class-level permission document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassLevelPermissions {
    entries: BTreeMap<ClpOperation, BTreeSet<String>>,
}

impl ClassLevelPermissions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant an operation to a subject.
    pub fn allow(mut self, operation: ClpOperation, subject: impl Into<String>) -> Self {
        self.entries.entry(operation).or_default().insert(subject.into());
        self
    }

    /// Parse and validate a permission document of the form
    /// `{"find": {"*": true, "role:admin": true}, ...}`.
    pub fn from_value(document: &Value) -> Result<Self> {
        let operations = document.as_object().ok_or_else(|| {
            TrellisError::InvalidJson("class level permissions must be an object".to_string())
        })?;
        let mut clp = Self::new();

        for (operation, perm) in operations {
            let op = ClpOperation::parse(operation).ok_or_else(|| {
                TrellisError::InvalidJson(format!(
                    "{} is not a valid operation for class level permissions",
                    operation
                ))
            })?;
            let subjects = perm.as_object().ok_or_else(|| {
                TrellisError::InvalidJson(format!(
                    "{} must map subjects to true in class level permissions",
                    operation
                ))
            })?;

            let entry = clp.entries.entry(op).or_default();
            for (subject, granted) in subjects {
                verify_permission_key(subject)?;
                match granted {
                    Value::Bool(true) => {
                        entry.insert(subject.clone());
                    }
                    Value::Bool(false) => {
                        return Err(TrellisError::InvalidJson(format!(
                            "false is not a valid value for class level permissions {}:{}:false",
                            operation, subject
                        )));
                    }
                    _ => {
                        return Err(TrellisError::InvalidJson(format!(
                            "this perm is not a valid value for class level permissions {}:{}:perm",
                            operation, subject
                        )));
                    }
                }
            }
        }

        Ok(clp)
    }

    /// Wire form of the explicitly set entries.
    pub fn to_value(&self) -> Value {
        let mut document = Map::new();
        for (op, subjects) in &self.entries {
            let grants: Map<String, Value> = subjects
                .iter()
                .map(|subject| (subject.clone(), Value::Bool(true)))
                .collect();
            document.insert(op.as_str().to_string(), Value::Object(grants));
        }
        Value::Object(document)
    }

    /// Wire form with every unset operation reported as fully open.
    pub fn to_value_with_defaults(&self) -> Value {
        let mut document = Map::new();
        for op in ClpOperation::ALL {
            let grants: Map<String, Value> = match self.entries.get(&op) {
                Some(subjects) => subjects
                    .iter()
                    .map(|subject| (subject.clone(), Value::Bool(true)))
                    .collect(),
                None => Map::from_iter([(PUBLIC_SUBJECT.to_string(), Value::Bool(true))]),
            };
            document.insert(op.as_str().to_string(), Value::Object(grants));
        }
        Value::Object(document)
    }

    /// Subjects allowed for an operation, if the operation is restricted.
    pub fn subjects(&self, operation: ClpOperation) -> Option<&BTreeSet<String>> {
        self.entries.get(&operation)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decide whether an ACL group may perform an operation on a class.
    pub fn authorize(&self, class_name: &str, acl_group: &[String], operation: ClpOperation) -> Result<()> {
        let Some(subjects) = self.entries.get(&operation) else {
            return Ok(());
        };
        if subjects.contains(PUBLIC_SUBJECT) || acl_group.iter().any(|s| subjects.contains(s)) {
            return Ok(());
        }
        Err(TrellisError::PermissionDenied(format!(
            "Permission denied for action {} on class {}.",
            operation, class_name
        )))
    }
}

/// Validate a class-level permission document without keeping it.
pub fn validate_clp_document(document: &Value) -> Result<()> {
    ClassLevelPermissions::from_value(document).map(|_| ())
}

/// A subject key must be a 24-character alphanumeric user id, `role:<name>`
/// or `*`.
pub fn verify_permission_key(key: &str) -> Result<()> {
    let is_user_id = key.len() == 24 && key.chars().all(|c| c.is_ascii_alphanumeric());
    let is_role = key.starts_with("role:");
    if is_user_id || is_role || key == PUBLIC_SUBJECT {
        return Ok(());
    }
    Err(TrellisError::InvalidJson(format!(
        "{} is not a valid key for class level permissions",
        key
    )))
}

// =============================================================================
// Tests
// =============================================================================
