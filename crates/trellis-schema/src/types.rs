//! Trellis Storage Types
//!
//! The closed set of field types a class schema can commit to, and the
//! conversions between the wire description (`{"type":"Pointer",
//! "targetClass":"X"}`), the persisted token (`*X`) and values found in
//! client payloads.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::validation::{class_name_is_valid, invalid_class_name_message};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use trellis_common::{Object, Result, TrellisError};

// =============================================================================
// Storage Type
// =============================================================================

/// Type of a committed field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StorageType {
    String,
    Number,
    Boolean,
    Date,
    Object,
    Array,
    GeoPoint,
    File,
    Bytes,
    Pointer(String),
    Relation(String),
}

impl StorageType {
    /// Parse a persisted token. The legacy `map` token reads as `object`.
    pub fn from_token(token: &str) -> Result<Self> {
        if let Some(target) = token.strip_prefix('*') {
            if !target.is_empty() {
                return Ok(Self::Pointer(target.to_string()));
            }
        }
        if let Some(target) = token
            .strip_prefix("relation<")
            .and_then(|rest| rest.strip_suffix('>'))
        {
            if !target.is_empty() {
                return Ok(Self::Relation(target.to_string()));
            }
        }

        match token {
            "string" => Ok(Self::String),
            "number" => Ok(Self::Number),
            "boolean" => Ok(Self::Boolean),
            "date" => Ok(Self::Date),
            "object" | "map" => Ok(Self::Object),
            "array" => Ok(Self::Array),
            "geopoint" => Ok(Self::GeoPoint),
            "file" => Ok(Self::File),
            "bytes" => Ok(Self::Bytes),
            other => Err(TrellisError::InvalidJson(format!(
                "unknown storage type token: {}",
                other
            ))),
        }
    }

    /// The persisted token.
    pub fn token(&self) -> String {
        match self {
            Self::String => "string".to_string(),
            Self::Number => "number".to_string(),
            Self::Boolean => "boolean".to_string(),
            Self::Date => "date".to_string(),
            Self::Object => "object".to_string(),
            Self::Array => "array".to_string(),
            Self::GeoPoint => "geopoint".to_string(),
            Self::File => "file".to_string(),
            Self::Bytes => "bytes".to_string(),
            Self::Pointer(target) => format!("*{}", target),
            Self::Relation(target) => format!("relation<{}>", target),
        }
    }

    /// Convert a wire type description into a storage type.
    pub fn from_api(api_type: &Value) -> Result<Self> {
        let invalid = || TrellisError::InvalidJson("invalid JSON".to_string());
        let description = api_type.as_object().ok_or_else(invalid)?;
        let kind = description
            .get("type")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(invalid)?;

        match kind {
            "Pointer" => Ok(Self::Pointer(target_class(description, kind)?)),
            "Relation" => Ok(Self::Relation(target_class(description, kind)?)),
            "Number" => Ok(Self::Number),
            "String" => Ok(Self::String),
            "Boolean" => Ok(Self::Boolean),
            "Date" => Ok(Self::Date),
            "Object" => Ok(Self::Object),
            "Array" => Ok(Self::Array),
            "GeoPoint" => Ok(Self::GeoPoint),
            "File" => Ok(Self::File),
            "Bytes" => Ok(Self::Bytes),
            _ => Err(invalid()),
        }
    }

    /// Convert into the wire type description.
    pub fn to_api(&self) -> ApiFieldType {
        match self {
            Self::Pointer(target) => ApiFieldType::with_target("Pointer", target),
            Self::Relation(target) => ApiFieldType::with_target("Relation", target),
            Self::String => ApiFieldType::new("String"),
            Self::Number => ApiFieldType::new("Number"),
            Self::Boolean => ApiFieldType::new("Boolean"),
            Self::Date => ApiFieldType::new("Date"),
            Self::Object => ApiFieldType::new("Object"),
            Self::Array => ApiFieldType::new("Array"),
            Self::GeoPoint => ApiFieldType::new("GeoPoint"),
            Self::File => ApiFieldType::new("File"),
            Self::Bytes => ApiFieldType::new("Bytes"),
        }
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Self::Pointer(_))
    }

    /// Target class of a pointer or relation.
    pub fn target_class(&self) -> Option<&str> {
        match self {
            Self::Pointer(target) | Self::Relation(target) => Some(target),
            _ => None,
        }
    }

    /// Infer the type a payload value would commit its field to. `None`
    /// means the value carries no type (a deletion, an unknown marker).
    pub fn infer(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(_) => Some(Self::Boolean),
            Value::String(_) => Some(Self::String),
            Value::Number(_) => Some(Self::Number),
            Value::Array(_) => Some(Self::Array),
            Value::Object(object) => infer_object(object),
            Value::Null => None,
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token())
    }
}

fn target_class(description: &Object, kind: &str) -> Result<String> {
    let target = description.get("targetClass").ok_or_else(|| {
        TrellisError::MissingRequiredFieldError(format!("type {} needs a class name", kind))
    })?;
    let target = target
        .as_str()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| TrellisError::InvalidJson("invalid targetClass".to_string()))?;
    if !class_name_is_valid(target) {
        return Err(TrellisError::InvalidClassName(invalid_class_name_message(target)));
    }
    Ok(target.to_string())
}

fn infer_object(object: &Object) -> Option<StorageType> {
    if let Some(kind) = object.get("__type") {
        let has = |key: &str| object.get(key).map(|v| !v.is_null()).unwrap_or(false);
        match kind.as_str() {
            Some("Pointer") => {
                if let Some(class_name) = object.get("className").and_then(Value::as_str) {
                    return Some(StorageType::Pointer(class_name.to_string()));
                }
            }
            Some("File") if has("name") => return Some(StorageType::File),
            Some("Date") if has("iso") => return Some(StorageType::Date),
            Some("GeoPoint") if has("latitude") && has("longitude") => {
                return Some(StorageType::GeoPoint)
            }
            Some("Bytes") if has("base64") => return Some(StorageType::Bytes),
            Some("File") | Some("Date") | Some("GeoPoint") | Some("Bytes") => {}
            _ => return None,
        }
    }

    if let Some(inner) = object.get("$ne") {
        return StorageType::infer(inner);
    }

    if let Some(op) = object.get("__op") {
        return match op.as_str()? {
            "Increment" => Some(StorageType::Number),
            "Delete" => None,
            "Add" | "AddUnique" | "Remove" => Some(StorageType::Array),
            "AddRelation" | "RemoveRelation" => {
                let first = object.get("objects")?.as_array()?.first()?;
                let class_name = first.get("className")?.as_str()?;
                Some(StorageType::Relation(class_name.to_string()))
            }
            "Batch" => StorageType::infer(object.get("ops")?.as_array()?.first()?),
            _ => None,
        };
    }

    Some(StorageType::Object)
}

// =============================================================================
// Wire Field Type
// =============================================================================

/// Wire description of a field type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiFieldType {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "targetClass", skip_serializing_if = "Option::is_none", default)]
    pub target_class: Option<String>,
}

impl ApiFieldType {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            target_class: None,
        }
    }

    pub fn with_target(kind: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            target_class: Some(target.into()),
        }
    }

    /// The access-control column type, reported but never stored as a token.
    pub fn acl() -> Self {
        Self::new("ACL")
    }
}

// =============================================================================
// Tests
// =============================================================================
