//! Trellis Types - Core Data Types
//!
//! Value-level types shared by the storage collaborator, the schema store
//! and the query engine. Documents are JSON objects; references between
//! documents are pointer values carrying a `__type` discriminator.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

// =============================================================================
// Documents
// =============================================================================

/// A JSON object: a stored row, a where clause node or an option map.
pub type Object = serde_json::Map<String, Value>;

// =============================================================================
// System Classes
// =============================================================================

pub const USER_CLASS: &str = "_User";
pub const INSTALLATION_CLASS: &str = "_Installation";
pub const ROLE_CLASS: &str = "_Role";
pub const SESSION_CLASS: &str = "_Session";
pub const PRODUCT_CLASS: &str = "_Product";

/// The five built-in classes.
pub const SYSTEM_CLASSES: [&str; 5] = [
    USER_CLASS,
    INSTALLATION_CLASS,
    ROLE_CLASS,
    SESSION_CLASS,
    PRODUCT_CLASS,
];

/// Check if a class is one of the built-in classes.
pub fn is_system_class(class_name: &str) -> bool {
    SYSTEM_CLASSES.contains(&class_name)
}

// =============================================================================
// Pointer
// =============================================================================

/// A reference to one object of a class, not inlined.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pointer {
    #[serde(rename = "className")]
    pub class_name: String,
    #[serde(rename = "objectId")]
    pub object_id: String,
}

impl Pointer {
    pub fn new(class_name: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            object_id: object_id.into(),
        }
    }

    /// Read a pointer from its wire form. Only values whose `__type` is
    /// exactly `Pointer` qualify; materialized objects do not.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        if obj.get("__type").and_then(Value::as_str) != Some("Pointer") {
            return None;
        }
        let class_name = obj.get("className").and_then(Value::as_str)?;
        let object_id = obj.get("objectId").and_then(Value::as_str)?;
        Some(Self::new(class_name, object_id))
    }

    /// Wire form: `{"__type":"Pointer","className":..,"objectId":..}`.
    pub fn to_value(&self) -> Value {
        json!({
            "__type": "Pointer",
            "className": self.class_name,
            "objectId": self.object_id,
        })
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}${}", self.class_name, self.object_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_classes() {
        assert!(is_system_class("_User"));
        assert!(is_system_class("_Product"));
        assert!(!is_system_class("_Join:users:_Role"));
        assert!(!is_system_class("Book"));
    }

    #[test]
    fn test_pointer_wire_form() {
        let pointer = Pointer::new("_User", "abc");
        let value = pointer.to_value();
        assert_eq!(value["__type"], "Pointer");
        assert_eq!(Pointer::from_value(&value), Some(pointer));
    }

    #[test]
    fn test_materialized_object_is_not_pointer() {
        let value = json!({"__type": "Object", "className": "_User", "objectId": "abc"});
        assert_eq!(Pointer::from_value(&value), None);

        let value = json!({"__type": "Pointer", "className": "_User"});
        assert_eq!(Pointer::from_value(&value), None);
    }
}
