//! Trellis Document Types
//!
//! Row identifiers, dotted-path access and the storage encoding of rows.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use trellis_common::{Object, Pointer};

// =============================================================================
// Document ID
// =============================================================================

/// Unique identifier for a stored row (`objectId`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub String);

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a 24-character hexadecimal identifier.
    pub fn generate() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        let seq = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mixed = (nanos ^ seq).wrapping_mul(0x5851_f42d_4c95_7f2d);
        Self(format!(
            "{:012x}{:012x}",
            nanos & 0xffff_ffff_ffff,
            (mixed.wrapping_add(seq)) & 0xffff_ffff_ffff
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// =============================================================================
// Path Access
// =============================================================================

/// Get a value at a dotted path (e.g., "user.address.city").
pub fn get_path<'a>(obj: &'a Object, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = obj.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(arr) => arr.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Set a value at a dotted path, creating intermediate objects.
pub fn set_path(obj: &mut Object, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            obj.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = obj
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Object::new()));
            if !entry.is_object() {
                *entry = Value::Object(Object::new());
            }
            if let Value::Object(child) = entry {
                set_path(child, rest, value);
            }
        }
    }
}

/// Remove the value at a dotted path. Returns the removed value.
pub fn unset_path(obj: &mut Object, path: &str) -> Option<Value> {
    match path.split_once('.') {
        None => obj.remove(path),
        Some((head, rest)) => match obj.get_mut(head) {
            Some(Value::Object(child)) => unset_path(child, rest),
            _ => None,
        },
    }
}

// =============================================================================
// Storage Encoding
// =============================================================================

/// Prefix of columns holding pointers in storage form.
pub const POINTER_PREFIX: &str = "_p_";

/// Encode a row for storage: top-level pointer values move to
/// `_p_<field>` columns holding `Class$objectId`.
pub fn encode_row(row: Object) -> Object {
    row.into_iter()
        .map(|(key, value)| match Pointer::from_value(&value) {
            Some(pointer) => (format!("{}{}", POINTER_PREFIX, key), Value::String(pointer.to_string())),
            None => (key, value),
        })
        .collect()
}

/// Decode a stored row back into its API form.
pub fn decode_row(row: &Object) -> Object {
    row.iter()
        .map(|(key, value)| {
            if let (Some(field), Some(text)) = (key.strip_prefix(POINTER_PREFIX), value.as_str()) {
                if let Some((class_name, object_id)) = text.split_once('$') {
                    return (field.to_string(), Pointer::new(class_name, object_id).to_value());
                }
            }
            (key.clone(), value.clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Object {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_document_id() {
        let id1 = DocumentId::generate();
        let id2 = DocumentId::generate();
        assert_ne!(id1, id2);
        assert_eq!(id1.as_str().len(), 24);
        assert!(id1.as_str().chars().all(|c| c.is_ascii_alphanumeric()));

        let id3 = DocumentId::new("custom-id");
        assert_eq!(id3.as_str(), "custom-id");
    }

    #[test]
    fn test_paths() {
        let mut row = obj(json!({"address": {"city": "NYC"}, "tags": ["a", "b"]}));
        assert_eq!(get_path(&row, "address.city"), Some(&json!("NYC")));
        assert_eq!(get_path(&row, "tags.1"), Some(&json!("b")));
        assert_eq!(get_path(&row, "address.zip"), None);

        set_path(&mut row, "address.zip", json!("10001"));
        set_path(&mut row, "meta.source.kind", json!("import"));
        assert_eq!(row["address"]["zip"], "10001");
        assert_eq!(row["meta"]["source"]["kind"], "import");

        assert_eq!(unset_path(&mut row, "address.city"), Some(json!("NYC")));
        assert_eq!(unset_path(&mut row, "missing.path"), None);
    }

    #[test]
    fn test_pointer_columns() {
        let row = obj(json!({
            "title": "Dune",
            "author": {"__type": "Pointer", "className": "Author", "objectId": "a1"}
        }));
        let stored = encode_row(row.clone());
        assert_eq!(stored["_p_author"], "Author$a1");
        assert!(!stored.contains_key("author"));
        assert_eq!(decode_row(&stored), row);
    }
}
