//! Trellis Query Options
//!
//! Parsing of caller-supplied query options: projection keys, pagination,
//! ordering, include paths, counting and class redirection.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use serde_json::Value;
use trellis_common::{Object, Result, TrellisError};

/// Keys every projection carries.
pub const ALWAYS_SELECTED: [&str; 3] = ["objectId", "createdAt", "updatedAt"];

// =============================================================================
// Query Options
// =============================================================================

/// Parsed query options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    /// Projection. `None` returns whole rows.
    pub keys: Option<Vec<String>>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
    pub order: Vec<String>,
    /// Dotted include paths, prefix-closed and sorted so ancestors come first.
    pub include: Vec<String>,
    pub count: bool,
    pub redirect_class_name_for_key: Option<String>,
}

impl QueryOptions {
    /// Parse an option map. Unknown keys and malformed values fail.
    pub fn parse(options: &Object) -> Result<Self> {
        let mut parsed = Self::default();

        for (name, value) in options {
            match name.as_str() {
                "keys" => {
                    let mut keys = string_list(name, value)?;
                    for key in ALWAYS_SELECTED {
                        if !keys.iter().any(|k| k == key) {
                            keys.push(key.to_string());
                        }
                    }
                    parsed.keys = Some(keys);
                }
                "count" => parsed.count = flag(name, value)?,
                "skip" => parsed.skip = Some(non_negative(name, value)?),
                "limit" => parsed.limit = Some(non_negative(name, value)?),
                "order" => parsed.order = string_list(name, value)?,
                "include" => parsed.include = normalize_include(&string_list(name, value)?),
                "redirectClassNameForKey" => {
                    let key = value.as_str().ok_or_else(|| bad_value(name))?;
                    parsed.redirect_class_name_for_key = Some(key.to_string());
                }
                other => {
                    return Err(TrellisError::InvalidJson(format!("bad option: {}", other)));
                }
            }
        }

        Ok(parsed)
    }
}

/// Explode each path into every non-empty prefix and sort the result.
pub fn normalize_include(paths: &[String]) -> Vec<String> {
    let mut exploded = Vec::new();
    for path in paths {
        let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
        for end in 1..=segments.len() {
            exploded.push(segments[..end].join("."));
        }
    }
    exploded.sort();
    exploded.dedup();
    exploded
}

fn string_list(name: &str, value: &Value) -> Result<Vec<String>> {
    match value {
        Value::String(csv) => Ok(csv
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or_else(|| bad_value(name)))
            .collect(),
        _ => Err(bad_value(name)),
    }
}

fn flag(name: &str, value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => match n.as_u64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(bad_value(name)),
        },
        _ => Err(bad_value(name)),
    }
}

fn non_negative(name: &str, value: &Value) -> Result<usize> {
    value
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| bad_value(name))
}

fn bad_value(name: &str) -> TrellisError {
    TrellisError::InvalidJson(format!("bad value for option {}", name))
}
