//! Trellis Document Query
//!
//! Where-clause filters for document matching. A where clause is a JSON
//! object mapping field paths to either a literal (equality) or a map of
//! comparison operators, combined with `$and`, `$or` and `$nor`.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::types::get_path;
use serde_json::Value;
use std::cmp::Ordering;
use trellis_common::{Object, Pointer, Result, TrellisError};

/// Compiled size limit for `$regex` patterns.
const REGEX_SIZE_LIMIT: usize = 1024 * 1024;

// =============================================================================
// Filter
// =============================================================================

/// A filter condition.
#[derive(Debug, Clone)]
pub enum Filter {
    Eq { field: String, value: Value },
    Ne { field: String, value: Value },
    Gt { field: String, value: Value },
    Gte { field: String, value: Value },
    Lt { field: String, value: Value },
    Lte { field: String, value: Value },
    In { field: String, values: Vec<Value> },
    Nin { field: String, values: Vec<Value> },
    All { field: String, values: Vec<Value> },
    Exists { field: String, exists: bool },
    Regex { field: String, regex: regex::Regex },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
}

impl Filter {
    /// Compile a where clause into a single filter.
    pub fn parse(clause: &Object) -> Result<Filter> {
        let mut filters = Vec::with_capacity(clause.len());

        for (key, value) in clause {
            match key.as_str() {
                "$and" => filters.push(Filter::And(parse_clause_list(key, value)?)),
                "$or" => filters.push(Filter::Or(parse_clause_list(key, value)?)),
                "$nor" => filters.push(Filter::Nor(parse_clause_list(key, value)?)),
                op if op.starts_with('$') => {
                    return Err(TrellisError::InvalidQuery(format!("bad top-level operator: {}", op)));
                }
                field => parse_field(field, value, &mut filters)?,
            }
        }

        Ok(match filters.len() {
            1 => filters.remove(0),
            _ => Filter::And(filters),
        })
    }

    /// Check if a row matches this filter.
    pub fn matches(&self, row: &Object) -> bool {
        match self {
            Self::Eq { field, value } => get_path(row, field)
                .map(|v| value_matches(v, value))
                .unwrap_or(value.is_null()),
            Self::Ne { field, value } => !get_path(row, field)
                .map(|v| value_matches(v, value))
                .unwrap_or(value.is_null()),
            Self::Gt { field, value } => compare_field(row, field, value, |o| o == Ordering::Greater),
            Self::Gte { field, value } => compare_field(row, field, value, |o| o != Ordering::Less),
            Self::Lt { field, value } => compare_field(row, field, value, |o| o == Ordering::Less),
            Self::Lte { field, value } => compare_field(row, field, value, |o| o != Ordering::Greater),
            Self::In { field, values } => get_path(row, field)
                .map(|v| values.iter().any(|candidate| value_matches(v, candidate)))
                .unwrap_or(false),
            Self::Nin { field, values } => get_path(row, field)
                .map(|v| !values.iter().any(|candidate| value_matches(v, candidate)))
                .unwrap_or(true),
            Self::All { field, values } => match get_path(row, field) {
                Some(Value::Array(items)) => values
                    .iter()
                    .all(|wanted| items.iter().any(|item| values_equal(item, wanted))),
                _ => false,
            },
            Self::Exists { field, exists } => get_path(row, field).is_some() == *exists,
            Self::Regex { field, regex } => match get_path(row, field) {
                Some(Value::String(s)) => regex.is_match(s),
                _ => false,
            },
            Self::And(filters) => filters.iter().all(|f| f.matches(row)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(row)),
            Self::Nor(filters) => !filters.iter().any(|f| f.matches(row)),
        }
    }
}

fn parse_clause_list(op: &str, value: &Value) -> Result<Vec<Filter>> {
    let clauses = value
        .as_array()
        .ok_or_else(|| TrellisError::InvalidQuery(format!("{} expects an array", op)))?;
    clauses
        .iter()
        .map(|clause| {
            clause
                .as_object()
                .ok_or_else(|| TrellisError::InvalidQuery(format!("{} expects objects", op)))
                .and_then(Filter::parse)
        })
        .collect()
}

fn is_operator_map(value: &Value) -> bool {
    match value {
        Value::Object(map) => !map.is_empty() && map.keys().all(|k| k.starts_with('$')),
        _ => false,
    }
}

fn parse_field(field: &str, value: &Value, filters: &mut Vec<Filter>) -> Result<()> {
    if !is_operator_map(value) {
        filters.push(Filter::Eq {
            field: field.to_string(),
            value: value.clone(),
        });
        return Ok(());
    }

    let Value::Object(ops) = value else {
        return Ok(());
    };
    let field = field.to_string();

    for (op, operand) in ops {
        let filter = match op.as_str() {
            "$eq" => Filter::Eq { field: field.clone(), value: operand.clone() },
            "$ne" => Filter::Ne { field: field.clone(), value: operand.clone() },
            "$gt" => Filter::Gt { field: field.clone(), value: operand.clone() },
            "$gte" => Filter::Gte { field: field.clone(), value: operand.clone() },
            "$lt" => Filter::Lt { field: field.clone(), value: operand.clone() },
            "$lte" => Filter::Lte { field: field.clone(), value: operand.clone() },
            "$in" => Filter::In { field: field.clone(), values: operand_array(op, operand)? },
            "$nin" => Filter::Nin { field: field.clone(), values: operand_array(op, operand)? },
            "$all" => Filter::All { field: field.clone(), values: operand_array(op, operand)? },
            "$exists" => Filter::Exists {
                field: field.clone(),
                exists: operand
                    .as_bool()
                    .ok_or_else(|| TrellisError::InvalidQuery("$exists expects a boolean".to_string()))?,
            },
            "$regex" => {
                let pattern = operand
                    .as_str()
                    .ok_or_else(|| TrellisError::InvalidQuery("$regex expects a string".to_string()))?;
                let case_insensitive = ops
                    .get("$options")
                    .and_then(Value::as_str)
                    .map(|o| o.contains('i'))
                    .unwrap_or(false);
                let regex = regex::RegexBuilder::new(pattern)
                    .case_insensitive(case_insensitive)
                    .size_limit(REGEX_SIZE_LIMIT)
                    .build()
                    .map_err(|e| TrellisError::InvalidQuery(format!("invalid regex pattern: {}", e)))?;
                Filter::Regex { field: field.clone(), regex }
            }
            "$options" => continue,
            other => {
                return Err(TrellisError::InvalidQuery(format!(
                    "unsupported operator {} on {}",
                    other, field
                )));
            }
        };
        filters.push(filter);
    }

    Ok(())
}

fn operand_array(op: &str, operand: &Value) -> Result<Vec<Value>> {
    operand
        .as_array()
        .cloned()
        .ok_or_else(|| TrellisError::InvalidQuery(format!("{} expects an array", op)))
}

// =============================================================================
// Value Comparison
// =============================================================================

/// Equality as seen by a query: an array field matches if any element does.
fn value_matches(stored: &Value, wanted: &Value) -> bool {
    if values_equal(stored, wanted) {
        return true;
    }
    match stored {
        Value::Array(items) if !wanted.is_array() => items.iter().any(|item| values_equal(item, wanted)),
        _ => false,
    }
}

/// Structural equality; pointers compare by class and id only, numbers by value.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    if let (Some(pa), Some(pb)) = (Pointer::from_value(a), Pointer::from_value(b)) {
        return pa == pb;
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare_field(row: &Object, field: &str, value: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    get_path(row, field)
        .and_then(|v| compare_values(v, value))
        .map(accept)
        .unwrap_or(false)
}

/// Ordering between two values of the same kind.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Object(a), Value::Object(b)) => match (a.get("iso"), b.get("iso")) {
            (Some(Value::String(x)), Some(Value::String(y))) => Some(x.cmp(y)),
            _ => None,
        },
        _ => None,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_test_row() -> Object {
        json!({
            "objectId": "test",
            "name": "Alice",
            "age": 30,
            "active": true,
            "email": "alice@example.com",
            "tags": ["admin", "staff"],
            "team": {"__type": "Pointer", "className": "Team", "objectId": "t1"}
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    fn filter(clause: Value) -> Filter {
        Filter::parse(clause.as_object().unwrap()).unwrap()
    }

    #[test]
    fn test_eq_filter() {
        let row = create_test_row();
        assert!(filter(json!({"name": "Alice"})).matches(&row));
        assert!(!filter(json!({"name": "Bob"})).matches(&row));
        assert!(filter(json!({"age": 30.0})).matches(&row));
    }

    #[test]
    fn test_comparison_filters() {
        let row = create_test_row();
        assert!(filter(json!({"age": {"$gt": 25}})).matches(&row));
        assert!(!filter(json!({"age": {"$lt": 25}})).matches(&row));
        assert!(filter(json!({"age": {"$gte": 30, "$lte": 30}})).matches(&row));
        assert!(filter(json!({"age": {"$ne": 31}})).matches(&row));
    }

    #[test]
    fn test_array_membership() {
        let row = create_test_row();
        assert!(filter(json!({"tags": "admin"})).matches(&row));
        assert!(filter(json!({"tags": {"$all": ["staff", "admin"]}})).matches(&row));
        assert!(!filter(json!({"tags": {"$all": ["staff", "owner"]}})).matches(&row));
        assert!(filter(json!({"name": {"$in": ["Bob", "Alice"]}})).matches(&row));
        assert!(filter(json!({"name": {"$nin": ["Bob"]}})).matches(&row));
        assert!(!filter(json!({"name": {"$in": []}})).matches(&row));
    }

    #[test]
    fn test_pointer_equality() {
        let row = create_test_row();
        let pointer = json!({"__type": "Pointer", "className": "Team", "objectId": "t1"});
        assert!(filter(json!({"team": pointer})).matches(&row));
        assert!(filter(json!({"team": {"$in": [pointer]}})).matches(&row));
        let other = json!({"__type": "Pointer", "className": "Team", "objectId": "t2"});
        assert!(filter(json!({"team": {"$nin": [other]}})).matches(&row));
    }

    #[test]
    fn test_logical_filters() {
        let row = create_test_row();
        assert!(filter(json!({"$and": [{"name": "Alice"}, {"age": {"$gt": 20}}]})).matches(&row));
        assert!(filter(json!({"$or": [{"name": "Bob"}, {"active": true}]})).matches(&row));
        assert!(!filter(json!({"$nor": [{"name": "Bob"}, {"active": true}]})).matches(&row));
        assert!(filter(json!({})).matches(&row));
    }

    #[test]
    fn test_exists_and_regex() {
        let row = create_test_row();
        assert!(filter(json!({"name": {"$exists": true}})).matches(&row));
        assert!(filter(json!({"missing": {"$exists": false}})).matches(&row));
        assert!(filter(json!({"email": {"$regex": "^ALICE@", "$options": "i"}})).matches(&row));
        assert!(!filter(json!({"email": {"$regex": "^bob"}})).matches(&row));
    }

    #[test]
    fn test_rejects_unknown_operators() {
        let clause = json!({"age": {"$near": 3}});
        assert!(matches!(
            Filter::parse(clause.as_object().unwrap()),
            Err(TrellisError::InvalidQuery(_))
        ));

        let clause = json!({"$where": "this.age > 3"});
        assert!(Filter::parse(clause.as_object().unwrap()).is_err());

        let clause = json!({"age": {"$in": 3}});
        assert!(Filter::parse(clause.as_object().unwrap()).is_err());
    }
}
