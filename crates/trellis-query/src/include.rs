//! Trellis Include Expansion
//!
//! Replaces pointers found along a dotted path with the objects they
//! reference. Paths are expanded ancestors first, so a deeper path walks
//! through objects a shallower one already materialized.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::auth::Auth;
use crate::engine::{QueryContext, RestQuery};
use crate::options::QueryOptions;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use trellis_common::{Object, Pointer, Result, USER_CLASS};

/// Expand one include path across a result set.
pub fn include_path(ctx: &QueryContext, auth: &Auth, rows: &mut [Object], path: &[&str], depth: usize) -> Result<()> {
    let mut pointers = Vec::new();
    for row in rows.iter() {
        collect_pointers(row, path, &mut pointers);
    }
    if pointers.is_empty() {
        return Ok(());
    }

    let classes: BTreeSet<&str> = pointers.iter().map(|p| p.class_name.as_str()).collect();
    if classes.len() != 1 {
        tracing::warn!(
            "Include path {} points at several classes ({:?}); skipping",
            path.join("."),
            classes
        );
        return Ok(());
    }
    let class_name = pointers[0].class_name.clone();

    let ids: BTreeSet<&str> = pointers.iter().map(|p| p.object_id.as_str()).collect();
    let where_clause = json!({ "objectId": { "$in": ids.into_iter().collect::<Vec<_>>() } });
    let where_clause = match where_clause {
        Value::Object(object) => object,
        _ => Object::new(),
    };

    let response = RestQuery::nested(
        ctx,
        auth.clone(),
        &class_name,
        where_clause,
        QueryOptions::default(),
        depth + 1,
    )?
    .execute()?;

    let mut replacements = HashMap::new();
    for mut row in response.results {
        if class_name == USER_CLASS {
            row.remove("sessionToken");
        }
        let Some(object_id) = row.get("objectId").and_then(Value::as_str).map(str::to_string) else {
            continue;
        };
        row.insert("__type".to_string(), Value::String("Object".to_string()));
        row.insert("className".to_string(), Value::String(class_name.clone()));
        replacements.insert(object_id, Value::Object(row));
    }

    tracing::debug!(
        "Include {} resolved {} of {} pointers",
        path.join("."),
        replacements.len(),
        pointers.len()
    );

    for row in rows.iter_mut() {
        replace_in_object(row, path, &class_name, &replacements);
    }
    Ok(())
}

// =============================================================================
// Tree Walking
// =============================================================================

fn collect_pointers(object: &Object, path: &[&str], out: &mut Vec<Pointer>) {
    let Some((first, rest)) = path.split_first() else {
        return;
    };
    if let Some(value) = object.get(*first) {
        collect_from_value(value, rest, out);
    }
}

fn collect_from_value(value: &Value, rest: &[&str], out: &mut Vec<Pointer>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_from_value(item, rest, out);
            }
        }
        Value::Object(object) if rest.is_empty() => {
            if let Some(pointer) = Pointer::from_value(value) {
                out.push(pointer);
            } else {
                tracing::trace!("Include target is not a pointer: {:?}", object.get("__type"));
            }
        }
        Value::Object(object) => collect_pointers(object, rest, out),
        _ => {}
    }
}

fn replace_in_object(object: &mut Object, path: &[&str], class_name: &str, replacements: &HashMap<String, Value>) {
    let Some((first, rest)) = path.split_first() else {
        return;
    };
    if let Some(value) = object.get_mut(*first) {
        replace_in_value(value, rest, class_name, replacements);
    }
}

fn replace_in_value(value: &mut Value, rest: &[&str], class_name: &str, replacements: &HashMap<String, Value>) {
    match value {
        Value::Array(items) => {
            for item in items.iter_mut() {
                replace_in_value(item, rest, class_name, replacements);
            }
        }
        Value::Object(_) if rest.is_empty() => {
            let replacement = Pointer::from_value(value)
                .filter(|pointer| pointer.class_name == class_name)
                .and_then(|pointer| replacements.get(&pointer.object_id));
            if let Some(replacement) = replacement {
                *value = replacement.clone();
            }
        }
        Value::Object(object) => replace_in_object(object, rest, class_name, replacements),
        _ => {}
    }
}
