//! Trellis Operator Desugaring
//!
//! Rewrites `$select`, `$dontSelect`, `$inQuery` and `$notInQuery` into
//! plain `$in` / `$nin` constraints by running the embedded query first.
//! One operator is resolved per pass until none remain. The rewrite works
//! on a copy, so a failure leaves the caller's where clause untouched.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::auth::Auth;
use crate::engine::{QueryContext, RestQuery};
use crate::options::QueryOptions;
use crate::where_tree::{node_at_mut, WhereVisitor};
use serde_json::Value;
use trellis_common::{Object, Pointer, Result, TrellisError};

/// Resolve every sub-query operator in a where clause.
pub fn desugar_where(ctx: &QueryContext, auth: &Auth, where_clause: &Object, depth: usize) -> Result<Object> {
    let visitor = WhereVisitor::new(ctx.config.max_where_depth);
    let mut tree = Value::Object(where_clause.clone());
    let mut passes = 0;

    while let Some((path, operator)) = visitor.find_operator(&tree)? {
        if passes >= ctx.config.max_desugar_passes {
            return Err(TrellisError::InvalidQuery(format!(
                "where clause needs more than {} sub-query rewrites",
                ctx.config.max_desugar_passes
            )));
        }
        passes += 1;

        let operand = node_at_mut(&mut tree, &path)
            .and_then(|node| node.get(operator).cloned())
            .ok_or_else(|| TrellisError::InvalidQuery(format!("lost {} while desugaring", operator)))?;

        let (target, values) = match operator {
            "$select" => ("$in", resolve_select(ctx, auth, &operand, operator, depth)?),
            "$dontSelect" => ("$nin", resolve_select(ctx, auth, &operand, operator, depth)?),
            "$inQuery" => ("$in", resolve_in_query(ctx, auth, &operand, operator, depth)?),
            _ => ("$nin", resolve_in_query(ctx, auth, &operand, operator, depth)?),
        };

        let node = node_at_mut(&mut tree, &path)
            .ok_or_else(|| TrellisError::InvalidQuery(format!("lost {} while desugaring", operator)))?;
        merge_values(node, target, values)?;
        node.remove(operator);
    }

    if passes > 0 {
        tracing::debug!("Desugared {} sub-query operators", passes);
    }

    match tree {
        Value::Object(object) => Ok(object),
        _ => Err(TrellisError::InvalidQuery("where clause must be an object".to_string())),
    }
}

/// `{"query": {"className": .., "where": ..}, "key": ..}`: the values of
/// `key` across every row the inner query returns.
fn resolve_select(ctx: &QueryContext, auth: &Auth, operand: &Value, operator: &str, depth: usize) -> Result<Vec<Value>> {
    let operand = exact_shape(operand, operator, ["query", "key"])?;
    let key = operand
        .get("key")
        .and_then(Value::as_str)
        .ok_or_else(|| improper(operator))?;
    let inner = operand
        .get("query")
        .and_then(Value::as_object)
        .ok_or_else(|| improper(operator))?;
    let class_name = inner
        .get("className")
        .and_then(Value::as_str)
        .ok_or_else(|| improper(operator))?;
    let where_clause = match inner.get("where") {
        None => Object::new(),
        Some(Value::Object(where_clause)) => where_clause.clone(),
        Some(_) => return Err(improper(operator)),
    };

    let options = QueryOptions {
        keys: Some(vec![key.to_string()]),
        ..Default::default()
    };
    let response =
        RestQuery::nested(ctx, auth.clone(), class_name, where_clause, options, depth + 1)?.execute()?;

    Ok(response
        .results
        .into_iter()
        .filter_map(|mut row| row.remove(key))
        .collect())
}

/// `{"where": .., "className": ..}`: pointers to every row the inner query
/// returns.
fn resolve_in_query(ctx: &QueryContext, auth: &Auth, operand: &Value, operator: &str, depth: usize) -> Result<Vec<Value>> {
    let operand = exact_shape(operand, operator, ["where", "className"])?;
    let class_name = operand
        .get("className")
        .and_then(Value::as_str)
        .ok_or_else(|| improper(operator))?;
    let where_clause = operand
        .get("where")
        .and_then(Value::as_object)
        .cloned()
        .ok_or_else(|| improper(operator))?;

    let response = RestQuery::nested(
        ctx,
        auth.clone(),
        class_name,
        where_clause,
        QueryOptions::default(),
        depth + 1,
    )?
    .execute()?;

    Ok(response
        .results
        .iter()
        .filter_map(|row| row.get("objectId").and_then(Value::as_str))
        .map(|object_id| Pointer::new(class_name, object_id).to_value())
        .collect())
}

fn exact_shape<'v>(operand: &'v Value, operator: &str, keys: [&str; 2]) -> Result<&'v Object> {
    let object = operand.as_object().ok_or_else(|| improper(operator))?;
    if object.len() != keys.len() || !keys.iter().all(|key| object.contains_key(*key)) {
        return Err(improper(operator));
    }
    Ok(object)
}

/// Append values to an existing `$in` / `$nin` list, or start one.
fn merge_values(node: &mut Object, target: &str, values: Vec<Value>) -> Result<()> {
    match node.get_mut(target) {
        Some(Value::Array(existing)) => existing.extend(values),
        Some(_) => {
            return Err(TrellisError::InvalidQuery(format!("{} must be an array", target)));
        }
        None => {
            node.insert(target.to_string(), Value::Array(values));
        }
    }
    Ok(())
}

fn improper(operator: &str) -> TrellisError {
    TrellisError::InvalidQuery(format!("improper usage of {}", operator))
}
