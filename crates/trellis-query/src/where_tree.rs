//! Trellis Where Tree
//!
//! Depth-bounded traversal of a where clause. The visitor locates nodes
//! holding sub-query operators and hands back an explicit path, which the
//! desugarer then resolves with a mutable borrow of just that node.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use serde_json::Value;
use trellis_common::{Object, Result, TrellisError};

/// Operators that embed another query.
pub const QUERY_OPERATORS: [&str; 4] = ["$select", "$dontSelect", "$inQuery", "$notInQuery"];

/// Operators whose operands are literal values. Their contents are never
/// searched, since they may hold data copied out of stored rows.
pub const LITERAL_OPERATORS: [&str; 5] = ["$in", "$nin", "$all", "$eq", "$ne"];

/// One step from a node to a child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Location of a node inside a where tree.
pub type NodePath = Vec<Segment>;

// =============================================================================
// Visitor
// =============================================================================

/// Depth-first visitor with a nesting limit.
#[derive(Debug, Clone, Copy)]
pub struct WhereVisitor {
    max_depth: usize,
}

impl WhereVisitor {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// The first object node (pre-order, key order) holding a sub-query
    /// operator, with the operator found there.
    pub fn find_operator(&self, tree: &Value) -> Result<Option<(NodePath, &'static str)>> {
        let mut path = NodePath::new();
        let found = self.visit(tree, 0, &mut path)?;
        Ok(found.map(|op| (path, op)))
    }

    /// Number of sub-query operators anywhere in the tree, including inside
    /// sub-query operands but not inside literal operands.
    pub fn count_operators(&self, tree: &Value) -> Result<usize> {
        self.count(tree, 0)
    }

    fn visit(&self, node: &Value, depth: usize, path: &mut NodePath) -> Result<Option<&'static str>> {
        self.check_depth(depth)?;

        match node {
            Value::Object(object) => {
                if let Some(op) = QUERY_OPERATORS.into_iter().find(|op| object.contains_key(*op)) {
                    return Ok(Some(op));
                }
                for (key, child) in object {
                    if LITERAL_OPERATORS.contains(&key.as_str()) {
                        continue;
                    }
                    path.push(Segment::Key(key.clone()));
                    if let Some(op) = self.visit(child, depth + 1, path)? {
                        return Ok(Some(op));
                    }
                    path.pop();
                }
                Ok(None)
            }
            Value::Array(items) => {
                for (index, child) in items.iter().enumerate() {
                    path.push(Segment::Index(index));
                    if let Some(op) = self.visit(child, depth + 1, path)? {
                        return Ok(Some(op));
                    }
                    path.pop();
                }
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    fn count(&self, node: &Value, depth: usize) -> Result<usize> {
        self.check_depth(depth)?;

        match node {
            Value::Object(object) => {
                let mut total = 0;
                for (key, child) in object {
                    if LITERAL_OPERATORS.contains(&key.as_str()) {
                        continue;
                    }
                    if QUERY_OPERATORS.contains(&key.as_str()) {
                        total += 1;
                    }
                    total += self.count(child, depth + 1)?;
                }
                Ok(total)
            }
            Value::Array(items) => {
                let mut total = 0;
                for child in items {
                    total += self.count(child, depth + 1)?;
                }
                Ok(total)
            }
            _ => Ok(0),
        }
    }

    fn check_depth(&self, depth: usize) -> Result<()> {
        if depth > self.max_depth {
            return Err(TrellisError::InvalidQuery(format!(
                "where clause is nested deeper than {} levels",
                self.max_depth
            )));
        }
        Ok(())
    }
}

/// Mutable access to the object node at a path.
pub fn node_at_mut<'a>(tree: &'a mut Value, path: &[Segment]) -> Option<&'a mut Object> {
    let mut node = tree;
    for segment in path {
        node = match (segment, node) {
            (Segment::Key(key), Value::Object(object)) => object.get_mut(key)?,
            (Segment::Index(index), Value::Array(items)) => items.get_mut(*index)?,
            _ => return None,
        };
    }
    node.as_object_mut()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_finds_nested_operator() {
        let tree = json!({
            "title": "Dune",
            "$or": [
                {"pages": {"$gt": 100}},
                {"author": {"$inQuery": {"where": {}, "className": "_User"}}}
            ]
        });
        let (path, op) = WhereVisitor::new(64).find_operator(&tree).unwrap().unwrap();
        assert_eq!(op, "$inQuery");
        assert_eq!(
            path,
            vec![
                Segment::Key("$or".into()),
                Segment::Index(1),
                Segment::Key("author".into())
            ]
        );
    }

    #[test]
    fn test_no_operator() {
        let tree = json!({"a": {"$in": [1, 2]}, "b": [{"c": 1}]});
        assert!(WhereVisitor::new(64).find_operator(&tree).unwrap().is_none());
        assert_eq!(WhereVisitor::new(64).count_operators(&tree).unwrap(), 0);
    }

    #[test]
    fn test_counts_operators_inside_subqueries() {
        let tree = json!({
            "a": {"$select": {"query": {"className": "T", "where": {"b": {"$dontSelect": {}}}}, "key": "k"}},
            "c": {"$notInQuery": {}}
        });
        assert_eq!(WhereVisitor::new(64).count_operators(&tree).unwrap(), 3);
    }

    #[test]
    fn test_literal_operands_are_opaque() {
        let stored = json!({"$select": {"query": {"className": "T", "where": {}}, "key": "k"}});
        let visitor = WhereVisitor::new(64);
        for op in LITERAL_OPERATORS {
            let tree = json!({"a": {op: [stored.clone()]}, "b": {op: stored.clone()}});
            assert!(visitor.find_operator(&tree).unwrap().is_none(), "{} searched", op);
            assert_eq!(visitor.count_operators(&tree).unwrap(), 0);
        }

        let tree = json!({"a": {"$in": [stored.clone()]}, "b": {"$inQuery": {}}});
        let (path, op) = visitor.find_operator(&tree).unwrap().unwrap();
        assert_eq!(op, "$inQuery");
        assert_eq!(path, vec![Segment::Key("b".into())]);
    }

    #[test]
    fn test_depth_limit() {
        let mut tree = json!(1);
        for _ in 0..10 {
            tree = json!({"$and": [tree]});
        }
        assert!(WhereVisitor::new(64).find_operator(&tree).is_ok());
        let err = WhereVisitor::new(5).find_operator(&tree).unwrap_err();
        assert!(matches!(err, TrellisError::InvalidQuery(_)));
    }

    #[test]
    fn test_node_at_mut() {
        let mut tree = json!({"$or": [{"a": {"$in": [1]}}]});
        let path = vec![Segment::Key("$or".into()), Segment::Index(0), Segment::Key("a".into())];
        node_at_mut(&mut tree, &path)
            .unwrap()
            .insert("$nin".into(), json!([2]));
        assert_eq!(tree, json!({"$or": [{"a": {"$in": [1], "$nin": [2]}}]}));

        assert!(node_at_mut(&mut tree, &[Segment::Index(0)]).is_none());
    }
}
