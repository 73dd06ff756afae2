//! Trellis Document Update
//!
//! Update operators applied to stored rows.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::types::{set_path, unset_path};
use serde_json::Value;
use trellis_common::{Object, Result, TrellisError};

/// A single update operation.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    Set { path: String, value: Value },
    Unset { path: String },
}

/// A parsed update document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Update {
    pub ops: Vec<UpdateOp>,
}

impl Update {
    /// Parse `{"$set": {..}, "$unset": {..}}`.
    pub fn parse(update: &Object) -> Result<Self> {
        let mut ops = Vec::new();

        for (op, fields) in update {
            let fields = fields.as_object().ok_or_else(|| {
                TrellisError::Storage(format!("update operator {} expects an object", op))
            })?;
            match op.as_str() {
                "$set" => ops.extend(fields.iter().map(|(path, value)| UpdateOp::Set {
                    path: path.clone(),
                    value: value.clone(),
                })),
                "$unset" => ops.extend(fields.keys().map(|path| UpdateOp::Unset { path: path.clone() })),
                other => {
                    return Err(TrellisError::Storage(format!("unsupported update operator: {}", other)));
                }
            }
        }

        Ok(Self { ops })
    }

    /// Apply every operation to a row.
    pub fn apply(&self, row: &mut Object) {
        for op in &self.ops {
            match op {
                UpdateOp::Set { path, value } => set_path(row, path, value.clone()),
                UpdateOp::Unset { path } => {
                    unset_path(row, path);
                }
            }
        }
    }

    /// Build a fresh row from the `$set` operations only.
    pub fn to_insert(&self) -> Object {
        let mut row = Object::new();
        for op in &self.ops {
            if let UpdateOp::Set { path, value } = op {
                set_path(&mut row, path, value.clone());
            }
        }
        row
    }
}
