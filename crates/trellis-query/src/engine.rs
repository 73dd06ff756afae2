//! Trellis Query Engine
//!
//! Runs one find request through a fixed pipeline: option parsing, session
//! and ACL scoping, class redirection, the class access guard, sub-query
//! desugaring, the find itself, an optional count and include expansion.
//! A failure at any stage aborts the request.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::auth::Auth;
use crate::desugar::desugar_where;
use crate::include::include_path;
use crate::options::QueryOptions;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use trellis_common::{Object, Pointer, QueryConfig, Result, TrellisError, SESSION_CLASS, USER_CLASS};
use trellis_document::{DocumentStore, FindOptions};
use trellis_schema::{ClpOperation, SchemaStore};

// =============================================================================
// Query Context
// =============================================================================

/// Shared collaborators of every query.
pub struct QueryContext {
    pub schema: Arc<SchemaStore>,
    pub store: Arc<dyn DocumentStore>,
    pub config: QueryConfig,
}

impl QueryContext {
    pub fn new(schema: Arc<SchemaStore>, store: Arc<dyn DocumentStore>, config: QueryConfig) -> Self {
        Self {
            schema,
            store,
            config,
        }
    }

    /// Build and run a query in one call.
    pub fn find(&self, auth: &Auth, class_name: &str, where_clause: &Object, options: &Object) -> Result<QueryResponse> {
        RestQuery::new(self, auth.clone(), class_name, where_clause.clone(), options)?.execute()
    }
}

/// Response envelope of a query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub results: Vec<Object>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub count: Option<u64>,
}

// =============================================================================
// Rest Query
// =============================================================================

/// One query request.
pub struct RestQuery<'a> {
    ctx: &'a QueryContext,
    auth: Auth,
    class_name: String,
    where_clause: Object,
    options: QueryOptions,
    find_options: FindOptions,
    acl_group: Vec<String>,
    depth: usize,
}

impl<'a> RestQuery<'a> {
    /// Parse options and scope the where clause for the caller.
    pub fn new(
        ctx: &'a QueryContext,
        auth: Auth,
        class_name: &str,
        where_clause: Object,
        options: &Object,
    ) -> Result<Self> {
        let options = QueryOptions::parse(options)?;
        Self::nested(ctx, auth, class_name, where_clause, options, 0)
    }

    /// A query issued on behalf of another query, `depth` levels down.
    pub(crate) fn nested(
        ctx: &'a QueryContext,
        auth: Auth,
        class_name: &str,
        where_clause: Object,
        options: QueryOptions,
        depth: usize,
    ) -> Result<Self> {
        if depth > ctx.config.max_subquery_depth {
            return Err(TrellisError::InvalidQuery(format!(
                "sub-queries nested deeper than {} levels",
                ctx.config.max_subquery_depth
            )));
        }

        let acl_group = if auth.is_master { Vec::new() } else { auth.acl_group()? };
        let mut query = Self {
            ctx,
            auth,
            class_name: class_name.to_string(),
            where_clause,
            options,
            find_options: FindOptions::default(),
            acl_group,
            depth,
        };
        query.scope_for_caller()?;
        Ok(query)
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn where_clause(&self) -> &Object {
        &self.where_clause
    }

    pub fn find_options(&self) -> &FindOptions {
        &self.find_options
    }

    /// Run the pipeline.
    pub fn execute(mut self) -> Result<QueryResponse> {
        self.redirect_class_name_for_key()?;
        self.validate_class_access()?;

        self.where_clause = desugar_where(self.ctx, &self.auth, &self.where_clause, self.depth)?;

        let mut results = self.run_find()?;
        let count = self.run_count()?;
        self.handle_includes(&mut results)?;

        Ok(QueryResponse { results, count })
    }

    // -------------------------------------------------------------------------
    // Scoping
    // -------------------------------------------------------------------------

    fn scope_for_caller(&mut self) -> Result<()> {
        if self.auth.is_master {
            return Ok(());
        }

        if self.class_name == SESSION_CLASS {
            let user_id = self.auth.user_id().ok_or_else(|| {
                TrellisError::InvalidSessionToken("This session token is invalid.".to_string())
            })?;
            let owner = json!({ "user": Pointer::new(USER_CLASS, user_id).to_value() });
            let original = std::mem::take(&mut self.where_clause);
            self.where_clause
                .insert("$and".to_string(), json!([Value::Object(original), owner]));
            return Ok(());
        }

        self.find_options.acl = Some(self.acl_group.clone());
        Ok(())
    }

    fn redirect_class_name_for_key(&mut self) -> Result<()> {
        let Some(key) = self.options.redirect_class_name_for_key.as_deref() else {
            return Ok(());
        };
        let target = self.ctx.schema.redirect_class_name_for_key(&self.class_name, key)?;
        if target != self.class_name {
            tracing::debug!("Redirected query on {}.{} to {}", self.class_name, key, target);
            self.class_name = target;
        }
        Ok(())
    }

    fn validate_class_access(&self) -> Result<()> {
        if self.auth.is_master {
            return Ok(());
        }

        if !self.ctx.config.allow_client_class_creation
            && !self.ctx.schema.defaults().is_system_class(&self.class_name)
            && !self.ctx.schema.has_class(&self.class_name)?
        {
            return Err(TrellisError::OperationForbidden(format!(
                "This user is not allowed to access non-existent class: {}",
                self.class_name
            )));
        }

        self.ctx
            .schema
            .validate_permission(&self.class_name, &self.acl_group, ClpOperation::Find)
    }

    // -------------------------------------------------------------------------
    // Execution
    // -------------------------------------------------------------------------

    fn run_find(&self) -> Result<Vec<Object>> {
        let options = FindOptions {
            skip: self.options.skip,
            limit: self.options.limit,
            sort: self.options.order.clone(),
            count: false,
            ..self.find_options.clone()
        };

        let mut rows = self
            .ctx
            .store
            .find(&self.class_name, &self.where_clause, &options)?
            .into_rows();

        if self.class_name == USER_CLASS {
            for row in rows.iter_mut() {
                row.remove("password");
            }
        }

        if let Some(keys) = &self.options.keys {
            rows = rows.into_iter().map(|row| project(row, keys)).collect();
        }

        tracing::debug!("Query on {} returned {} rows", self.class_name, rows.len());
        Ok(rows)
    }

    fn run_count(&self) -> Result<Option<u64>> {
        if !self.options.count {
            return Ok(None);
        }

        let options = FindOptions {
            skip: None,
            limit: None,
            sort: Vec::new(),
            count: true,
            ..self.find_options.clone()
        };
        let count = self
            .ctx
            .store
            .find(&self.class_name, &self.where_clause, &options)?
            .count();
        Ok(Some(count))
    }

    fn handle_includes(&self, results: &mut [Object]) -> Result<()> {
        for path in &self.options.include {
            let segments: Vec<&str> = path.split('.').collect();
            tracing::debug!("Expanding include path {} on {}", path, self.class_name);
            include_path(self.ctx, &self.auth, results, &segments, self.depth)?;
        }
        Ok(())
    }
}

/// Keep only the requested keys that are present. A dotted key keeps its
/// top-level field.
fn project(row: Object, keys: &[String]) -> Object {
    let wanted = |field: &str| {
        keys.iter()
            .any(|key| key == field || key.split('.').next() == Some(field))
    };
    row.into_iter().filter(|(field, _)| wanted(field.as_str())).collect()
}
