//! Trellis Query - Query Engine
//!
//! Executes find requests against a document store on behalf of a caller:
//! scoping by session and ACL, enforcing class access, rewriting sub-query
//! operators and expanding includes.
//!
//! Key Features:
//! - Option parsing with normalized include paths
//! - Session ownership scoping and row-level ACL filtering
//! - Class-level `find` permission enforcement
//! - Depth-bounded `$select` / `$dontSelect` / `$inQuery` / `$notInQuery` rewriting
//! - Pointer include expansion through arrays and nested objects
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod auth;
pub mod desugar;
pub mod engine;
pub mod include;
pub mod options;
pub mod where_tree;

pub use auth::{Auth, RoleProvider, StaticRoleProvider};
pub use engine::{QueryContext, QueryResponse, RestQuery};
pub use options::QueryOptions;
pub use where_tree::{WhereVisitor, LITERAL_OPERATORS, QUERY_OPERATORS};
