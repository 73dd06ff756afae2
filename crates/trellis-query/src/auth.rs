//! Trellis Auth - Caller Capability and Role Resolution
//!
//! The query engine does not authenticate anyone. It receives an [`Auth`]
//! describing the caller (master key, a user row, or nobody) and asks an
//! optional [`RoleProvider`] for the roles that user holds.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use trellis_common::{Object, Result, TrellisError};

/// Prefix of role subjects in ACLs and class-level permissions.
pub const ROLE_PREFIX: &str = "role:";

// =============================================================================
// Role Provider
// =============================================================================

/// Resolves the roles a user holds, directly or through inheritance.
pub trait RoleProvider: Send + Sync {
    /// Bare role names (without the `role:` prefix).
    fn user_roles(&self, user_id: &str) -> Result<Vec<String>>;
}

// =============================================================================
// Auth
// =============================================================================

/// The caller of a request.
#[derive(Clone, Default)]
pub struct Auth {
    pub is_master: bool,
    /// The authenticated user row. Must carry an `objectId`.
    pub user: Option<Object>,
    roles: Option<Arc<dyn RoleProvider>>,
}

impl Auth {
    /// A caller holding the master key.
    pub fn master() -> Self {
        Self {
            is_master: true,
            ..Default::default()
        }
    }

    /// A caller without a session.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A caller authenticated as the given user row.
    pub fn for_user(user: Object) -> Self {
        Self {
            user: Some(user),
            ..Default::default()
        }
    }

    /// Attach a role provider.
    pub fn with_roles(mut self, provider: Arc<dyn RoleProvider>) -> Self {
        self.roles = Some(provider);
        self
    }

    /// Object id of the authenticated user.
    pub fn user_id(&self) -> Option<&str> {
        self.user
            .as_ref()
            .and_then(|user| user.get("objectId"))
            .and_then(Value::as_str)
    }

    /// Roles of the authenticated user as `role:<name>` subjects.
    pub fn user_roles(&self) -> Result<Vec<String>> {
        let (Some(user_id), Some(provider)) = (self.user_id(), self.roles.as_ref()) else {
            return Ok(Vec::new());
        };
        Ok(provider
            .user_roles(user_id)?
            .into_iter()
            .map(|name| format!("{}{}", ROLE_PREFIX, name))
            .collect())
    }

    /// Every subject the caller acts as: its roles followed by its user id.
    /// Anonymous callers have an empty group.
    pub fn acl_group(&self) -> Result<Vec<String>> {
        let Some(user_id) = self.user_id() else {
            return Ok(Vec::new());
        };
        let mut group = self.user_roles()?;
        group.push(user_id.to_string());
        Ok(group)
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Auth")
            .field("is_master", &self.is_master)
            .field("user_id", &self.user_id())
            .field("has_roles", &self.roles.is_some())
            .finish()
    }
}

// =============================================================================
// Static Role Provider
// =============================================================================

/// In-process role table with role inheritance.
#[derive(Default)]
pub struct StaticRoleProvider {
    user_roles: RwLock<HashMap<String, HashSet<String>>>,
    inherits: RwLock<HashMap<String, HashSet<String>>>,
}

impl StaticRoleProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a role to a user.
    pub fn assign_role(&self, user_id: &str, role_name: &str) -> Result<()> {
        validate_role_name(role_name)?;
        self.user_roles
            .write()
            .entry(user_id.to_string())
            .or_default()
            .insert(role_name.to_string());
        Ok(())
    }

    /// Revoke a role from a user. Returns false if the user did not hold it.
    pub fn revoke_role(&self, user_id: &str, role_name: &str) -> bool {
        self.user_roles
            .write()
            .get_mut(user_id)
            .map(|roles| roles.remove(role_name))
            .unwrap_or(false)
    }

    /// Holders of `role_name` also hold `inherited`.
    pub fn add_inheritance(&self, role_name: &str, inherited: &str) -> Result<()> {
        validate_role_name(role_name)?;
        validate_role_name(inherited)?;
        self.inherits
            .write()
            .entry(role_name.to_string())
            .or_default()
            .insert(inherited.to_string());
        Ok(())
    }
}

impl RoleProvider for StaticRoleProvider {
    fn user_roles(&self, user_id: &str) -> Result<Vec<String>> {
        let user_roles = self.user_roles.read();
        let inherits = self.inherits.read();

        let mut resolved = BTreeSet::new();
        let mut pending: Vec<String> = user_roles
            .get(user_id)
            .map(|roles| roles.iter().cloned().collect())
            .unwrap_or_default();

        while let Some(role) = pending.pop() {
            if !resolved.insert(role.clone()) {
                continue;
            }
            if let Some(parents) = inherits.get(&role) {
                pending.extend(parents.iter().filter(|p| !resolved.contains(*p)).cloned());
            }
        }

        Ok(resolved.into_iter().collect())
    }
}

fn validate_role_name(role_name: &str) -> Result<()> {
    let valid = !role_name.is_empty()
        && role_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == ' ');
    if valid {
        Ok(())
    } else {
        Err(TrellisError::InvalidJson(format!("invalid role name: {:?}", role_name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(id: &str) -> Object {
        json!({"objectId": id, "username": "ann"}).as_object().cloned().unwrap()
    }

    #[test]
    fn test_anonymous_and_master() {
        assert!(Auth::master().is_master);
        let anon = Auth::anonymous();
        assert!(!anon.is_master);
        assert_eq!(anon.user_id(), None);
        assert!(anon.acl_group().unwrap().is_empty());
    }

    #[test]
    fn test_acl_group() {
        let roles = Arc::new(StaticRoleProvider::new());
        roles.assign_role("u1", "staff").unwrap();

        let auth = Auth::for_user(user("u1")).with_roles(roles);
        assert_eq!(auth.user_id(), Some("u1"));
        assert_eq!(auth.acl_group().unwrap(), vec!["role:staff".to_string(), "u1".to_string()]);

        let without_provider = Auth::for_user(user("u2"));
        assert_eq!(without_provider.acl_group().unwrap(), vec!["u2".to_string()]);
    }

    #[test]
    fn test_role_inheritance() {
        let roles = StaticRoleProvider::new();
        roles.assign_role("u1", "moderator").unwrap();
        roles.add_inheritance("moderator", "member").unwrap();
        roles.add_inheritance("member", "guest").unwrap();
        roles.add_inheritance("guest", "moderator").unwrap();

        assert_eq!(
            roles.user_roles("u1").unwrap(),
            vec!["guest".to_string(), "member".to_string(), "moderator".to_string()]
        );
        assert!(roles.user_roles("nobody").unwrap().is_empty());
    }

    #[test]
    fn test_revoke_role() {
        let roles = StaticRoleProvider::new();
        roles.assign_role("u1", "staff").unwrap();
        assert!(roles.revoke_role("u1", "staff"));
        assert!(!roles.revoke_role("u1", "staff"));
        assert!(roles.user_roles("u1").unwrap().is_empty());
        assert!(roles.assign_role("u1", "bad:name").is_err());
    }
}
