use std::collections::HashSet;

use stockflow_core::UserId;

use crate::{Permission, Role, default_role_permissions};

/// An identified caller with its effective permissions resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    user_id: Option<UserId>,
    roles: Vec<Role>,
    permissions: HashSet<Permission>,
}

impl Principal {
    /// Resolve permissions for `roles` with the built-in policy.
    pub fn from_roles(user_id: Option<UserId>, roles: Vec<Role>) -> Self {
        Self::with_policy(user_id, roles, default_role_permissions)
    }

    pub fn with_policy<F>(user_id: Option<UserId>, roles: Vec<Role>, policy: F) -> Self
    where
        F: Fn(&str) -> Vec<Permission>,
    {
        let permissions = roles.iter().flat_map(|r| policy(r.as_str())).collect();
        Self {
            user_id,
            roles,
            permissions,
        }
    }

    /// Caller without identity or roles.
    pub fn anonymous() -> Self {
        Self::from_roles(None, Vec::new())
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn permissions(&self) -> impl Iterator<Item = &Permission> {
        self.permissions.iter()
    }
}
