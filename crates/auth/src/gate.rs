use thiserror::Error;

use crate::{Permission, Principal};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Generic permission check consumed by the calling layers.
pub trait PermissionGate {
    fn has_permission(&self, permission: &Permission) -> bool;
}

impl PermissionGate for Principal {
    fn has_permission(&self, permission: &Permission) -> bool {
        self.permissions()
            .any(|p| p.is_wildcard() || p == permission)
    }
}

/// Check a permission, turning a denial into an error.
///
/// No IO, no panics.
pub fn authorize<G: PermissionGate + ?Sized>(
    gate: &G,
    required: &Permission,
) -> Result<(), AuthzError> {
    if gate.has_permission(required) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;
    use stockflow_core::UserId;

    fn principal(roles: &[Role]) -> Principal {
        Principal::from_roles(Some(UserId::new()), roles.to_vec())
    }

    #[test]
    fn admin_wildcard_grants_everything() {
        let admin = principal(&[Role::ADMIN]);
        assert!(admin.has_permission(&Permission::PRODUCTS_WRITE));
        assert!(admin.has_permission(&Permission::new("anything.else")));
    }

    #[test]
    fn staff_can_read_and_process_but_not_write() {
        let staff = principal(&[Role::STAFF]);
        assert!(staff.has_permission(&Permission::ORDERS_PROCESS));
        assert!(staff.has_permission(&Permission::INVENTORY_READ));
        assert_eq!(
            authorize(&staff, &Permission::ORDERS_WRITE),
            Err(AuthzError::Forbidden("orders.write".to_string()))
        );
    }

    #[test]
    fn manager_manages_orders_and_products() {
        let manager = principal(&[Role::MANAGER]);
        assert!(authorize(&manager, &Permission::ORDERS_WRITE).is_ok());
        assert!(authorize(&manager, &Permission::PRODUCTS_WRITE).is_ok());
    }

    #[test]
    fn roles_combine() {
        let p = principal(&[Role::new("auditor"), Role::STAFF]);
        assert!(p.has_permission(&Permission::ORDERS_READ));
    }

    #[test]
    fn anonymous_has_nothing() {
        let anon = Principal::anonymous();
        assert!(!anon.has_permission(&Permission::PRODUCTS_READ));
        assert!(anon.user_id().is_none());
    }

    #[test]
    fn custom_policy_is_honoured() {
        let p = Principal::with_policy(None, vec![Role::new("reader")], |role| match role {
            "reader" => vec![Permission::PRODUCTS_READ],
            _ => vec![],
        });
        assert!(p.has_permission(&Permission::PRODUCTS_READ));
        assert!(!p.has_permission(&Permission::ORDERS_READ));
    }
}
