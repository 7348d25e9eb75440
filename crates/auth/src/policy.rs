use crate::Permission;

/// Built-in role → permission mapping.
///
/// Unknown roles grant nothing.
pub fn default_role_permissions(role: &str) -> Vec<Permission> {
    match role {
        "admin" => vec![Permission::WILDCARD],
        "manager" => vec![
            Permission::PRODUCTS_READ,
            Permission::PRODUCTS_WRITE,
            Permission::ORDERS_READ,
            Permission::ORDERS_WRITE,
            Permission::ORDERS_PROCESS,
            Permission::INVENTORY_READ,
            Permission::ACTIVITIES_READ,
        ],
        "staff" => vec![
            Permission::PRODUCTS_READ,
            Permission::ORDERS_READ,
            Permission::ORDERS_PROCESS,
            Permission::INVENTORY_READ,
            Permission::ACTIVITIES_READ,
        ],
        _ => Vec::new(),
    }
}
