//! `stockflow-auth` — authorization boundary.
//!
//! Identity is established upstream; this crate only answers "may this
//! principal do X". It is decoupled from HTTP and storage.

pub mod gate;
pub mod permissions;
pub mod policy;
pub mod principal;
pub mod roles;

pub use gate::{AuthzError, PermissionGate, authorize};
pub use permissions::Permission;
pub use policy::default_role_permissions;
pub use principal::Principal;
pub use roles::Role;
