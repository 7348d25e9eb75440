use stockflow_auth::{Principal, Role};
use stockflow_core::UserId;

/// Principal context for a request (caller identity + resolved permissions).
///
/// Inserted by [`crate::middleware::principal_middleware`] for every
/// protected route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// Recorded as the actor on movements and activities.
    pub fn user_id(&self) -> Option<UserId> {
        self.principal.user_id()
    }

    pub fn roles(&self) -> &[Role] {
        self.principal.roles()
    }
}
