//! Authentication user types.

use crate::db::UserRole;
use crate::principal::Principal;

/// The principal behind the request's bearer token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub principal: Principal,
    /// Record ID of the access token that authenticated this request
    pub token_id: i64,
}

impl AuthenticatedUser {
    pub fn user_id(&self) -> i64 {
        self.principal.id
    }

    pub fn is_admin(&self) -> bool {
        self.principal.role == UserRole::Admin
    }
}
