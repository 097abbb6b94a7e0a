//! Authentication user types.

use crate::db::UserRole;
use crate::jwt::AccessClaims;

/// Caller identity decoded from a valid access token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub claims: AccessClaims,
}

impl AuthenticatedUser {
    pub fn user_id(&self) -> i64 {
        self.claims.sub
    }

    pub fn role(&self) -> UserRole {
        self.claims.role
    }
}
