//! Token authority: credential checks, token issuance and refresh rotation.
//!
//! Every successful register/login/refresh ends in [`TokenAuthority::issue`],
//! which mints an access/refresh pair and persists a refresh record. A refresh
//! record is spent the moment it is presented: rotation revokes it before the
//! replacement pair is minted, so a stolen refresh token is good for one use.

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::db::{Database, NewUser, RepositoryError, User, UserRole};
use crate::jwt::{AccessClaims, AccessTokenResult, JwtConfig, RefreshTokenResult, unix_now};
use crate::password::{hash_password, prepare_dummy_hash, verify_dummy, verify_password};
use crate::validation::{FieldError, normalize_email, validate_login, validate_registration};
use crate::wire::{AuthData, UserProfile};

/// Domain failures of the authority, mapped to HTTP statuses at the API edge.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Validation failed")]
    Validation(Vec<FieldError>),
    #[error("{0}")]
    Conflict(&'static str),
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0}")]
    NotFound(&'static str),
    #[error("{0}")]
    Internal(&'static str),
}

/// Generic message for every token failure; details stay in the logs.
pub const INVALID_TOKEN: &str = "Invalid or expired token";
const INVALID_CREDENTIALS: &str = "Invalid credentials";
const REFRESH_TOKEN_REQUIRED: &str = "Refresh token required";

trait RepoResultExt<T> {
    fn repo_err(self, context: &str) -> Result<T, AuthError>;
}

impl<T> RepoResultExt<T> for Result<T, RepositoryError> {
    fn repo_err(self, context: &str) -> Result<T, AuthError> {
        self.map_err(|e| {
            error!(error = %e, "{}", context);
            AuthError::Internal("Database error")
        })
    }
}

/// A freshly minted token pair and the user it belongs to.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub user: UserProfile,
    pub access: AccessTokenResult,
    pub refresh: RefreshTokenResult,
}

impl IssuedTokens {
    pub fn into_auth_data(self) -> AuthData {
        AuthData {
            user: self.user,
            access_token: self.access.token,
            refresh_token: self.refresh.token,
        }
    }
}

pub struct TokenAuthority {
    db: Database,
    jwt: Arc<JwtConfig>,
}

impl TokenAuthority {
    pub fn new(db: Database, jwt: Arc<JwtConfig>) -> Self {
        prepare_dummy_hash();
        Self { db, jwt }
    }

    /// Mint an access/refresh pair for `user` and persist the refresh record.
    pub async fn issue(&self, user: &User) -> Result<IssuedTokens, AuthError> {
        let access = self
            .jwt
            .generate_access_token(user.id, &user.email, user.role)
            .map_err(|e| {
                error!(error = %e, "Failed to generate access token");
                AuthError::Internal("Failed to generate token")
            })?;

        let refresh = self.jwt.generate_refresh_token(user.id).map_err(|e| {
            error!(error = %e, "Failed to generate refresh token");
            AuthError::Internal("Failed to generate token")
        })?;

        self.db
            .tokens()
            .create(user.id, &refresh.token, &refresh.jti, refresh.expires_at)
            .await
            .repo_err("Failed to store refresh token")?;

        Ok(IssuedTokens {
            user: UserProfile {
                id: user.id,
                email: user.email.clone(),
                role: user.role,
            },
            access,
            refresh,
        })
    }

    /// Create a `USER` account and issue its first token pair.
    pub async fn register(&self, email: &str, password: &str) -> Result<IssuedTokens, AuthError> {
        let email = normalize_email(email);
        validate_registration(&email, password).map_err(AuthError::Validation)?;

        let user = self.create_user(&email, password, UserRole::User).await?;
        info!(user_id = user.id, "User registered");

        self.issue(&user).await
    }

    /// Create a user with the given role. Used by registration and the admin bootstrap.
    pub async fn create_user(
        &self,
        email: &str,
        password: &str,
        role: UserRole,
    ) -> Result<User, AuthError> {
        let email = normalize_email(email);

        if self
            .db
            .users()
            .get_by_email(&email)
            .await
            .repo_err("Failed to look up user")?
            .is_some()
        {
            return Err(AuthError::Conflict("Email already in use"));
        }

        let password_hash = hash_password(password).map_err(|e| {
            error!(error = %e, "Failed to hash password");
            AuthError::Internal("Failed to create user")
        })?;

        let id = match self
            .db
            .users()
            .create(NewUser {
                email: &email,
                password_hash: &password_hash,
                role,
            })
            .await
        {
            Ok(id) => id,
            // Lost a race with a concurrent registration of the same email
            Err(RepositoryError::Conflict) => {
                return Err(AuthError::Conflict("Email already in use"));
            }
            Err(e) => return Err(e).repo_err("Failed to create user"),
        };

        Ok(User {
            id,
            email,
            password_hash,
            role,
        })
    }

    /// Check credentials and issue a token pair.
    ///
    /// Unknown email and wrong password produce the same error.
    pub async fn login(&self, email: &str, password: &str) -> Result<IssuedTokens, AuthError> {
        let email = normalize_email(email);
        validate_login(&email, password).map_err(AuthError::Validation)?;

        let Some(user) = self
            .db
            .users()
            .get_by_email(&email)
            .await
            .repo_err("Failed to look up user")?
        else {
            verify_dummy(password);
            return Err(AuthError::Unauthorized(INVALID_CREDENTIALS));
        };

        let matches = verify_password(password, &user.password_hash).map_err(|e| {
            error!(user_id = user.id, error = %e, "Stored password hash unusable");
            AuthError::Internal("Failed to verify credentials")
        })?;

        if !matches {
            return Err(AuthError::Unauthorized(INVALID_CREDENTIALS));
        }

        self.issue(&user).await
    }

    /// Exchange a refresh token for a new pair, revoking the presented one.
    pub async fn refresh(&self, token: Option<&str>) -> Result<IssuedTokens, AuthError> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::Unauthorized(REFRESH_TOKEN_REQUIRED))?;

        let claims = self.jwt.validate_refresh_token(token).map_err(|e| {
            warn!(error = %e, "Rejected refresh token");
            AuthError::Unauthorized(INVALID_TOKEN)
        })?;

        let tokens = self.db.tokens();
        let record = tokens
            .find_active(token)
            .await
            .repo_err("Failed to look up refresh token")?
            .ok_or_else(|| {
                warn!(user_id = claims.sub, jti = %claims.jti, "Refresh token reused or revoked");
                AuthError::Unauthorized(INVALID_TOKEN)
            })?;

        let now = unix_now().map_err(|_| AuthError::Internal("System time error"))?;
        if record.is_expired_at(now) {
            tokens
                .revoke_if_current(&record)
                .await
                .repo_err("Failed to revoke expired refresh token")?;
            info!(user_id = record.user_id, "Burned expired refresh token");
            return Err(AuthError::Unauthorized(INVALID_TOKEN));
        }

        if !tokens
            .revoke_if_current(&record)
            .await
            .repo_err("Failed to rotate refresh token")?
        {
            warn!(user_id = record.user_id, "Lost refresh rotation race");
            return Err(AuthError::Unauthorized(INVALID_TOKEN));
        }

        let user = match self.db.users().require_by_id(record.user_id).await {
            Ok(user) => user,
            Err(RepositoryError::NotFound) => return Err(AuthError::NotFound("User not found")),
            Err(e) => return Err(e).repo_err("Failed to look up user"),
        };

        self.issue(&user).await
    }

    /// Revoke the presented refresh token if it is known. Never fails.
    pub async fn logout(&self, token: Option<&str>) {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return;
        };

        match self.db.tokens().revoke_by_token(token).await {
            Ok(0) => {}
            Ok(_) => info!("Refresh token revoked on logout"),
            Err(e) => warn!(error = %e, "Failed to revoke refresh token on logout"),
        }
    }

    /// Verify an access token's signature and expiry. No database access.
    pub fn validate(&self, access_token: &str) -> Result<AccessClaims, AuthError> {
        self.jwt
            .validate_access_token(access_token)
            .map_err(|_| AuthError::Unauthorized(INVALID_TOKEN))
    }
}
