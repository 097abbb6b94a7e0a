//! JWT token generation and validation.
//!
//! Access and refresh tokens are signed with separate secrets so a leaked
//! refresh secret cannot mint API credentials and vice versa.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::db::UserRole;

/// Token type for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Short-lived access token, validated without a database lookup
    Access,
    /// Long-lived refresh token, tracked in the database by token string and JTI
    Refresh,
}

/// JWT claims for access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user ID)
    pub sub: i64,
    /// User role
    pub role: UserRole,
    /// User email
    pub email: String,
    /// Token type
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// JWT claims for refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// JWT ID, keeps two tokens minted in the same second distinct
    pub jti: String,
    /// Subject (user ID)
    pub sub: i64,
    /// Token type
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Access token duration: 15 minutes
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 15 * 60;

/// Refresh token duration: 7 days
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

/// Lifetimes applied when minting tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetimes {
    pub access_secs: u64,
    pub refresh_secs: u64,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access_secs: ACCESS_TOKEN_DURATION_SECS,
            refresh_secs: REFRESH_TOKEN_DURATION_SECS,
        }
    }
}

/// Configuration for JWT operations.
#[derive(Clone)]
pub struct JwtConfig {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    lifetimes: TokenLifetimes,
}

/// Result of generating an access token.
#[derive(Debug, Clone)]
pub struct AccessTokenResult {
    /// The JWT token string
    pub token: String,
    /// Token duration in seconds
    pub duration: u64,
}

/// Result of generating a refresh token.
#[derive(Debug, Clone)]
pub struct RefreshTokenResult {
    /// The JWT token string
    pub token: String,
    /// JWT ID
    pub jti: String,
    /// Issued at timestamp (Unix seconds)
    pub issued_at: u64,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Token duration in seconds
    pub duration: u64,
}

/// Current Unix time in seconds.
pub fn unix_now() -> Result<u64, JwtError> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| JwtError::TimeError)?
        .as_secs())
}

impl JwtConfig {
    /// Create a new JWT configuration with default lifetimes.
    pub fn new(access_secret: &[u8], refresh_secret: &[u8]) -> Self {
        Self::with_lifetimes(access_secret, refresh_secret, TokenLifetimes::default())
    }

    pub fn with_lifetimes(
        access_secret: &[u8],
        refresh_secret: &[u8],
        lifetimes: TokenLifetimes,
    ) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(access_secret),
            access_decoding: DecodingKey::from_secret(access_secret),
            refresh_encoding: EncodingKey::from_secret(refresh_secret),
            refresh_decoding: DecodingKey::from_secret(refresh_secret),
            lifetimes,
        }
    }

    pub fn lifetimes(&self) -> TokenLifetimes {
        self.lifetimes
    }

    /// Generate an access token for a user.
    pub fn generate_access_token(
        &self,
        user_id: i64,
        email: &str,
        role: UserRole,
    ) -> Result<AccessTokenResult, JwtError> {
        let now = unix_now()?;
        let duration = self.lifetimes.access_secs;

        let claims = AccessClaims {
            sub: user_id,
            role,
            email: email.to_string(),
            token_type: TokenType::Access,
            iat: now,
            exp: now + duration,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.access_encoding)
            .map_err(JwtError::Encoding)?;

        Ok(AccessTokenResult { token, duration })
    }

    /// Generate a refresh token for a user.
    pub fn generate_refresh_token(&self, user_id: i64) -> Result<RefreshTokenResult, JwtError> {
        let now = unix_now()?;
        let duration = self.lifetimes.refresh_secs;

        let jti = uuid::Uuid::new_v4().to_string();
        let exp = now + duration;

        let claims = RefreshClaims {
            jti: jti.clone(),
            sub: user_id,
            token_type: TokenType::Refresh,
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.refresh_encoding)
            .map_err(JwtError::Encoding)?;

        Ok(RefreshTokenResult {
            token,
            jti,
            issued_at: now,
            expires_at: exp,
            duration,
        })
    }

    /// Validate and decode an access token.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessClaims, JwtError> {
        let token_data =
            jsonwebtoken::decode::<AccessClaims>(token, &self.access_decoding, &strict_hs256())
                .map_err(JwtError::Decoding)?;

        if token_data.claims.token_type != TokenType::Access {
            return Err(JwtError::WrongTokenType);
        }

        Ok(token_data.claims)
    }

    /// Validate and decode a refresh token.
    pub fn validate_refresh_token(&self, token: &str) -> Result<RefreshClaims, JwtError> {
        let token_data =
            jsonwebtoken::decode::<RefreshClaims>(token, &self.refresh_decoding, &strict_hs256())
                .map_err(JwtError::Decoding)?;

        if token_data.claims.token_type != TokenType::Refresh {
            return Err(JwtError::WrongTokenType);
        }

        Ok(token_data.claims)
    }
}

fn strict_hs256() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation
}

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Failed to encode token: {0}")]
    Encoding(jsonwebtoken::errors::Error),
    #[error("Failed to decode token: {0}")]
    Decoding(jsonwebtoken::errors::Error),
    #[error("System time error")]
    TimeError,
    /// e.g. a refresh token presented where an access token is expected
    #[error("Wrong token type")]
    WrongTokenType,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> JwtConfig {
        JwtConfig::new(b"test-access-secret", b"test-refresh-secret")
    }

    #[test]
    fn test_generate_and_validate_access_token() {
        let config = config();

        let result = config
            .generate_access_token(42, "alice@example.com", UserRole::User)
            .unwrap();

        assert_eq!(result.duration, ACCESS_TOKEN_DURATION_SECS);

        let claims = config.validate_access_token(&result.token).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.email, "alice@example.com");
        assert_eq!(claims.role, UserRole::User);
        assert_eq!(claims.token_type, TokenType::Access);
        assert_eq!(claims.exp - claims.iat, ACCESS_TOKEN_DURATION_SECS);
    }

    #[test]
    fn test_generate_and_validate_refresh_token() {
        let config = config();

        let result = config.generate_refresh_token(42).unwrap();

        assert_eq!(result.duration, REFRESH_TOKEN_DURATION_SECS);
        assert_eq!(result.expires_at - result.issued_at, REFRESH_TOKEN_DURATION_SECS);

        let claims = config.validate_refresh_token(&result.token).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.token_type, TokenType::Refresh);
        assert_eq!(claims.jti, result.jti);
    }

    #[test]
    fn test_tokens_not_interchangeable() {
        let config = config();

        let access = config
            .generate_access_token(1, "alice@example.com", UserRole::User)
            .unwrap();
        let refresh = config.generate_refresh_token(1).unwrap();

        assert!(config.validate_refresh_token(&access.token).is_err());
        assert!(config.validate_access_token(&refresh.token).is_err());
    }

    #[test]
    fn test_same_secret_still_checks_type() {
        let config = JwtConfig::new(b"shared-secret", b"shared-secret");

        let refresh = config.generate_refresh_token(1).unwrap();
        assert!(config.validate_access_token(&refresh.token).is_err());
    }

    #[test]
    fn test_admin_role_in_token() {
        let config = config();

        let result = config
            .generate_access_token(7, "root@example.com", UserRole::Admin)
            .unwrap();

        let claims = config.validate_access_token(&result.token).unwrap();
        assert_eq!(claims.role, UserRole::Admin);
    }

    #[test]
    fn test_invalid_token() {
        assert!(config().validate_access_token("invalid-token").is_err());
    }

    #[test]
    fn test_wrong_secret() {
        let config1 = JwtConfig::new(b"secret-1", b"refresh-1");
        let config2 = JwtConfig::new(b"secret-2", b"refresh-2");

        let result = config1
            .generate_access_token(1, "alice@example.com", UserRole::User)
            .unwrap();

        assert!(config2.validate_access_token(&result.token).is_err());
    }

    #[test]
    fn test_expired_token() {
        let secret = b"test-secret";
        let encoding_key = EncodingKey::from_secret(secret);
        let now = unix_now().unwrap();

        let claims = AccessClaims {
            sub: 1,
            role: UserRole::User,
            email: "alice@example.com".to_string(),
            token_type: TokenType::Access,
            iat: now - 100,
            exp: now - 50,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &encoding_key).unwrap();

        let config = JwtConfig::new(secret, b"refresh");
        assert!(config.validate_access_token(&token).is_err());
    }

    #[test]
    fn test_custom_lifetimes() {
        let config = JwtConfig::with_lifetimes(
            b"a",
            b"r",
            TokenLifetimes {
                access_secs: 30,
                refresh_secs: 60,
            },
        );

        assert_eq!(
            config
                .generate_access_token(1, "a@example.com", UserRole::User)
                .unwrap()
                .duration,
            30
        );
        assert_eq!(config.generate_refresh_token(1).unwrap().duration, 60);
    }

    #[test]
    fn test_unique_jti_per_refresh_token() {
        let config = config();

        let result1 = config.generate_refresh_token(1).unwrap();
        let result2 = config.generate_refresh_token(1).unwrap();

        assert_ne!(result1.jti, result2.jti);
        assert_ne!(result1.token, result2.token);
    }
}
