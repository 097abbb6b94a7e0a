//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::auth::CookieSettings;
use crate::authority::{AuthError, TokenAuthority};
use crate::db::{Database, UserRole};
use crate::jwt::{ACCESS_TOKEN_DURATION_SECS, REFRESH_TOKEN_DURATION_SECS, TokenLifetimes};
use crate::rate_limit::DEFAULT_AUTH_PER_MINUTE;
use axum::http::HeaderValue;
use clap::Parser;
use tracing::{error, info};
use url::Url;

const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "storefront-auth",
    about = "Token authority for the storefront API"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "4000")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "DATABASE_PATH", default_value = "storefront.db")]
    pub database: String,

    /// Path to file containing the access token secret. Prefer JWT_ACCESS_SECRET
    #[arg(long)]
    pub access_secret_file: Option<String>,

    /// Path to file containing the refresh token secret. Prefer JWT_REFRESH_SECRET
    #[arg(long)]
    pub refresh_secret_file: Option<String>,

    /// Access token lifetime in seconds
    #[arg(long, env = "JWT_ACCESS_TTL_SECS", default_value_t = ACCESS_TOKEN_DURATION_SECS)]
    pub access_ttl_secs: u64,

    /// Refresh token lifetime in seconds
    #[arg(long, env = "JWT_REFRESH_TTL_SECS", default_value_t = REFRESH_TOKEN_DURATION_SECS)]
    pub refresh_ttl_secs: u64,

    /// Set the Secure attribute on auth cookies
    #[arg(long, env = "COOKIE_SECURE")]
    pub cookie_secure: bool,

    /// Domain attribute for auth cookies
    #[arg(long, env = "COOKIE_DOMAIN")]
    pub cookie_domain: Option<String>,

    /// Browser origin allowed to call the API with credentials
    #[arg(long, env = "CLIENT_ORIGIN", default_value = "http://localhost:5173")]
    pub client_origin: String,

    /// Register/login attempts per minute per client IP
    #[arg(long, env = "AUTH_RATE_LIMIT_PER_MINUTE", default_value_t = DEFAULT_AUTH_PER_MINUTE)]
    pub auth_rate_limit: u32,

    /// Create an admin user from ADMIN_EMAIL and ADMIN_PASSWORD on startup
    #[arg(long)]
    pub create_admin: bool,

    #[arg(long, env = "ADMIN_EMAIL", hide = true)]
    pub admin_email: Option<String>,

    #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true, hide = true)]
    pub admin_password: Option<String>,

    /// Log output format
    #[arg(short, long, env = "LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load a signing secret from an environment variable or a file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_secret(env_var: &str, secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var(env_var) {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(env_var) };
        secret
    } else if let Some(path) = secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read secret file");
                return None;
            }
        }
    } else {
        error!(
            "{} is required. Set the environment variable (recommended) or pass a secret file",
            env_var
        );
        return None;
    };

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "{} is shorter than {} characters. Use a longer secret",
            env_var, MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Load both signing secrets and refuse to run with a shared one.
pub fn load_secrets(args: &Args) -> Option<(String, String)> {
    let access = load_secret("JWT_ACCESS_SECRET", args.access_secret_file.as_deref())?;
    let refresh = load_secret("JWT_REFRESH_SECRET", args.refresh_secret_file.as_deref())?;

    if access == refresh {
        error!("JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must differ");
        return None;
    }

    Some((access, refresh))
}

/// Parse the client origin into a CORS header value.
/// Returns None and logs an error if validation fails.
pub fn validate_client_origin(origin: &str) -> Option<HeaderValue> {
    let url = match Url::parse(origin) {
        Ok(url) => url,
        Err(e) => {
            error!(origin = %origin, error = %e, "Invalid client origin URL");
            return None;
        }
    };

    let serialized = url.origin().ascii_serialization();
    match HeaderValue::from_str(&serialized) {
        Ok(value) if serialized != "null" => Some(value),
        _ => {
            error!(origin = %origin, "Client origin has no usable scheme and host");
            None
        }
    }
}

/// Handle the --create-admin flag: create the admin unless the email is taken.
pub async fn handle_create_admin(authority: &TokenAuthority, args: &Args) {
    let (Some(email), Some(password)) = (&args.admin_email, &args.admin_password) else {
        error!("--create-admin requires ADMIN_EMAIL and ADMIN_PASSWORD");
        std::process::exit(1);
    };

    if let Err(errors) = crate::validation::validate_registration(email, password) {
        for e in errors {
            error!(field = %e.path, "{}", e.message);
        }
        std::process::exit(1);
    }

    match authority.create_user(email, password, UserRole::Admin).await {
        Ok(user) => info!(user_id = user.id, email = %user.email, "Admin user created"),
        Err(AuthError::Conflict(_)) => info!(email = %email, "Admin user already exists"),
        Err(e) => {
            error!(error = %e, "Failed to create admin user");
            std::process::exit(1);
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    args: &Args,
    db: Database,
    access_secret: String,
    refresh_secret: String,
    client_origin: HeaderValue,
) -> ServerConfig {
    ServerConfig {
        db,
        access_secret: access_secret.into_bytes(),
        refresh_secret: refresh_secret.into_bytes(),
        lifetimes: TokenLifetimes {
            access_secs: args.access_ttl_secs,
            refresh_secs: args.refresh_ttl_secs,
        },
        cookies: CookieSettings {
            secure: args.cookie_secure,
            domain: args.cookie_domain.clone().filter(|d| !d.is_empty()),
        },
        client_origin: Some(client_origin),
        auth_rate_limit_per_minute: args.auth_rate_limit,
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["storefront-auth"]).unwrap();
        assert_eq!(args.access_ttl_secs, 15 * 60);
        assert_eq!(args.refresh_ttl_secs, 7 * 24 * 60 * 60);
        assert!(!args.create_admin);
    }

    #[test]
    fn test_client_origin_is_normalized() {
        let origin = validate_client_origin("http://localhost:5173/").unwrap();
        assert_eq!(origin, "http://localhost:5173");
    }

    #[test]
    fn test_client_origin_rejects_garbage() {
        assert!(validate_client_origin("not a url").is_none());
    }
}
