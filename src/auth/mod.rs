//! Access-token authentication for API routes.
//!
//! Access tokens are verified statelessly (signature and expiry) from either
//! the `Authorization: Bearer` header or the `accessToken` cookie. Refresh
//! tokens never authenticate a request; they are only accepted by the
//! refresh and logout endpoints.

mod cookie;
mod errors;
mod extractors;
mod ip;
mod state;
mod types;

pub use cookie::{ACCESS_COOKIE_NAME, CookieSettings, REFRESH_COOKIE_NAME, get_cookie};
pub use errors::{ApiAuthError, AuthErrorKind};
pub use extractors::{AdminOnly, AnyRole, Auth, RoleConstraint, access_token_from_parts};
pub use ip::{FORWARDED_FOR_HEADER, extract_client_ip};
pub use state::HasAuthBackend;
pub use types::AuthenticatedUser;
