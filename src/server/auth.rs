//! Role-token authorization for map administration endpoints.
//!
//! # Token Scheme
//!
//! A token names a role and an expiry and carries an HMAC-SHA256 over both:
//!
//! ```text
//! token     = "{role}.{expiry}.{hex(mac)}"
//! mac       = HMAC-SHA256(secret_key, "{role}:{expiry}")
//! ```
//!
//! Tokens are sent as `Authorization: Bearer <token>`. Two roles exist:
//! `read-admin` and `write-admin`, and `write-admin` satisfies any endpoint
//! requiring `read-admin`.
//!
//! # Example
//!
//! ```rust
//! use mapserve::server::auth::{Role, RoleTokenAuth};
//! use std::time::Duration;
//!
//! let auth = RoleTokenAuth::new("my-secret-key");
//! let (token, _expiry) = auth.issue(Role::WriteAdmin, Duration::from_secs(3600)).unwrap();
//!
//! assert!(auth.authorize(&token, Role::ReadAdmin).is_ok());
//! ```

use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use super::handlers::ErrorResponse;

type HmacSha256 = Hmac<Sha256>;

// =============================================================================
// Roles
// =============================================================================

/// Capability granted by a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    ReadAdmin,
    WriteAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::ReadAdmin => "read-admin",
            Role::WriteAdmin => "write-admin",
        }
    }

    /// Whether a holder of `self` may call an endpoint requiring `required`.
    pub fn satisfies(&self, required: Role) -> bool {
        *self >= required
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read-admin" => Ok(Role::ReadAdmin),
            "write-admin" => Ok(Role::WriteAdmin),
            other => Err(format!(
                "unknown role '{}' (expected read-admin or write-admin)",
                other
            )),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Clone)]
pub enum AuthError {
    /// No bearer token on the request
    MissingToken,

    /// Token is not `<role>.<expiry>.<hex>`
    MalformedToken,

    Expired { expired_at: u64, current_time: u64 },

    /// MAC does not match
    InvalidSignature,

    /// Valid token, but its role is too weak for the endpoint
    InsufficientRole { required: Role, granted: Role },

    /// The signing key could not be used
    InvalidKey,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingToken => write!(f, "Missing bearer token"),
            AuthError::MalformedToken => write!(f, "Malformed token"),
            AuthError::Expired {
                expired_at,
                current_time,
            } => write!(
                f,
                "Token expired at {} (current time: {})",
                expired_at, current_time
            ),
            AuthError::InvalidSignature => write!(f, "Invalid token signature"),
            AuthError::InsufficientRole { required, granted } => write!(
                f,
                "Role {} required, token grants {}",
                required, granted
            ),
            AuthError::InvalidKey => write!(f, "Signing key is unusable"),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "missing_token"),
            AuthError::MalformedToken => (StatusCode::UNAUTHORIZED, "malformed_token"),
            AuthError::Expired { .. } => (StatusCode::UNAUTHORIZED, "token_expired"),
            AuthError::InvalidSignature => (StatusCode::UNAUTHORIZED, "invalid_signature"),
            AuthError::InsufficientRole { .. } => (StatusCode::FORBIDDEN, "insufficient_role"),
            AuthError::InvalidKey => (StatusCode::INTERNAL_SERVER_ERROR, "invalid_key"),
        };
        let message = self.to_string();

        // Bad signatures and role escalation attempts are worth a warning.
        match &self {
            AuthError::InvalidSignature | AuthError::InsufficientRole { .. } => {
                warn!(
                    error_type = error_type,
                    status = status.as_u16(),
                    "Authorization failed: {}",
                    message
                );
            }
            _ => {
                debug!(
                    error_type = error_type,
                    status = status.as_u16(),
                    "Authorization failed: {}",
                    message
                );
            }
        }

        let body = ErrorResponse::with_status(error_type, message, status);
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// Token Authority
// =============================================================================

/// Issues and verifies role tokens with a shared secret.
#[derive(Clone)]
pub struct RoleTokenAuth {
    secret_key: Vec<u8>,
}

impl RoleTokenAuth {
    pub fn new(secret_key: impl AsRef<[u8]>) -> Self {
        Self {
            secret_key: secret_key.as_ref().to_vec(),
        }
    }

    /// Issue a token valid for `ttl`. Returns the token and its expiry.
    pub fn issue(&self, role: Role, ttl: Duration) -> Result<(String, u64), AuthError> {
        let expiry = now_secs() + ttl.as_secs();
        Ok((self.issue_with_expiry(role, expiry)?, expiry))
    }

    /// Issue a token expiring at the given Unix timestamp.
    pub fn issue_with_expiry(&self, role: Role, expiry: u64) -> Result<String, AuthError> {
        let mac = self.compute_mac(role, expiry)?;
        Ok(format!("{}.{}.{}", role, expiry, hex::encode(mac)))
    }

    /// Check a token's signature and expiry and return the role it grants.
    pub fn verify(&self, token: &str) -> Result<Role, AuthError> {
        let mut parts = token.splitn(3, '.');
        let (Some(role), Some(expiry), Some(mac)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::MalformedToken);
        };

        let role = Role::from_str(role).map_err(|_| AuthError::MalformedToken)?;
        let expiry = expiry
            .parse::<u64>()
            .map_err(|_| AuthError::MalformedToken)?;
        let provided = hex::decode(mac).map_err(|_| AuthError::MalformedToken)?;

        let current_time = now_secs();
        if current_time > expiry {
            return Err(AuthError::Expired {
                expired_at: expiry,
                current_time,
            });
        }

        let expected = self.compute_mac(role, expiry)?;
        if provided.ct_eq(&expected).into() {
            Ok(role)
        } else {
            Err(AuthError::InvalidSignature)
        }
    }

    /// Verify a token and check that it grants `required`.
    pub fn authorize(&self, token: &str, required: Role) -> Result<Role, AuthError> {
        let granted = self.verify(token)?;
        if granted.satisfies(required) {
            Ok(granted)
        } else {
            Err(AuthError::InsufficientRole { required, granted })
        }
    }

    fn compute_mac(&self, role: Role, expiry: u64) -> Result<Vec<u8>, AuthError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret_key).map_err(|_| AuthError::InvalidKey)?;
        mac.update(format!("{}:{}", role, expiry).as_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

impl std::fmt::Debug for RoleTokenAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleTokenAuth").finish_non_exhaustive()
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Extract the token from an `Authorization: Bearer` header.
pub fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

// =============================================================================
// Axum Middleware
// =============================================================================

async fn require_role(
    auth: &RoleTokenAuth,
    required: Role,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = bearer_token(&request).ok_or(AuthError::MissingToken)?;
    let granted = auth.authorize(token, required)?;
    debug!(role = %granted, path = %request.uri().path(), "Authorized request");
    Ok(next.run(request).await)
}

/// Middleware for endpoints that read administrative state.
///
/// ```ignore
/// let app = Router::new()
///     .route("/map/getCustomMapInfo", get(custom_map_info_handler))
///     .layer(middleware::from_fn_with_state(auth, require_read_admin));
/// ```
pub async fn require_read_admin(
    State(auth): State<RoleTokenAuth>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    require_role(&auth, Role::ReadAdmin, request, next).await
}

/// Middleware for endpoints that change the map or its settings.
pub async fn require_write_admin(
    State(auth): State<RoleTokenAuth>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    require_role(&auth, Role::WriteAdmin, request, next).await
}

// =============================================================================
// Tests
// =============================================================================
