/*!
 * # Authentication and Authorization Module
 *
 * Bearer-token authentication for the order API. Tokens are HS256 JWTs
 * minted after the external OAuth handshake; each user holds at most one
 * live token, tracked by a [`SessionStore`].
 *
 * Admin routes additionally require the `admin` role carried in the claims.
 */

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub mod session_store;

pub use session_store::{
    build_session_store, InMemorySessionStore, RedisSessionStore, SessionStore, SessionStoreError,
};

pub const DEFAULT_ISSUER: &str = "ecommerce-api";
pub const DEFAULT_AUDIENCE: &str = "ecommerce-app";
pub const ADMIN_ROLE: &str = "admin";

/// Claim structure for JWT tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,        // Subject (user ID)
    pub jti: String,        // JWT ID, the session handle
    pub iss: String,        // Issuer
    pub aud: String,        // Audience
    pub iat: i64,           // Issued at time
    pub nbf: i64,           // Not valid before time
    pub exp: i64,           // Expiration time
    pub roles: Vec<String>, // User's roles
}

/// Authenticated caller, placed in request extensions by [`auth_middleware`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: i32,
    pub roles: Vec<String>,
    pub token_id: String,
    pub expires_at: i64,
}

impl AuthUser {
    /// Check if the user has a specific role
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Check if the user is an admin
    pub fn is_admin(&self) -> bool {
        self.has_role(ADMIN_ROLE)
    }

    pub fn token_expiry(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.expires_at, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AuthError::MissingToken)
    }
}

/// Authentication configuration
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub token_lifetime: ChronoDuration,
    /// Tokens older than this are logged, not rejected
    pub max_token_age: ChronoDuration,
}

impl AuthConfig {
    pub fn new(jwt_secret: String) -> Self {
        Self {
            jwt_secret,
            jwt_issuer: DEFAULT_ISSUER.to_string(),
            jwt_audience: DEFAULT_AUDIENCE.to_string(),
            token_lifetime: ChronoDuration::hours(2),
            max_token_age: ChronoDuration::seconds(7200),
        }
    }
}

/// A freshly minted bearer token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedToken {
    pub token: String,
    pub token_id: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

/// Authentication service that handles token issuance and validation
#[derive(Clone)]
pub struct AuthService {
    pub config: AuthConfig,
    sessions: Arc<dyn SessionStore>,
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("issuer", &self.config.jwt_issuer)
            .field("audience", &self.config.jwt_audience)
            .finish()
    }
}

impl AuthService {
    pub fn new(config: AuthConfig, sessions: Arc<dyn SessionStore>) -> Self {
        Self { config, sessions }
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// Mint a token for `user_id` and make it the user's only live session
    pub async fn issue_token(
        &self,
        user_id: i32,
        roles: Vec<String>,
    ) -> Result<IssuedToken, AuthError> {
        let now = Utc::now();
        let expires_at = now + self.config.token_lifetime;
        let jti = Uuid::new_v4().to_string();

        let claims = Claims {
            sub: user_id.to_string(),
            jti: jti.clone(),
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: expires_at.timestamp(),
            roles,
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))?;

        let superseded = self.sessions.issue(user_id, &jti, expires_at).await?;
        if let Some(previous) = superseded {
            info!(user_id, superseded_jti = %previous, "Previous session revoked by new login");
        }

        Ok(IssuedToken {
            token,
            token_id: jti,
            token_type: "Bearer".to_string(),
            expires_at,
        })
    }

    /// Validate a JWT token and extract the claims
    pub async fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Blacklist entries are pruned shortly after `exp`
        validation.leeway = 0;
        validation.set_issuer(&[self.config.jwt_issuer.as_str()]);
        validation.set_audience(&[self.config.jwt_audience.as_str()]);
        validation.validate_nbf = true;

        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
            ErrorKind::InvalidAudience => AuthError::InvalidAudience,
            ErrorKind::InvalidAlgorithm => AuthError::UnexpectedSigningMethod,
            _ => AuthError::MalformedToken,
        })?
        .claims;

        if self.sessions.is_revoked(&claims.jti).await? {
            return Err(AuthError::BlacklistedToken);
        }

        let age = Utc::now().timestamp() - claims.iat;
        if age > self.config.max_token_age.num_seconds() {
            warn!(jti = %claims.jti, age_secs = age, "Token older than expected lifetime");
        }

        Ok(claims)
    }

    /// Turns validated claims into the request-scoped caller identity
    pub fn auth_user_from_claims(&self, claims: Claims) -> Result<AuthUser, AuthError> {
        let user_id = claims
            .sub
            .parse::<i32>()
            .map_err(|_| AuthError::MalformedToken)?;
        Ok(AuthUser {
            user_id,
            roles: claims.roles,
            token_id: claims.jti,
            expires_at: claims.exp,
        })
    }

    /// Blacklist `token_id` and clear it from its owner's live session
    pub async fn logout(&self, token_id: &str, expires_at: DateTime<Utc>) -> Result<(), AuthError> {
        if token_id.trim().is_empty() {
            return Err(AuthError::MissingTokenId);
        }
        self.sessions.revoke(token_id, expires_at).await?;
        debug!(jti = %token_id, "Token revoked on logout");
        Ok(())
    }

    /// Revoke whatever token `user_id` currently holds
    pub async fn force_invalidate_all(&self, user_id: i32) -> Result<Option<String>, AuthError> {
        let revoked = self.sessions.revoke_all(user_id).await?;
        if let Some(jti) = &revoked {
            info!(user_id, jti = %jti, "All sessions invalidated for user");
        }
        Ok(revoked)
    }
}

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No authentication token provided")]
    MissingToken,

    #[error("Malformed token")]
    MalformedToken,

    #[error("Unexpected signing method")]
    UnexpectedSigningMethod,

    #[error("Token has been revoked")]
    BlacklistedToken,

    #[error("Invalid token issuer")]
    InvalidIssuer,

    #[error("Invalid token audience")]
    InvalidAudience,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token id is required")]
    MissingTokenId,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error("Session store unavailable: {0}")]
    SessionStore(#[from] SessionStoreError),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code, error_message): (StatusCode, &str, String) = match &self {
            Self::MissingToken => (
                StatusCode::UNAUTHORIZED,
                "AUTH_MISSING_TOKEN",
                "No authentication token provided".to_string(),
            ),
            Self::MalformedToken => (
                StatusCode::UNAUTHORIZED,
                "AUTH_MALFORMED_TOKEN",
                "Invalid authentication token".to_string(),
            ),
            Self::UnexpectedSigningMethod => (
                StatusCode::UNAUTHORIZED,
                "AUTH_UNEXPECTED_SIGNING_METHOD",
                "Unexpected token signing method".to_string(),
            ),
            Self::BlacklistedToken => (
                StatusCode::UNAUTHORIZED,
                "AUTH_REVOKED_TOKEN",
                "Authentication token has been revoked".to_string(),
            ),
            Self::InvalidIssuer => (
                StatusCode::UNAUTHORIZED,
                "AUTH_INVALID_ISSUER",
                "Invalid token issuer".to_string(),
            ),
            Self::InvalidAudience => (
                StatusCode::UNAUTHORIZED,
                "AUTH_INVALID_AUDIENCE",
                "Invalid token audience".to_string(),
            ),
            Self::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                "AUTH_TOKEN_EXPIRED",
                "Token has expired".to_string(),
            ),
            Self::MissingTokenId => (
                StatusCode::BAD_REQUEST,
                "AUTH_MISSING_TOKEN_ID",
                "Token id is required".to_string(),
            ),
            Self::InsufficientPermissions => (
                StatusCode::FORBIDDEN,
                "AUTH_INSUFFICIENT_PERMISSIONS",
                "Insufficient permissions".to_string(),
            ),
            Self::TokenCreation(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AUTH_TOKEN_CREATION_FAILED",
                msg.clone(),
            ),
            Self::SessionStore(err) => {
                error!(error = %err, "Session store failure during authentication");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "AUTH_SESSION_STORE_UNAVAILABLE",
                    "Session store unavailable".to_string(),
                )
            }
        };

        let body = Json(serde_json::json!({
            "error": {
                "code": error_code,
                "message": error_message,
            }
        }));

        (status, body).into_response()
    }
}

/// Role middleware to check if a user has the required role
pub async fn role_middleware(
    State(required_role): State<String>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = match request.extensions().get::<AuthUser>() {
        Some(user) => user.clone(),
        None => return Err(AuthError::MissingToken),
    };

    if !user.has_role(&required_role) {
        debug!(user_id = user.user_id, role = %required_role, "Role check failed");
        return Err(AuthError::InsufficientPermissions);
    }

    Ok(next.run(request).await)
}

/// Authentication middleware that extracts and validates bearer tokens
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let auth_service = match request.extensions().get::<Arc<AuthService>>() {
        Some(service) => service.clone(),
        None => {
            error!("Authentication service missing from request extensions");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Authentication service not available",
            )
                .into_response();
        }
    };

    match extract_auth_from_headers(request.headers(), &auth_service).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Extract authentication info from request headers
async fn extract_auth_from_headers(
    headers: &HeaderMap,
    auth_service: &AuthService,
) -> Result<AuthUser, AuthError> {
    let auth_value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::MalformedToken)?;

    let token = auth_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MalformedToken)?;

    let claims = auth_service.validate_token(token).await?;
    auth_service.auth_user_from_claims(claims)
}

pub trait AuthRouterExt {
    fn with_auth(self) -> Self;
    fn with_role(self, role: &str) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self) -> Self {
        self.route_layer(axum::middleware::from_fn(auth_middleware))
    }

    fn with_role(self, role: &str) -> Self {
        self.route_layer(axum::middleware::from_fn_with_state(
            role.to_string(),
            role_middleware,
        ))
        .with_auth()
    }
}
