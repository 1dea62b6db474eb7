// Authentication, session CSRF binding and the per-request security context.
use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::api::ApiRequest;

/// Cookie carrying the session token for browser clients
pub const SESSION_COOKIE: &str = "session";
/// Header carrying the CSRF token bound to a cookie session
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Authentication failure. Terminal for mandatory-auth endpoints, recorded
/// and ignored for optional-auth ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("no credentials provided")]
    CredentialsMissing,

    #[error("invalid credentials")]
    CredentialsInvalid,

    #[error("CSRF token mismatch")]
    CsrfMismatch,
}

impl AuthError {
    /// Machine-readable code for the `error` field of a 401 body
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::CredentialsMissing => "credentials_missing",
            AuthError::CredentialsInvalid => "credentials_invalid",
            AuthError::CsrfMismatch => "csrf_mismatch",
        }
    }
}

/// How much of the login context an endpoint needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthLevel {
    /// Context from token claims only
    #[default]
    Basic,
    /// Claims plus the user record from the credential store
    User,
}

/// Session token claims
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub session: Uuid,
    pub csrf: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(username: impl Into<String>, expiry_hours: u64) -> Self {
        let now = Utc::now();
        Self {
            sub: username.into(),
            session: Uuid::new_v4(),
            csrf: Uuid::new_v4().simple().to_string(),
            exp: (now + Duration::hours(expiry_hours as i64)).timestamp(),
            iat: now.timestamp(),
        }
    }
}

/// User record loaded for `AuthLevel::User` endpoints
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub admin: bool,
}

/// Credential store seam (the concrete user backing is an external
/// collaborator; tests substitute a stub)
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load_user(&self, username: &str) -> Result<Option<UserRecord>, String>;
}

/// Postgres-backed credential store
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn load_user(&self, username: &str) -> Result<Option<UserRecord>, String> {
        let row = sqlx::query("SELECT id, username, admin FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| e.to_string())?;

        Ok(row.map(|row| UserRecord {
            id: row.get("id"),
            username: row.get("username"),
            admin: row.get("admin"),
        }))
    }
}

/// Credential store used when no user backing is configured;
/// `User`-level authentication always fails through it
pub struct NoCredentialStore;

#[async_trait]
impl CredentialStore for NoCredentialStore {
    async fn load_user(&self, _username: &str) -> Result<Option<UserRecord>, String> {
        Ok(None)
    }
}

/// Resolved identity of an authenticated caller
#[derive(Debug, Clone)]
pub struct Identity {
    pub username: String,
    pub session: Uuid,
    pub user: Option<UserRecord>,
}

/// Per-request security context. Created by the gate, discarded at request
/// end; never persisted. `identity` is absent for anonymous callers, and
/// `error` records a soft failure on optional-auth endpoints.
#[derive(Debug, Clone)]
pub struct SecurityContext {
    pub identity: Option<Identity>,
    pub auth_level: AuthLevel,
    pub error: Option<AuthError>,
}

impl SecurityContext {
    pub fn anonymous(error: Option<AuthError>) -> Self {
        Self { identity: None, auth_level: AuthLevel::Basic, error }
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }
}

/// Resolves credentials (bearer token or session cookie) into a
/// `SecurityContext` and enforces the CSRF binding for cookie sessions.
pub struct SecurityGate {
    secret: String,
    users: Arc<dyn CredentialStore>,
}

impl SecurityGate {
    pub fn new(secret: impl Into<String>, users: Arc<dyn CredentialStore>) -> Self {
        Self { secret: secret.into(), users }
    }

    /// Sign a session token for the given claims
    pub fn issue_token(&self, claims: &Claims) -> Result<String, jsonwebtoken::errors::Error> {
        encode(&Header::default(), claims, &EncodingKey::from_secret(self.secret.as_bytes()))
    }

    fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|_| AuthError::CredentialsInvalid)
    }

    /// Authenticate a request. `check_csrf` only applies to cookie-borne
    /// sessions; a bearer header cannot be sent cross-site by a browser.
    pub async fn authenticate(
        &self,
        request: &ApiRequest,
        level: AuthLevel,
        check_csrf: bool,
    ) -> Result<SecurityContext, AuthError> {
        let (token, from_cookie) = match bearer_token(request) {
            Some(token) => (token.to_string(), false),
            None => match request.cookie_value(SESSION_COOKIE) {
                Some(token) => (token.to_string(), true),
                None => return Err(AuthError::CredentialsMissing),
            },
        };

        let claims = self.verify(&token)?;

        if from_cookie && check_csrf {
            let presented = request.header_value(CSRF_HEADER);
            if presented != Some(claims.csrf.as_str()) {
                return Err(AuthError::CsrfMismatch);
            }
        }

        let user = match level {
            AuthLevel::Basic => None,
            AuthLevel::User => match self.users.load_user(&claims.sub).await {
                Ok(Some(user)) => Some(user),
                Ok(None) => return Err(AuthError::CredentialsInvalid),
                Err(e) => {
                    tracing::error!("credential store lookup failed for '{}': {}", claims.sub, e);
                    return Err(AuthError::CredentialsInvalid);
                }
            },
        };

        Ok(SecurityContext {
            identity: Some(Identity {
                username: claims.sub,
                session: claims.session,
                user,
            }),
            auth_level: level,
            error: None,
        })
    }
}

fn bearer_token(request: &ApiRequest) -> Option<&str> {
    let value = request.header_value("authorization")?;
    let token = value.strip_prefix("Bearer ")?;
    (!token.trim().is_empty()).then_some(token)
}
