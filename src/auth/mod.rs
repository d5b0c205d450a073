//! Bearer authentication: 30-day HS256 session tokens for the account
//! routes, and `sg_` API keys for programmatic access. Both resolve to
//! a live subscription row on every request.

use axum::http::{HeaderMap, StatusCode};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

use crate::store::{Store, Subscription};
use crate::util;

const TOKEN_TTL_SECS: u64 = 30 * 24 * 60 * 60;
const SECRET_FILE: &str = ".jwt-secret";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: i64,
    pub address: String,
    pub tier: String,
    pub iat: u64,
    pub exp: u64,
}

/// Request identity after a successful bearer check.
#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub id: i64,
    pub address: String,
    pub tier: String,
    pub subscription: Subscription,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthError {
    MissingBearer,
    InvalidToken,
    TokenExpired,
    UserNotFound,
    SubscriptionExpired,
    InvalidApiKey,
    ApiKeyExpired,
    Internal,
}

impl AuthError {
    pub fn status(self) -> StatusCode {
        match self {
            AuthError::ApiKeyExpired => StatusCode::FORBIDDEN,
            AuthError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            AuthError::MissingBearer => "Missing or invalid Authorization header",
            AuthError::InvalidToken => "Invalid token",
            AuthError::TokenExpired => "Token expired",
            AuthError::UserNotFound => "User not found",
            AuthError::SubscriptionExpired => "Subscription expired",
            AuthError::InvalidApiKey => "Invalid API key",
            AuthError::ApiKeyExpired => "Subscription expired. Please renew.",
            AuthError::Internal => "Token verification failed",
        }
    }
}

#[derive(Clone)]
pub struct AuthService {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl AuthService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Secret resolution order: persisted file under the data dir, then
    /// the JWT_SECRET env var, then a freshly generated value which we
    /// try to persist for the next restart.
    pub fn from_data_dir(data_dir: &Path) -> Self {
        let path: PathBuf = data_dir.join(SECRET_FILE);
        if let Ok(contents) = std::fs::read_to_string(&path) {
            let trimmed = contents.trim();
            if !trimmed.is_empty() {
                return Self::new(trimmed);
            }
        }

        let secret = std::env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(random_secret);
        match persist_secret(&path, &secret) {
            Ok(()) => info!(path = %path.display(), "generated new JWT secret"),
            Err(e) => {
                warn!(error = %e, "could not persist JWT secret, tokens will not survive restarts")
            }
        }
        Self::new(&secret)
    }

    pub fn sign(&self, user_id: i64, address: &str, tier: &str) -> Result<String, AuthError> {
        let now = (util::now_ms() / 1000) as u64;
        let claims = Claims {
            user_id,
            address: address.to_string(),
            tier: tier.to_string(),
            iat: now,
            exp: now + TOKEN_TTL_SECS,
        };
        encode(&Header::default(), &claims, &self.encoding).map_err(|_| AuthError::Internal)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            })
    }

    /// Validate a session token and load the live subscription behind
    /// it. The token alone is not enough; a lapsed subscription loses
    /// access before the token expires.
    pub fn authenticate_jwt(
        &self,
        headers: &HeaderMap,
        store: &Store,
    ) -> Result<AuthedUser, AuthError> {
        let token = bearer_token(headers).ok_or(AuthError::MissingBearer)?;
        let claims = self.verify(token)?;
        let sub = store
            .subscription_by_address(&claims.address)
            .map_err(|_| AuthError::Internal)?
            .ok_or(AuthError::UserNotFound)?;
        if sub.expires_at < util::now_ms() {
            return Err(AuthError::SubscriptionExpired);
        }
        Ok(AuthedUser {
            id: sub.id,
            address: sub.address.clone(),
            tier: sub.plan.clone(),
            subscription: sub,
        })
    }

    /// Validate a `Bearer sg_...` API key against the store.
    pub fn authenticate_api_key(
        &self,
        headers: &HeaderMap,
        store: &Store,
    ) -> Result<AuthedUser, AuthError> {
        let key = bearer_token(headers).ok_or(AuthError::MissingBearer)?;
        if !key.starts_with("sg_") {
            return Err(AuthError::InvalidApiKey);
        }
        let sub = store
            .subscription_by_api_key(key)
            .map_err(|_| AuthError::Internal)?
            .ok_or(AuthError::InvalidApiKey)?;
        if sub.expires_at < util::now_ms() {
            return Err(AuthError::ApiKeyExpired);
        }
        Ok(AuthedUser {
            id: sub.id,
            address: sub.address.clone(),
            tier: sub.plan.clone(),
            subscription: sub,
        })
    }

    /// Best-effort identity for routes that work with or without
    /// credentials. Tries the session token first, then the API key.
    pub fn optional_identity(&self, headers: &HeaderMap, store: &Store) -> Option<AuthedUser> {
        if let Ok(user) = self.authenticate_jwt(headers, store) {
            return Some(user);
        }
        self.authenticate_api_key(headers, store).ok()
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

fn random_secret() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

fn persist_secret(path: &Path, secret: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, secret)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}
