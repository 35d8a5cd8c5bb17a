use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::ApiError,
    models::Role,
    policy,
    repository::{Repository, RepositoryState},
};

// --- Token Issuer/Verifier ---

/// Claims
///
/// The payload of an access token. Signed with the server's HS256 secret and validated on
/// every authenticated request. Nothing is persisted: expiry is the only invalidation.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the principal's id.
    pub sub: Uuid,
    /// Role at issue time. Authorization uses the stored role, see [`resolve_identity`].
    pub role: Role,
    /// Issued At (iat), seconds since the epoch.
    pub iat: i64,
    /// Expiration Time (exp), seconds since the epoch.
    pub exp: i64,
}

/// The identity carried by a token that passed signature and expiry checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub principal_id: Uuid,
    pub role: Role,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token encoding failed: {0}")]
    Encoding(#[source] jsonwebtoken::errors::Error),
    /// `now + ttl` falls outside the representable date range.
    #[error("token lifetime out of range")]
    Lifetime,
    #[error("token expired")]
    Expired,
    /// Bad signature, wrong key, or malformed structure.
    #[error("invalid token")]
    Invalid,
}

/// issue_token
///
/// Signs a token for `principal_id` that expires `ttl` from now.
pub fn issue_token(
    secret: &str,
    principal_id: Uuid,
    role: Role,
    ttl: Duration,
) -> Result<String, TokenError> {
    let now = Utc::now();
    let expires_at = now.checked_add_signed(ttl).ok_or(TokenError::Lifetime)?;
    let claims = Claims {
        sub: principal_id,
        role,
        iat: now.timestamp(),
        exp: expires_at.timestamp(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(TokenError::Encoding)
}

/// verify_token
///
/// Checks signature integrity (HS256 only) and expiry with no leeway.
pub fn verify_token(secret: &str, token: &str) -> Result<VerifiedToken, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.leeway = 0;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Invalid,
    })?;

    Ok(VerifiedToken {
        principal_id: data.claims.sub,
        role: data.claims.role,
    })
}

/// Pulls the token out of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

// --- Identity Resolver ---

/// AuthUser
///
/// The resolved identity of an authenticated, active principal. Handlers take it as an
/// argument to require authentication and use it for ownership decisions.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    /// The role currently stored for the principal.
    pub role: Role,
}

/// resolve_identity
///
/// Maps a verified principal id to its current record.
/// Fails with `NotFound` if the principal is gone and `Inactive` if it was deactivated.
pub async fn resolve_identity(
    repo: &dyn Repository,
    principal_id: Uuid,
) -> Result<AuthUser, ApiError> {
    let user = repo
        .get_user(principal_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    if !user.is_active {
        tracing::warn!(user_id = %user.id, "inactive user presented a valid token");
        return Err(ApiError::Inactive);
    }

    Ok(AuthUser {
        id: user.id,
        email: user.email,
        role: user.role,
    })
}

/// AuthUser Extractor Implementation
///
/// 1. Reuse: a principal already resolved earlier in the request (by the auth middleware)
///    is taken from the request extensions.
/// 2. Token Extraction: `Authorization: Bearer <token>`.
/// 3. Token Validation: signature and expiry via [`verify_token`].
/// 4. DB Lookup: [`resolve_identity`], so deleted or deactivated principals are refused even
///    while their token is still unexpired.
///
/// Rejection: `Unauthorized` for steps 2–3, `NotFound`/`Inactive` for step 4.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        let token = bearer_token(&parts.headers).ok_or_else(ApiError::unauthorized)?;

        let verified = verify_token(&config.jwt_secret, token).map_err(|e| {
            tracing::debug!(error = %e, "rejected access token");
            ApiError::unauthorized()
        })?;

        let user = resolve_identity(repo.as_ref(), verified.principal_id).await?;

        parts.extensions.insert(user.clone());
        Ok(user)
    }
}

/// AdminUser
///
/// An [`AuthUser`] holding the admin role. Rejects everyone else with `Forbidden`.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        policy::require_admin(&user)?;
        Ok(AdminUser(user))
    }
}
