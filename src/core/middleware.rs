use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::config::AuthConfig;
use crate::core::shared::error::ApiError;
use crate::core::shared::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub company_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// Caller identity resolved from the bearer token. `company_id` is the tenant
/// every service call is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub company_id: Uuid,
    pub email: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Authentication required")]
    MissingToken,
    #[error("Authorization header must use the Bearer scheme")]
    InvalidFormat,
    #[error("Token expired")]
    Expired,
    #[error("Invalid token: {0}")]
    InvalidToken(String),
    #[error("Failed to sign token: {0}")]
    Signing(String),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Signing(msg) => ApiError::Internal(msg),
            AuthError::InvalidToken(reason) => {
                debug!("Rejected token: {reason}");
                ApiError::Unauthorized("Invalid token".to_string())
            }
            other => ApiError::Unauthorized(other.to_string()),
        }
    }
}

pub fn issue_token(
    auth: &AuthConfig,
    user_id: Uuid,
    company_id: Uuid,
    email: Option<String>,
) -> Result<String, AuthError> {
    let now = Utc::now();
    let claims = TokenClaims {
        sub: user_id.to_string(),
        company_id: company_id.to_string(),
        email,
        iss: auth.issuer.clone(),
        iat: now.timestamp(),
        exp: (now + Duration::minutes(auth.token_ttl_minutes)).timestamp(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(auth.jwt_secret.as_bytes()),
    )
    .map_err(|e| AuthError::Signing(e.to_string()))
}

pub fn validate_jwt(token: &str, auth: &AuthConfig) -> Result<TokenClaims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.validate_nbf = false;
    validation.set_issuer(&[auth.issuer.as_str()]);
    validation.set_required_spec_claims(&["sub", "exp", "iss"]);

    decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(auth.jwt_secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
        _ => AuthError::InvalidToken(e.to_string()),
    })
}

fn bearer_token(parts: &Parts) -> Result<&str, AuthError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingToken)?;
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::InvalidFormat)
}

pub fn authenticate(parts: &Parts, auth: &AuthConfig) -> Result<AuthenticatedUser, AuthError> {
    let claims = validate_jwt(bearer_token(parts)?, auth)?;

    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AuthError::InvalidToken("Invalid user ID".to_string()))?;
    let company_id = Uuid::parse_str(&claims.company_id)
        .map_err(|_| AuthError::InvalidToken("Invalid company ID".to_string()))?;

    Ok(AuthenticatedUser {
        user_id,
        company_id,
        email: claims.email,
    })
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>() {
            return Ok(user.clone());
        }
        let user = authenticate(parts, &state.config.auth)?;
        parts.extensions.insert(user.clone());
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::AppConfig;
    use axum::http::Request;

    fn parts_with(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/api/crm/pipelines");
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_issued_token_round_trips() {
        let auth = AppConfig::in_memory("secret").auth;
        let (user, company) = (Uuid::new_v4(), Uuid::new_v4());
        let token = issue_token(&auth, user, company, Some("a@b.test".into())).unwrap();

        let parsed = authenticate(&parts_with(Some(&format!("Bearer {token}"))), &auth).unwrap();
        assert_eq!(parsed.user_id, user);
        assert_eq!(parsed.company_id, company);
        assert_eq!(parsed.email.as_deref(), Some("a@b.test"));
    }

    #[test]
    fn test_missing_and_malformed_headers() {
        let auth = AppConfig::in_memory("secret").auth;
        assert!(matches!(
            authenticate(&parts_with(None), &auth),
            Err(AuthError::MissingToken)
        ));
        assert!(matches!(
            authenticate(&parts_with(Some("Basic abc")), &auth),
            Err(AuthError::InvalidFormat)
        ));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let auth = AppConfig::in_memory("secret").auth;
        let other = AppConfig::in_memory("other").auth;
        let token = issue_token(&other, Uuid::new_v4(), Uuid::new_v4(), None).unwrap();
        assert!(matches!(
            authenticate(&parts_with(Some(&format!("Bearer {token}"))), &auth),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let mut auth = AppConfig::in_memory("secret").auth;
        auth.token_ttl_minutes = -10;
        let token = issue_token(&auth, Uuid::new_v4(), Uuid::new_v4(), None).unwrap();
        assert!(matches!(validate_jwt(&token, &auth), Err(AuthError::Expired)));
    }
}
