//! JWT authentication helpers and the `AuthUser` extractor.
//!
//! Tokens are issued by the surrounding application; this server only
//! validates them. `sub` carries the user's UUID.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use keeper_audit::store::RequestContext;
use keeper_common::error::AppError;
use keeper_common::types::User;

use crate::state::AppState;

/// JWT claims stored in the token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject, the user's UUID
    pub sub: String,
    /// Expiration time (UNIX timestamp)
    pub exp: i64,
    /// Issued at (UNIX timestamp)
    pub iat: i64,
}

/// Authenticated caller extracted from the `Authorization: Bearer` header.
///
/// ```ignore
/// async fn handler(auth: AuthUser) -> impl IntoResponse {
///     // auth.user_id is the authenticated user's UUID
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub claims: Claims,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl AuthUser {
    /// Load the user record behind the token.
    pub async fn user(&self, state: &AppState) -> Result<User, AppError> {
        state
            .users
            .find(self.user_id)
            .await?
            .ok_or_else(|| AppError::Auth("Unknown user".to_string()))
    }

    /// Audit context for writes made by this caller.
    pub fn context(&self) -> RequestContext {
        RequestContext {
            causer_id: Some(self.user_id),
            ip_address: self.ip_address.clone(),
            user_agent: self.user_agent.clone(),
        }
    }
}

/// Encode a JWT token for a user.
pub fn encode_jwt(user_id: Uuid, secret: &str, expiry_hours: u64) -> Result<String, AppError> {
    let now = Utc::now();
    let exp = now + Duration::hours(expiry_hours as i64);

    let claims = Claims {
        sub: user_id.to_string(),
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Auth(format!("Failed to encode JWT: {}", e)))
}

/// Decode and validate a JWT token.
pub fn decode_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| AppError::Auth(format!("Invalid token: {}", e)))?;

    Ok(token_data.claims)
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// First hop of `X-Forwarded-For`, else `X-Real-IP`.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    header(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
        .filter(|ip| !ip.is_empty())
        .or_else(|| header(headers, "x-real-ip"))
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let secret = state.config.jwt_secret.clone();
        let auth_header = header(&parts.headers, "authorization");
        let ip_address = client_ip(&parts.headers);
        let user_agent = header(&parts.headers, "user-agent");

        async move {
            let token = auth_header
                .as_deref()
                .and_then(|auth| auth.strip_prefix("Bearer "))
                .ok_or_else(|| {
                    AppError::Auth(
                        "Missing or invalid Authorization header. Use 'Bearer <JWT>'".to_string(),
                    )
                })?;

            let claims = decode_jwt(token, &secret)?;
            let user_id = Uuid::parse_str(&claims.sub)
                .map_err(|_| AppError::Auth("Invalid user ID in token".to_string()))?;

            Ok(AuthUser {
                user_id,
                claims,
                ip_address,
                user_agent,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "keeper-unit-test-secret";

    fn token_with(sub: &str, exp_offset_hours: i64) -> String {
        let now = Utc::now();
        let claims = Claims {
            sub: sub.to_string(),
            exp: (now + Duration::hours(exp_offset_hours)).timestamp(),
            iat: now.timestamp(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_issued_token_carries_user_id() {
        let user_id = Uuid::new_v4();
        let claims = decode_jwt(&encode_jwt(user_id, SECRET, 1).unwrap(), SECRET).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_rejected_tokens() {
        let valid = token_with(&Uuid::new_v4().to_string(), 1);
        assert!(decode_jwt(&valid, "another-secret").is_err());
        assert!(decode_jwt(&token_with("anyone", -1), SECRET).is_err());
        assert!(decode_jwt("not.a.valid.jwt", SECRET).is_err());
        assert!(matches!(decode_jwt("", SECRET), Err(AppError::Auth(_))));
    }

    #[test]
    fn test_client_ip_prefers_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), None);

        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.9"));
        assert_eq!(client_ip(&headers).as_deref(), Some("10.0.0.9"));

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.7"));
    }
}
