// src/utils/jwt.rs

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{config::Config, error::AppError, session::Session};

/// JWT Claims structure.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    /// Subject - Stores the User ID (as string).
    pub sub: String,
    /// Expiration time as Unix timestamp.
    pub exp: usize,
}

/// Signs a new JWT for the user.
///
/// Tokens are normally issued by the authentication service; this exists for
/// tooling and tests that need to act as a user.
pub fn sign_jwt(id: i64, secret: &str, expiration_seconds: u64) -> Result<String, AppError> {
    // Calculate expiration: current time + expiration_seconds
    let expiration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::StoreFailure(e.to_string()))?
        .as_secs() as usize
        + expiration_seconds as usize;

    let claims = Claims {
        sub: id.to_string(), // Store User ID in 'sub' claim
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::StoreFailure(e.to_string()))
}

/// Verifies and decodes a JWT string.
///
/// Returns the `Claims` if valid, otherwise returns an `AppError`.
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthenticated("Invalid token".to_string()))?;

    Ok(token_data.claims)
}

/// Resolves the acting user from an `Authorization` header value.
///
/// No header means an anonymous session; a header that does not carry a valid
/// token is an error.
pub fn resolve_session(auth_header: Option<&str>, secret: &str) -> Result<Session, AppError> {
    let Some(header) = auth_header else {
        return Ok(Session::anonymous());
    };
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthenticated("Malformed authorization header".to_string()))?;
    let claims = verify_jwt(token, secret)?;
    let user_id = claims
        .sub
        .parse::<i64>()
        .map_err(|_| AppError::Unauthenticated("Invalid token subject".to_string()))?;
    Ok(Session::user(user_id))
}

/// Axum Middleware: Session resolution.
///
/// Injects a `Session` into the request extensions for handlers to use. Requests
/// without an 'Authorization' header pass through anonymously; an invalid
/// 'Bearer <token>' is rejected with 401 Unauthorized.
pub async fn session_middleware(
    State(config): State<Config>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    match resolve_session(auth_header, &config.jwt_secret) {
        Ok(session) => {
            req.extensions_mut().insert(session);
            Ok(next.run(req).await)
        }
        Err(_) => Err(StatusCode::UNAUTHORIZED),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit_test_secret";

    #[test]
    fn test_round_trip_resolves_user() {
        let token = sign_jwt(42, SECRET, 60).unwrap();
        let session = resolve_session(Some(&format!("Bearer {}", token)), SECRET).unwrap();
        assert_eq!(session, Session::user(42));
    }

    #[test]
    fn test_missing_header_is_anonymous() {
        assert_eq!(resolve_session(None, SECRET).unwrap(), Session::anonymous());
    }

    #[test]
    fn test_bad_tokens_are_rejected() {
        let token = sign_jwt(42, "other_secret", 60).unwrap();
        assert!(resolve_session(Some(&format!("Bearer {}", token)), SECRET).is_err());
        assert!(resolve_session(Some("Basic abc"), SECRET).is_err());
    }
}
