//! Identity extraction
//!
//! A request authenticates either with a bearer token (HS256, subject claim
//! carries the user id) or, for trusted internal hops, with the `X-User-ID`
//! header. The bearer path wins when both are present; the two are never
//! combined.

use axum::http::HeaderMap;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;
use veilgate_core::{GatewayError, Result, SecretString};

/// Bearer token claims; `sub` is the user id
#[derive(Debug, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[allow(dead_code)]
    pub exp: usize,
}

/// Resolve the caller's user id from the request headers.
pub fn authenticate(headers: &HeaderMap, jwt_secret: &SecretString) -> Result<String> {
    if let Some(authorization) = headers.get("authorization") {
        let value = authorization
            .to_str()
            .map_err(|_| GatewayError::Authentication("malformed authorization header".into()))?;
        let token = value
            .strip_prefix("Bearer ")
            .or_else(|| value.strip_prefix("bearer "))
            .ok_or_else(|| {
                GatewayError::Authentication("authorization header is not a bearer token".into())
            })?;
        return decode_user_id(token, jwt_secret);
    }

    if let Some(user_id) = headers.get("x-user-id") {
        let user_id = user_id
            .to_str()
            .map_err(|_| GatewayError::Authentication("malformed X-User-ID header".into()))?;
        if user_id.is_empty() {
            return Err(GatewayError::Authentication("empty X-User-ID header".into()));
        }
        return Ok(user_id.to_string());
    }

    Err(GatewayError::Authentication(
        "missing credentials: provide a bearer token or X-User-ID".into(),
    ))
}

fn decode_user_id(token: &str, jwt_secret: &SecretString) -> Result<String> {
    let key = DecodingKey::from_secret(jwt_secret.expose().as_bytes());
    let data = decode::<Claims>(token, &key, &Validation::default())
        .map_err(|e| GatewayError::Authentication(format!("invalid bearer token: {}", e)))?;
    Ok(data.claims.sub)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestClaims {
        sub: String,
        exp: usize,
    }

    fn secret() -> SecretString {
        SecretString::new("test-secret")
    }

    fn token(sub: &str, secret: &str) -> String {
        let claims = TestClaims {
            sub: sub.to_string(),
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_bearer_token() {
        let mut headers = HeaderMap::new();
        let value = format!("Bearer {}", token("user-42", "test-secret"));
        headers.insert("authorization", HeaderValue::from_str(&value).unwrap());

        let user_id = authenticate(&headers, &secret()).unwrap();
        assert_eq!(user_id, "user-42");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let mut headers = HeaderMap::new();
        let value = format!("Bearer {}", token("user-42", "other-secret"));
        headers.insert("authorization", HeaderValue::from_str(&value).unwrap());

        let err = authenticate(&headers, &secret());
        assert!(matches!(err, Err(GatewayError::Authentication(_))));
    }

    #[test]
    fn test_expired_token_rejected() {
        let claims = TestClaims {
            sub: "user-42".to_string(),
            exp: (chrono::Utc::now().timestamp() - 3600) as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );

        let err = authenticate(&headers, &secret());
        assert!(matches!(err, Err(GatewayError::Authentication(_))));
    }

    #[test]
    fn test_user_id_header_accepted() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static("internal-7"));

        let user_id = authenticate(&headers, &secret()).unwrap();
        assert_eq!(user_id, "internal-7");
    }

    #[test]
    fn test_bearer_wins_over_user_id_header() {
        let mut headers = HeaderMap::new();
        let value = format!("Bearer {}", token("jwt-user", "test-secret"));
        headers.insert("authorization", HeaderValue::from_str(&value).unwrap());
        headers.insert("x-user-id", HeaderValue::from_static("header-user"));

        let user_id = authenticate(&headers, &secret()).unwrap();
        assert_eq!(user_id, "jwt-user");
    }

    #[test]
    fn test_invalid_bearer_not_rescued_by_user_id_header() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer garbage"));
        headers.insert("x-user-id", HeaderValue::from_static("header-user"));

        let err = authenticate(&headers, &secret());
        assert!(matches!(err, Err(GatewayError::Authentication(_))));
    }

    #[test]
    fn test_missing_credentials() {
        let err = authenticate(&HeaderMap::new(), &secret());
        assert!(matches!(err, Err(GatewayError::Authentication(_))));
    }

    #[test]
    fn test_non_bearer_authorization_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic dXNlcg=="));
        let err = authenticate(&headers, &secret());
        assert!(matches!(err, Err(GatewayError::Authentication(_))));
    }
}
