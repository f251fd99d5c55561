//! Bearer-token guard for the connection endpoint
//!
//! Token issuance belongs to the bank's auth service. This side only checks
//! the HMAC signature and that the token's subject is the user whose
//! notifications are requested.

use crate::config::AuthConfig;
use crate::error::{HubError, Result};
use crate::hub::UserId;
use actix_web::{http::header, HttpRequest};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Authenticated user id
    pub sub: String,
    pub exp: usize,
}

pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str, algorithm: Algorithm) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(algorithm),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(&config.secret_key, config.algorithm)
    }

    pub fn verify(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Rejected bearer token");
                HubError::Unauthorized
            })
    }

    /// Check that `token` authenticates exactly `user_id`
    pub fn authorize_user(&self, token: Option<&str>, user_id: UserId) -> Result<Claims> {
        let token = token.ok_or(HubError::Unauthorized)?;
        let claims = self.verify(token)?;

        match claims.sub.parse::<UserId>() {
            Ok(subject) if subject == user_id => Ok(claims),
            _ => {
                tracing::warn!(
                    user_id,
                    subject = %claims.sub,
                    "Token subject does not match requested user"
                );
                Err(HubError::Forbidden)
            }
        }
    }
}

/// Token from `Authorization: Bearer ...`
pub fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret";

    fn token_for(sub: &str, exp_offset: i64) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            exp: (chrono::Utc::now().timestamp() + exp_offset) as usize,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_authorize_matching_user() {
        let verifier = TokenVerifier::new(SECRET, Algorithm::HS256);
        let token = token_for("5", 3600);
        let claims = verifier.authorize_user(Some(token.as_str()), 5).unwrap();
        assert_eq!(claims.sub, "5");
    }

    #[test]
    fn test_missing_token_is_unauthorized() {
        let verifier = TokenVerifier::new(SECRET, Algorithm::HS256);
        assert!(matches!(
            verifier.authorize_user(None, 5),
            Err(HubError::Unauthorized)
        ));
    }

    #[test]
    fn test_other_user_is_forbidden() {
        let verifier = TokenVerifier::new(SECRET, Algorithm::HS256);
        let token = token_for("6", 3600);
        assert!(matches!(
            verifier.authorize_user(Some(token.as_str()), 5),
            Err(HubError::Forbidden)
        ));
    }

    #[test]
    fn test_expired_token_is_unauthorized() {
        let verifier = TokenVerifier::new(SECRET, Algorithm::HS256);
        let token = token_for("5", -3600);
        assert!(matches!(verifier.verify(&token), Err(HubError::Unauthorized)));
    }

    #[test]
    fn test_wrong_secret_is_unauthorized() {
        let verifier = TokenVerifier::new("another-secret", Algorithm::HS256);
        let token = token_for("5", 3600);
        assert!(matches!(verifier.verify(&token), Err(HubError::Unauthorized)));
    }

    #[test]
    fn test_bearer_token_extraction() {
        let req = actix_web::test::TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Bearer abc.def.ghi"))
            .to_http_request();
        assert_eq!(bearer_token(&req).as_deref(), Some("abc.def.ghi"));

        let req = actix_web::test::TestRequest::default().to_http_request();
        assert_eq!(bearer_token(&req), None);
    }
}
