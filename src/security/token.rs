//! Signed access tokens bound to a login session

use crate::db::User;
use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Failed to sign token: {0}")]
    Encode(String),
    #[error("Token expired")]
    Expired,
    #[error("Invalid token: {0}")]
    Invalid(String),
}

/// Token payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub id: i64,
    pub email: String,
    pub role: String,
    pub session_id: String,
    pub iat: i64,
    pub exp: i64,
}

/// HS256 signer and verifier
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        }
    }

    /// Issue a token for the user's session
    pub fn issue(&self, user: &User, session_id: &str) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            id: user.id,
            email: user.email.clone(),
            role: user.role.clone(),
            session_id: session_id.to_string(),
            iat: now,
            exp: now + self.ttl.as_secs() as i64,
        };
        self.sign(&claims)
    }

    pub fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenError::Encode(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: 42,
            email: "ba@example.com".into(),
            username: None,
            mobile: None,
            password_hash: String::new(),
            first_name: "B".into(),
            last_name: "A".into(),
            role: "analyst".into(),
            is_active: true,
            last_login: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_issue_and_verify() {
        let service = TokenService::new("secret", Duration::from_secs(3600));
        let token = service.issue(&user(), "session-1").unwrap();

        let claims = service.verify(&token).unwrap();
        assert_eq!(claims.id, 42);
        assert_eq!(claims.role, "analyst");
        assert_eq!(claims.session_id, "session-1");
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_wrong_secret_and_garbage() {
        let service = TokenService::new("secret", Duration::from_secs(60));
        let other = TokenService::new("other", Duration::from_secs(60));
        let token = service.issue(&user(), "s").unwrap();

        assert!(matches!(other.verify(&token), Err(TokenError::Invalid(_))));
        assert!(matches!(service.verify("not-a-jwt"), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn test_expired() {
        let service = TokenService::new("secret", Duration::from_secs(60));
        let past = Utc::now().timestamp() - 120;
        let token = service
            .sign(&Claims {
                id: 1,
                email: "x@example.com".into(),
                role: "viewer".into(),
                session_id: "s".into(),
                iat: past - 60,
                exp: past,
            })
            .unwrap();

        assert!(matches!(service.verify(&token), Err(TokenError::Expired)));
    }
}
