//! Access tokens
//!
//! Short-lived HS256 JWTs bound to a user and a verified device.

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::domain::Role;

use super::AuthError;

/// Claims carried by an access token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// User ID
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    /// Device record the token was issued for
    pub device_id: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

/// Signs and validates access tokens
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    ttl_secs: i64,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(secret: &[u8], issuer: &str, audience: &str, ttl_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: issuer.to_string(),
            audience: audience.to_string(),
            ttl_secs,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.jwt_secret.as_bytes(),
            &config.jwt_issuer,
            &config.jwt_audience,
            config.access_token_ttl_secs,
        )
    }

    /// Lifetime of issued tokens in seconds
    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    /// Issue an access token
    pub fn issue(
        &self,
        user_id: Uuid,
        email: &str,
        role: Role,
        device_id: Uuid,
    ) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            sub: user_id,
            email: email.to_string(),
            role,
            device_id,
            iat: now,
            exp: now + self.ttl_secs,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };

        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding_key,
        )?)
    }

    /// Validate signature, expiry, issuer and audience
    pub fn verify(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&[self.audience.as_str()]);

        let data = jsonwebtoken::decode::<AccessClaims>(token, &self.decoding_key, &validation)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(b"unit-test-secret", "urn:test:iss", "urn:test:aud", 60)
    }

    #[test]
    fn test_issue_and_verify() {
        let issuer = issuer();
        let user_id = Uuid::new_v4();
        let device_id = Uuid::new_v4();

        let token = issuer
            .issue(user_id, "alice@example.com", Role::Client, device_id)
            .unwrap();
        let claims = issuer.verify(&token).unwrap();

        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.device_id, device_id);
        assert_eq!(claims.role, Role::Client);
        assert_eq!(claims.exp - claims.iat, 60);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issuer()
            .issue(Uuid::new_v4(), "a@b.c", Role::Admin, Uuid::new_v4())
            .unwrap();
        let other = TokenIssuer::new(b"another-secret", "urn:test:iss", "urn:test:aud", 60);
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn test_wrong_audience_rejected() {
        let token = issuer()
            .issue(Uuid::new_v4(), "a@b.c", Role::Client, Uuid::new_v4())
            .unwrap();
        let other = TokenIssuer::new(b"unit-test-secret", "urn:test:iss", "urn:other:aud", 60);
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let expired = TokenIssuer::new(b"unit-test-secret", "urn:test:iss", "urn:test:aud", -10);
        let token = expired
            .issue(Uuid::new_v4(), "a@b.c", Role::Client, Uuid::new_v4())
            .unwrap();
        assert!(expired.verify(&token).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(issuer().verify("not.a.jwt").is_err());
    }
}
