//! Refresh tokens
//!
//! Opaque random strings handed to the client; only their SHA-256 digest is
//! persisted.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Random bytes per token
const TOKEN_BYTES: usize = 32;

/// A freshly generated refresh token
#[derive(Debug, Clone)]
pub struct RefreshToken {
    /// Value returned to the client
    pub token: String,
    /// Value stored in `refresh_tokens.token_hash`
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

/// Generate a new refresh token valid for `ttl_days`
pub fn generate_refresh_token(ttl_days: i64) -> RefreshToken {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    let token = hex::encode(bytes);
    let token_hash = hash_refresh_token(&token);

    RefreshToken {
        token,
        token_hash,
        expires_at: Utc::now() + Duration::days(ttl_days),
    }
}

/// Digest used to look a presented token up
pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
