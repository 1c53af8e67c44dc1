//! Authentication module
//!
//! Password hashing, access tokens and refresh tokens.

mod jwt;
mod password;
mod refresh_token;

pub use jwt::{AccessClaims, TokenIssuer};
pub use password::{hash_password, verify_password, PasswordDigest};
pub use refresh_token::{generate_refresh_token, hash_refresh_token, RefreshToken};

/// Authentication errors
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
}
