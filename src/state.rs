//! Shared application state

use std::sync::Arc;

use sqlx::PgPool;

use crate::auth::TokenIssuer;
use crate::config::Config;

/// State shared by every route and middleware
#[derive(Debug, Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub tokens: TokenIssuer,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let tokens = TokenIssuer::from_config(&config);
        Self {
            pool,
            config: Arc::new(config),
            tokens,
        }
    }
}
