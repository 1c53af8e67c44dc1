//! Jambo Backend Library
//!
//! Customer backend: users, admin-verified devices, accounts and an
//! append-only deposit/withdrawal ledger. Re-exports modules for the server
//! binary, the admin bootstrap tool and integration tests.

pub mod api;
pub mod audit;
pub mod auth;
pub mod config;
pub mod db;
pub mod domain;
pub mod event_store;
pub mod handlers;
pub mod jobs;
pub mod ledger;
pub mod state;

mod error;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use domain::{Amount, AmountError, Balance, DomainError, DomainEvent, OperationContext};
pub use state::AppState;
