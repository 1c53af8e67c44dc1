//! Domain module
//!
//! Core domain types and business logic.

pub mod amount;
pub mod context;
pub mod error;
pub mod events;
pub mod status;

pub use amount::{Amount, AmountError, Balance};
pub use context::OperationContext;
pub use error::DomainError;
pub use events::DomainEvent;
pub use status::{Role, TransactionStatus, TransactionType, VerificationStatus};
