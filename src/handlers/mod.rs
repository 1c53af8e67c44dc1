//! Command Handlers module
//!
//! Handlers validate commands, run the database work for one operation and
//! record the matching event and audit entry in the same transaction.

mod account_handler;
mod admin_handler;
mod commands;
mod device_handler;
mod transaction_handler;
mod user_handler;
mod verification_handler;

#[cfg(test)]
mod tests;

use uuid::Uuid;

use crate::domain::OperationContext;
use crate::error::{AppError, AppResult};

pub use account_handler::{BalanceHandler, CreateAccountHandler, ListAccountsHandler};
pub use admin_handler::{BootstrapAdminCommand, BootstrapAdminHandler, BootstrapAdminResult};
pub use commands::*;
pub use device_handler::{ListDevicesHandler, RegisterDeviceHandler};
pub use transaction_handler::{CreateTransactionHandler, ListTransactionsHandler, PREVIEW_LIMIT};
pub use user_handler::{CurrentUserHandler, LoginHandler, RefreshHandler, RegisterUserHandler};
pub use verification_handler::{
    GetVerificationHandler, ListVerificationsHandler, RecordVerificationHandler,
};

/// Authenticated user of the operation
pub fn require_user(context: &OperationContext) -> AppResult<Uuid> {
    context
        .user_id
        .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))
}

/// Authenticated admin of the operation
pub fn require_admin(context: &OperationContext) -> AppResult<Uuid> {
    let user_id = require_user(context)?;
    if !context.is_admin() {
        return Err(AppError::Forbidden("Admin role required".to_string()));
    }
    Ok(user_id)
}
