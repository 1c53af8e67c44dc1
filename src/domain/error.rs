//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use thiserror::Error;

/// Domain-specific errors
///
/// These errors represent business rule violations and domain invariant failures.
/// They are independent of the web/infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Withdrawal larger than the running balance
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        required: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    },

    /// Invalid amount (zero, negative, or exceeds limit)
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// A stored or submitted enumerated value is not recognised
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Input failed validation
    #[error("Validation failed: {0}")]
    Validation(String),

    /// User not found
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// Account not found (or not visible to the caller)
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Device not found
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Device exists but has not been approved by an admin
    #[error("Device not verified or not registered")]
    DeviceNotVerified,

    /// Unique resource already exists
    #[error("{0} already exists")]
    AlreadyExists(String),
}

impl DomainError {
    /// Create an insufficient funds error
    pub fn insufficient_funds(
        required: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    ) -> Self {
        Self::InsufficientFunds { required, available }
    }

    /// Check if this is a client error (user's fault)
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::InvalidValue(_))
    }

    /// Check if this is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::UserNotFound(_) | Self::AccountNotFound(_) | Self::DeviceNotFound(_)
        )
    }
}

impl From<super::AmountError> for DomainError {
    fn from(err: super::AmountError) -> Self {
        DomainError::InvalidAmount(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_insufficient_funds_error() {
        let err = DomainError::insufficient_funds(Decimal::new(100, 0), Decimal::new(50, 0));

        assert!(err.is_client_error());
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("100"));
        assert!(err.to_string().contains("50"));
    }

    #[test]
    fn test_not_found_errors() {
        assert!(DomainError::AccountNotFound("x".into()).is_not_found());
        assert!(DomainError::DeviceNotFound("x".into()).is_not_found());
        assert!(!DomainError::DeviceNotVerified.is_not_found());
    }

    #[test]
    fn test_invalid_stored_value_is_server_side() {
        assert!(!DomainError::InvalidValue("bogus".into()).is_client_error());
    }

    #[test]
    fn test_amount_error_conversion() {
        let err: DomainError = crate::domain::AmountError::Overflow.into();
        assert!(matches!(err, DomainError::InvalidAmount(_)));
    }
}
