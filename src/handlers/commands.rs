//! Command definitions
//!
//! Commands represent intentions to change the system state. Results are the
//! JSON views returned to clients.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    Amount, DomainError, Role, TransactionStatus, TransactionType, VerificationStatus,
};

/// Currency used when an account is opened without one
pub const DEFAULT_CURRENCY: &str = "RWF";

/// Minimum password length
pub const MIN_PASSWORD_LEN: usize = 8;

// =========================================================================
// Users
// =========================================================================

/// Command to register a new user
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterUserCommand {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

impl RegisterUserCommand {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Command to log in from a registered device
#[derive(Debug, Clone, Deserialize)]
pub struct LoginCommand {
    pub email: String,
    pub password: String,
    /// Device record id returned by device registration
    pub device_id: Uuid,
}

impl LoginCommand {
    pub fn new(email: impl Into<String>, password: impl Into<String>, device_id: Uuid) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            device_id,
        }
    }
}

/// Command to exchange a refresh token
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshCommand {
    pub refresh_token: String,
}

// =========================================================================
// Devices
// =========================================================================

/// Command to register a device for a user
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterDeviceCommand {
    pub user_id: Uuid,
    /// Client-generated device identifier
    pub device_id: String,
    pub device_meta: Option<serde_json::Value>,
    pub created_by: Option<String>,
}

impl RegisterDeviceCommand {
    pub fn new(user_id: Uuid, device_id: impl Into<String>) -> Self {
        Self {
            user_id,
            device_id: device_id.into(),
            device_meta: None,
            created_by: None,
        }
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.device_meta = Some(meta);
        self
    }

    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }
}

/// Command to record an admin decision on a device
#[derive(Debug, Clone, Deserialize)]
pub struct RecordVerificationCommand {
    pub device_id: Uuid,
    pub status: VerificationStatus,
    pub note: Option<String>,
}

impl RecordVerificationCommand {
    pub fn new(device_id: Uuid, status: VerificationStatus) -> Self {
        Self {
            device_id,
            status,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

// =========================================================================
// Accounts and transactions
// =========================================================================

/// Command to open an account for the authenticated user
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateAccountCommand {
    pub currency: Option<String>,
}

/// Command to record a deposit or withdrawal
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTransactionCommand {
    pub account_id: Uuid,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: Amount,
    pub reference: Option<String>,
    pub meta: Option<serde_json::Value>,
}

impl CreateTransactionCommand {
    pub fn new(account_id: Uuid, kind: TransactionType, amount: Amount) -> Self {
        Self {
            account_id,
            kind,
            amount,
            reference: None,
            meta: None,
        }
    }

    pub fn deposit(account_id: Uuid, amount: Amount) -> Self {
        Self::new(account_id, TransactionType::Deposit, amount)
    }

    pub fn withdrawal(account_id: Uuid, amount: Amount) -> Self {
        Self::new(account_id, TransactionType::Withdrawal, amount)
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

// =========================================================================
// Results
// =========================================================================

/// Public view of a user (never carries the password hash or salt)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserView {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Access and refresh token pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub jwt: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub device_id: String,
    pub device_meta: Option<serde_json::Value>,
    pub registered_at: DateTime<Utc>,
    pub created_by: Option<String>,
    /// Latest verification decision
    pub status: Option<VerificationStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationView {
    pub id: Uuid,
    pub device_id: Uuid,
    pub admin_id: Option<Uuid>,
    pub status: VerificationStatus,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionView {
    pub id: Uuid,
    pub account_id: Uuid,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: Decimal,
    pub reference: Option<String>,
    pub meta: Option<serde_json::Value>,
    pub status: TransactionStatus,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

// =========================================================================
// Input validation
// =========================================================================

/// Trim and lowercase an email address, rejecting malformed ones
pub fn normalize_email(email: &str) -> Result<String, DomainError> {
    let email = email.trim().to_lowercase();
    let invalid = || DomainError::Validation(format!("invalid email address '{}'", email));

    if email.len() > 254 || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }

    let labels_ok = domain.contains('.') && domain.split('.').all(|label| !label.is_empty());
    if !labels_ok {
        return Err(invalid());
    }

    Ok(email)
}

pub fn validate_password(password: &str) -> Result<(), DomainError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(DomainError::Validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Currency code for a new account (3 uppercase ASCII letters)
pub fn normalize_currency(currency: Option<&str>) -> Result<String, DomainError> {
    let currency = match currency.map(str::trim) {
        None | Some("") => return Ok(DEFAULT_CURRENCY.to_string()),
        Some(code) => code,
    };

    if currency.len() == 3 && currency.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(currency.to_string())
    } else {
        Err(DomainError::Validation(format!(
            "currency must be a 3-letter uppercase code (got '{}')",
            currency
        )))
    }
}

/// Non-empty client device identifier
pub fn validate_device_id(device_id: &str) -> Result<String, DomainError> {
    let trimmed = device_id.trim();
    if trimmed.is_empty() || trimmed.len() > 255 {
        return Err(DomainError::Validation(
            "device_id must be between 1 and 255 characters".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}
