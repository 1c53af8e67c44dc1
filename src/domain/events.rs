//! Domain Events
//!
//! Immutable facts recorded in the append-only `events` table.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{TransactionType, VerificationStatus};

/// Aggregate kinds used as `events.aggregate_type`
pub mod aggregate {
    pub const USER: &str = "user";
    pub const DEVICE: &str = "device";
    pub const ACCOUNT: &str = "account";
    pub const TRANSACTION: &str = "transaction";
}

/// Events emitted by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    UserRegistered {
        user_id: Uuid,
        email: String,
        name: Option<String>,
    },

    UserLoggedIn {
        user_id: Uuid,
        device_id: Uuid,
    },

    DeviceRegistered {
        id: Uuid,
        device_id: String,
        user_id: Uuid,
    },

    DeviceVerificationRecorded {
        device_id: Uuid,
        admin_id: Uuid,
        status: VerificationStatus,
        note: Option<String>,
    },

    AccountOpened {
        account_id: Uuid,
        user_id: Uuid,
        currency: String,
    },

    DepositCreated {
        transaction_id: Uuid,
        account_id: Uuid,
        amount: Decimal,
    },

    WithdrawalCreated {
        transaction_id: Uuid,
        account_id: Uuid,
        amount: Decimal,
    },

    BalanceSnapshotTaken {
        account_id: Uuid,
        balance: Decimal,
        last_tx_id: Uuid,
    },
}

impl DomainEvent {
    /// Build the ledger event matching a transaction type
    pub fn transaction_created(
        kind: TransactionType,
        transaction_id: Uuid,
        account_id: Uuid,
        amount: Decimal,
    ) -> Self {
        match kind {
            TransactionType::Deposit => DomainEvent::DepositCreated {
                transaction_id,
                account_id,
                amount,
            },
            TransactionType::Withdrawal => DomainEvent::WithdrawalCreated {
                transaction_id,
                account_id,
                amount,
            },
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::UserRegistered { .. } => "UserRegistered",
            DomainEvent::UserLoggedIn { .. } => "UserLoggedIn",
            DomainEvent::DeviceRegistered { .. } => "DeviceRegistered",
            DomainEvent::DeviceVerificationRecorded { status, .. } => match status {
                VerificationStatus::Verified => "DeviceVerified",
                VerificationStatus::Rejected => "DeviceRejected",
                VerificationStatus::Pending => "DeviceVerificationReset",
            },
            DomainEvent::AccountOpened { .. } => "AccountOpened",
            DomainEvent::DepositCreated { .. } => "DepositCreated",
            DomainEvent::WithdrawalCreated { .. } => "WithdrawalCreated",
            DomainEvent::BalanceSnapshotTaken { .. } => "BalanceSnapshotTaken",
        }
    }

    /// Aggregate this event belongs to
    pub fn aggregate_type(&self) -> &'static str {
        match self {
            DomainEvent::UserRegistered { .. } | DomainEvent::UserLoggedIn { .. } => {
                aggregate::USER
            }
            DomainEvent::DeviceRegistered { .. }
            | DomainEvent::DeviceVerificationRecorded { .. } => aggregate::DEVICE,
            DomainEvent::AccountOpened { .. } | DomainEvent::BalanceSnapshotTaken { .. } => {
                aggregate::ACCOUNT
            }
            DomainEvent::DepositCreated { .. } | DomainEvent::WithdrawalCreated { .. } => {
                aggregate::TRANSACTION
            }
        }
    }

    /// ID of the aggregate this event belongs to
    pub fn aggregate_id(&self) -> Uuid {
        match self {
            DomainEvent::UserRegistered { user_id, .. } => *user_id,
            DomainEvent::UserLoggedIn { user_id, .. } => *user_id,
            DomainEvent::DeviceRegistered { id, .. } => *id,
            DomainEvent::DeviceVerificationRecorded { device_id, .. } => *device_id,
            DomainEvent::AccountOpened { account_id, .. } => *account_id,
            DomainEvent::DepositCreated { transaction_id, .. } => *transaction_id,
            DomainEvent::WithdrawalCreated { transaction_id, .. } => *transaction_id,
            DomainEvent::BalanceSnapshotTaken { account_id, .. } => *account_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_created_picks_event_by_type() {
        let tx_id = Uuid::new_v4();
        let account_id = Uuid::new_v4();
        let event = DomainEvent::transaction_created(
            TransactionType::Withdrawal,
            tx_id,
            account_id,
            Decimal::new(500, 2),
        );

        assert_eq!(event.event_type(), "WithdrawalCreated");
        assert_eq!(event.aggregate_type(), aggregate::TRANSACTION);
        assert_eq!(event.aggregate_id(), tx_id);
    }

    #[test]
    fn test_verification_event_type_follows_status() {
        let event = DomainEvent::DeviceVerificationRecorded {
            device_id: Uuid::new_v4(),
            admin_id: Uuid::new_v4(),
            status: VerificationStatus::Rejected,
            note: Some("unknown hardware".into()),
        };
        assert_eq!(event.event_type(), "DeviceRejected");
        assert_eq!(event.aggregate_type(), aggregate::DEVICE);
    }

    #[test]
    fn test_event_payload_is_tagged() {
        let event = DomainEvent::AccountOpened {
            account_id: Uuid::nil(),
            user_id: Uuid::nil(),
            currency: "RWF".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "AccountOpened");
        assert_eq!(json["currency"], "RWF");
    }
}
