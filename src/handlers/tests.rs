//! Handler tests
//!
//! Command construction, input validation and authorization guards. Flows
//! that need PostgreSQL live in the `tests/` integration suites.

#[cfg(test)]
mod tests {
    use crate::domain::{
        Amount, DomainError, OperationContext, Role, TransactionType, VerificationStatus,
    };
    use crate::error::AppError;
    use crate::handlers::{
        normalize_currency, normalize_email, require_admin, require_user, validate_device_id,
        validate_password, CreateTransactionCommand, LoginCommand, RecordVerificationCommand,
        RegisterDeviceCommand, RegisterUserCommand, DEFAULT_CURRENCY,
    };
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use uuid::Uuid;

    // =========================================================================
    // Commands
    // =========================================================================

    #[test]
    fn test_register_user_command() {
        let cmd = RegisterUserCommand::new("alice@example.com", "correct horse")
            .with_name("Alice");

        assert_eq!(cmd.email, "alice@example.com");
        assert_eq!(cmd.name, Some("Alice".to_string()));
    }

    #[test]
    fn test_register_device_command() {
        let user_id = Uuid::new_v4();
        let cmd = RegisterDeviceCommand::new(user_id, "iphone-15")
            .with_meta(serde_json::json!({ "os": "ios" }))
            .with_created_by("web");

        assert_eq!(cmd.user_id, user_id);
        assert_eq!(cmd.device_id, "iphone-15");
        assert_eq!(cmd.created_by.as_deref(), Some("web"));
    }

    #[test]
    fn test_record_verification_command() {
        let cmd = RecordVerificationCommand::new(Uuid::new_v4(), VerificationStatus::Rejected)
            .with_note("unknown hardware");

        assert_eq!(cmd.status, VerificationStatus::Rejected);
        assert_eq!(cmd.note.as_deref(), Some("unknown hardware"));
    }

    #[test]
    fn test_transaction_command_constructors() {
        let account_id = Uuid::new_v4();
        let amount = Amount::from_str("25.50").unwrap();

        let deposit = CreateTransactionCommand::deposit(account_id, amount).with_reference("salary");
        assert_eq!(deposit.kind, TransactionType::Deposit);
        assert_eq!(deposit.reference.as_deref(), Some("salary"));

        let withdrawal = CreateTransactionCommand::withdrawal(account_id, amount);
        assert_eq!(withdrawal.kind, TransactionType::Withdrawal);
        assert_eq!(withdrawal.amount.value(), Decimal::from_str("25.50").unwrap());
    }

    #[test]
    fn test_transaction_command_from_json() {
        let account_id = Uuid::new_v4();
        let cmd: CreateTransactionCommand = serde_json::from_value(serde_json::json!({
            "account_id": account_id,
            "type": "WITHDRAWAL",
            "amount": "10.5",
        }))
        .unwrap();

        assert_eq!(cmd.kind, TransactionType::Withdrawal);
        assert_eq!(cmd.amount.to_string(), "10.50");

        let numeric: CreateTransactionCommand = serde_json::from_value(serde_json::json!({
            "account_id": account_id,
            "type": "DEPOSIT",
            "amount": 99.99,
        }))
        .unwrap();
        assert_eq!(numeric.amount.to_string(), "99.99");
    }

    #[test]
    fn test_transaction_command_rejects_bad_amounts() {
        let account_id = Uuid::new_v4();
        for amount in [
            serde_json::json!("0"),
            serde_json::json!(-5),
            serde_json::json!("1.001"),
            serde_json::json!("abc"),
        ] {
            let result: Result<CreateTransactionCommand, _> =
                serde_json::from_value(serde_json::json!({
                    "account_id": account_id,
                    "type": "DEPOSIT",
                    "amount": amount,
                }));
            assert!(result.is_err(), "amount {} should be rejected", amount);
        }
    }

    #[test]
    fn test_login_command_from_json() {
        let device_id = Uuid::new_v4();
        let cmd: LoginCommand = serde_json::from_value(serde_json::json!({
            "email": "a@b.co",
            "password": "secret-password",
            "device_id": device_id,
        }))
        .unwrap();
        assert_eq!(cmd.device_id, device_id);
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[test]
    fn test_normalize_email() {
        assert_eq!(
            normalize_email("  Alice@Example.COM ").unwrap(),
            "alice@example.com"
        );

        for bad in ["", "alice", "alice@", "@example.com", "a@b", "a b@c.de", "a@b@c.de", "a@b..c"] {
            assert!(
                matches!(normalize_email(bad), Err(DomainError::Validation(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("12345678").is_ok());
        assert!(validate_password("1234567").is_err());
        assert!(validate_password("").is_err());
    }

    #[test]
    fn test_normalize_currency() {
        assert_eq!(normalize_currency(None).unwrap(), DEFAULT_CURRENCY);
        assert_eq!(normalize_currency(Some("")).unwrap(), "RWF");
        assert_eq!(normalize_currency(Some("USD")).unwrap(), "USD");
        assert!(normalize_currency(Some("usd")).is_err());
        assert!(normalize_currency(Some("EURO")).is_err());
        assert!(normalize_currency(Some("U$D")).is_err());
    }

    #[test]
    fn test_validate_device_id() {
        assert_eq!(validate_device_id("  pixel-7 ").unwrap(), "pixel-7");
        assert!(validate_device_id("   ").is_err());
        assert!(validate_device_id(&"x".repeat(256)).is_err());
    }

    // =========================================================================
    // Authorization guards
    // =========================================================================

    #[test]
    fn test_require_user() {
        let anonymous = OperationContext::new();
        assert!(matches!(
            require_user(&anonymous),
            Err(AppError::Unauthorized(_))
        ));

        let user_id = Uuid::new_v4();
        let context = OperationContext::new().with_user(user_id, Role::Client);
        assert_eq!(require_user(&context).unwrap(), user_id);
    }

    #[test]
    fn test_require_admin() {
        let client = OperationContext::new().with_user(Uuid::new_v4(), Role::Client);
        assert!(matches!(require_admin(&client), Err(AppError::Forbidden(_))));

        let admin_id = Uuid::new_v4();
        let admin = OperationContext::new().with_user(admin_id, Role::Admin);
        assert_eq!(require_admin(&admin).unwrap(), admin_id);

        assert!(matches!(
            require_admin(&OperationContext::new()),
            Err(AppError::Unauthorized(_))
        ));
    }
}
