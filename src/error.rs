use rust_decimal::Decimal;
use thiserror::Error;

/// Application-wide error type.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] config::ConfigError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// PIN failed the format policy or did not match the stored hash.
    #[error("Invalid PIN: {0}")]
    InvalidPin(String),

    #[error("Transaction PIN is required")]
    PinRequired,

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: Decimal, available: Decimal },

    #[error("Insufficient approver balance: required {required}, available {available}")]
    InsufficientApproverBalance { required: Decimal, available: Decimal },

    #[error("Already processed: {0}")]
    AlreadyProcessed(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// SQLSTATE codes that indicate a transient concurrency failure.
const RETRYABLE_SQLSTATES: &[&str] = &[
    "23505", // unique_violation (reference number collision)
    "40001", // serialization_failure
    "40P01", // deadlock_detected
    "55P03", // lock_not_available
];

impl AppError {
    /// Returns true when retrying the same operation is safe and may succeed.
    /// The failed attempt always rolled back, so no partial state survives.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Database(sqlx::Error::Database(db_err)) => db_err
                .code()
                .map(|code| RETRYABLE_SQLSTATES.contains(&code.as_ref()))
                .unwrap_or(false),
            AppError::Database(sqlx::Error::PoolTimedOut) => true,
            AppError::Conflict(_) => true,
            _ => false,
        }
    }

    /// True for a unique-constraint failure on `constraint`.
    pub fn is_unique_violation_on(&self, constraint: &str) -> bool {
        match self {
            AppError::Database(sqlx::Error::Database(db_err)) => {
                db_err.code().as_deref() == Some("23505") && db_err.constraint() == Some(constraint)
            }
            _ => false,
        }
    }

    /// Short machine-readable reason, used for metric labels.
    pub fn reason_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database",
            AppError::Migration(_) => "migration",
            AppError::Configuration(_) => "configuration",
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "validation",
            AppError::InvalidPin(_) => "invalid_pin",
            AppError::PinRequired => "pin_required",
            AppError::InsufficientBalance { .. } => "insufficient_balance",
            AppError::InsufficientApproverBalance { .. } => "insufficient_approver_balance",
            AppError::AlreadyProcessed(_) => "already_processed",
            AppError::Conflict(_) => "conflict",
            AppError::PermissionDenied(_) => "permission_denied",
            AppError::Gateway(_) => "gateway",
            AppError::Internal(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_insufficient_balance_message() {
        let err = AppError::InsufficientBalance {
            required: dec!(100),
            available: dec!(50.00),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient balance: required 100, available 50.00"
        );
        assert_eq!(err.reason_code(), "insufficient_balance");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(AppError::Conflict("duplicate reference".to_string()).is_retryable());
        assert!(AppError::Database(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!AppError::PinRequired.is_retryable());
        assert!(!AppError::Validation("bad".to_string()).is_retryable());
    }

    #[test]
    fn test_unique_violation_needs_database_error() {
        assert!(!AppError::Conflict("duplicate reference".to_string())
            .is_unique_violation_on("wallet_transactions_reference_number_key"));
    }
}
