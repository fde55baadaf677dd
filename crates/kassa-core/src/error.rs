//! # Error Types
//!
//! Domain-specific error types for kassa-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  kassa-core errors (this file)                                         │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  kassa-db errors (separate crate)                                      │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  kassa-service errors                                                  │
//! │  └── ServiceError     - Operation boundary taxonomy                    │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → ServiceError → caller             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::currency::{Amount, Currency};

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// Every variant except [`CoreError::Validation`] is a business-rule
/// violation: the caller has to choose a different action, retrying the same
/// request will fail the same way.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Not enough stock across the matching lots.
    ///
    /// ## User Workflow
    /// ```text
    /// Order 5 × T-SHIRT (red, L)
    ///      │
    ///      ▼
    /// Matching lots: [2, 1]  → available = 3
    ///      │
    ///      ▼
    /// InsufficientStock { available: 3, requested: 5 }
    ///      │
    ///      ▼
    /// No lot is touched
    /// ```
    #[error("Insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// The drawer cannot pay out the exact change owed.
    #[error("Insufficient change in {currency}: owed {owed}, {remaining} left unpaid")]
    InsufficientChange {
        currency: Currency,
        owed: Amount,
        remaining: Amount,
    },

    /// The drawer holds no inventory for the requested currency.
    #[error("Drawer holds no {0} denominations")]
    NoInventoryForCurrency(Currency),

    /// The acting user already owns an open drawer.
    #[error("User {user_id} already has an open drawer")]
    DrawerAlreadyOpen { user_id: String },

    /// The drawer has been closed and can no longer be mutated.
    #[error("Drawer {0} is closed")]
    DrawerClosed(String),

    /// The acting user has no open drawer.
    #[error("No open drawer for user {0}")]
    NoOpenDrawer(String),

    /// The drawer's inventory no longer matches its last settlement checkpoint.
    #[error("Drawer {drawer_id} inventory does not match its settlement checkpoint")]
    CheckpointMismatch { drawer_id: String },

    /// The payment is finalized; its totals are immutable.
    #[error("Payment {0} already finalized")]
    PaymentFinalized(String),

    /// A payment references a transaction the sweeper has reclaimed.
    #[error("Transaction {0} was abandoned and its stock released")]
    TransactionAbandoned(String),

    /// A transaction was already paid by another payment.
    #[error("Transaction {0} is already completed")]
    TransactionCompleted(String),

    /// The transaction is already part of another payment.
    #[error("Transaction {transaction_id} belongs to payment {payment_id}")]
    TransactionAssigned {
        transaction_id: String,
        payment_id: String,
    },

    /// The payment was started on another drawer than the acting one.
    #[error("Payment {payment_id} belongs to drawer {drawer_id}")]
    PaymentOnOtherDrawer {
        payment_id: String,
        drawer_id: String,
    },

    /// Payment aggregates too many transactions.
    #[error("Payment cannot have more than {max} transactions")]
    PaymentTooLarge { max: usize },

    /// Change owed is larger than the cash handed over.
    #[error("Change {change} exceeds tendered cash {tendered}")]
    ChangeExceedsTender { change: Amount, tendered: Amount },

    /// Cash kept after change is worth less than the payment total.
    #[error("Tendered cash {tendered} less change does not cover {total}")]
    TenderShort { total: Amount, tendered: Amount },

    /// An amount left the range money arithmetic can represent.
    #[error("Amount out of range while computing {0}")]
    AmountOutOfRange(&'static str),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Returns true for business-rule violations (everything but validation).
    pub fn is_business_rule(&self) -> bool {
        !matches!(self, CoreError::Validation(_))
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when caller input doesn't meet requirements.
/// Each one names the offending field so the boundary can report a
/// structured, field-level list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., invalid UUID, unknown currency).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

impl ValidationError {
    /// Name of the field this error refers to.
    pub fn field(&self) -> &str {
        match self {
            ValidationError::Required { field }
            | ValidationError::TooLong { field, .. }
            | ValidationError::OutOfRange { field, .. }
            | ValidationError::MustBePositive { field }
            | ValidationError::MustNotBeNegative { field }
            | ValidationError::InvalidFormat { field, .. }
            | ValidationError::NotAllowed { field, .. } => field,
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            product_id: "p-1".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for product p-1: available 3, requested 5"
        );

        let err = CoreError::InsufficientChange {
            currency: Currency::Usd,
            owed: Amount::new(Money::from_cents(735), Currency::Usd),
            remaining: Amount::new(Money::from_cents(35), Currency::Usd),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient change in USD: owed 7.35 USD, 0.35 USD left unpaid"
        );
    }

    #[test]
    fn test_validation_error_field() {
        let err = ValidationError::MustBePositive {
            field: "quantity".to_string(),
        };
        assert_eq!(err.field(), "quantity");
        assert_eq!(err.to_string(), "quantity must be positive");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "product_id".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert!(!core_err.is_business_rule());
        assert!(CoreError::PaymentFinalized("p".into()).is_business_rule());
    }
}
