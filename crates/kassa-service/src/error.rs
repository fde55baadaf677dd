//! # Service Error Types
//!
//! The structured failure every operation returns.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Operation Boundary Errors                           │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │   Validation    │  │  Business Rule  │  │      Not Found          │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  field-level    │  │  InsufficientStock│ │  unknown product,     │ │
//! │  │  error list     │  │  PaymentFinalized │ │  payment, drawer ...  │ │
//! │  │                 │  │  DrawerAlreadyOpen│ │                       │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │        fix input          choose another         fix the reference      │
//! │                             action                                      │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │    Transient    │  │     Storage     │                              │
//! │  │                 │  │                 │                              │
//! │  │  conflicts      │  │  corrupt row,   │                              │
//! │  │  exhausted,     │  │  failed query   │                              │
//! │  │  store offline  │  │                 │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! │    retry whole op         report                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! No partial mutation is ever visible after any of these: every operation
//! runs in one SQLite transaction that is only committed on success.

use serde::Serialize;
use thiserror::Error;

use kassa_core::{CoreError, ValidationError};
use kassa_db::DbError;

/// Result type alias for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Failure of a service operation.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Input rejected before any state was read.
    #[error("Validation failed: {}", join_messages(.0))]
    Validation(Vec<ValidationError>),

    /// A business rule forbids the operation in the current state.
    #[error(transparent)]
    BusinessRule(CoreError),

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Write conflicts exhausted the retry budget, or the store is
    /// unreachable. Safe to retry the whole operation.
    #[error("Temporarily unavailable: {0}")]
    Transient(DbError),

    /// Any other persistence failure.
    #[error("Storage error: {0}")]
    Storage(DbError),

    /// Configuration could not be loaded or is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

fn join_messages(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ServiceError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        ServiceError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// True when retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Transient(_))
    }

    /// Machine-readable category.
    pub fn code(&self) -> ErrorCode {
        match self {
            ServiceError::Validation(_) => ErrorCode::ValidationError,
            ServiceError::BusinessRule(_) => ErrorCode::BusinessRule,
            ServiceError::NotFound { .. } => ErrorCode::NotFound,
            ServiceError::Transient(_) => ErrorCode::Transient,
            ServiceError::Storage(_) => ErrorCode::StorageError,
            ServiceError::InvalidConfig(_) => ErrorCode::ConfigError,
        }
    }
}

/// Converts database errors to service errors.
///
/// ```text
/// NotFound                                  → NotFound
/// Conflict / PoolExhausted / ConnectionFailed → Transient (retried)
/// everything else                           → Storage
/// ```
impl From<DbError> for ServiceError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ServiceError::NotFound { entity, id },
            e if e.is_transient() => ServiceError::Transient(e),
            e => {
                tracing::error!(error = %e, "Storage failure");
                ServiceError::Storage(e)
            }
        }
    }
}

/// Converts core errors to service errors.
impl From<CoreError> for ServiceError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(e) => ServiceError::Validation(vec![e]),
            e => ServiceError::BusinessRule(e),
        }
    }
}

impl From<ValidationError> for ServiceError {
    fn from(err: ValidationError) -> Self {
        ServiceError::Validation(vec![err])
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        DbError::from(err).into()
    }
}

impl From<Vec<ValidationError>> for ServiceError {
    fn from(errors: Vec<ValidationError>) -> Self {
        ServiceError::Validation(errors)
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::InvalidConfig(err.to_string())
    }
}

impl From<toml::de::Error> for ServiceError {
    fn from(err: toml::de::Error) -> Self {
        ServiceError::InvalidConfig(err.to_string())
    }
}

impl From<toml::ser::Error> for ServiceError {
    fn from(err: toml::ser::Error) -> Self {
        ServiceError::InvalidConfig(err.to_string())
    }
}

// =============================================================================
// Serialized Form
// =============================================================================

/// Error codes for serialized responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    BusinessRule,
    NotFound,
    Transient,
    StorageError,
    ConfigError,
}

/// One field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// What a caller outside the process receives when an operation fails.
///
/// ```json
/// {
///   "code": "VALIDATION_ERROR",
///   "message": "Validation failed: quantity must be positive",
///   "fields": [{ "field": "quantity", "message": "quantity must be positive" }]
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
    pub retryable: bool,
}

impl From<&ServiceError> for ErrorResponse {
    fn from(err: &ServiceError) -> Self {
        let fields = match err {
            ServiceError::Validation(errors) => errors
                .iter()
                .map(|e| FieldError {
                    field: e.field().to_string(),
                    message: e.to_string(),
                })
                .collect(),
            _ => Vec::new(),
        };

        let message = match err {
            // Storage details stay in the log.
            ServiceError::Storage(_) => "Storage operation failed".to_string(),
            other => other.to_string(),
        };

        ErrorResponse {
            code: err.code(),
            message,
            fields,
            retryable: err.is_transient(),
        }
    }
}

impl From<ServiceError> for ErrorResponse {
    fn from(err: ServiceError) -> Self {
        ErrorResponse::from(&err)
    }
}
