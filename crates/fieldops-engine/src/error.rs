//! # Service Error Type
//!
//! The one error type every engine operation returns.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Error Flow in FieldOps                            │
//! │                                                                         │
//! │  ValidationError ──► CoreError ──┐                                     │
//! │                                  ├──► ServiceError ──► caller          │
//! │  sqlx::Error ──────► DbError ────┘        │                            │
//! │                                           ├── code()    NOT_FOUND      │
//! │                                           └── message   "Request not   │
//! │                                                          found: 42"    │
//! │                                                                         │
//! │  Storage details are logged here with tracing::error! and replaced     │
//! │  by a generic message before they reach the caller.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use thiserror::Error;

use fieldops_core::{CoreError, ValidationError};
use fieldops_db::DbError;

/// Result alias for engine operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Failure of an engine operation.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Bad input or an illegal precondition. The caller can fix it.
    #[error("{0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Another actor holds the edit lock.
    #[error("Request is being edited by {holder}")]
    Conflict { holder: String },

    /// Persistence failed. The message is deliberately generic.
    #[error("{0}")]
    Storage(String),

    /// A collaborator (blob store, mailer, invoice authority) failed.
    #[error("External service failed: {0}")]
    ExternalService(String),
}

/// Machine-readable error codes.
///
/// ```json
/// { "code": "NOT_FOUND", "message": "Request not found: 42" }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    NotFound,
    Conflict,
    StorageError,
    ExternalService,
}

/// Serializable view of a [`ServiceError`] for transport layers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }

    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        ServiceError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ServiceError::Validation(_) => ErrorCode::ValidationError,
            ServiceError::NotFound { .. } => ErrorCode::NotFound,
            ServiceError::Conflict { .. } => ErrorCode::Conflict,
            ServiceError::Storage(_) => ErrorCode::StorageError,
            ServiceError::ExternalService(_) => ErrorCode::ExternalService,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

/// Converts database errors to service errors.
impl From<DbError> for ServiceError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ServiceError::NotFound { entity, id },
            DbError::UniqueViolation { field, value } => {
                ServiceError::Validation(format!("{} '{}' already exists", field, value))
            }
            DbError::StateConflict { .. } => ServiceError::Validation(err.to_string()),
            DbError::ForeignKeyViolation { message } => {
                tracing::error!("Foreign key violation: {}", message);
                ServiceError::Validation("Invalid reference".to_string())
            }
            DbError::ConnectionFailed(e) => {
                tracing::error!("Database connection failed: {}", e);
                ServiceError::Storage("Database connection failed".to_string())
            }
            DbError::MigrationFailed(e) => {
                tracing::error!("Database migration failed: {}", e);
                ServiceError::Storage("Database migration failed".to_string())
            }
            DbError::QueryFailed(e) => {
                // Log the actual error but return a generic message
                tracing::error!("Database query failed: {}", e);
                ServiceError::Storage("Database operation failed".to_string())
            }
            DbError::TransactionFailed(e) => {
                tracing::error!("Transaction failed: {}", e);
                ServiceError::Storage("Database transaction failed".to_string())
            }
            DbError::PoolExhausted => {
                tracing::error!("Database pool exhausted");
                ServiceError::Storage("Database is busy".to_string())
            }
            DbError::Internal(e) => {
                tracing::error!("Internal database error: {}", e);
                ServiceError::Storage("Database operation failed".to_string())
            }
        }
    }
}

/// Every core error is a caller mistake.
impl From<CoreError> for ServiceError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(e) => ServiceError::Validation(e.to_string()),
            other => ServiceError::Validation(other.to_string()),
        }
    }
}

impl From<ValidationError> for ServiceError {
    fn from(err: ValidationError) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_errors_map_to_codes() {
        let err: ServiceError = DbError::not_found("Request", "r-1").into();
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert_eq!(err.to_string(), "Request not found: r-1");

        let err: ServiceError = DbError::state_conflict("Request", "r-1", "open").into();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let err: ServiceError = DbError::QueryFailed("disk I/O error at page 7".into()).into();
        assert_eq!(err.code(), ErrorCode::StorageError);
        assert!(!err.to_string().contains("page 7"));
    }

    #[test]
    fn test_core_errors_are_validation() {
        let err: ServiceError = CoreError::InvalidTransition {
            from: "open".into(),
            to: "completed".into(),
        }
        .into();
        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert_eq!(err.to_string(), "Cannot move request from open to completed");

        let err: ServiceError = ValidationError::Required {
            field: "description".into(),
        }
        .into();
        assert_eq!(err.to_string(), "description is required");
    }

    #[test]
    fn test_body_serialization() {
        let body = ServiceError::Conflict {
            holder: "tech-7".into(),
        }
        .body();
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["code"], "CONFLICT");
        assert_eq!(json["message"], "Request is being edited by tech-7");
    }
}
