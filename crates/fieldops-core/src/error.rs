//! # Error Types
//!
//! Domain-specific error types for fieldops-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  fieldops-core errors (this file)                                      │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  fieldops-db errors (separate crate)                                   │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  fieldops-engine errors                                                │
//! │  └── ServiceError     - What callers see (code + message)              │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → ServiceError ← DbError            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations raised by the pure domain logic.
///
/// Every variant is a caller mistake (bad input or an illegal precondition),
/// so the service layer reports all of them as validation failures.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A status change that the transition table does not allow.
    ///
    /// ## When This Occurs
    /// - Jumping from `open` straight to `completed`
    /// - Any change out of `confirmed` or `cancelled`
    #[error("Cannot move request from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// The entity is in a state that forbids the operation.
    ///
    /// ## When This Occurs
    /// - Confirming a request that is not completed
    /// - Issuing an invoice for a request still in progress
    /// - Cancelling an invoice that was never issued
    #[error("{entity} is {status}, cannot {operation}")]
    InvalidState {
        entity: String,
        status: String,
        operation: String,
    },

    /// Invoicing requires a strictly positive budget.
    #[error("Budget total must be positive to issue an invoice (current: {total})")]
    BudgetNotPositive { total: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when caller input doesn't meet requirements.
#[derive(Debug, Error)]
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

    /// Invalid format (e.g., invalid UUID, invalid document).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
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

    #[test]
    fn test_error_messages() {
        let err = CoreError::InvalidTransition {
            from: "open".to_string(),
            to: "completed".to_string(),
        };
        assert_eq!(err.to_string(), "Cannot move request from open to completed");

        let err = CoreError::InvalidState {
            entity: "Invoice".to_string(),
            status: "processing".to_string(),
            operation: "cancel".to_string(),
        };
        assert_eq!(err.to_string(), "Invoice is processing, cannot cancel");
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "equipment_ids".to_string(),
        };
        assert_eq!(err.to_string(), "equipment_ids is required");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::MustBePositive {
            field: "gross".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
