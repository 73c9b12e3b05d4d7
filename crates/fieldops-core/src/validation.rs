//! # Validation Module
//!
//! Input validation for request intake, budget items and fiscal settings.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Layer 1: Service call (fieldops-engine)                                │
//! │  └── THIS MODULE: field rules, runs before any write                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Domain rules (lifecycle, tax engine)                          │
//! │  └── transition table, invoice preconditions                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL / CHECK constraints                                      │
//! │  └── UNIQUE (provider_id, number), one active invoice per request      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use fieldops_core::money::Quantity;
//! use fieldops_core::validation::{validate_quantity, validate_document};
//!
//! validate_quantity(Quantity::from_milli(2_500)).unwrap();
//! validate_document("12.345.678/0001-95").unwrap();
//! ```

use crate::error::ValidationError;
use crate::money::{Quantity, Rate};
use crate::types::{NewBudgetItem, NewChecklistItem, NewRequest};
use crate::{MAX_DESCRIPTION_LEN, MAX_ITEM_QUANTITY, MAX_NAME_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Rejects empty or whitespace-only values.
pub fn validate_required(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Required text with an upper length bound (in characters).
pub fn validate_text(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    validate_required(field, value)?;

    if value.trim().chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(())
}

/// Validates a CPF (11 digits) or CNPJ (14 digits).
///
/// Punctuation is ignored, so `123.456.789-09` and `12345678909` are both
/// accepted. Check digits are not verified here.
///
/// ## Example
/// ```rust
/// use fieldops_core::validation::validate_document;
///
/// assert!(validate_document("123.456.789-09").is_ok());
/// assert!(validate_document("12.345.678/0001-95").is_ok());
/// assert!(validate_document("1234").is_err());
/// ```
pub fn validate_document(document: &str) -> ValidationResult<()> {
    let digits = document.chars().filter(char::is_ascii_digit).count();
    let only_punctuation = document
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '/' | ' '));

    if !only_punctuation || !(digits == 11 || digits == 14) {
        return Err(ValidationError::InvalidFormat {
            field: "client_document".to_string(),
            reason: "must be a CPF (11 digits) or CNPJ (14 digits)".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Budget item quantity: positive and at most [`MAX_ITEM_QUANTITY`].
pub fn validate_quantity(qty: Quantity) -> ValidationResult<()> {
    if !qty.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 0,
            max: MAX_ITEM_QUANTITY.milli() / Quantity::SCALE,
        });
    }

    Ok(())
}

/// Unit prices may be zero (courtesy items) but never negative.
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "unit_price".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    Ok(())
}

/// A tax rate must lie in 0..=100%.
pub fn validate_rate(field: &str, rate: Rate) -> ValidationResult<()> {
    if rate.bps() > 10_000 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: 10_000,
        });
    }
    Ok(())
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string.
pub fn validate_uuid(field: &str, id: &str) -> ValidationResult<()> {
    validate_required(field, id)?;

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Input Validators
// =============================================================================

/// Validates a request before intake.
///
/// ## Rules
/// - provider, client and service type are required
/// - description is required and bounded
/// - at least one equipment reference, none blank
/// - the client document, when given, is a CPF or CNPJ
pub fn validate_new_request(input: &NewRequest) -> ValidationResult<()> {
    validate_required("provider_id", &input.provider_id)?;
    validate_required("client_id", &input.client_id)?;
    validate_text("client_name", &input.client_name, MAX_NAME_LEN)?;
    validate_text("service_type", &input.service_type, MAX_NAME_LEN)?;
    validate_text("description", &input.description, MAX_DESCRIPTION_LEN)?;

    if input.equipment_ids.is_empty() {
        return Err(ValidationError::Required {
            field: "equipment_ids".to_string(),
        });
    }
    for id in &input.equipment_ids {
        validate_required("equipment_id", id)?;
    }

    if let Some(document) = &input.client_document {
        validate_document(document)?;
    }

    Ok(())
}

pub fn validate_budget_item(item: &NewBudgetItem) -> ValidationResult<()> {
    validate_text("description", &item.description, MAX_DESCRIPTION_LEN)?;
    validate_quantity(item.quantity)?;
    validate_price_cents(item.unit_price_cents)?;
    Ok(())
}

pub fn validate_checklist_item(item: &NewChecklistItem) -> ValidationResult<()> {
    validate_text("description", &item.description, MAX_DESCRIPTION_LEN)
}

// =============================================================================
// Unit Tests
// =============================================================================
