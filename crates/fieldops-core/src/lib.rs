//! # fieldops-core: Pure Business Logic for FieldOps
//!
//! Domain types and rules for field-service requests and their fiscal
//! (NFS-e) invoices. Every function here is deterministic and free of I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        FieldOps Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  fieldops-engine (services)                     │   │
//! │  │   RequestService, LockService, BudgetService, InvoiceService   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ fieldops-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │ lifecycle │  │    tax    │  │   money   │  │   │
//! │  │   │  Request  │  │ sla, lock │  │  engine   │  │ Money     │  │   │
//! │  │   │  Invoice  │  │  budget   │  │  tables   │  │ Rate      │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • NO WALL CLOCK            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                fieldops-db (Database Layer)                     │   │
//! │  │           SQLite queries, migrations, repositories              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Request, Invoice, BudgetLineItem, ...)
//! - [`money`] - Integer centavos and basis-point rates
//! - [`lifecycle`] - Request status transition table
//! - [`sla`] - SLA deadline per priority
//! - [`lock`] - Edit lock expiry rules
//! - [`budget`] - Budget totals and suggestion catalog
//! - [`tax`] - Fiscal configuration, rule tables and the tax engine
//! - [`validation`] - Input validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use fieldops_core::money::Money;
//! use fieldops_core::tax::{calculate, FiscalConfiguration, TaxRegime};
//!
//! let config = FiscalConfiguration::suggested("provider-1", TaxRegime::SimplesNacional);
//! let breakdown = calculate(Money::from_cents(50_000), Money::zero(), &config).unwrap();
//!
//! // Simples Nacional taxes are paid through the DAS, not on the invoice
//! assert!(breakdown.total_taxes.is_zero());
//! assert!(breakdown.das_inclusive);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod budget;
pub mod error;
pub mod lifecycle;
pub mod lock;
pub mod money;
pub mod sla;
pub mod tax;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use lock::{LockOutcome, LockPolicy};
pub use money::{Money, Quantity, Rate};
pub use tax::{FiscalConfiguration, TaxBreakdown, TaxRegime};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// First number handed out to a provider's requests.
pub const FIRST_REQUEST_NUMBER: i64 = 1001;

/// Maximum quantity on a single budget line.
pub const MAX_ITEM_QUANTITY: Quantity = Quantity::units(9_999);

/// Maximum length of names (client, service type, file names).
pub const MAX_NAME_LEN: usize = 200;

/// Maximum length of free-text descriptions.
pub const MAX_DESCRIPTION_LEN: usize = 2_000;
