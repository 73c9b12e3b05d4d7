//! # fieldops-engine: Request Lifecycle & Invoicing Services
//!
//! The service layer of FieldOps. Every operation takes structured input,
//! applies the rules from `fieldops-core`, persists through `fieldops-db`
//! and returns `Result<T, ServiceError>`.
//!
//! ## Services
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              Engine                                     │
//! │                                                                         │
//! │   requests()   RequestService   create, assign, update_status,         │
//! │                                 confirm, checklist, attachments,       │
//! │                                 signatures, history, delete            │
//! │   locks()      LockService      acquire, release                       │
//! │   budget()     BudgetService    add_item, remove_item, approve         │
//! │   invoices()   InvoiceService   issue, cancel, preview_taxes,          │
//! │                                 fiscal configuration                   │
//! │                                                                         │
//! │   Shared context: Database • Clock • EventPublisher • BlobStorage •    │
//! │                   InvoiceAuthority • Mailer • LockPolicy               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//! ```rust,ignore
//! use fieldops_db::{Database, DbConfig};
//! use fieldops_engine::{init_tracing, Engine, EngineConfig};
//!
//! init_tracing();
//! let config = EngineConfig::load_or_default(None);
//! let db = Database::new(config.db_config()).await?;
//! let engine = Engine::builder(db).config(&config).build();
//!
//! let request = engine.requests().create(input, &actor).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod budget;
pub mod clock;
pub mod collaborators;
pub mod config;
mod context;
pub mod error;
pub mod invoice;
pub mod lock;
pub mod request;
pub mod telemetry;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use budget::BudgetService;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, EngineConfig};
pub use context::{Engine, EngineBuilder};
pub use error::{ErrorBody, ErrorCode, ServiceError, ServiceResult};
pub use invoice::{InvoiceService, IssuedInvoice};
pub use lock::LockService;
pub use request::RequestService;
pub use telemetry::init_tracing;
