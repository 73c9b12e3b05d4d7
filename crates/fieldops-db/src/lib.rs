//! # fieldops-db: Database Layer for FieldOps
//!
//! SQLite persistence for the request lifecycle and invoicing engine,
//! built on sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        FieldOps Data Flow                               │
//! │                                                                         │
//! │  fieldops-engine (RequestService, InvoiceService, ...)                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   fieldops-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │ (request.rs)  │    │  (embedded)  │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ SqlitePool    │    │ RequestRepo   │    │ 001_initial  │  │   │
//! │  │   │ Connection    │◄───│ BudgetRepo    │    │   _schema    │  │   │
//! │  │   │ Management    │    │ InvoiceRepo   │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fieldops_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("./fieldops.db")).await?;
//!
//! let request = db.requests().get_by_number("provider-1", 1001).await?;
//! let items = db.budget().items(&request.unwrap().id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::attachment::AttachmentRepository;
pub use repository::budget::BudgetRepository;
pub use repository::checklist::ChecklistRepository;
pub use repository::fiscal::FiscalRepository;
pub use repository::history::HistoryRepository;
pub use repository::invoice::{Authorization, InvoiceRepository};
pub use repository::request::{LockState, RequestRepository};
pub use repository::sequence::SequenceRepository;
