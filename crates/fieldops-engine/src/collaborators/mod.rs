//! # Collaborators
//!
//! Everything the engine talks to that is not its own database.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Trait              Default              Other implementations          │
//! │  ─────              ───────              ─────────────────────          │
//! │  EventPublisher     NoOpPublisher        BroadcastPublisher (tokio)     │
//! │  BlobStorage        UnconfiguredStorage  LocalBlobStorage (tokio::fs)   │
//! │  InvoiceAuthority   UnconfiguredAuthority                               │
//! │  Mailer             NoOpMailer                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Publishing is fire-and-forget. Blob, authority and mail calls are async
//! and fallible; how a failure is handled depends on the operation.

pub mod authority;
pub mod events;
pub mod mail;
pub mod storage;

pub use authority::{
    AuthorityCredentials, AuthorityError, AuthorityReceipt, InvoiceAuthority, PreparedInvoice,
    UnconfiguredAuthority,
};
pub use events::{BroadcastPublisher, EventPublisher, NoOpPublisher, PublishedEvent};
pub use mail::{MailError, Mailer, NoOpMailer};
pub use storage::{BlobStorage, LocalBlobStorage, StorageError, UnconfiguredStorage, UploadedFile};
