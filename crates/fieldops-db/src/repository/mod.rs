//! # Repository Module
//!
//! Database repository implementations for FieldOps.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Service (fieldops-engine)                                              │
//! │       │                                                                 │
//! │       │  db.requests().get(&id)                                        │
//! │       ▼                                                                 │
//! │  RequestRepository                                                     │
//! │  ├── create(request, history)    one transaction                       │
//! │  ├── save(request, expected, history)                                  │
//! │  ├── try_lock / unlock                                                 │
//! │  └── delete_cascade(id)                                                │
//! │       │                                                                 │
//! │       │  SQL                                                            │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Repositories never read the clock: every timestamp they write arrives
//! on the entity or as an argument.
//!
//! ## Available Repositories
//!
//! - [`RequestRepository`](request::RequestRepository) - Requests, equipment, edit lock, delete
//! - [`SequenceRepository`](sequence::SequenceRepository) - Per-provider numbering
//! - [`BudgetRepository`](budget::BudgetRepository) - Budget lines and totals
//! - [`HistoryRepository`](history::HistoryRepository) - Audit trail
//! - [`ChecklistRepository`](checklist::ChecklistRepository) - Checklist items
//! - [`AttachmentRepository`](attachment::AttachmentRepository) - Attachment records
//! - [`FiscalRepository`](fiscal::FiscalRepository) - Fiscal configuration
//! - [`InvoiceRepository`](invoice::InvoiceRepository) - Invoices and their events

pub mod attachment;
pub mod budget;
pub mod checklist;
pub mod fiscal;
pub mod history;
pub mod invoice;
pub mod request;
pub mod sequence;

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{DateTime, TimeZone, Utc};
    use fieldops_core::sla::sla_deadline;
    use fieldops_core::{HistoryEntry, Priority, Request, RequestStatus};

    pub fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap()
    }

    pub fn new_request(provider_id: &str, id: &str) -> Request {
        Request {
            id: id.to_string(),
            provider_id: provider_id.to_string(),
            number: 0,
            client_id: "client-1".into(),
            client_name: "Padaria Central".into(),
            client_document: Some("12345678000195".into()),
            status: RequestStatus::Open,
            priority: Priority::High,
            service_type: "Preventive maintenance".into(),
            description: "Cold room compressor".into(),
            responsible_id: None,
            responsible_name: None,
            scheduled_at: None,
            sla_limit: sla_deadline(Priority::High, t0()),
            confirmed_at: None,
            confirmed_by: None,
            observation: None,
            materials_used: None,
            next_maintenance_at: None,
            locked_by: None,
            locked_at: None,
            budget_total_cents: 0,
            budget_approved: false,
            client_signature: None,
            technician_signature: None,
            signed_at: None,
            created_at: t0(),
            updated_at: t0(),
            equipment_ids: vec!["eq-1".into(), "eq-2".into()],
        }
    }

    pub fn history_entry(request_id: &str, action: &str) -> HistoryEntry {
        HistoryEntry {
            id: uuid::Uuid::new_v4().to_string(),
            request_id: request_id.to_string(),
            actor_id: "user-1".into(),
            actor_name: "Ana".into(),
            action: action.to_string(),
            details: None,
            before_value: None,
            after_value: None,
            created_at: t0(),
        }
    }
}
