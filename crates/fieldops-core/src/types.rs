//! # Domain Types
//!
//! Core domain types used throughout FieldOps.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Request      │──►│ BudgetLineItem  │   │  HistoryEntry   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  quantity       │   │  append-only    │       │
//! │  │  number (1001+) │   │  unit_price     │   │  actor, action  │       │
//! │  │  status         │   │  total          │   └─────────────────┘       │
//! │  │  sla_limit      │   └─────────────────┘                              │
//! │  │  locked_by      │                                                    │
//! │  └────────┬────────┘   ┌─────────────────┐   ┌─────────────────┐       │
//! │           │            │  ChecklistItem  │   │   Attachment    │       │
//! │           │            └─────────────────┘   └─────────────────┘       │
//! │           ▼                                                             │
//! │  ┌─────────────────┐   ┌─────────────────┐                              │
//! │  │    Invoice      │──►│  InvoiceEvent   │                              │
//! │  │  gross / net    │   │  append-only    │                              │
//! │  │  tax amounts    │   │  emission, ...  │                              │
//! │  └─────────────────┘   └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every request has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - `number`: per-provider sequential number shown to clients ("Chamado #1001")

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::{Money, Quantity, Rate};
use crate::tax::TaxRegime;

// =============================================================================
// Actor
// =============================================================================

/// The user performing an operation, as recorded in history and events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Actor {
    pub id: String,
    pub name: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Actor {
            id: id.into(),
            name: name.into(),
        }
    }
}

// =============================================================================
// Priority
// =============================================================================

/// Urgency of a request. Determines the SLA deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Emergency,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Emergency => "emergency",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Request Status
// =============================================================================

/// The lifecycle status of a request.
///
/// ```text
/// open ──► assigned ◄──► scheduled ──► in_progress ◄──► paused
///                                            │
///                                            ▼
///                                       completed ──► confirmed
///
/// cancelled is reachable from every non-terminal state
/// ```
///
/// Legal moves live in [`crate::lifecycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Just created, nobody responsible yet.
    Open,
    /// A technician is responsible but no visit is scheduled.
    Assigned,
    /// A visit is scheduled.
    Scheduled,
    /// Technician is on site working.
    InProgress,
    /// Work interrupted (waiting for parts, client absent, ...).
    Paused,
    /// Technician finished the work.
    Completed,
    /// Client confirmed the completed work. Terminal.
    Confirmed,
    /// Abandoned. Terminal.
    Cancelled,
}

impl Default for RequestStatus {
    fn default() -> Self {
        RequestStatus::Open
    }
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 8] = [
        RequestStatus::Open,
        RequestStatus::Assigned,
        RequestStatus::Scheduled,
        RequestStatus::InProgress,
        RequestStatus::Paused,
        RequestStatus::Completed,
        RequestStatus::Confirmed,
        RequestStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Open => "open",
            RequestStatus::Assigned => "assigned",
            RequestStatus::Scheduled => "scheduled",
            RequestStatus::InProgress => "in_progress",
            RequestStatus::Paused => "paused",
            RequestStatus::Completed => "completed",
            RequestStatus::Confirmed => "confirmed",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal states accept no further status change.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Confirmed | RequestStatus::Cancelled)
    }

    /// The completed set: states from which an invoice may be issued.
    #[inline]
    pub fn is_completed(&self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Confirmed)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequestStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "status".to_string(),
                allowed: RequestStatus::ALL.iter().map(|s| s.to_string()).collect(),
            })
    }
}

// =============================================================================
// Request
// =============================================================================

/// A field-service work order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Request {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Provider (tenant) that owns the request.
    pub provider_id: String,

    /// Sequential number within the provider, starting at 1001.
    pub number: i64,

    pub client_id: String,

    /// Client name at creation time (denormalized for listings).
    pub client_name: String,

    /// CPF/CNPJ of the client, used as the invoice recipient document.
    pub client_document: Option<String>,

    pub status: RequestStatus,
    pub priority: Priority,
    pub service_type: String,
    pub description: String,

    /// Technician responsible for the visit.
    pub responsible_id: Option<String>,
    pub responsible_name: Option<String>,

    #[ts(as = "Option<String>")]
    pub scheduled_at: Option<DateTime<Utc>>,

    /// Promised resolution deadline, fixed at creation from the priority.
    #[ts(as = "String")]
    pub sla_limit: DateTime<Utc>,

    #[ts(as = "Option<String>")]
    pub confirmed_at: Option<DateTime<Utc>>,
    pub confirmed_by: Option<String>,

    /// Free-text note from the last status change.
    pub observation: Option<String>,
    pub materials_used: Option<String>,

    #[ts(as = "Option<String>")]
    pub next_maintenance_at: Option<DateTime<Utc>>,

    /// Current edit-lock holder (advisory).
    pub locked_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub locked_at: Option<DateTime<Utc>>,

    /// Live sum of the budget line items, in centavos.
    pub budget_total_cents: i64,
    pub budget_approved: bool,

    /// Signature images as data URLs.
    pub client_signature: Option<String>,
    pub technician_signature: Option<String>,
    #[ts(as = "Option<String>")]
    pub signed_at: Option<DateTime<Utc>>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,

    /// Equipment covered by this request (stored in a join table).
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub equipment_ids: Vec<String>,
}

impl Request {
    /// Returns the budget total as Money.
    #[inline]
    pub fn budget_total(&self) -> Money {
        Money::from_cents(self.budget_total_cents)
    }

    /// Whether the SLA deadline has passed without the work being done.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_completed() && !self.status.is_terminal() && now > self.sla_limit
    }
}

// =============================================================================
// Request Inputs
// =============================================================================

/// Input for creating a request.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewRequest {
    pub provider_id: String,
    pub client_id: String,
    pub client_name: String,
    pub client_document: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    pub service_type: String,
    pub description: String,
    pub equipment_ids: Vec<String>,
    #[ts(as = "Option<String>")]
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Partial edit of the descriptive fields of a request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RequestUpdate {
    pub priority: Option<Priority>,
    pub service_type: Option<String>,
    pub description: Option<String>,
    #[ts(as = "Option<String>")]
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl RequestUpdate {
    pub fn is_empty(&self) -> bool {
        self.priority.is_none()
            && self.service_type.is_none()
            && self.description.is_none()
            && self.scheduled_at.is_none()
    }
}

/// A status change plus the side-channel fields written with it.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StatusChange {
    pub status: RequestStatus,
    pub observation: Option<String>,
    pub materials_used: Option<String>,
    #[ts(as = "Option<String>")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub next_maintenance_at: Option<DateTime<Utc>>,
}

impl StatusChange {
    pub fn to(status: RequestStatus) -> Self {
        StatusChange {
            status,
            observation: None,
            materials_used: None,
            scheduled_at: None,
            next_maintenance_at: None,
        }
    }

    pub fn with_observation(mut self, observation: impl Into<String>) -> Self {
        self.observation = Some(observation.into());
        self
    }

    pub fn with_materials(mut self, materials: impl Into<String>) -> Self {
        self.materials_used = Some(materials.into());
        self
    }
}

/// Filter for listing requests of a provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub responsible_id: Option<String>,
}

// =============================================================================
// Signature
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SignatureKind {
    Client,
    Technician,
}

impl fmt::Display for SignatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignatureKind::Client => f.write_str("client"),
            SignatureKind::Technician => f.write_str("technician"),
        }
    }
}

// =============================================================================
// Budget
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum BudgetCategory {
    Service,
    Material,
    Labor,
}

impl Default for BudgetCategory {
    fn default() -> Self {
        BudgetCategory::Service
    }
}

/// One line of a request's budget.
///
/// `quantity` is in thousandths of a unit. `total_cents` is
/// `quantity × unit_price_cents` rounded half-up to the cent; it is computed
/// when the item is created and never edited afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct BudgetLineItem {
    pub id: String,
    pub request_id: String,
    pub description: String,
    pub quantity: Quantity,
    pub unit_price_cents: i64,
    pub total_cents: i64,
    pub category: BudgetCategory,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl BudgetLineItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// Input for adding a budget line.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewBudgetItem {
    pub description: String,
    pub quantity: Quantity,
    pub unit_price_cents: i64,
    #[serde(default)]
    pub category: BudgetCategory,
}

// =============================================================================
// History
// =============================================================================

/// Append-only audit record for a request.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct HistoryEntry {
    pub id: String,
    pub request_id: String,
    pub actor_id: String,
    pub actor_name: String,
    pub action: String,
    pub details: Option<String>,
    pub before_value: Option<String>,
    pub after_value: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Checklist
// =============================================================================

/// A verification step the technician ticks off during the visit.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ChecklistItem {
    pub id: String,
    pub request_id: String,
    /// Equipment this step refers to, when the request covers several.
    pub equipment_id: Option<String>,
    pub description: String,
    pub checked: bool,
    pub observation: Option<String>,
    pub checked_by_id: Option<String>,
    pub checked_by_name: Option<String>,
    #[ts(as = "Option<String>")]
    pub checked_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewChecklistItem {
    pub description: String,
    pub equipment_id: Option<String>,
}

// =============================================================================
// Attachment
// =============================================================================

/// Metadata of a file stored in blob storage and linked to a request.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Attachment {
    pub id: String,
    pub request_id: String,
    pub file_name: String,
    /// Location returned by blob storage; also the key used to delete it.
    pub url: String,
    pub mime_type: String,
    pub file_size: i64,
    pub uploaded_by_id: String,
    pub uploaded_by_name: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Invoice
// =============================================================================

/// Lifecycle of a fiscal service invoice (NFS-e).
///
/// ```text
/// pending ──► processing ──► issued ──► cancelled
///                   │
///                   └──────► error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    Processing,
    Issued,
    Cancelled,
    Error,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Processing => "processing",
            InvoiceStatus::Issued => "issued",
            InvoiceStatus::Cancelled => "cancelled",
            InvoiceStatus::Error => "error",
        }
    }

    /// Active invoices block a second issuance for the same request.
    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            InvoiceStatus::Pending | InvoiceStatus::Processing | InvoiceStatus::Issued
        )
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fiscal service invoice derived from a completed request.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Invoice {
    pub id: String,
    pub request_id: String,
    pub provider_id: String,

    pub recipient_name: String,
    pub recipient_document: Option<String>,

    /// "Discriminação" printed on the document.
    pub service_description: String,
    pub service_code: Option<String>,

    pub regime: TaxRegime,
    pub gross_cents: i64,
    pub deductions_cents: i64,
    pub net_cents: i64,

    pub iss_rate_bps: i64,
    pub iss_cents: i64,
    pub iss_withheld: bool,
    pub pis_cents: i64,
    pub cofins_cents: i64,
    pub csll_cents: i64,
    pub irpj_cents: i64,
    pub inss_cents: i64,
    pub total_taxes_cents: i64,

    pub status: InvoiceStatus,
    /// Number assigned by the municipal authority.
    pub issued_number: Option<String>,
    pub verification_code: Option<String>,
    pub error_message: Option<String>,

    #[ts(as = "Option<String>")]
    pub issued_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    #[inline]
    pub fn gross(&self) -> Money {
        Money::from_cents(self.gross_cents)
    }

    #[inline]
    pub fn net(&self) -> Money {
        Money::from_cents(self.net_cents)
    }

    #[inline]
    pub fn total_taxes(&self) -> Money {
        Money::from_cents(self.total_taxes_cents)
    }

    pub fn iss_rate(&self) -> Rate {
        Rate::from_bps(u32::try_from(self.iss_rate_bps).unwrap_or(0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceEventKind {
    Emission,
    Authorization,
    Rejection,
    Cancellation,
}

impl fmt::Display for InvoiceEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InvoiceEventKind::Emission => "emission",
            InvoiceEventKind::Authorization => "authorization",
            InvoiceEventKind::Rejection => "rejection",
            InvoiceEventKind::Cancellation => "cancellation",
        };
        f.write_str(s)
    }
}

/// Append-only audit entry for an invoice status transition.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InvoiceEvent {
    pub id: String,
    pub invoice_id: String,
    pub kind: InvoiceEventKind,
    /// Invoice status after the transition.
    pub status: InvoiceStatus,
    pub message: String,
    pub reason: Option<String>,
    pub actor_id: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_status_parsing() {
        assert_eq!("in_progress".parse::<RequestStatus>().unwrap(), RequestStatus::InProgress);
        assert_eq!(" Confirmed ".parse::<RequestStatus>().unwrap(), RequestStatus::Confirmed);
        assert!("EM_ANDAMENTO".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn test_status_sets() {
        assert!(RequestStatus::Completed.is_completed());
        assert!(RequestStatus::Confirmed.is_completed());
        assert!(!RequestStatus::Paused.is_completed());

        assert!(RequestStatus::Cancelled.is_terminal());
        assert!(!RequestStatus::Completed.is_terminal());
    }

    #[test]
    fn test_status_serde_matches_as_str() {
        for status in RequestStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }

    #[test]
    fn test_invoice_status_active() {
        assert!(InvoiceStatus::Processing.is_active());
        assert!(InvoiceStatus::Issued.is_active());
        assert!(!InvoiceStatus::Error.is_active());
        assert!(!InvoiceStatus::Cancelled.is_active());
    }

    #[test]
    fn test_request_overdue() {
        let created = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        let mut request = Request {
            id: "r1".into(),
            provider_id: "p1".into(),
            number: 1001,
            client_id: "c1".into(),
            client_name: "Padaria Central".into(),
            client_document: None,
            status: RequestStatus::InProgress,
            priority: Priority::High,
            service_type: "preventiva".into(),
            description: "Revisão do compressor".into(),
            responsible_id: None,
            responsible_name: None,
            scheduled_at: None,
            sla_limit: created + chrono::Duration::hours(24),
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
            created_at: created,
            updated_at: created,
            equipment_ids: vec!["eq-1".into()],
        };

        let late = created + chrono::Duration::hours(25);
        assert!(request.is_overdue(late));

        request.status = RequestStatus::Completed;
        assert!(!request.is_overdue(late));
    }
}
