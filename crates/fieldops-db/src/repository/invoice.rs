//! # Invoice Repository
//!
//! Invoices and their append-only event trail.
//!
//! ## Status Writes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create_processing   INSERT invoice (processing) + emission event       │
//! │  mark_issued         processing → issued     + authorization event     │
//! │                                              + request history         │
//! │  mark_error          processing → error      + rejection event         │
//! │  mark_cancelled      issued     → cancelled  + cancellation event      │
//! │                                              + request history         │
//! │                                                                         │
//! │  Each row is one transaction. Status UPDATEs are guarded by the        │
//! │  expected current status; a miss is DbError::StateConflict.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use super::history;
use crate::error::{DbError, DbResult};
use fieldops_core::{HistoryEntry, Invoice, InvoiceEvent, InvoiceStatus};

const SELECT_INVOICE: &str = r#"
    SELECT id, request_id, provider_id, recipient_name, recipient_document,
           service_description, service_code, regime,
           gross_cents, deductions_cents, net_cents,
           iss_rate_bps, iss_cents, iss_withheld,
           pis_cents, cofins_cents, csll_cents, irpj_cents, inss_cents,
           total_taxes_cents, status, issued_number, verification_code,
           error_message, issued_at, created_at, updated_at
    FROM invoices
"#;

const SELECT_EVENT: &str = r#"
    SELECT e.id, e.invoice_id, e.kind, e.status, e.message, e.reason,
           e.actor_id, e.created_at
    FROM invoice_events e
"#;

async fn insert_event_in(conn: &mut SqliteConnection, event: &InvoiceEvent) -> DbResult<()> {
    debug!(invoice_id = %event.invoice_id, kind = %event.kind, "Appending invoice event");

    sqlx::query(
        r#"
        INSERT INTO invoice_events (
            id, invoice_id, kind, status, message, reason, actor_id, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&event.id)
    .bind(&event.invoice_id)
    .bind(event.kind)
    .bind(event.status)
    .bind(&event.message)
    .bind(&event.reason)
    .bind(&event.actor_id)
    .bind(event.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn fetch_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Invoice> {
    let sql = format!("{SELECT_INVOICE} WHERE id = ?1");
    sqlx::query_as::<_, Invoice>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Invoice", id))
}

/// Fields written when the authority accepts an invoice.
#[derive(Debug, Clone)]
pub struct Authorization {
    pub issued_number: String,
    pub verification_code: String,
    pub issued_at: DateTime<Utc>,
}

/// Repository for invoices and invoice events.
#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: SqlitePool,
}

impl InvoiceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        InvoiceRepository { pool }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get(&self, id: &str) -> DbResult<Option<Invoice>> {
        let sql = format!("{SELECT_INVOICE} WHERE id = ?1");
        let invoice = sqlx::query_as::<_, Invoice>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(invoice)
    }

    /// Most recent invoice of a request, whatever its status.
    pub async fn latest_for_request(&self, request_id: &str) -> DbResult<Option<Invoice>> {
        let sql = format!(
            "{SELECT_INVOICE} WHERE request_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT 1"
        );
        let invoice = sqlx::query_as::<_, Invoice>(&sql)
            .bind(request_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(invoice)
    }

    /// The pending, processing or issued invoice of a request, if any.
    pub async fn active_for_request(&self, request_id: &str) -> DbResult<Option<Invoice>> {
        let sql = format!(
            "{SELECT_INVOICE} WHERE request_id = ?1 \
             AND status IN ('pending', 'processing', 'issued') LIMIT 1"
        );
        let invoice = sqlx::query_as::<_, Invoice>(&sql)
            .bind(request_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(invoice)
    }

    /// Events of one invoice, newest first.
    pub async fn events(&self, invoice_id: &str) -> DbResult<Vec<InvoiceEvent>> {
        let sql = format!("{SELECT_EVENT} WHERE e.invoice_id = ?1 ORDER BY e.created_at DESC, e.rowid DESC");
        let events = sqlx::query_as::<_, InvoiceEvent>(&sql)
            .bind(invoice_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(events)
    }

    /// Events of every invoice of a request, newest first.
    pub async fn events_for_request(&self, request_id: &str) -> DbResult<Vec<InvoiceEvent>> {
        let sql = format!(
            "{SELECT_EVENT} JOIN invoices i ON i.id = e.invoice_id \
             WHERE i.request_id = ?1 ORDER BY e.created_at DESC, e.rowid DESC"
        );
        let events = sqlx::query_as::<_, InvoiceEvent>(&sql)
            .bind(request_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(events)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Inserts a new invoice together with its emission event.
    ///
    /// Fails with [`DbError::UniqueViolation`] when the request already has
    /// an active invoice.
    pub async fn create_processing(&self, invoice: &Invoice, event: &InvoiceEvent) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, request_id, provider_id, recipient_name, recipient_document,
                service_description, service_code, regime,
                gross_cents, deductions_cents, net_cents,
                iss_rate_bps, iss_cents, iss_withheld,
                pis_cents, cofins_cents, csll_cents, irpj_cents, inss_cents,
                total_taxes_cents, status, issued_number, verification_code,
                error_message, issued_at, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8,
                ?9, ?10, ?11,
                ?12, ?13, ?14,
                ?15, ?16, ?17, ?18, ?19,
                ?20, ?21, ?22, ?23,
                ?24, ?25, ?26, ?27
            )
            "#,
        )
        .bind(&invoice.id)
        .bind(&invoice.request_id)
        .bind(&invoice.provider_id)
        .bind(&invoice.recipient_name)
        .bind(&invoice.recipient_document)
        .bind(&invoice.service_description)
        .bind(&invoice.service_code)
        .bind(invoice.regime)
        .bind(invoice.gross_cents)
        .bind(invoice.deductions_cents)
        .bind(invoice.net_cents)
        .bind(invoice.iss_rate_bps)
        .bind(invoice.iss_cents)
        .bind(invoice.iss_withheld)
        .bind(invoice.pis_cents)
        .bind(invoice.cofins_cents)
        .bind(invoice.csll_cents)
        .bind(invoice.irpj_cents)
        .bind(invoice.inss_cents)
        .bind(invoice.total_taxes_cents)
        .bind(invoice.status)
        .bind(&invoice.issued_number)
        .bind(&invoice.verification_code)
        .bind(&invoice.error_message)
        .bind(invoice.issued_at)
        .bind(invoice.created_at)
        .bind(invoice.updated_at)
        .execute(&mut *tx)
        .await?;

        insert_event_in(&mut tx, event).await?;
        tx.commit().await?;

        info!(id = %invoice.id, request_id = %invoice.request_id, "Invoice created");
        Ok(())
    }

    /// `processing → issued`, with the authorization event and the request
    /// history entry.
    pub async fn mark_issued(
        &self,
        id: &str,
        authorization: &Authorization,
        event: &InvoiceEvent,
        entry: &HistoryEntry,
    ) -> DbResult<Invoice> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE invoices SET
                status = 'issued',
                issued_number = ?2,
                verification_code = ?3,
                issued_at = ?4,
                error_message = NULL,
                updated_at = ?4
            WHERE id = ?1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(&authorization.issued_number)
        .bind(&authorization.verification_code)
        .bind(authorization.issued_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::state_conflict("Invoice", id, InvoiceStatus::Processing.as_str()));
        }

        insert_event_in(&mut tx, event).await?;
        history::insert_in(&mut tx, entry).await?;
        let invoice = fetch_in(&mut tx, id).await?;
        tx.commit().await?;

        Ok(invoice)
    }

    /// `processing → error`, with the rejection event.
    pub async fn mark_error(
        &self,
        id: &str,
        message: &str,
        event: &InvoiceEvent,
    ) -> DbResult<Invoice> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE invoices SET status = 'error', error_message = ?2, updated_at = ?3
            WHERE id = ?1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(message)
        .bind(event.created_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::state_conflict("Invoice", id, InvoiceStatus::Processing.as_str()));
        }

        insert_event_in(&mut tx, event).await?;
        let invoice = fetch_in(&mut tx, id).await?;
        tx.commit().await?;

        Ok(invoice)
    }

    /// `issued → cancelled`, with the cancellation event and the request
    /// history entry.
    pub async fn mark_cancelled(
        &self,
        id: &str,
        message: &str,
        event: &InvoiceEvent,
        entry: &HistoryEntry,
    ) -> DbResult<Invoice> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE invoices SET status = 'cancelled', error_message = ?2, updated_at = ?3
            WHERE id = ?1 AND status = 'issued'
            "#,
        )
        .bind(id)
        .bind(message)
        .bind(event.created_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::state_conflict("Invoice", id, InvoiceStatus::Issued.as_str()));
        }

        insert_event_in(&mut tx, event).await?;
        history::insert_in(&mut tx, entry).await?;
        let invoice = fetch_in(&mut tx, id).await?;
        tx.commit().await?;

        Ok(invoice)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::{history_entry, new_request, t0};
    use crate::{Database, DbConfig};
    use chrono::Duration;
    use fieldops_core::{InvoiceEventKind, TaxRegime};

    fn invoice(id: &str, created_at: DateTime<Utc>) -> Invoice {
        Invoice {
            id: id.to_string(),
            request_id: "r-1".into(),
            provider_id: "p1".into(),
            recipient_name: "Padaria Central".into(),
            recipient_document: Some("12345678000195".into()),
            service_description: "Preventive maintenance".into(),
            service_code: Some("14.01".into()),
            regime: TaxRegime::LucroPresumido,
            gross_cents: 100_000,
            deductions_cents: 0,
            net_cents: 56_350,
            iss_rate_bps: 500,
            iss_cents: 5_000,
            iss_withheld: false,
            pis_cents: 650,
            cofins_cents: 3_000,
            csll_cents: 9_000,
            irpj_cents: 15_000,
            inss_cents: 11_000,
            total_taxes_cents: 43_650,
            status: InvoiceStatus::Processing,
            issued_number: None,
            verification_code: None,
            error_message: None,
            issued_at: None,
            created_at,
            updated_at: created_at,
        }
    }

    fn event(invoice_id: &str, kind: InvoiceEventKind, status: InvoiceStatus, at: DateTime<Utc>) -> InvoiceEvent {
        InvoiceEvent {
            id: uuid::Uuid::new_v4().to_string(),
            invoice_id: invoice_id.to_string(),
            kind,
            status,
            message: kind.to_string(),
            reason: None,
            actor_id: "user-1".into(),
            created_at: at,
        }
    }

    async fn setup() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.requests()
            .create(new_request("p1", "r-1"), &history_entry("r-1", "Request created"))
            .await
            .unwrap();
        db
    }

    #[tokio::test]
    async fn test_issue_flow_records_events() {
        let db = setup().await;
        let repo = db.invoices();

        repo.create_processing(
            &invoice("i-1", t0()),
            &event("i-1", InvoiceEventKind::Emission, InvoiceStatus::Processing, t0()),
        )
        .await
        .unwrap();

        let later = t0() + Duration::seconds(5);
        let issued = repo
            .mark_issued(
                "i-1",
                &Authorization {
                    issued_number: "2026000123".into(),
                    verification_code: "AB12-CD34".into(),
                    issued_at: later,
                },
                &event("i-1", InvoiceEventKind::Authorization, InvoiceStatus::Issued, later),
                &history_entry("r-1", "Invoice issued"),
            )
            .await
            .unwrap();

        assert_eq!(issued.status, InvoiceStatus::Issued);
        assert_eq!(issued.issued_number.as_deref(), Some("2026000123"));
        assert_eq!(issued.issued_at, Some(later));

        let events = repo.events_for_request("r-1").await.unwrap();
        let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![InvoiceEventKind::Authorization, InvoiceEventKind::Emission]);
        assert_eq!(repo.events("i-1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_second_active_invoice_rejected() {
        let db = setup().await;
        let repo = db.invoices();

        repo.create_processing(
            &invoice("i-1", t0()),
            &event("i-1", InvoiceEventKind::Emission, InvoiceStatus::Processing, t0()),
        )
        .await
        .unwrap();

        let err = repo
            .create_processing(
                &invoice("i-2", t0()),
                &event("i-2", InvoiceEventKind::Emission, InvoiceStatus::Processing, t0()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
        // the emission event of the rejected insert was rolled back
        assert_eq!(repo.events_for_request("r-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_error_invoice_allows_reissue() {
        let db = setup().await;
        let repo = db.invoices();

        repo.create_processing(
            &invoice("i-1", t0()),
            &event("i-1", InvoiceEventKind::Emission, InvoiceStatus::Processing, t0()),
        )
        .await
        .unwrap();
        let failed = repo
            .mark_error(
                "i-1",
                "authority unavailable",
                &event("i-1", InvoiceEventKind::Rejection, InvoiceStatus::Error, t0()),
            )
            .await
            .unwrap();
        assert_eq!(failed.status, InvoiceStatus::Error);
        assert!(repo.active_for_request("r-1").await.unwrap().is_none());

        let later = t0() + Duration::seconds(60);
        repo.create_processing(
            &invoice("i-2", later),
            &event("i-2", InvoiceEventKind::Emission, InvoiceStatus::Processing, later),
        )
        .await
        .unwrap();
        assert_eq!(repo.latest_for_request("r-1").await.unwrap().unwrap().id, "i-2");
    }

    #[tokio::test]
    async fn test_status_guards() {
        let db = setup().await;
        let repo = db.invoices();

        repo.create_processing(
            &invoice("i-1", t0()),
            &event("i-1", InvoiceEventKind::Emission, InvoiceStatus::Processing, t0()),
        )
        .await
        .unwrap();

        // cannot cancel while processing
        let err = repo
            .mark_cancelled(
                "i-1",
                "Cancelled: duplicate",
                &event("i-1", InvoiceEventKind::Cancellation, InvoiceStatus::Cancelled, t0()),
                &history_entry("r-1", "Invoice cancelled"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::StateConflict { .. }));
        assert_eq!(repo.events("i-1").await.unwrap().len(), 1);
        assert_eq!(db.history().list("r-1").await.unwrap().len(), 1);
    }
}
