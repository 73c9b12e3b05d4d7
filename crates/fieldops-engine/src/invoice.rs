//! # Invoice Service
//!
//! Issues and cancels service invoices (NFS-e) for completed requests.
//!
//! ## Emission Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  issue() ──► checks ──► calculate taxes ──► INSERT processing invoice  │
//! │                                             + emission event           │
//! │     │                                             │                     │
//! │     │ returns now                                 ▼                     │
//! │     ▼                                  tokio::spawn(emission task)      │
//! │  IssuedInvoice { invoice, emission }              │                     │
//! │                                                   ▼                     │
//! │                         authority.submit() under emission_timeout       │
//! │                                 │                     │                 │
//! │                              receipt           rejection / timeout      │
//! │                                 ▼                     ▼                 │
//! │                     issued + authorization     error + rejection        │
//! │                     + "Invoice issued"                                  │
//! │                     + optional mail                                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Callers observe the outcome by polling [`InvoiceService::get`], or by
//! awaiting the returned join handle. A started emission is never
//! cancelled.
//!
//! Writing the outcome is retried with exponential backoff for the
//! configured window. An authorization that still cannot be written is
//! recorded as an error that carries the authority's number, so the invoice
//! never stays in `processing`.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use fieldops_core::budget::{budget_total, ensure_invoiceable};
use fieldops_core::tax::{calculate, regime_catalog, CancellationReason, RegimeInfo};
use fieldops_core::validation::validate_required;
use fieldops_core::{
    Actor, CoreError, FiscalConfiguration, Invoice, InvoiceEvent, InvoiceEventKind,
    InvoiceStatus, Money, Request, TaxBreakdown, TaxRegime,
};
use fieldops_db::{Authorization, DbError, DbResult};

use crate::collaborators::events::{
    INVOICE_CANCELLED, INVOICE_FAILED, INVOICE_ISSUED, INVOICE_PROCESSING,
};
use crate::collaborators::{AuthorityCredentials, AuthorityReceipt, PreparedInvoice};
use crate::context::Context;
use crate::error::{ServiceError, ServiceResult};

const ACTIVE_INVOICE: &str = "Request already has an active invoice";

/// A freshly created invoice and the task that is emitting it.
#[derive(Debug)]
pub struct IssuedInvoice {
    /// The invoice as inserted, in `processing`.
    pub invoice: Invoice,
    pub emission: JoinHandle<()>,
}

pub struct InvoiceService {
    ctx: Arc<Context>,
}

impl InvoiceService {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        InvoiceService { ctx }
    }

    // =========================================================================
    // Issue
    // =========================================================================

    /// Starts the emission of an invoice for a completed request.
    pub async fn issue(&self, request_id: &str, actor: &Actor) -> ServiceResult<IssuedInvoice> {
        self.start(request_id, actor, None).await
    }

    /// Same as [`issue`](Self::issue), and mails the recipient once the
    /// authority accepts the invoice.
    pub async fn issue_and_notify(
        &self,
        request_id: &str,
        actor: &Actor,
        recipient_email: &str,
    ) -> ServiceResult<IssuedInvoice> {
        validate_required("recipient_email", recipient_email)?;
        self.start(request_id, actor, Some(recipient_email.trim().to_string()))
            .await
    }

    async fn start(
        &self,
        request_id: &str,
        actor: &Actor,
        recipient_email: Option<String>,
    ) -> ServiceResult<IssuedInvoice> {
        let request = self.ctx.load_request(request_id).await?;
        let items = self.ctx.db.budget().items(request_id).await?;
        let total = budget_total(&items);

        ensure_invoiceable(request.status, total)?;

        let config = self
            .ctx
            .db
            .fiscal()
            .get(&request.provider_id)
            .await?
            .ok_or_else(|| ServiceError::validation("fiscal configuration missing"))?;

        if self
            .ctx
            .db
            .invoices()
            .active_for_request(request_id)
            .await?
            .is_some()
        {
            return Err(ServiceError::validation(ACTIVE_INVOICE));
        }

        let breakdown = calculate(total, Money::zero(), &config)?;
        let now = self.ctx.now();
        let invoice = build_invoice(&request, &config, &breakdown, now);

        let event = InvoiceEvent {
            id: Uuid::new_v4().to_string(),
            invoice_id: invoice.id.clone(),
            kind: InvoiceEventKind::Emission,
            status: InvoiceStatus::Processing,
            message: breakdown.summary(),
            reason: None,
            actor_id: actor.id.clone(),
            created_at: now,
        };

        match self.ctx.db.invoices().create_processing(&invoice, &event).await {
            Ok(()) => {}
            Err(DbError::UniqueViolation { .. }) => {
                return Err(ServiceError::validation(ACTIVE_INVOICE))
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            invoice_id = %invoice.id,
            request_id = %request_id,
            gross = %breakdown.gross,
            total_taxes = %breakdown.total_taxes,
            "Invoice emission started"
        );
        self.ctx.publish(
            INVOICE_PROCESSING,
            json!({ "invoice_id": invoice.id, "request_id": request_id }),
        );

        let prepared = PreparedInvoice {
            invoice_id: invoice.id.clone(),
            provider_id: request.provider_id.clone(),
            request_number: request.number,
            recipient_name: invoice.recipient_name.clone(),
            recipient_document: invoice.recipient_document.clone(),
            service_description: invoice.service_description.clone(),
            service_code: config.service_code.clone(),
            municipality_code: config.municipality_code.clone(),
            regime: config.regime,
            gross: breakdown.gross,
            deductions: breakdown.deductions,
            net: breakdown.net,
            iss_rate: breakdown.iss.rate,
            iss_amount: breakdown.iss.amount,
            iss_withheld: breakdown.iss.withheld,
            total_taxes: breakdown.total_taxes,
            issued_on: now,
        };
        let credentials = AuthorityCredentials {
            provider_id: config.provider_id.clone(),
            environment: config.environment,
            municipal_registration: config.municipal_registration.clone(),
            certificate_path: self
                .ctx
                .certificate_dir
                .as_ref()
                .map(|dir| dir.join(format!("{}.pfx", config.provider_id))),
        };

        let emission = tokio::spawn(emit(
            self.ctx.clone(),
            request.id.clone(),
            prepared,
            credentials,
            actor.clone(),
            recipient_email,
        ));

        Ok(IssuedInvoice { invoice, emission })
    }

    // =========================================================================
    // Cancel
    // =========================================================================

    /// Cancels the request's issued invoice.
    pub async fn cancel(
        &self,
        request_id: &str,
        actor: &Actor,
        reason: &str,
        code: CancellationReason,
    ) -> ServiceResult<Invoice> {
        validate_required("reason", reason)?;
        self.ctx.ensure_request(request_id).await?;

        let invoice = self.latest(request_id).await?;
        if invoice.status != InvoiceStatus::Issued {
            return Err(CoreError::InvalidState {
                entity: "Invoice".to_string(),
                status: invoice.status.to_string(),
                operation: "cancel".to_string(),
            }
            .into());
        }

        let reason = reason.trim();
        let now = self.ctx.now();
        let event = InvoiceEvent {
            id: Uuid::new_v4().to_string(),
            invoice_id: invoice.id.clone(),
            kind: InvoiceEventKind::Cancellation,
            status: InvoiceStatus::Cancelled,
            message: format!("Reason: {} | Code: {}", reason, code.code()),
            reason: Some(code.code().to_string()),
            actor_id: actor.id.clone(),
            created_at: now,
        };

        let mut entry = self.ctx.history(request_id, actor, "Invoice cancelled", now);
        entry.details = Some(code.description().to_string());
        entry.before_value = invoice.issued_number.clone();

        let cancelled = self
            .ctx
            .db
            .invoices()
            .mark_cancelled(&invoice.id, &format!("Cancelled: {}", reason), &event, &entry)
            .await?;

        info!(invoice_id = %invoice.id, request_id = %request_id, code = code.code(), "Invoice cancelled");
        self.ctx.publish(
            INVOICE_CANCELLED,
            json!({ "invoice_id": invoice.id, "request_id": request_id, "code": code.code() }),
        );

        Ok(cancelled)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// The request's most recent invoice.
    pub async fn get(&self, request_id: &str) -> ServiceResult<Invoice> {
        self.latest(request_id).await
    }

    /// Every invoice event of the request, newest first.
    pub async fn events(&self, request_id: &str) -> ServiceResult<Vec<InvoiceEvent>> {
        self.ctx.ensure_request(request_id).await?;
        Ok(self.ctx.db.invoices().events_for_request(request_id).await?)
    }

    async fn latest(&self, request_id: &str) -> ServiceResult<Invoice> {
        self.ctx
            .db
            .invoices()
            .latest_for_request(request_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Invoice", request_id))
    }

    // =========================================================================
    // Fiscal configuration
    // =========================================================================

    /// Tax breakdown for an arbitrary amount, using the provider's stored
    /// configuration or the Lucro Presumido preset when there is none.
    pub async fn preview_taxes(
        &self,
        provider_id: &str,
        gross: Money,
        deductions: Money,
    ) -> ServiceResult<TaxBreakdown> {
        let config = match self.ctx.db.fiscal().get(provider_id).await? {
            Some(config) => config,
            None => FiscalConfiguration::suggested(provider_id, TaxRegime::LucroPresumido),
        };
        Ok(calculate(gross, deductions, &config)?)
    }

    pub async fn fiscal_config(&self, provider_id: &str) -> ServiceResult<Option<FiscalConfiguration>> {
        Ok(self.ctx.db.fiscal().get(provider_id).await?)
    }

    /// Creates or replaces the provider's configuration.
    pub async fn save_fiscal_config(
        &self,
        provider_id: &str,
        mut config: FiscalConfiguration,
    ) -> ServiceResult<FiscalConfiguration> {
        validate_required("provider_id", provider_id)?;
        config.provider_id = provider_id.to_string();
        config.validate()?;

        self.ctx.db.fiscal().upsert(&config, self.ctx.now()).await?;
        info!(provider_id = %provider_id, regime = %config.regime, "Fiscal configuration saved");
        Ok(config)
    }

    pub fn regimes(&self) -> Vec<RegimeInfo> {
        regime_catalog()
    }
}

fn build_invoice(
    request: &Request,
    config: &FiscalConfiguration,
    breakdown: &TaxBreakdown,
    now: chrono::DateTime<chrono::Utc>,
) -> Invoice {
    Invoice {
        id: Uuid::new_v4().to_string(),
        request_id: request.id.clone(),
        provider_id: request.provider_id.clone(),
        recipient_name: request.client_name.clone(),
        recipient_document: request
            .client_document
            .as_ref()
            .map(|d| d.chars().filter(char::is_ascii_digit).collect()),
        service_description: format!("{} - {}", request.service_type, request.description),
        service_code: config.service_code.clone(),
        regime: breakdown.regime,
        gross_cents: breakdown.gross.cents(),
        deductions_cents: breakdown.deductions.cents(),
        net_cents: breakdown.net.cents(),
        iss_rate_bps: i64::from(breakdown.iss.rate.bps()),
        iss_cents: breakdown.iss.amount.cents(),
        iss_withheld: breakdown.iss.withheld,
        pis_cents: breakdown.pis.amount.cents(),
        cofins_cents: breakdown.cofins.amount.cents(),
        csll_cents: breakdown.csll.amount.cents(),
        irpj_cents: breakdown.irpj.amount.cents(),
        inss_cents: breakdown.inss.amount.cents(),
        total_taxes_cents: breakdown.total_taxes.cents(),
        status: InvoiceStatus::Processing,
        issued_number: None,
        verification_code: None,
        error_message: None,
        issued_at: None,
        created_at: now,
        updated_at: now,
    }
}

// =============================================================================
// Emission task
// =============================================================================

async fn emit(
    ctx: Arc<Context>,
    request_id: String,
    prepared: PreparedInvoice,
    credentials: AuthorityCredentials,
    actor: Actor,
    recipient_email: Option<String>,
) {
    let submitted = tokio::time::timeout(
        ctx.emission_timeout,
        ctx.authority.submit(&prepared, &credentials),
    )
    .await;

    let outcome = match submitted {
        Ok(Ok(receipt)) => Ok(receipt),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!(
            "Invoice authority did not answer within {}s",
            ctx.emission_timeout.as_secs_f64()
        )),
    };

    match outcome {
        Ok(receipt) => {
            authorized(&ctx, &request_id, &prepared, receipt, &actor, recipient_email).await
        }
        Err(message) => rejected(&ctx, &prepared, message, &actor).await,
    }
}

async fn authorized(
    ctx: &Context,
    request_id: &str,
    prepared: &PreparedInvoice,
    receipt: AuthorityReceipt,
    actor: &Actor,
    recipient_email: Option<String>,
) {
    let now = ctx.now();

    let authorization = Authorization {
        issued_number: receipt.issued_number.clone(),
        verification_code: receipt.verification_code.clone(),
        issued_at: now,
    };
    let event = InvoiceEvent {
        id: Uuid::new_v4().to_string(),
        invoice_id: prepared.invoice_id.clone(),
        kind: InvoiceEventKind::Authorization,
        status: InvoiceStatus::Issued,
        message: format!(
            "Authorized as {} (verification {})",
            receipt.issued_number, receipt.verification_code
        ),
        reason: None,
        actor_id: actor.id.clone(),
        created_at: now,
    };
    let mut entry = ctx.history(request_id, actor, "Invoice issued", now);
    entry.after_value = Some(receipt.issued_number.clone());

    let invoices = ctx.db.invoices();
    let recorded = record_with_retry(ctx.record_retry, &prepared.invoice_id, || {
        invoices.mark_issued(&prepared.invoice_id, &authorization, &event, &entry)
    })
    .await;

    let invoice = match recorded {
        Ok(invoice) => invoice,
        Err(e) => {
            error!(invoice_id = %prepared.invoice_id, error = %e, "Failed to record authorization");
            let message = format!(
                "Authorized as {} (verification {}) but recording it failed: {}",
                receipt.issued_number, receipt.verification_code, e
            );
            rejected(ctx, prepared, message, actor).await;
            return;
        }
    };

    info!(
        invoice_id = %invoice.id,
        issued_number = %receipt.issued_number,
        "Invoice issued"
    );
    ctx.publish(
        INVOICE_ISSUED,
        json!({
            "invoice_id": invoice.id,
            "request_id": invoice.request_id,
            "issued_number": receipt.issued_number,
            "verification_code": receipt.verification_code,
        }),
    );

    if let Some(to) = recipient_email {
        let subject = format!("NFS-e {} issued", receipt.issued_number);
        let body = format!(
            "Invoice {} for request #{} was issued.\nVerification code: {}\nNet amount: {}",
            receipt.issued_number, prepared.request_number, receipt.verification_code, prepared.net
        );
        if let Err(e) = ctx.mailer.send(&to, &subject, &body).await {
            warn!(invoice_id = %invoice.id, to = %to, error = %e, "Invoice mail not sent");
        }
    }
}

async fn rejected(ctx: &Context, prepared: &PreparedInvoice, message: String, actor: &Actor) {
    let event = InvoiceEvent {
        id: Uuid::new_v4().to_string(),
        invoice_id: prepared.invoice_id.clone(),
        kind: InvoiceEventKind::Rejection,
        status: InvoiceStatus::Error,
        message: message.clone(),
        reason: None,
        actor_id: actor.id.clone(),
        created_at: ctx.now(),
    };

    let invoices = ctx.db.invoices();
    let recorded = record_with_retry(ctx.record_retry, &prepared.invoice_id, || {
        invoices.mark_error(&prepared.invoice_id, &message, &event)
    })
    .await;

    match recorded {
        Ok(invoice) => {
            warn!(invoice_id = %invoice.id, message = %message, "Invoice emission failed");
            ctx.publish(
                INVOICE_FAILED,
                json!({
                    "invoice_id": invoice.id,
                    "request_id": invoice.request_id,
                    "message": message,
                }),
            );
        }
        Err(e) => {
            error!(invoice_id = %prepared.invoice_id, error = %e, "Failed to record emission failure");
        }
    }
}

/// Runs `write` until it succeeds or `window` has elapsed. A conflict or a
/// missing row will not change on retry and is returned at once.
async fn record_with_retry<T, F, Fut>(window: Duration, invoice_id: &str, mut write: F) -> DbResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DbResult<T>>,
{
    let mut backoff = ExponentialBackoff {
        initial_interval: Duration::from_millis(50),
        max_interval: Duration::from_secs(1),
        multiplier: 2.0,
        max_elapsed_time: Some(window),
        ..Default::default()
    };

    loop {
        match write().await {
            Ok(value) => return Ok(value),
            Err(e @ (DbError::StateConflict { .. } | DbError::NotFound { .. })) => return Err(e),
            Err(e) => match backoff.next_backoff() {
                Some(delay) => {
                    warn!(invoice_id = %invoice_id, error = %e, ?delay, "Retrying invoice write");
                    tokio::time::sleep(delay).await;
                }
                None => return Err(e),
            },
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
