//! # Invoice Authority
//!
//! The municipal / national NFS-e service. The engine prepares the
//! document, an adapter signs and transmits it, and the authority answers
//! with the official number and verification code or a rejection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

use fieldops_core::tax::FiscalEnvironment;
use fieldops_core::{Money, Rate, TaxRegime};

/// Everything the authority needs to register one service invoice.
#[derive(Debug, Clone, Serialize)]
pub struct PreparedInvoice {
    pub invoice_id: String,
    pub provider_id: String,
    /// Request number, used as the document series number.
    pub request_number: i64,

    pub recipient_name: String,
    /// Digits-only CPF or CNPJ.
    pub recipient_document: Option<String>,

    pub service_description: String,
    pub service_code: Option<String>,
    pub municipality_code: Option<String>,

    pub regime: TaxRegime,
    pub gross: Money,
    pub deductions: Money,
    pub net: Money,
    pub iss_rate: Rate,
    pub iss_amount: Money,
    pub iss_withheld: bool,
    pub total_taxes: Money,

    pub issued_on: DateTime<Utc>,
}

/// Identity the adapter signs with.
#[derive(Debug, Clone)]
pub struct AuthorityCredentials {
    pub provider_id: String,
    pub environment: FiscalEnvironment,
    pub municipal_registration: Option<String>,
    /// PKCS#12 signing certificate, when one is installed.
    pub certificate_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityReceipt {
    pub issued_number: String,
    pub verification_code: String,
}

#[derive(Debug, Clone, Error)]
pub enum AuthorityError {
    /// The authority looked at the document and refused it.
    #[error("Rejected by invoice authority: {0}")]
    Rejected(String),

    /// The authority could not be reached or answered garbage.
    #[error("Invoice authority unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait InvoiceAuthority: Send + Sync {
    async fn submit(
        &self,
        invoice: &PreparedInvoice,
        credentials: &AuthorityCredentials,
    ) -> Result<AuthorityReceipt, AuthorityError>;
}

/// Fails every submission, so invoices land in `error` until a real
/// adapter is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredAuthority;

#[async_trait]
impl InvoiceAuthority for UnconfiguredAuthority {
    async fn submit(
        &self,
        _invoice: &PreparedInvoice,
        _credentials: &AuthorityCredentials,
    ) -> Result<AuthorityReceipt, AuthorityError> {
        Err(AuthorityError::Unavailable(
            "no invoice authority configured".to_string(),
        ))
    }
}
