//! # Test Doubles
//!
//! Scripted collaborators and a ready-wired [`Harness`] over an in-memory
//! database. Compiled for this crate's tests and, with the `testing`
//! feature, for downstream integration tests.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use fieldops_core::{Actor, FiscalConfiguration, NewRequest, Priority, TaxRegime};
use fieldops_db::{Database, DbConfig, DbResult};

use crate::clock::ManualClock;
use crate::collaborators::{
    AuthorityCredentials, AuthorityError, AuthorityReceipt, BlobStorage, EventPublisher,
    InvoiceAuthority, MailError, Mailer, PreparedInvoice, PublishedEvent, StorageError,
    UploadedFile,
};
use crate::context::Engine;

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Event Publisher
// =============================================================================

/// Keeps every published event in order.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<PublishedEvent>>,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<PublishedEvent> {
        guard(&self.events).clone()
    }

    pub fn names(&self) -> Vec<String> {
        guard(&self.events).iter().map(|e| e.name.clone()).collect()
    }

    pub fn last(&self, name: &str) -> Option<PublishedEvent> {
        guard(&self.events).iter().rev().find(|e| e.name == name).cloned()
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(&self, name: &str, payload: Value) {
        guard(&self.events).push(PublishedEvent {
            name: name.to_string(),
            payload,
        });
    }
}

// =============================================================================
// Blob Storage
// =============================================================================

/// Blobs in a map, addressed by `mem://` urls.
#[derive(Debug, Default)]
pub struct MemoryBlobStorage {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    fail_uploads: AtomicBool,
    fail_deletes: AtomicBool,
    counter: AtomicU64,
}

impl MemoryBlobStorage {
    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, url: &str) -> bool {
        guard(&self.blobs).contains_key(url)
    }

    pub fn len(&self) -> usize {
        guard(&self.blobs).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts a blob directly, as if uploaded earlier.
    pub fn put(&self, url: &str, bytes: Vec<u8>) {
        guard(&self.blobs).insert(url.to_string(), bytes);
    }
}

#[async_trait]
impl BlobStorage for MemoryBlobStorage {
    async fn upload(&self, file: &UploadedFile) -> Result<String, StorageError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other("bucket unavailable")));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let url = format!("mem://{}/{}", n, file.file_name);
        guard(&self.blobs).insert(url.clone(), file.bytes.clone());
        Ok(url)
    }

    async fn delete(&self, url: &str) -> Result<(), StorageError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other("bucket unavailable")));
        }
        guard(&self.blobs).remove(url);
        Ok(())
    }
}

// =============================================================================
// Invoice Authority
// =============================================================================

/// One scripted answer.
#[derive(Debug, Clone)]
pub enum AuthorityScript {
    Accept(AuthorityReceipt),
    Reject(String),
    Unavailable(String),
    /// Answer only after this delay.
    Delay(Duration, Box<AuthorityScript>),
}

/// Plays scripted answers in order. With an empty script it accepts with
/// numbered receipts.
#[derive(Debug, Default)]
pub struct ScriptedAuthority {
    script: Mutex<VecDeque<AuthorityScript>>,
    submissions: Mutex<Vec<PreparedInvoice>>,
    issued: AtomicU64,
}

impl ScriptedAuthority {
    pub fn push(&self, answer: AuthorityScript) {
        guard(&self.script).push_back(answer);
    }

    pub fn submissions(&self) -> Vec<PreparedInvoice> {
        guard(&self.submissions).clone()
    }
}

#[async_trait]
impl InvoiceAuthority for ScriptedAuthority {
    async fn submit(
        &self,
        invoice: &PreparedInvoice,
        _credentials: &AuthorityCredentials,
    ) -> Result<AuthorityReceipt, AuthorityError> {
        guard(&self.submissions).push(invoice.clone());

        let next = guard(&self.script).pop_front();
        let mut answer = match next {
            Some(answer) => answer,
            None => {
                let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
                AuthorityScript::Accept(AuthorityReceipt {
                    issued_number: format!("2026{:06}", n),
                    verification_code: format!("VC-{:04}", n),
                })
            }
        };

        loop {
            match answer {
                AuthorityScript::Accept(receipt) => return Ok(receipt),
                AuthorityScript::Reject(reason) => return Err(AuthorityError::Rejected(reason)),
                AuthorityScript::Unavailable(reason) => {
                    return Err(AuthorityError::Unavailable(reason))
                }
                AuthorityScript::Delay(delay, then) => {
                    tokio::time::sleep(delay).await;
                    answer = *then;
                }
            }
        }
    }
}

// =============================================================================
// Mailer
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
    fail: AtomicBool,
}

impl RecordingMailer {
    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMail> {
        guard(&self.sent).clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MailError("smtp relay refused".to_string()));
        }
        guard(&self.sent).push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

// =============================================================================
// Harness
// =============================================================================

pub const PROVIDER: &str = "provider-1";

/// 2026-04-01 09:00:00 UTC.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0)
        .single()
        .unwrap_or_default()
}

pub fn dispatcher() -> Actor {
    Actor::new("user-1", "Ana Souza")
}

pub fn technician() -> Actor {
    Actor::new("tech-1", "Carlos Lima")
}

pub fn new_request() -> NewRequest {
    NewRequest {
        provider_id: PROVIDER.to_string(),
        client_id: "client-1".to_string(),
        client_name: "Padaria Central".to_string(),
        client_document: Some("12.345.678/0001-95".to_string()),
        priority: Priority::High,
        service_type: "Preventive maintenance".to_string(),
        description: "Cold room compressor cycling".to_string(),
        equipment_ids: vec!["eq-1".to_string()],
        scheduled_at: None,
    }
}

/// An engine over a fresh in-memory database with every collaborator
/// replaced by a recording fake.
pub struct Harness {
    pub engine: Engine,
    pub db: Database,
    pub clock: Arc<ManualClock>,
    pub events: Arc<RecordingPublisher>,
    pub blobs: Arc<MemoryBlobStorage>,
    pub authority: Arc<ScriptedAuthority>,
    pub mailer: Arc<RecordingMailer>,
}

impl Harness {
    pub async fn new() -> DbResult<Self> {
        let db = Database::new(DbConfig::in_memory()).await?;
        let clock = Arc::new(ManualClock::new(t0()));
        let events = Arc::new(RecordingPublisher::default());
        let blobs = Arc::new(MemoryBlobStorage::default());
        let authority = Arc::new(ScriptedAuthority::default());
        let mailer = Arc::new(RecordingMailer::default());

        let engine = Engine::builder(db.clone())
            .clock(clock.clone())
            .publisher(events.clone())
            .blob_storage(blobs.clone())
            .authority(authority.clone())
            .mailer(mailer.clone())
            .emission_timeout(Duration::from_secs(2))
            .record_retry(Duration::from_millis(300))
            .build();

        Ok(Harness {
            engine,
            db,
            clock,
            events,
            blobs,
            authority,
            mailer,
        })
    }

    /// Stores the Lucro Presumido preset for [`PROVIDER`].
    pub async fn with_fiscal_config(self) -> DbResult<Self> {
        let config = FiscalConfiguration::suggested(PROVIDER, TaxRegime::LucroPresumido);
        self.db.fiscal().upsert(&config, t0()).await?;
        Ok(self)
    }
}

/// Polls `check` until it holds or a second passes.
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
