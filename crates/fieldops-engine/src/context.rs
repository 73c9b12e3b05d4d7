//! # Engine
//!
//! [`Engine`] bundles the database, the collaborators and the policies, and
//! hands out the services the same way `Database` hands out repositories.
//!
//! ```rust,ignore
//! let engine = Engine::builder(db)
//!     .publisher(Arc::new(BroadcastPublisher::default()))
//!     .authority(Arc::new(my_authority))
//!     .build();
//!
//! let request = engine.requests().create(input, &actor).await?;
//! let outcome = engine.locks().acquire(&request.id, &actor).await?;
//! ```

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use fieldops_core::{Actor, HistoryEntry, LockPolicy, Request};
use fieldops_db::Database;

use crate::budget::BudgetService;
use crate::clock::{Clock, SystemClock};
use crate::collaborators::{
    BlobStorage, EventPublisher, InvoiceAuthority, Mailer, NoOpMailer, NoOpPublisher,
    UnconfiguredAuthority, UnconfiguredStorage,
};
use crate::config::EngineConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::invoice::InvoiceService;
use crate::lock::LockService;
use crate::request::RequestService;

/// Shared state behind every service.
pub(crate) struct Context {
    pub db: Database,
    pub clock: Arc<dyn Clock>,
    pub events: Arc<dyn EventPublisher>,
    pub blobs: Arc<dyn BlobStorage>,
    pub authority: Arc<dyn InvoiceAuthority>,
    pub mailer: Arc<dyn Mailer>,
    pub lock_policy: LockPolicy,
    pub emission_timeout: Duration,
    /// Window for retrying the write of an emission outcome.
    pub record_retry: Duration,
    pub certificate_dir: Option<PathBuf>,
}

impl Context {
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn publish(&self, name: &str, payload: Value) {
        self.events.publish(name, payload);
    }

    pub fn history(
        &self,
        request_id: &str,
        actor: &Actor,
        action: impl Into<String>,
        at: DateTime<Utc>,
    ) -> HistoryEntry {
        HistoryEntry {
            id: Uuid::new_v4().to_string(),
            request_id: request_id.to_string(),
            actor_id: actor.id.clone(),
            actor_name: actor.name.clone(),
            action: action.into(),
            details: None,
            before_value: None,
            after_value: None,
            created_at: at,
        }
    }

    pub async fn load_request(&self, id: &str) -> ServiceResult<Request> {
        self.db
            .requests()
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Request", id))
    }

    pub async fn ensure_request(&self, id: &str) -> ServiceResult<()> {
        if self.db.requests().exists(id).await? {
            Ok(())
        } else {
            Err(ServiceError::not_found("Request", id))
        }
    }
}

/// Entry point to the services.
#[derive(Clone)]
pub struct Engine {
    ctx: Arc<Context>,
}

impl Engine {
    pub fn builder(db: Database) -> EngineBuilder {
        EngineBuilder::new(db)
    }

    pub fn requests(&self) -> RequestService {
        RequestService::new(self.ctx.clone())
    }

    pub fn locks(&self) -> LockService {
        LockService::new(self.ctx.clone())
    }

    pub fn budget(&self) -> BudgetService {
        BudgetService::new(self.ctx.clone())
    }

    pub fn invoices(&self) -> InvoiceService {
        InvoiceService::new(self.ctx.clone())
    }

    pub fn database(&self) -> &Database {
        &self.ctx.db
    }
}

/// Builder for [`Engine`]. Every collaborator has a harmless default.
pub struct EngineBuilder {
    db: Database,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventPublisher>,
    blobs: Arc<dyn BlobStorage>,
    authority: Arc<dyn InvoiceAuthority>,
    mailer: Arc<dyn Mailer>,
    lock_policy: LockPolicy,
    emission_timeout: Duration,
    record_retry: Duration,
    certificate_dir: Option<PathBuf>,
}

impl EngineBuilder {
    fn new(db: Database) -> Self {
        let defaults = EngineConfig::default();
        EngineBuilder {
            db,
            clock: Arc::new(SystemClock),
            events: Arc::new(NoOpPublisher),
            blobs: Arc::new(UnconfiguredStorage),
            authority: Arc::new(UnconfiguredAuthority),
            mailer: Arc::new(NoOpMailer),
            lock_policy: defaults.lock_policy(),
            emission_timeout: defaults.emission_timeout(),
            record_retry: defaults.record_retry(),
            certificate_dir: None,
        }
    }

    /// Applies the lock and invoicing sections of `config`.
    pub fn config(mut self, config: &EngineConfig) -> Self {
        self.lock_policy = config.lock_policy();
        self.emission_timeout = config.emission_timeout();
        self.record_retry = config.record_retry();
        self.certificate_dir = config.invoicing.certificate_dir.clone();
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn publisher(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = events;
        self
    }

    pub fn blob_storage(mut self, blobs: Arc<dyn BlobStorage>) -> Self {
        self.blobs = blobs;
        self
    }

    pub fn authority(mut self, authority: Arc<dyn InvoiceAuthority>) -> Self {
        self.authority = authority;
        self
    }

    pub fn mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }

    pub fn lock_policy(mut self, policy: LockPolicy) -> Self {
        self.lock_policy = policy;
        self
    }

    pub fn emission_timeout(mut self, timeout: Duration) -> Self {
        self.emission_timeout = timeout;
        self
    }

    pub fn record_retry(mut self, window: Duration) -> Self {
        self.record_retry = window;
        self
    }

    pub fn build(self) -> Engine {
        Engine {
            ctx: Arc::new(Context {
                db: self.db,
                clock: self.clock,
                events: self.events,
                blobs: self.blobs,
                authority: self.authority,
                mailer: self.mailer,
                lock_policy: self.lock_policy,
                emission_timeout: self.emission_timeout,
                record_retry: self.record_retry,
                certificate_dir: self.certificate_dir,
            }),
        }
    }
}
