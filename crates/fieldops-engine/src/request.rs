//! # Request Service
//!
//! Intake, assignment and the status lifecycle of service requests, plus
//! the pieces that hang off a request (checklist, attachments, signatures).
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   open ──► assigned ◄──► scheduled ──► in_progress ◄──► paused          │
//! │     │          │             │              │                           │
//! │     │          └─────────────┴──────────────┤                           │
//! │     │                                       ▼                           │
//! │     │                                   completed ──► confirmed         │
//! │     │                                       │                           │
//! │     └──────────────── any non-terminal ─────┴──► cancelled              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every mutation loads the request, applies a core rule, and saves with a
//! write guarded on the status it was loaded with. The history entry is
//! written in the same transaction.

use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use fieldops_core::lifecycle::{ensure_confirmable, status_after_assignment, validate_transition};
use fieldops_core::sla::sla_deadline;
use fieldops_core::validation::{
    validate_checklist_item, validate_new_request, validate_required, validate_text,
};
use fieldops_core::{
    Actor, Attachment, ChecklistItem, HistoryEntry, NewChecklistItem, NewRequest, Request,
    RequestFilter, RequestStatus, RequestUpdate, SignatureKind, StatusChange, MAX_DESCRIPTION_LEN,
    MAX_NAME_LEN,
};

use crate::collaborators::events::{
    ATTACHMENT_ADDED, ATTACHMENT_REMOVED, CHECKLIST_ADDED, CHECKLIST_REMOVED, CHECKLIST_UPDATED,
    REQUEST_ASSIGNED, REQUEST_CONFIRMED, REQUEST_CREATED, REQUEST_DELETED, REQUEST_SIGNED,
    REQUEST_STATUS_CHANGED, REQUEST_UPDATED,
};
use crate::collaborators::{BlobStorage, UploadedFile};
use crate::context::Context;
use crate::error::{ServiceError, ServiceResult};

const SIGNATURE_PREFIX: &str = "data:image/";

/// Operations on service requests.
pub struct RequestService {
    ctx: Arc<Context>,
}

impl RequestService {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        RequestService { ctx }
    }

    // =========================================================================
    // Intake
    // =========================================================================

    /// Opens a new request with the next number of its provider.
    pub async fn create(&self, input: NewRequest, actor: &Actor) -> ServiceResult<Request> {
        debug!(provider_id = %input.provider_id, client_id = %input.client_id, "create request");

        validate_new_request(&input)?;

        let now = self.ctx.now();
        let id = Uuid::new_v4().to_string();

        let request = Request {
            id: id.clone(),
            provider_id: input.provider_id,
            number: 0,
            client_id: input.client_id,
            client_name: input.client_name.trim().to_string(),
            client_document: input.client_document,
            status: RequestStatus::Open,
            priority: input.priority,
            service_type: input.service_type.trim().to_string(),
            description: input.description.trim().to_string(),
            responsible_id: None,
            responsible_name: None,
            scheduled_at: input.scheduled_at,
            sla_limit: sla_deadline(input.priority, now),
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
            created_at: now,
            updated_at: now,
            equipment_ids: input.equipment_ids,
        };

        let entry = self.ctx.history(&id, actor, "Request created", now);
        let created = self.ctx.db.requests().create(request, &entry).await?;

        self.ctx.publish(
            REQUEST_CREATED,
            json!({
                "id": created.id,
                "provider_id": created.provider_id,
                "number": created.number,
                "priority": created.priority,
                "sla_limit": created.sla_limit,
            }),
        );

        Ok(created)
    }

    /// Edits the descriptive fields. The SLA deadline stays where intake put it.
    pub async fn update(
        &self,
        id: &str,
        changes: RequestUpdate,
        actor: &Actor,
    ) -> ServiceResult<Request> {
        if changes.is_empty() {
            return Err(ServiceError::validation("Nothing to update"));
        }

        let mut request = self.ctx.load_request(id).await?;
        if request.status.is_terminal() {
            return Err(ServiceError::validation(format!(
                "Request is {}, cannot update",
                request.status
            )));
        }

        let mut changed = Vec::new();
        if let Some(priority) = changes.priority {
            request.priority = priority;
            changed.push("priority");
        }
        if let Some(service_type) = changes.service_type {
            validate_text("service_type", &service_type, MAX_NAME_LEN)?;
            request.service_type = service_type.trim().to_string();
            changed.push("service_type");
        }
        if let Some(description) = changes.description {
            validate_text("description", &description, MAX_DESCRIPTION_LEN)?;
            request.description = description.trim().to_string();
            changed.push("description");
        }
        if let Some(scheduled_at) = changes.scheduled_at {
            request.scheduled_at = Some(scheduled_at);
            changed.push("scheduled_at");
        }

        let now = self.ctx.now();
        request.updated_at = now;

        let mut entry = self.ctx.history(id, actor, "Request updated", now);
        entry.details = Some(changed.join(", "));

        self.ctx
            .db
            .requests()
            .save(&request, request.status, &entry)
            .await?;

        self.ctx
            .publish(REQUEST_UPDATED, json!({ "id": id, "fields": changed }));

        Ok(request)
    }

    /// Sets the responsible technician. An `open` request becomes
    /// `scheduled`; re-assigning keeps the current status.
    pub async fn assign(
        &self,
        id: &str,
        responsible_id: &str,
        responsible_name: &str,
        actor: &Actor,
    ) -> ServiceResult<Request> {
        validate_required("responsible_id", responsible_id)?;
        validate_text("responsible_name", responsible_name, MAX_NAME_LEN)?;

        let mut request = self.ctx.load_request(id).await?;
        let previous_status = request.status;
        let next_status = status_after_assignment(previous_status)?;
        let previous_name = request.responsible_name.clone();

        let now = self.ctx.now();
        request.responsible_id = Some(responsible_id.to_string());
        request.responsible_name = Some(responsible_name.trim().to_string());
        request.status = next_status;
        request.updated_at = now;

        let mut entry = self.ctx.history(id, actor, "Responsible assigned", now);
        entry.before_value = previous_name;
        entry.after_value = request.responsible_name.clone();

        self.ctx
            .db
            .requests()
            .save(&request, previous_status, &entry)
            .await?;

        info!(id = %id, responsible_id = %responsible_id, status = %next_status, "Request assigned");

        self.ctx.publish(
            REQUEST_ASSIGNED,
            json!({
                "id": id,
                "responsible_id": responsible_id,
                "status": next_status,
            }),
        );

        Ok(request)
    }

    /// Moves the request along the transition table and records the
    /// side-channel fields that came with the move.
    pub async fn update_status(
        &self,
        id: &str,
        change: StatusChange,
        actor: &Actor,
    ) -> ServiceResult<Request> {
        let mut request = self.ctx.load_request(id).await?;
        let from = request.status;
        let to = change.status;

        validate_transition(from, to)?;

        let now = self.ctx.now();
        let note = change.observation.clone();
        request.status = to;
        request.updated_at = now;
        if let Some(observation) = change.observation {
            request.observation = Some(observation);
        }
        if let Some(materials) = change.materials_used {
            request.materials_used = Some(materials);
        }
        if let Some(scheduled_at) = change.scheduled_at {
            request.scheduled_at = Some(scheduled_at);
        }
        if let Some(next_maintenance_at) = change.next_maintenance_at {
            request.next_maintenance_at = Some(next_maintenance_at);
        }
        if to == RequestStatus::Confirmed {
            request.confirmed_at = Some(now);
            request.confirmed_by = Some(actor.id.clone());
        }

        let mut entry = self.ctx.history(id, actor, "Status changed", now);
        entry.before_value = Some(from.to_string());
        entry.after_value = Some(to.to_string());
        entry.details = note;

        self.ctx.db.requests().save(&request, from, &entry).await?;

        info!(id = %id, from = %from, to = %to, "Request status changed");

        self.ctx.publish(
            REQUEST_STATUS_CHANGED,
            json!({ "id": id, "from": from, "to": to }),
        );

        Ok(request)
    }

    /// Client sign-off of completed work.
    pub async fn confirm(&self, id: &str, actor: &Actor) -> ServiceResult<Request> {
        let mut request = self.ctx.load_request(id).await?;
        let from = request.status;
        ensure_confirmable(from)?;

        let now = self.ctx.now();
        request.status = RequestStatus::Confirmed;
        request.confirmed_at = Some(now);
        request.confirmed_by = Some(actor.id.clone());
        request.updated_at = now;

        let mut entry = self.ctx.history(id, actor, "Request confirmed", now);
        entry.before_value = Some(from.to_string());
        entry.after_value = Some(RequestStatus::Confirmed.to_string());

        self.ctx.db.requests().save(&request, from, &entry).await?;

        info!(id = %id, confirmed_by = %actor.id, "Request confirmed");

        self.ctx.publish(
            REQUEST_CONFIRMED,
            json!({ "id": id, "confirmed_by": actor.id, "confirmed_at": now }),
        );

        Ok(request)
    }

    /// Stores a captured signature as an image data url.
    pub async fn save_signature(
        &self,
        id: &str,
        kind: SignatureKind,
        data_url: &str,
        actor: &Actor,
    ) -> ServiceResult<Request> {
        validate_required("signature", data_url)?;
        if !data_url.starts_with(SIGNATURE_PREFIX) {
            return Err(ServiceError::validation(
                "signature must be an image data url",
            ));
        }

        let mut request = self.ctx.load_request(id).await?;
        if request.status == RequestStatus::Cancelled {
            return Err(ServiceError::validation(
                "Request is cancelled, cannot sign",
            ));
        }

        let now = self.ctx.now();
        match kind {
            SignatureKind::Client => request.client_signature = Some(data_url.to_string()),
            SignatureKind::Technician => request.technician_signature = Some(data_url.to_string()),
        }
        request.signed_at = Some(now);
        request.updated_at = now;

        let mut entry = self.ctx.history(id, actor, "Signature saved", now);
        entry.details = Some(kind.to_string());

        self.ctx
            .db
            .requests()
            .save(&request, request.status, &entry)
            .await?;

        self.ctx
            .publish(REQUEST_SIGNED, json!({ "id": id, "kind": kind.to_string() }));

        Ok(request)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get(&self, id: &str) -> ServiceResult<Request> {
        self.ctx.load_request(id).await
    }

    pub async fn get_by_number(&self, provider_id: &str, number: i64) -> ServiceResult<Request> {
        self.ctx
            .db
            .requests()
            .get_by_number(provider_id, number)
            .await?
            .ok_or_else(|| ServiceError::not_found("Request", format!("{provider_id}#{number}")))
    }

    /// Requests of a provider, highest number first.
    pub async fn list(&self, provider_id: &str, filter: &RequestFilter) -> ServiceResult<Vec<Request>> {
        Ok(self.ctx.db.requests().list(provider_id, filter).await?)
    }

    /// Audit trail, newest first.
    pub async fn history(&self, id: &str) -> ServiceResult<Vec<HistoryEntry>> {
        self.ctx.ensure_request(id).await?;
        Ok(self.ctx.db.history().list(id).await?)
    }

    // =========================================================================
    // Checklist
    // =========================================================================

    pub async fn add_checklist_item(
        &self,
        id: &str,
        input: NewChecklistItem,
        actor: &Actor,
    ) -> ServiceResult<ChecklistItem> {
        validate_checklist_item(&input)?;
        self.ctx.ensure_request(id).await?;

        let item = ChecklistItem {
            id: Uuid::new_v4().to_string(),
            request_id: id.to_string(),
            equipment_id: input.equipment_id,
            description: input.description.trim().to_string(),
            checked: false,
            observation: None,
            checked_by_id: None,
            checked_by_name: None,
            checked_at: None,
            created_at: self.ctx.now(),
        };
        self.ctx.db.checklist().insert(&item).await?;

        debug!(request_id = %id, item_id = %item.id, actor = %actor.id, "Checklist item added");
        self.ctx.publish(
            CHECKLIST_ADDED,
            json!({ "request_id": id, "item_id": item.id }),
        );

        Ok(item)
    }

    /// Checks or unchecks an item. A checked item remembers who and when.
    pub async fn toggle_checklist_item(
        &self,
        id: &str,
        item_id: &str,
        checked: bool,
        observation: Option<&str>,
        actor: &Actor,
    ) -> ServiceResult<ChecklistItem> {
        let item = self
            .ctx
            .db
            .checklist()
            .set_checked(id, item_id, checked, observation, actor, self.ctx.now())
            .await?;

        self.ctx.publish(
            CHECKLIST_UPDATED,
            json!({ "request_id": id, "item_id": item_id, "checked": checked }),
        );

        Ok(item)
    }

    pub async fn remove_checklist_item(
        &self,
        id: &str,
        item_id: &str,
        actor: &Actor,
    ) -> ServiceResult<()> {
        self.ctx.db.checklist().delete(id, item_id).await?;

        debug!(request_id = %id, item_id = %item_id, actor = %actor.id, "Checklist item removed");
        self.ctx.publish(
            CHECKLIST_REMOVED,
            json!({ "request_id": id, "item_id": item_id }),
        );
        Ok(())
    }

    pub async fn checklist(&self, id: &str) -> ServiceResult<Vec<ChecklistItem>> {
        self.ctx.ensure_request(id).await?;
        Ok(self.ctx.db.checklist().list(id).await?)
    }

    // =========================================================================
    // Attachments
    // =========================================================================

    /// Uploads the file, then records it. If the row cannot be written the
    /// blob is removed again in the background.
    pub async fn add_attachment(
        &self,
        id: &str,
        file: UploadedFile,
        actor: &Actor,
    ) -> ServiceResult<Attachment> {
        validate_text("file_name", &file.file_name, MAX_NAME_LEN)?;
        validate_required("mime_type", &file.mime_type)?;
        if file.bytes.is_empty() {
            return Err(ServiceError::validation("file is empty"));
        }
        self.ctx.ensure_request(id).await?;

        let url = self.ctx.blobs.upload(&file).await.map_err(|e| {
            warn!(request_id = %id, file_name = %file.file_name, error = %e, "Upload failed");
            ServiceError::ExternalService(e.to_string())
        })?;

        let attachment = Attachment {
            id: Uuid::new_v4().to_string(),
            request_id: id.to_string(),
            file_name: file.file_name.clone(),
            url,
            mime_type: file.mime_type.clone(),
            file_size: file.size(),
            uploaded_by_id: actor.id.clone(),
            uploaded_by_name: actor.name.clone(),
            created_at: self.ctx.now(),
        };

        if let Err(e) = self.ctx.db.attachments().insert(&attachment).await {
            spawn_blob_delete(self.ctx.blobs.clone(), attachment.url.clone());
            return Err(e.into());
        }

        info!(request_id = %id, attachment_id = %attachment.id, size = attachment.file_size, "Attachment added");
        self.ctx.publish(
            ATTACHMENT_ADDED,
            json!({ "request_id": id, "attachment_id": attachment.id, "url": attachment.url }),
        );

        Ok(attachment)
    }

    /// Deletes the row now and the blob in the background.
    pub async fn remove_attachment(
        &self,
        id: &str,
        attachment_id: &str,
        actor: &Actor,
    ) -> ServiceResult<()> {
        let removed = self.ctx.db.attachments().delete(id, attachment_id).await?;
        spawn_blob_delete(self.ctx.blobs.clone(), removed.url);

        debug!(request_id = %id, attachment_id = %attachment_id, actor = %actor.id, "Attachment removed");
        self.ctx.publish(
            ATTACHMENT_REMOVED,
            json!({ "request_id": id, "attachment_id": attachment_id }),
        );
        Ok(())
    }

    /// Attachments of a request, newest first.
    pub async fn attachments(&self, id: &str) -> ServiceResult<Vec<Attachment>> {
        self.ctx.ensure_request(id).await?;
        Ok(self.ctx.db.attachments().list(id).await?)
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Removes the request and everything attached to it in one
    /// transaction, then deletes the stored blobs without waiting on them.
    pub async fn delete(&self, id: &str, actor: &Actor) -> ServiceResult<()> {
        let urls = self.ctx.db.requests().delete_cascade(id).await?;

        info!(id = %id, actor = %actor.id, blobs = urls.len(), "Request removed");

        for url in urls {
            spawn_blob_delete(self.ctx.blobs.clone(), url);
        }

        self.ctx
            .publish(REQUEST_DELETED, json!({ "id": id, "deleted_by": actor.id }));
        Ok(())
    }
}

/// Best-effort blob removal. Failures are logged and otherwise ignored.
fn spawn_blob_delete(blobs: Arc<dyn BlobStorage>, url: String) {
    tokio::spawn(async move {
        if let Err(e) = blobs.delete(&url).await {
            warn!(url = %url, error = %e, "Blob delete failed");
        }
    });
}

// =============================================================================
// Unit Tests
// =============================================================================
