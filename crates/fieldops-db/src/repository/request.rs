//! # Request Repository
//!
//! Database operations for requests and their equipment references.
//!
//! ## Transactions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create                                                                 │
//! │    BEGIN                                                                │
//! │    ├── request_sequences upsert  → number (first statement)            │
//! │    ├── INSERT requests                                                 │
//! │    ├── INSERT request_equipment × n                                    │
//! │    └── INSERT request_history                                          │
//! │    COMMIT                                                               │
//! │                                                                         │
//! │  save (status change, assignment, edits)                                │
//! │    BEGIN                                                                │
//! │    ├── UPDATE requests ... WHERE id = ? AND status = <expected>        │
//! │    └── INSERT request_history                                          │
//! │    COMMIT                                                               │
//! │                                                                         │
//! │  delete_cascade                                                         │
//! │    BEGIN                                                                │
//! │    ├── collect attachment urls                                          │
//! │    ├── DELETE children (attachments, checklist, history, budget,       │
//! │    │   equipment, invoice events, invoices)                            │
//! │    └── DELETE requests                                                 │
//! │    COMMIT (or nothing at all)                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use super::{history, sequence};
use crate::error::{DbError, DbResult};
use fieldops_core::{HistoryEntry, Request, RequestFilter, RequestStatus};

const SELECT_REQUEST: &str = r#"
    SELECT id, provider_id, number, client_id, client_name, client_document,
           status, priority, service_type, description,
           responsible_id, responsible_name, scheduled_at, sla_limit,
           confirmed_at, confirmed_by, observation, materials_used,
           next_maintenance_at, locked_by, locked_at,
           budget_total_cents, budget_approved,
           client_signature, technician_signature, signed_at,
           created_at, updated_at
    FROM requests
"#;

/// Current holder and timestamp of a request's edit lock.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct LockState {
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
}

/// Repository for request database operations.
#[derive(Debug, Clone)]
pub struct RequestRepository {
    pool: SqlitePool,
}

impl RequestRepository {
    pub fn new(pool: SqlitePool) -> Self {
        RequestRepository { pool }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get(&self, id: &str) -> DbResult<Option<Request>> {
        let sql = format!("{SELECT_REQUEST} WHERE id = ?1");
        let request = sqlx::query_as::<_, Request>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match request {
            Some(request) => Ok(Some(self.with_equipment(request).await?)),
            None => Ok(None),
        }
    }

    pub async fn get_by_number(&self, provider_id: &str, number: i64) -> DbResult<Option<Request>> {
        let sql = format!("{SELECT_REQUEST} WHERE provider_id = ?1 AND number = ?2");
        let request = sqlx::query_as::<_, Request>(&sql)
            .bind(provider_id)
            .bind(number)
            .fetch_optional(&self.pool)
            .await?;

        match request {
            Some(request) => Ok(Some(self.with_equipment(request).await?)),
            None => Ok(None),
        }
    }

    /// Requests of a provider, newest number first.
    pub async fn list(&self, provider_id: &str, filter: &RequestFilter) -> DbResult<Vec<Request>> {
        let sql = format!(
            "{SELECT_REQUEST} WHERE provider_id = ?1 \
             AND (?2 IS NULL OR status = ?2) \
             AND (?3 IS NULL OR responsible_id = ?3) \
             ORDER BY number DESC"
        );
        let requests = sqlx::query_as::<_, Request>(&sql)
            .bind(provider_id)
            .bind(filter.status)
            .bind(&filter.responsible_id)
            .fetch_all(&self.pool)
            .await?;

        let mut loaded = Vec::with_capacity(requests.len());
        for request in requests {
            loaded.push(self.with_equipment(request).await?);
        }
        Ok(loaded)
    }

    pub async fn exists(&self, id: &str) -> DbResult<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM requests WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    async fn with_equipment(&self, mut request: Request) -> DbResult<Request> {
        request.equipment_ids = sqlx::query_scalar(
            "SELECT equipment_id FROM request_equipment WHERE request_id = ?1 ORDER BY position",
        )
        .bind(&request.id)
        .fetch_all(&self.pool)
        .await?;
        Ok(request)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Inserts a request with the next number of its provider.
    ///
    /// `request.number` is ignored and replaced by the allocated number.
    pub async fn create(&self, mut request: Request, entry: &HistoryEntry) -> DbResult<Request> {
        let mut tx = self.pool.begin().await?;

        request.number = sequence::next_number_in(&mut tx, &request.provider_id).await?;

        sqlx::query(
            r#"
            INSERT INTO requests (
                id, provider_id, number, client_id, client_name, client_document,
                status, priority, service_type, description,
                responsible_id, responsible_name, scheduled_at, sla_limit,
                confirmed_at, confirmed_by, observation, materials_used,
                next_maintenance_at, locked_by, locked_at,
                budget_total_cents, budget_approved,
                client_signature, technician_signature, signed_at,
                created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9, ?10,
                ?11, ?12, ?13, ?14,
                ?15, ?16, ?17, ?18,
                ?19, ?20, ?21,
                ?22, ?23,
                ?24, ?25, ?26,
                ?27, ?28
            )
            "#,
        )
        .bind(&request.id)
        .bind(&request.provider_id)
        .bind(request.number)
        .bind(&request.client_id)
        .bind(&request.client_name)
        .bind(&request.client_document)
        .bind(request.status)
        .bind(request.priority)
        .bind(&request.service_type)
        .bind(&request.description)
        .bind(&request.responsible_id)
        .bind(&request.responsible_name)
        .bind(request.scheduled_at)
        .bind(request.sla_limit)
        .bind(request.confirmed_at)
        .bind(&request.confirmed_by)
        .bind(&request.observation)
        .bind(&request.materials_used)
        .bind(request.next_maintenance_at)
        .bind(&request.locked_by)
        .bind(request.locked_at)
        .bind(request.budget_total_cents)
        .bind(request.budget_approved)
        .bind(&request.client_signature)
        .bind(&request.technician_signature)
        .bind(request.signed_at)
        .bind(request.created_at)
        .bind(request.updated_at)
        .execute(&mut *tx)
        .await?;

        for (position, equipment_id) in request.equipment_ids.iter().enumerate() {
            sqlx::query(
                "INSERT INTO request_equipment (request_id, equipment_id, position) VALUES (?1, ?2, ?3)",
            )
            .bind(&request.id)
            .bind(equipment_id)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }

        history::insert_in(&mut tx, entry).await?;

        tx.commit().await?;

        info!(
            id = %request.id,
            provider_id = %request.provider_id,
            number = request.number,
            "Request created"
        );
        Ok(request)
    }

    /// Writes every mutable column of `request` and appends `entry`.
    ///
    /// The update only applies while the stored status is still
    /// `expected_status`, so two racing status changes cannot both win.
    pub async fn save(
        &self,
        request: &Request,
        expected_status: RequestStatus,
        entry: &HistoryEntry,
    ) -> DbResult<()> {
        debug!(id = %request.id, status = %request.status, "Saving request");

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE requests SET
                status = ?3,
                priority = ?4,
                service_type = ?5,
                description = ?6,
                responsible_id = ?7,
                responsible_name = ?8,
                scheduled_at = ?9,
                sla_limit = ?10,
                confirmed_at = ?11,
                confirmed_by = ?12,
                observation = ?13,
                materials_used = ?14,
                next_maintenance_at = ?15,
                client_signature = ?16,
                technician_signature = ?17,
                signed_at = ?18,
                updated_at = ?19
            WHERE id = ?1 AND status = ?2
            "#,
        )
        .bind(&request.id)
        .bind(expected_status)
        .bind(request.status)
        .bind(request.priority)
        .bind(&request.service_type)
        .bind(&request.description)
        .bind(&request.responsible_id)
        .bind(&request.responsible_name)
        .bind(request.scheduled_at)
        .bind(request.sla_limit)
        .bind(request.confirmed_at)
        .bind(&request.confirmed_by)
        .bind(&request.observation)
        .bind(&request.materials_used)
        .bind(request.next_maintenance_at)
        .bind(&request.client_signature)
        .bind(&request.technician_signature)
        .bind(request.signed_at)
        .bind(request.updated_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(missing_or_moved(&mut tx, &request.id, expected_status).await);
        }

        history::insert_in(&mut tx, entry).await?;
        tx.commit().await?;

        Ok(())
    }

    // =========================================================================
    // Edit lock
    // =========================================================================

    /// Grants the lock to `actor` if it is free, already theirs, or was
    /// stamped before `expired_before`. Returns whether the grant happened.
    pub async fn try_lock(
        &self,
        id: &str,
        actor_id: &str,
        now: DateTime<Utc>,
        expired_before: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE requests SET locked_by = ?2, locked_at = ?3
            WHERE id = ?1
              AND (locked_by IS NULL
                   OR locked_by = ?2
                   OR locked_at IS NULL
                   OR locked_at < ?4)
            "#,
        )
        .bind(id)
        .bind(actor_id)
        .bind(now)
        .bind(expired_before)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn lock_state(&self, id: &str) -> DbResult<Option<LockState>> {
        let state = sqlx::query_as::<_, LockState>(
            "SELECT locked_by, locked_at FROM requests WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(state)
    }

    /// Clears the lock if `actor` holds it. Returns whether it was cleared.
    pub async fn unlock(&self, id: &str, actor_id: &str) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE requests SET locked_by = NULL, locked_at = NULL WHERE id = ?1 AND locked_by = ?2",
        )
        .bind(id)
        .bind(actor_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Deletes a request and everything that hangs off it in one
    /// transaction. Returns the attachment urls so the caller can remove
    /// the blobs once the rows are gone.
    pub async fn delete_cascade(&self, id: &str) -> DbResult<Vec<String>> {
        let mut tx = self.pool.begin().await?;

        // first statement writes, so the transaction queues for the lock
        let urls: Vec<String> =
            sqlx::query_scalar("DELETE FROM attachments WHERE request_id = ?1 RETURNING url")
                .bind(id)
                .fetch_all(&mut *tx)
                .await?;

        let children = [
            "DELETE FROM checklist_items WHERE request_id = ?1",
            "DELETE FROM request_history WHERE request_id = ?1",
            "DELETE FROM budget_items WHERE request_id = ?1",
            "DELETE FROM request_equipment WHERE request_id = ?1",
            "DELETE FROM invoice_events WHERE invoice_id IN (SELECT id FROM invoices WHERE request_id = ?1)",
            "DELETE FROM invoices WHERE request_id = ?1",
        ];
        for statement in children {
            sqlx::query(statement).bind(id).execute(&mut *tx).await?;
        }

        let result = sqlx::query("DELETE FROM requests WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Request", id));
        }

        tx.commit().await?;

        info!(id = %id, attachments = urls.len(), "Request deleted");
        Ok(urls)
    }
}

/// Builds the error for a guarded UPDATE that matched nothing.
pub(crate) async fn missing_or_moved(
    conn: &mut SqliteConnection,
    id: &str,
    expected_status: RequestStatus,
) -> DbError {
    let found: Result<Option<i64>, sqlx::Error> =
        sqlx::query_scalar("SELECT 1 FROM requests WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await;

    match found {
        Ok(Some(_)) => DbError::state_conflict("Request", id, expected_status.to_string()),
        Ok(None) => DbError::not_found("Request", id),
        Err(e) => e.into(),
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

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_assigns_numbers_and_equipment() {
        let db = db().await;
        let repo = db.requests();

        let first = new_request("p1", "r-1");
        let first = repo.create(first, &history_entry("r-1", "Request created")).await.unwrap();
        let second = repo
            .create(new_request("p1", "r-2"), &history_entry("r-2", "Request created"))
            .await
            .unwrap();

        assert_eq!(first.number, 1001);
        assert_eq!(second.number, 1002);

        let loaded = repo.get("r-1").await.unwrap().unwrap();
        assert_eq!(loaded.equipment_ids, vec!["eq-1".to_string(), "eq-2".to_string()]);
        assert_eq!(loaded.status, RequestStatus::Open);
        assert_eq!(loaded.sla_limit, first.sla_limit);

        let by_number = repo.get_by_number("p1", 1002).await.unwrap().unwrap();
        assert_eq!(by_number.id, "r-2");
        assert_eq!(db.history().list("r-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_filters() {
        let db = db().await;
        let repo = db.requests();
        for id in ["r-1", "r-2", "r-3"] {
            repo.create(new_request("p1", id), &history_entry(id, "Request created"))
                .await
                .unwrap();
        }
        repo.create(new_request("p2", "r-4"), &history_entry("r-4", "Request created"))
            .await
            .unwrap();

        let mut assigned = repo.get("r-2").await.unwrap().unwrap();
        assigned.status = RequestStatus::Scheduled;
        assigned.responsible_id = Some("tech-1".into());
        repo.save(&assigned, RequestStatus::Open, &history_entry("r-2", "Assigned"))
            .await
            .unwrap();

        let all = repo.list("p1", &RequestFilter::default()).await.unwrap();
        assert_eq!(all.iter().map(|r| r.number).collect::<Vec<_>>(), vec![1003, 1002, 1001]);

        let scheduled = RequestFilter {
            status: Some(RequestStatus::Scheduled),
            responsible_id: None,
        };
        assert_eq!(repo.list("p1", &scheduled).await.unwrap().len(), 1);

        let by_tech = RequestFilter {
            status: None,
            responsible_id: Some("tech-1".into()),
        };
        let found = repo.list("p1", &by_tech).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "r-2");
    }

    #[tokio::test]
    async fn test_save_is_guarded_by_status() {
        let db = db().await;
        let repo = db.requests();
        let request = repo
            .create(new_request("p1", "r-1"), &history_entry("r-1", "Request created"))
            .await
            .unwrap();

        let mut moved = request.clone();
        moved.status = RequestStatus::Scheduled;
        repo.save(&moved, RequestStatus::Open, &history_entry("r-1", "Scheduled"))
            .await
            .unwrap();

        // second writer still believes the request is open
        let mut stale = request.clone();
        stale.status = RequestStatus::Cancelled;
        let err = repo
            .save(&stale, RequestStatus::Open, &history_entry("r-1", "Cancelled"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::StateConflict { .. }));

        let mut ghost = request;
        ghost.id = "missing".into();
        let err = repo
            .save(&ghost, RequestStatus::Open, &history_entry("missing", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));

        // the failed saves left no history behind
        assert_eq!(db.history().list("r-1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_lock_grant_refresh_and_expiry() {
        let db = db().await;
        let repo = db.requests();
        repo.create(new_request("p1", "r-1"), &history_entry("r-1", "Request created"))
            .await
            .unwrap();

        let timeout = Duration::seconds(300);
        let now = t0();
        assert!(repo.try_lock("r-1", "ana", now, now - timeout).await.unwrap());

        let later = now + Duration::seconds(60);
        assert!(!repo.try_lock("r-1", "bruno", later, later - timeout).await.unwrap());
        assert!(repo.try_lock("r-1", "ana", later, later - timeout).await.unwrap());

        let state = repo.lock_state("r-1").await.unwrap().unwrap();
        assert_eq!(state.locked_by.as_deref(), Some("ana"));
        assert_eq!(state.locked_at, Some(later));

        let expired = later + Duration::seconds(301);
        assert!(repo.try_lock("r-1", "bruno", expired, expired - timeout).await.unwrap());

        assert!(!repo.unlock("r-1", "ana").await.unwrap());
        assert!(repo.unlock("r-1", "bruno").await.unwrap());
        let state = repo.lock_state("r-1").await.unwrap().unwrap();
        assert_eq!(state.locked_by, None);
    }

    #[tokio::test]
    async fn test_delete_cascade_removes_children() {
        let db = db().await;
        let repo = db.requests();
        repo.create(new_request("p1", "r-1"), &history_entry("r-1", "Request created"))
            .await
            .unwrap();

        sqlx::query(
            "INSERT INTO attachments (id, request_id, file_name, url, mime_type, file_size, \
             uploaded_by_id, uploaded_by_name, created_at) \
             VALUES ('a-1', 'r-1', 'photo.jpg', 'blob://photo', 'image/jpeg', 10, 'u', 'U', ?1)",
        )
        .bind(t0())
        .execute(db.pool())
        .await
        .unwrap();

        let urls = repo.delete_cascade("r-1").await.unwrap();
        assert_eq!(urls, vec!["blob://photo".to_string()]);
        assert!(repo.get("r-1").await.unwrap().is_none());
        assert!(db.history().list("r-1").await.unwrap().is_empty());

        assert!(matches!(
            repo.delete_cascade("r-1").await,
            Err(DbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_rolls_back_when_final_delete_fails() {
        let db = db().await;
        let repo = db.requests();
        repo.create(new_request("p1", "r-1"), &history_entry("r-1", "Request created"))
            .await
            .unwrap();

        sqlx::query(
            "CREATE TRIGGER block_request_delete BEFORE DELETE ON requests \
             BEGIN SELECT RAISE(ABORT, 'delete blocked'); END",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let err = repo.delete_cascade("r-1").await.unwrap_err();
        assert!(matches!(err, DbError::QueryFailed(_)));

        // children deleted earlier in the transaction are back
        let request = repo.get("r-1").await.unwrap().unwrap();
        assert_eq!(request.equipment_ids.len(), 2);
        assert_eq!(db.history().list("r-1").await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_get_unique_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(DbConfig::new(dir.path().join("numbers.db")).max_connections(8))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let repo = db.requests();
            handles.push(tokio::spawn(async move {
                let id = format!("r-{i}");
                repo.create(new_request("p1", &id), &history_entry(&id, "Request created"))
                    .await
                    .map(|r| r.number)
            }));
        }

        let mut numbers = Vec::new();
        for handle in handles {
            numbers.push(handle.await.unwrap().unwrap());
        }
        numbers.sort_unstable();

        assert_eq!(numbers, (1001..=1020).collect::<Vec<i64>>());
        db.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_deletes_all_commit() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(DbConfig::new(dir.path().join("deletes.db")).max_connections(8))
            .await
            .unwrap();
        for i in 0..16 {
            let id = format!("r-{i}");
            db.requests()
                .create(new_request("p1", &id), &history_entry(&id, "Request created"))
                .await
                .unwrap();
        }

        let mut handles = Vec::new();
        for i in 0..16 {
            let repo = db.requests();
            handles.push(tokio::spawn(async move {
                repo.delete_cascade(&format!("r-{i}")).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let left: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM requests")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(left, 0);
        db.close().await;
    }
}
