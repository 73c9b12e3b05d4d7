//! # History Repository
//!
//! Append-only audit trail of a request.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use fieldops_core::HistoryEntry;

/// Appends `entry` on an open connection or transaction.
pub(crate) async fn insert_in(conn: &mut SqliteConnection, entry: &HistoryEntry) -> DbResult<()> {
    debug!(request_id = %entry.request_id, action = %entry.action, "Appending history");

    sqlx::query(
        r#"
        INSERT INTO request_history (
            id, request_id, actor_id, actor_name, action,
            details, before_value, after_value, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.request_id)
    .bind(&entry.actor_id)
    .bind(&entry.actor_name)
    .bind(&entry.action)
    .bind(&entry.details)
    .bind(&entry.before_value)
    .bind(&entry.after_value)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Repository for request history.
#[derive(Debug, Clone)]
pub struct HistoryRepository {
    pool: SqlitePool,
}

impl HistoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        HistoryRepository { pool }
    }

    pub async fn append(&self, entry: &HistoryEntry) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        insert_in(&mut conn, entry).await
    }

    /// Entries of a request, newest first.
    pub async fn list(&self, request_id: &str) -> DbResult<Vec<HistoryEntry>> {
        let entries = sqlx::query_as::<_, HistoryEntry>(
            r#"
            SELECT id, request_id, actor_id, actor_name, action,
                   details, before_value, after_value, created_at
            FROM request_history
            WHERE request_id = ?1
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(request_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}
