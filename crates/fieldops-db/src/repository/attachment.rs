//! # Attachment Repository
//!
//! Attachment records. The bytes live in blob storage; this table keeps
//! the url the storage returned.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use fieldops_core::Attachment;

/// Repository for request attachments.
#[derive(Debug, Clone)]
pub struct AttachmentRepository {
    pool: SqlitePool,
}

impl AttachmentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        AttachmentRepository { pool }
    }

    pub async fn insert(&self, attachment: &Attachment) -> DbResult<()> {
        debug!(
            request_id = %attachment.request_id,
            file_name = %attachment.file_name,
            size = attachment.file_size,
            "Inserting attachment"
        );

        sqlx::query(
            r#"
            INSERT INTO attachments (
                id, request_id, file_name, url, mime_type, file_size,
                uploaded_by_id, uploaded_by_name, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&attachment.id)
        .bind(&attachment.request_id)
        .bind(&attachment.file_name)
        .bind(&attachment.url)
        .bind(&attachment.mime_type)
        .bind(attachment.file_size)
        .bind(&attachment.uploaded_by_id)
        .bind(&attachment.uploaded_by_name)
        .bind(attachment.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Deletes the record and returns it so the caller can drop the blob.
    pub async fn delete(&self, request_id: &str, id: &str) -> DbResult<Attachment> {
        sqlx::query_as::<_, Attachment>(
            r#"
            DELETE FROM attachments
            WHERE id = ?1 AND request_id = ?2
            RETURNING id, request_id, file_name, url, mime_type, file_size,
                      uploaded_by_id, uploaded_by_name, created_at
            "#,
        )
        .bind(id)
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("Attachment", id))
    }

    /// Attachments of a request, newest first.
    pub async fn list(&self, request_id: &str) -> DbResult<Vec<Attachment>> {
        let attachments = sqlx::query_as::<_, Attachment>(
            r#"
            SELECT id, request_id, file_name, url, mime_type, file_size,
                   uploaded_by_id, uploaded_by_name, created_at
            FROM attachments
            WHERE request_id = ?1
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(request_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(attachments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::{history_entry, new_request, t0};
    use crate::{Database, DbConfig};

    fn attachment(id: &str, request_id: &str) -> Attachment {
        Attachment {
            id: id.to_string(),
            request_id: request_id.to_string(),
            file_name: "before.jpg".into(),
            url: format!("file:///blobs/{id}"),
            mime_type: "image/jpeg".into(),
            file_size: 2_048,
            uploaded_by_id: "tech-1".into(),
            uploaded_by_name: "Carlos".into(),
            created_at: t0(),
        }
    }

    #[tokio::test]
    async fn test_insert_list_delete() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.requests()
            .create(new_request("p1", "r-1"), &history_entry("r-1", "Request created"))
            .await
            .unwrap();
        let repo = db.attachments();

        repo.insert(&attachment("a-1", "r-1")).await.unwrap();
        repo.insert(&attachment("a-2", "r-1")).await.unwrap();

        let listed = repo.list("r-1").await.unwrap();
        assert_eq!(listed.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(), vec!["a-2", "a-1"]);

        let removed = repo.delete("r-1", "a-1").await.unwrap();
        assert_eq!(removed.url, "file:///blobs/a-1");
        assert!(matches!(repo.delete("r-1", "a-1").await, Err(DbError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_insert_for_unknown_request_fails() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db.attachments().insert(&attachment("a-1", "ghost")).await.unwrap_err();
        assert!(matches!(err, DbError::ForeignKeyViolation { .. }));
    }
}
