//! # Checklist Repository

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use fieldops_core::{Actor, ChecklistItem};

const SELECT_ITEM: &str = r#"
    SELECT id, request_id, equipment_id, description, checked, observation,
           checked_by_id, checked_by_name, checked_at, created_at
    FROM checklist_items
"#;

/// Repository for request checklist items.
#[derive(Debug, Clone)]
pub struct ChecklistRepository {
    pool: SqlitePool,
}

impl ChecklistRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ChecklistRepository { pool }
    }

    pub async fn insert(&self, item: &ChecklistItem) -> DbResult<()> {
        debug!(request_id = %item.request_id, id = %item.id, "Inserting checklist item");

        sqlx::query(
            r#"
            INSERT INTO checklist_items (
                id, request_id, equipment_id, description, checked, observation,
                checked_by_id, checked_by_name, checked_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&item.id)
        .bind(&item.request_id)
        .bind(&item.equipment_id)
        .bind(&item.description)
        .bind(item.checked)
        .bind(&item.observation)
        .bind(&item.checked_by_id)
        .bind(&item.checked_by_name)
        .bind(item.checked_at)
        .bind(item.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, request_id: &str, id: &str) -> DbResult<Option<ChecklistItem>> {
        let sql = format!("{SELECT_ITEM} WHERE id = ?1 AND request_id = ?2");
        let item = sqlx::query_as::<_, ChecklistItem>(&sql)
            .bind(id)
            .bind(request_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(item)
    }

    /// Checks or unchecks an item. Unchecking clears who checked it.
    pub async fn set_checked(
        &self,
        request_id: &str,
        id: &str,
        checked: bool,
        observation: Option<&str>,
        actor: &Actor,
        at: DateTime<Utc>,
    ) -> DbResult<ChecklistItem> {
        let (by_id, by_name, checked_at) = if checked {
            (Some(actor.id.as_str()), Some(actor.name.as_str()), Some(at))
        } else {
            (None, None, None)
        };

        let sql = r#"
            UPDATE checklist_items SET
                checked = ?3,
                observation = COALESCE(?4, observation),
                checked_by_id = ?5,
                checked_by_name = ?6,
                checked_at = ?7
            WHERE id = ?1 AND request_id = ?2
            RETURNING id, request_id, equipment_id, description, checked, observation,
                      checked_by_id, checked_by_name, checked_at, created_at
        "#;

        sqlx::query_as::<_, ChecklistItem>(sql)
            .bind(id)
            .bind(request_id)
            .bind(checked)
            .bind(observation)
            .bind(by_id)
            .bind(by_name)
            .bind(checked_at)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("ChecklistItem", id))
    }

    pub async fn delete(&self, request_id: &str, id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM checklist_items WHERE id = ?1 AND request_id = ?2")
            .bind(id)
            .bind(request_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("ChecklistItem", id));
        }
        Ok(())
    }

    /// Items of a request in insertion order.
    pub async fn list(&self, request_id: &str) -> DbResult<Vec<ChecklistItem>> {
        let sql = format!("{SELECT_ITEM} WHERE request_id = ?1 ORDER BY created_at, rowid");
        let items = sqlx::query_as::<_, ChecklistItem>(&sql)
            .bind(request_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::{history_entry, new_request, t0};
    use crate::{Database, DbConfig};

    fn item(id: &str) -> ChecklistItem {
        ChecklistItem {
            id: id.to_string(),
            request_id: "r-1".into(),
            equipment_id: Some("eq-1".into()),
            description: "Clean evaporator coil".into(),
            checked: false,
            observation: None,
            checked_by_id: None,
            checked_by_name: None,
            checked_at: None,
            created_at: t0(),
        }
    }

    #[tokio::test]
    async fn test_checklist_roundtrip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.requests()
            .create(new_request("p1", "r-1"), &history_entry("r-1", "Request created"))
            .await
            .unwrap();
        let repo = db.checklist();

        repo.insert(&item("c-1")).await.unwrap();
        repo.insert(&item("c-2")).await.unwrap();

        let tech = Actor::new("tech-1", "Carlos");
        let checked = repo
            .set_checked("r-1", "c-1", true, Some("coil was dirty"), &tech, t0())
            .await
            .unwrap();
        assert!(checked.checked);
        assert_eq!(checked.checked_by_name.as_deref(), Some("Carlos"));
        assert_eq!(checked.observation.as_deref(), Some("coil was dirty"));

        let unchecked = repo.set_checked("r-1", "c-1", false, None, &tech, t0()).await.unwrap();
        assert!(!unchecked.checked);
        assert!(unchecked.checked_by_id.is_none());
        assert_eq!(unchecked.observation.as_deref(), Some("coil was dirty"));

        repo.delete("r-1", "c-2").await.unwrap();
        assert!(matches!(repo.delete("r-1", "c-2").await, Err(DbError::NotFound { .. })));
        assert_eq!(repo.list("r-1").await.unwrap().len(), 1);
        assert!(repo.get("other", "c-1").await.unwrap().is_none());
    }
}
