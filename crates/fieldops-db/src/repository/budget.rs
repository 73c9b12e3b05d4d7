//! # Budget Repository
//!
//! Budget lines of a request and the cached `requests.budget_total_cents`.
//!
//! Every item write recomputes the cached total from the item rows in the
//! same transaction, so the cache always equals the live sum.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::history;
use crate::error::{DbError, DbResult};
use fieldops_core::{BudgetLineItem, HistoryEntry};

/// Recomputes the cached budget total. Returns the new total.
async fn refresh_total(
    conn: &mut SqliteConnection,
    request_id: &str,
    now: DateTime<Utc>,
) -> DbResult<i64> {
    let total: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE requests SET
            budget_total_cents = (
                SELECT COALESCE(SUM(total_cents), 0) FROM budget_items WHERE request_id = ?1
            ),
            updated_at = ?2
        WHERE id = ?1
        RETURNING budget_total_cents
        "#,
    )
    .bind(request_id)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;

    total.ok_or_else(|| DbError::not_found("Request", request_id))
}

/// Opens an item write with a write on the request row, so the transaction
/// holds the write lock before it reads anything.
async fn touch_request(
    conn: &mut SqliteConnection,
    request_id: &str,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query("UPDATE requests SET updated_at = ?2 WHERE id = ?1")
        .bind(request_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Request", request_id));
    }
    Ok(())
}

/// Repository for budget line items.
#[derive(Debug, Clone)]
pub struct BudgetRepository {
    pool: SqlitePool,
}

impl BudgetRepository {
    pub fn new(pool: SqlitePool) -> Self {
        BudgetRepository { pool }
    }

    /// Inserts `item`, refreshes the request total and appends `entry`.
    /// Returns the new total in cents.
    pub async fn add_item(&self, item: &BudgetLineItem, entry: &HistoryEntry) -> DbResult<i64> {
        debug!(request_id = %item.request_id, total = item.total_cents, "Adding budget item");

        let mut tx = self.pool.begin().await?;
        touch_request(&mut tx, &item.request_id, entry.created_at).await?;

        sqlx::query(
            r#"
            INSERT INTO budget_items (
                id, request_id, description, quantity,
                unit_price_cents, total_cents, category, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&item.id)
        .bind(&item.request_id)
        .bind(&item.description)
        .bind(item.quantity)
        .bind(item.unit_price_cents)
        .bind(item.total_cents)
        .bind(item.category)
        .bind(item.created_at)
        .execute(&mut *tx)
        .await?;

        let total = refresh_total(&mut tx, &item.request_id, entry.created_at).await?;
        history::insert_in(&mut tx, entry).await?;
        tx.commit().await?;

        Ok(total)
    }

    /// Deletes one line of `request_id`. Returns the removed line and the
    /// new total in cents.
    pub async fn remove_item(
        &self,
        request_id: &str,
        item_id: &str,
        entry: &HistoryEntry,
    ) -> DbResult<(BudgetLineItem, i64)> {
        debug!(request_id = %request_id, item_id = %item_id, "Removing budget item");

        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query_as::<_, BudgetLineItem>(
            r#"
            DELETE FROM budget_items
            WHERE id = ?1 AND request_id = ?2
            RETURNING id, request_id, description, quantity,
                      unit_price_cents, total_cents, category, created_at
            "#,
        )
        .bind(item_id)
        .bind(request_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DbError::not_found("BudgetLineItem", item_id))?;

        let total = refresh_total(&mut tx, request_id, entry.created_at).await?;
        history::insert_in(&mut tx, entry).await?;
        tx.commit().await?;

        Ok((removed, total))
    }

    /// Lines of a request in insertion order.
    pub async fn items(&self, request_id: &str) -> DbResult<Vec<BudgetLineItem>> {
        let items = sqlx::query_as::<_, BudgetLineItem>(
            r#"
            SELECT id, request_id, description, quantity,
                   unit_price_cents, total_cents, category, created_at
            FROM budget_items
            WHERE request_id = ?1
            ORDER BY created_at, rowid
            "#,
        )
        .bind(request_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Live sum of the item rows.
    pub async fn live_total(&self, request_id: &str) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(total_cents), 0) FROM budget_items WHERE request_id = ?1",
        )
        .bind(request_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    /// Marks the budget as approved by the client.
    pub async fn approve(&self, request_id: &str, entry: &HistoryEntry) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE requests SET budget_approved = 1, updated_at = ?2 WHERE id = ?1",
        )
        .bind(request_id)
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Request", request_id));
        }

        history::insert_in(&mut tx, entry).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::{history_entry, new_request, t0};
    use crate::{Database, DbConfig};
    use fieldops_core::{BudgetCategory, Quantity};

    fn line(id: &str, request_id: &str, quantity: i64, unit_price_cents: i64) -> BudgetLineItem {
        BudgetLineItem {
            id: id.to_string(),
            request_id: request_id.to_string(),
            description: "Filtro de ar novo".into(),
            quantity: Quantity::units(quantity),
            unit_price_cents,
            total_cents: quantity * unit_price_cents,
            category: BudgetCategory::Material,
            created_at: t0(),
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
    async fn test_total_tracks_items() {
        let db = setup().await;
        let budget = db.budget();

        let total = budget
            .add_item(&line("b-1", "r-1", 2, 6_000), &history_entry("r-1", "Budget item added"))
            .await
            .unwrap();
        assert_eq!(total, 12_000);

        let total = budget
            .add_item(&line("b-2", "r-1", 1, 15_000), &history_entry("r-1", "Budget item added"))
            .await
            .unwrap();
        assert_eq!(total, 27_000);

        let (removed, total) = budget
            .remove_item("r-1", "b-1", &history_entry("r-1", "Budget item removed"))
            .await
            .unwrap();
        assert_eq!(removed.total_cents, 12_000);
        assert_eq!(total, 15_000);

        let request = db.requests().get("r-1").await.unwrap().unwrap();
        assert_eq!(request.budget_total_cents, budget.live_total("r-1").await.unwrap());
        assert_eq!(budget.items("r-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_request_or_item() {
        let db = setup().await;
        let budget = db.budget();

        let err = budget
            .add_item(&line("b-1", "nope", 1, 100), &history_entry("nope", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));

        let err = budget
            .remove_item("r-1", "missing", &history_entry("r-1", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_item_of_other_request_not_removed() {
        let db = setup().await;
        db.requests()
            .create(new_request("p1", "r-2"), &history_entry("r-2", "Request created"))
            .await
            .unwrap();
        db.budget()
            .add_item(&line("b-1", "r-2", 1, 500), &history_entry("r-2", "Budget item added"))
            .await
            .unwrap();

        assert!(db
            .budget()
            .remove_item("r-1", "b-1", &history_entry("r-1", "x"))
            .await
            .is_err());
        assert_eq!(db.budget().live_total("r-2").await.unwrap(), 500);
    }

    #[tokio::test]
    async fn test_approve() {
        let db = setup().await;
        db.budget()
            .approve("r-1", &history_entry("r-1", "Budget approved"))
            .await
            .unwrap();
        assert!(db.requests().get("r-1").await.unwrap().unwrap().budget_approved);
    }

    #[tokio::test]
    async fn test_fractional_quantity_round_trips() {
        let db = setup().await;
        let mut tubing = line("b-1", "r-1", 0, 4_500);
        tubing.quantity = Quantity::from_milli(2_500);
        tubing.total_cents = 11_250;

        let total = db
            .budget()
            .add_item(&tubing, &history_entry("r-1", "Budget item added"))
            .await
            .unwrap();
        assert_eq!(total, 11_250);

        let stored = db.budget().items("r-1").await.unwrap();
        assert_eq!(stored[0].quantity, Quantity::from_milli(2_500));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_item_writes_all_commit() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(DbConfig::new(dir.path().join("budget.db")).max_connections(8))
            .await
            .unwrap();
        db.requests()
            .create(new_request("p1", "r-1"), &history_entry("r-1", "Request created"))
            .await
            .unwrap();

        for round in 0..5 {
            let mut handles = Vec::new();
            for i in 0..16 {
                let budget = db.budget();
                handles.push(tokio::spawn(async move {
                    let item = line(&format!("b-{round}-{i}"), "r-1", 1, 100);
                    budget
                        .add_item(&item, &history_entry("r-1", "Budget item added"))
                        .await
                }));
            }
            for handle in handles {
                handle.await.unwrap().unwrap();
            }
        }

        let request = db.requests().get("r-1").await.unwrap().unwrap();
        assert_eq!(request.budget_total_cents, 80 * 100);
        assert_eq!(db.budget().items("r-1").await.unwrap().len(), 80);
        db.close().await;
    }
}
