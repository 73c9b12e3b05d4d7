//! # Request Sequence Repository
//!
//! Per-provider request numbering.
//!
//! ```text
//!   request_sequences
//!   ┌──────────────┬─────────────┐
//!   │ provider_id  │ last_number │     INSERT ... VALUES (p, 1001)
//!   ├──────────────┼─────────────┤     ON CONFLICT (provider_id)
//!   │ provider-1   │ 1007        │     DO UPDATE SET last_number = last_number + 1
//!   │ provider-2   │ 1001        │     RETURNING last_number
//!   └──────────────┴─────────────┘
//! ```
//!
//! The upsert is a single write statement, so SQLite serializes concurrent
//! callers on the database write lock. When it is the first statement of a
//! transaction the number is consumed only if that transaction commits.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use fieldops_core::FIRST_REQUEST_NUMBER;

/// Allocates the next number for `provider_id` on an open connection or
/// transaction.
pub(crate) async fn next_number_in(conn: &mut SqliteConnection, provider_id: &str) -> DbResult<i64> {
    let number: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO request_sequences (provider_id, last_number)
        VALUES (?1, ?2)
        ON CONFLICT (provider_id) DO UPDATE SET last_number = last_number + 1
        RETURNING last_number
        "#,
    )
    .bind(provider_id)
    .bind(FIRST_REQUEST_NUMBER)
    .fetch_one(&mut *conn)
    .await?;

    debug!(provider_id = %provider_id, number, "Allocated request number");
    Ok(number)
}

/// Repository for the request number sequences.
#[derive(Debug, Clone)]
pub struct SequenceRepository {
    pool: SqlitePool,
}

impl SequenceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SequenceRepository { pool }
    }

    /// Allocates a number outside of any request insert.
    pub async fn next_number(&self, provider_id: &str) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        next_number_in(&mut conn, provider_id).await
    }

    /// Last number handed out, `None` before the first request.
    pub async fn current(&self, provider_id: &str) -> DbResult<Option<i64>> {
        let number = sqlx::query_scalar(
            "SELECT last_number FROM request_sequences WHERE provider_id = ?1",
        )
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(number)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_numbers_start_at_1001_per_provider() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let seq = db.sequences();

        assert_eq!(seq.next_number("p1").await.unwrap(), 1001);
        assert_eq!(seq.next_number("p1").await.unwrap(), 1002);
        assert_eq!(seq.next_number("p2").await.unwrap(), 1001);
        assert_eq!(seq.current("p1").await.unwrap(), Some(1002));
    }

    #[tokio::test]
    async fn test_rolled_back_transaction_releases_number() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let mut tx = db.pool().begin().await.unwrap();
        let number = super::next_number_in(&mut tx, "p1").await.unwrap();
        assert_eq!(number, 1001);
        tx.rollback().await.unwrap();

        assert_eq!(db.sequences().next_number("p1").await.unwrap(), 1001);
    }
}
