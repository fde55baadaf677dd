//! # Allocation Repository
//!
//! Records of stock taken from lots on behalf of transactions.
//!
//! A record is written in the same unit of work as the lot decrement it
//! describes. Release stamps `released_at` with a conditional update, so a
//! record can only ever be released once no matter how many callers race.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use kassa_core::LotAllocation;

#[derive(Debug, FromRow)]
struct AllocationRow {
    id: String,
    lot_id: String,
    transaction_id: Option<String>,
    amount: i64,
    created_at: DateTime<Utc>,
    released_at: Option<DateTime<Utc>>,
}

impl From<AllocationRow> for LotAllocation {
    fn from(row: AllocationRow) -> Self {
        LotAllocation {
            id: row.id,
            lot_id: row.lot_id,
            transaction_id: row.transaction_id,
            amount: row.amount,
            created_at: row.created_at,
            released_at: row.released_at,
        }
    }
}

pub async fn insert_allocation(
    conn: &mut SqliteConnection,
    allocation: &LotAllocation,
) -> DbResult<()> {
    debug!(
        id = %allocation.id,
        lot_id = %allocation.lot_id,
        amount = allocation.amount,
        "Recording lot allocation"
    );

    sqlx::query(
        r#"
        INSERT INTO lot_allocations (id, lot_id, transaction_id, amount, created_at, released_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(&allocation.id)
    .bind(&allocation.lot_id)
    .bind(&allocation.transaction_id)
    .bind(allocation.amount)
    .bind(allocation.created_at)
    .bind(allocation.released_at)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn fetch_allocation(
    conn: &mut SqliteConnection,
    id: &str,
) -> DbResult<Option<LotAllocation>> {
    let row: Option<AllocationRow> = sqlx::query_as("SELECT * FROM lot_allocations WHERE id = ?1")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(row.map(LotAllocation::from))
}

/// Allocations of a transaction that still hold stock.
pub async fn fetch_unreleased_for_transaction(
    conn: &mut SqliteConnection,
    transaction_id: &str,
) -> DbResult<Vec<LotAllocation>> {
    let rows: Vec<AllocationRow> = sqlx::query_as(
        r#"
        SELECT * FROM lot_allocations
        WHERE transaction_id = ?1 AND released_at IS NULL
        ORDER BY created_at, id
        "#,
    )
    .bind(transaction_id)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(LotAllocation::from).collect())
}

/// Attaches orphan allocations to the transaction they were made for.
pub async fn assign_transaction(
    conn: &mut SqliteConnection,
    allocation_id: &str,
    transaction_id: &str,
) -> DbResult<()> {
    sqlx::query("UPDATE lot_allocations SET transaction_id = ?2 WHERE id = ?1")
        .bind(allocation_id)
        .bind(transaction_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Stamps the allocation released.
///
/// Returns `false` when it was already released; the caller must then leave
/// the lot alone.
pub async fn mark_released(
    conn: &mut SqliteConnection,
    id: &str,
    now: DateTime<Utc>,
) -> DbResult<bool> {
    let result = sqlx::query(
        "UPDATE lot_allocations SET released_at = ?2 WHERE id = ?1 AND released_at IS NULL",
    )
    .bind(id)
    .bind(now)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Units of a lot held by unreleased allocations.
pub async fn outstanding_for_lot(conn: &mut SqliteConnection, lot_id: &str) -> DbResult<i64> {
    let total: Option<i64> = sqlx::query_scalar(
        "SELECT SUM(amount) FROM lot_allocations WHERE lot_id = ?1 AND released_at IS NULL",
    )
    .bind(lot_id)
    .fetch_one(conn)
    .await?;
    Ok(total.unwrap_or(0))
}

/// Repository for allocation reads outside a unit of work.
#[derive(Debug, Clone)]
pub struct AllocationRepository {
    pool: SqlitePool,
}

impl AllocationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        AllocationRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<LotAllocation>> {
        let mut conn = self.pool.acquire().await?;
        fetch_allocation(&mut conn, id).await
    }

    pub async fn unreleased_for_transaction(
        &self,
        transaction_id: &str,
    ) -> DbResult<Vec<LotAllocation>> {
        let mut conn = self.pool.acquire().await?;
        fetch_unreleased_for_transaction(&mut conn, transaction_id).await
    }

    pub async fn outstanding_for_lot(&self, lot_id: &str) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        outstanding_for_lot(&mut conn, lot_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{db, minutes_ago, seed_lot, seed_product};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_release_happens_once() {
        let db = db().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let product = seed_product(&mut conn, 1000).await;
        let lot = seed_lot(&mut conn, &product.id, 5, minutes_ago(5)).await;

        let allocation = LotAllocation {
            id: Uuid::new_v4().to_string(),
            lot_id: lot.id.clone(),
            transaction_id: None,
            amount: 2,
            created_at: Utc::now(),
            released_at: None,
        };
        insert_allocation(&mut conn, &allocation).await.unwrap();
        assert_eq!(outstanding_for_lot(&mut conn, &lot.id).await.unwrap(), 2);

        assert!(mark_released(&mut conn, &allocation.id, Utc::now()).await.unwrap());
        assert!(!mark_released(&mut conn, &allocation.id, Utc::now()).await.unwrap());

        let stored = fetch_allocation(&mut conn, &allocation.id).await.unwrap().unwrap();
        assert!(stored.is_released());
        assert_eq!(outstanding_for_lot(&mut conn, &lot.id).await.unwrap(), 0);
    }
}
