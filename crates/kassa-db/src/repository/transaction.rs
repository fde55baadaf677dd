//! # Transaction Repository
//!
//! Order lines and their lifecycle.
//!
//! ## Transaction Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  place_order ──► pending ──── checkout ────► completed                 │
//! │                     │                                                   │
//! │                     └──── sweeper ─────────► pending + is_deleted      │
//! │                                                                         │
//! │  Both exits are conditional on `status = 'pending' AND is_deleted = 0`, │
//! │  so each transaction leaves the pending state exactly once.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, trace};

use crate::error::DbResult;
use crate::repository::expect_one_row;
use kassa_core::pricing::Discount;
use kassa_core::query::TransactionQuery;
use kassa_core::{Currency, Money, Transaction, TransactionStatus};

#[derive(Debug, FromRow)]
struct TransactionRow {
    id: String,
    product_id: String,
    payment_id: Option<String>,
    quantity: i64,
    unit_price: i64,
    base_total: i64,
    total: i64,
    currency: Currency,
    discount: Option<Json<Discount>>,
    status: TransactionStatus,
    is_deleted: bool,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<TransactionRow> for Transaction {
    fn from(row: TransactionRow) -> Self {
        Transaction {
            id: row.id,
            product_id: row.product_id,
            payment_id: row.payment_id,
            quantity: row.quantity,
            unit_price: Money::from_minor(row.unit_price),
            base_total: Money::from_minor(row.base_total),
            total: Money::from_minor(row.total),
            currency: row.currency,
            discount: row.discount.map(|d| d.0),
            status: row.status,
            is_deleted: row.is_deleted,
            created_at: row.created_at,
            completed_at: row.completed_at,
            deleted_at: row.deleted_at,
        }
    }
}

pub async fn insert_transaction(conn: &mut SqliteConnection, tx: &Transaction) -> DbResult<()> {
    debug!(id = %tx.id, product_id = %tx.product_id, quantity = tx.quantity, "Inserting transaction");

    sqlx::query(
        r#"
        INSERT INTO transactions (
            id, product_id, payment_id, quantity,
            unit_price, base_total, total, currency, discount,
            status, is_deleted, created_at, completed_at, deleted_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
    )
    .bind(&tx.id)
    .bind(&tx.product_id)
    .bind(&tx.payment_id)
    .bind(tx.quantity)
    .bind(tx.unit_price.minor())
    .bind(tx.base_total.minor())
    .bind(tx.total.minor())
    .bind(tx.currency)
    .bind(tx.discount.as_ref().map(Json))
    .bind(tx.status)
    .bind(tx.is_deleted)
    .bind(tx.created_at)
    .bind(tx.completed_at)
    .bind(tx.deleted_at)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn fetch_transaction(
    conn: &mut SqliteConnection,
    id: &str,
) -> DbResult<Option<Transaction>> {
    let row: Option<TransactionRow> = sqlx::query_as("SELECT * FROM transactions WHERE id = ?1")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(row.map(Transaction::from))
}

/// Links a transaction to the payment that will settle it.
pub async fn set_payment(
    conn: &mut SqliteConnection,
    id: &str,
    payment_id: &str,
) -> DbResult<()> {
    let result = sqlx::query("UPDATE transactions SET payment_id = ?2 WHERE id = ?1 AND is_deleted = 0")
        .bind(id)
        .bind(payment_id)
        .execute(conn)
        .await?;
    expect_one_row(result, "Transaction", id)
}

/// Moves a pending transaction to completed.
pub async fn mark_completed(
    conn: &mut SqliteConnection,
    id: &str,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE transactions SET status = 'completed', completed_at = ?2
        WHERE id = ?1 AND status = 'pending' AND is_deleted = 0
        "#,
    )
    .bind(id)
    .bind(now)
    .execute(conn)
    .await?;

    debug!(id, rows = result.rows_affected(), "Completed transaction");
    expect_one_row(result, "Transaction", id)
}

/// Soft-deletes a pending transaction.
///
/// Returns `false` when another sweep or a checkout got there first.
pub async fn soft_delete(
    conn: &mut SqliteConnection,
    id: &str,
    now: DateTime<Utc>,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE transactions SET is_deleted = 1, deleted_at = ?2
        WHERE id = ?1 AND status = 'pending' AND is_deleted = 0
        "#,
    )
    .bind(id)
    .bind(now)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Sweeper candidates: pending, not deleted, created before `cutoff`.
pub async fn fetch_pending_before(
    conn: &mut SqliteConnection,
    cutoff: DateTime<Utc>,
) -> DbResult<Vec<Transaction>> {
    let rows: Vec<TransactionRow> = sqlx::query_as(
        r#"
        SELECT * FROM transactions
        WHERE status = 'pending' AND is_deleted = 0 AND created_at < ?1
        ORDER BY created_at, id
        "#,
    )
    .bind(cutoff)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(Transaction::from).collect())
}

/// Lists transactions matching a validated query.
pub async fn search(
    conn: &mut SqliteConnection,
    query: &TransactionQuery,
) -> DbResult<Vec<Transaction>> {
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM transactions WHERE 1 = 1");

    if let Some(product_id) = &query.product_id {
        builder.push(" AND product_id = ").push_bind(product_id.clone());
    }
    if let Some(payment_id) = &query.payment_id {
        builder.push(" AND payment_id = ").push_bind(payment_id.clone());
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status);
    }
    if !query.include_deleted {
        builder.push(" AND is_deleted = 0");
    }
    if let Some(after) = query.created_after {
        builder.push(" AND created_at >= ").push_bind(after);
    }
    if let Some(before) = query.created_before {
        builder.push(" AND created_at < ").push_bind(before);
    }

    builder
        .push(" ORDER BY ")
        .push(query.sort.column())
        .push(" ")
        .push(query.direction.as_sql())
        .push(", id LIMIT ")
        .push_bind(query.pagination.limit())
        .push(" OFFSET ")
        .push_bind(query.pagination.offset());

    trace!(sql = builder.sql(), "Searching transactions");

    let rows: Vec<TransactionRow> = builder.build_query_as().fetch_all(conn).await?;
    Ok(rows.into_iter().map(Transaction::from).collect())
}

/// Repository for transaction reads outside a unit of work.
#[derive(Debug, Clone)]
pub struct TransactionRepository {
    pool: SqlitePool,
}

impl TransactionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TransactionRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Transaction>> {
        let mut conn = self.pool.acquire().await?;
        fetch_transaction(&mut conn, id).await
    }

    pub async fn search(&self, query: &TransactionQuery) -> DbResult<Vec<Transaction>> {
        let mut conn = self.pool.acquire().await?;
        search(&mut conn, query).await
    }

    pub async fn pending_before(&self, cutoff: DateTime<Utc>) -> DbResult<Vec<Transaction>> {
        let mut conn = self.pool.acquire().await?;
        fetch_pending_before(&mut conn, cutoff).await
    }
}
