//! # Payment Repository
//!
//! Invoices aggregating transactions.
//!
//! Every update is a compare-and-set on `version` and `is_finalized = 0`:
//! a stale writer gets `DbError::Conflict` and re-reads, a writer racing a
//! checkout re-reads a finalized payment and stops.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, trace};

use crate::error::{DbError, DbResult};
use crate::repository::{expect_one_row, parse_rate};
use kassa_core::payment::Charge;
use kassa_core::query::PaymentQuery;
use kassa_core::{CashTender, Currency, Money, Payment};

#[derive(Debug, FromRow)]
struct PaymentRow {
    id: String,
    drawer_id: String,
    customer_id: Option<String>,
    reservation_id: Option<String>,
    transaction_ids: Json<Vec<String>>,
    services: Json<Vec<Charge>>,
    vouchers: Json<Vec<Charge>>,
    discounts: Json<Vec<Charge>>,
    subtotal: i64,
    total: i64,
    currency: Currency,
    buy_rate: String,
    sell_rate: String,
    is_finalized: bool,
    received_cash: Json<Vec<CashTender>>,
    returned_change: Json<Vec<CashTender>>,
    created_at: DateTime<Utc>,
    finalized_at: Option<DateTime<Utc>>,
    version: i64,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DbError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            rate: parse_rate(&row.buy_rate, &row.sell_rate)?,
            id: row.id,
            drawer_id: row.drawer_id,
            customer_id: row.customer_id,
            reservation_id: row.reservation_id,
            transaction_ids: row.transaction_ids.0,
            services: row.services.0,
            vouchers: row.vouchers.0,
            discounts: row.discounts.0,
            subtotal: Money::from_minor(row.subtotal),
            total: Money::from_minor(row.total),
            currency: row.currency,
            is_finalized: row.is_finalized,
            received_cash: row.received_cash.0,
            returned_change: row.returned_change.0,
            created_at: row.created_at,
            finalized_at: row.finalized_at,
            version: row.version,
        })
    }
}

pub async fn insert_payment(conn: &mut SqliteConnection, payment: &Payment) -> DbResult<()> {
    debug!(id = %payment.id, drawer_id = %payment.drawer_id, "Inserting payment");

    sqlx::query(
        r#"
        INSERT INTO payments (
            id, drawer_id, customer_id, reservation_id,
            transaction_ids, services, vouchers, discounts,
            subtotal, total, currency, buy_rate, sell_rate,
            is_finalized, received_cash, returned_change,
            created_at, finalized_at, version
        ) VALUES (
            ?1, ?2, ?3, ?4,
            ?5, ?6, ?7, ?8,
            ?9, ?10, ?11, ?12, ?13,
            ?14, ?15, ?16,
            ?17, ?18, ?19
        )
        "#,
    )
    .bind(&payment.id)
    .bind(&payment.drawer_id)
    .bind(&payment.customer_id)
    .bind(&payment.reservation_id)
    .bind(Json(&payment.transaction_ids))
    .bind(Json(&payment.services))
    .bind(Json(&payment.vouchers))
    .bind(Json(&payment.discounts))
    .bind(payment.subtotal.minor())
    .bind(payment.total.minor())
    .bind(payment.currency)
    .bind(payment.rate.buy().to_string())
    .bind(payment.rate.sell().to_string())
    .bind(payment.is_finalized)
    .bind(Json(&payment.received_cash))
    .bind(Json(&payment.returned_change))
    .bind(payment.created_at)
    .bind(payment.finalized_at)
    .bind(payment.version)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn fetch_payment(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Payment>> {
    let row: Option<PaymentRow> = sqlx::query_as("SELECT * FROM payments WHERE id = ?1")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    row.map(Payment::try_from).transpose()
}

/// Writes the transaction list, charge lists and totals of an open payment.
///
/// `payment.version` is the version that was read; on success the stored
/// version is one higher.
pub async fn update_totals(conn: &mut SqliteConnection, payment: &Payment) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE payments SET
            transaction_ids = ?3,
            services = ?4,
            vouchers = ?5,
            discounts = ?6,
            subtotal = ?7,
            total = ?8,
            version = version + 1
        WHERE id = ?1 AND version = ?2 AND is_finalized = 0
        "#,
    )
    .bind(&payment.id)
    .bind(payment.version)
    .bind(Json(&payment.transaction_ids))
    .bind(Json(&payment.services))
    .bind(Json(&payment.vouchers))
    .bind(Json(&payment.discounts))
    .bind(payment.subtotal.minor())
    .bind(payment.total.minor())
    .execute(conn)
    .await?;

    debug!(id = %payment.id, rows = result.rows_affected(), "Updated payment totals");
    expect_one_row(result, "Payment", &payment.id)
}

/// Flips the payment to finalized and stores the cash movement.
pub async fn finalize(
    conn: &mut SqliteConnection,
    payment: &Payment,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE payments SET
            is_finalized = 1,
            received_cash = ?3,
            returned_change = ?4,
            finalized_at = ?5,
            version = version + 1
        WHERE id = ?1 AND version = ?2 AND is_finalized = 0
        "#,
    )
    .bind(&payment.id)
    .bind(payment.version)
    .bind(Json(&payment.received_cash))
    .bind(Json(&payment.returned_change))
    .bind(now)
    .execute(conn)
    .await?;

    debug!(id = %payment.id, rows = result.rows_affected(), "Finalized payment");
    expect_one_row(result, "Payment", &payment.id)
}

/// Lists payments matching a validated query.
pub async fn search(conn: &mut SqliteConnection, query: &PaymentQuery) -> DbResult<Vec<Payment>> {
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM payments WHERE 1 = 1");

    if let Some(drawer_id) = &query.drawer_id {
        builder.push(" AND drawer_id = ").push_bind(drawer_id.clone());
    }
    if let Some(customer_id) = &query.customer_id {
        builder.push(" AND customer_id = ").push_bind(customer_id.clone());
    }
    if let Some(finalized) = query.is_finalized {
        builder.push(" AND is_finalized = ").push_bind(finalized);
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

    trace!(sql = builder.sql(), "Searching payments");

    let rows: Vec<PaymentRow> = builder.build_query_as().fetch_all(conn).await?;
    rows.into_iter().map(Payment::try_from).collect()
}

/// Repository for payment reads outside a unit of work.
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Payment>> {
        let mut conn = self.pool.acquire().await?;
        fetch_payment(&mut conn, id).await
    }

    pub async fn search(&self, query: &PaymentQuery) -> DbResult<Vec<Payment>> {
        let mut conn = self.pool.acquire().await?;
        search(&mut conn, query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::drawer::insert_drawer;
    use crate::repository::test_support::db;
    use kassa_core::{Amount, Drawer, ExchangeRate};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn rate() -> ExchangeRate {
        ExchangeRate::new(Decimal::from(4000), Decimal::from(4100)).unwrap()
    }

    async fn seed_drawer(conn: &mut SqliteConnection) -> Drawer {
        let drawer = Drawer {
            id: Uuid::new_v4().to_string(),
            user_id: Uuid::new_v4().to_string(),
            inventories: vec![],
            rate: rate(),
            is_open: true,
            checkpoint: vec![],
            opened_at: Utc::now(),
            closed_at: None,
            version: 0,
        };
        insert_drawer(conn, &drawer).await.unwrap();
        drawer
    }

    fn payment(drawer_id: &str) -> Payment {
        Payment {
            id: Uuid::new_v4().to_string(),
            drawer_id: drawer_id.to_string(),
            customer_id: None,
            reservation_id: None,
            transaction_ids: vec![],
            services: vec![Charge::new(
                "delivery",
                Amount::new(Money::from_cents(150), Currency::Usd),
            )],
            vouchers: vec![],
            discounts: vec![],
            subtotal: Money::zero(),
            total: Money::from_cents(150),
            currency: Currency::Usd,
            rate: rate(),
            is_finalized: false,
            received_cash: vec![],
            returned_change: vec![],
            created_at: Utc::now(),
            finalized_at: None,
            version: 0,
        }
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let db = db().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let drawer = seed_drawer(&mut conn).await;
        let mut p = payment(&drawer.id);
        insert_payment(&mut conn, &p).await.unwrap();

        p.subtotal = Money::from_cents(1000);
        update_totals(&mut conn, &p).await.unwrap();

        // Same stale version again.
        let err = update_totals(&mut conn, &p).await.unwrap_err();
        assert!(matches!(err, DbError::Conflict { .. }));

        let stored = fetch_payment(&mut conn, &p.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.subtotal, Money::from_cents(1000));
        assert_eq!(stored.services, p.services);
        assert_eq!(stored.rate, rate());
    }

    #[tokio::test]
    async fn test_finalize_only_once() {
        let db = db().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let drawer = seed_drawer(&mut conn).await;
        let p = payment(&drawer.id);
        insert_payment(&mut conn, &p).await.unwrap();

        finalize(&mut conn, &p, Utc::now()).await.unwrap();
        let mut reread = fetch_payment(&mut conn, &p.id).await.unwrap().unwrap();
        assert!(reread.is_finalized);

        assert!(finalize(&mut conn, &reread, Utc::now()).await.is_err());
        reread.total = Money::zero();
        assert!(update_totals(&mut conn, &reread).await.is_err());
    }

    #[tokio::test]
    async fn test_search_by_drawer_and_status() {
        let db = db().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let drawer = seed_drawer(&mut conn).await;
        let open = payment(&drawer.id);
        let done = payment(&drawer.id);
        insert_payment(&mut conn, &open).await.unwrap();
        insert_payment(&mut conn, &done).await.unwrap();
        finalize(&mut conn, &done, Utc::now()).await.unwrap();

        let query = PaymentQuery {
            drawer_id: Some(drawer.id.clone()),
            is_finalized: Some(false),
            ..Default::default()
        };
        let found = search(&mut conn, &query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, open.id);
    }
}
