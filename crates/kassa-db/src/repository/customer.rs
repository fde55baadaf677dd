//! # Customer Repository
//!
//! Customers (loyalty balance) and reservations. Checkout is the only
//! writer of loyalty points and of reservation completion.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use kassa_core::{Customer, Reservation, ReservationStatus};

#[derive(Debug, FromRow)]
struct CustomerRow {
    id: String,
    name: String,
    loyalty_points: i64,
    created_at: DateTime<Utc>,
}

impl From<CustomerRow> for Customer {
    fn from(row: CustomerRow) -> Self {
        Customer {
            id: row.id,
            name: row.name,
            loyalty_points: row.loyalty_points,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct ReservationRow {
    id: String,
    customer_id: Option<String>,
    status: ReservationStatus,
    reserved_for: DateTime<Utc>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl From<ReservationRow> for Reservation {
    fn from(row: ReservationRow) -> Self {
        Reservation {
            id: row.id,
            customer_id: row.customer_id,
            status: row.status,
            reserved_for: row.reserved_for,
            created_at: row.created_at,
            completed_at: row.completed_at,
        }
    }
}

// =============================================================================
// Customers
// =============================================================================

pub async fn insert_customer(conn: &mut SqliteConnection, customer: &Customer) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO customers (id, name, loyalty_points, created_at) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(&customer.id)
    .bind(&customer.name)
    .bind(customer.loyalty_points)
    .bind(customer.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fetch_customer(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Customer>> {
    let row: Option<CustomerRow> = sqlx::query_as("SELECT * FROM customers WHERE id = ?1")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(row.map(Customer::from))
}

/// Adds loyalty points in place.
pub async fn add_loyalty_points(
    conn: &mut SqliteConnection,
    id: &str,
    points: i64,
) -> DbResult<()> {
    let result =
        sqlx::query("UPDATE customers SET loyalty_points = loyalty_points + ?2 WHERE id = ?1")
            .bind(id)
            .bind(points)
            .execute(conn)
            .await?;

    debug!(id, points, "Accrued loyalty points");
    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Customer", id));
    }
    Ok(())
}

// =============================================================================
// Reservations
// =============================================================================

pub async fn insert_reservation(
    conn: &mut SqliteConnection,
    reservation: &Reservation,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO reservations (id, customer_id, status, reserved_for, created_at, completed_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(&reservation.id)
    .bind(&reservation.customer_id)
    .bind(reservation.status)
    .bind(reservation.reserved_for)
    .bind(reservation.created_at)
    .bind(reservation.completed_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fetch_reservation(
    conn: &mut SqliteConnection,
    id: &str,
) -> DbResult<Option<Reservation>> {
    let row: Option<ReservationRow> = sqlx::query_as("SELECT * FROM reservations WHERE id = ?1")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(row.map(Reservation::from))
}

/// Marks a pending reservation completed. Returns `false` if it was not
/// pending.
pub async fn complete_reservation(
    conn: &mut SqliteConnection,
    id: &str,
    now: DateTime<Utc>,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE reservations SET status = 'completed', completed_at = ?2
        WHERE id = ?1 AND status = 'pending'
        "#,
    )
    .bind(id)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Repository for customer and reservation access outside a unit of work.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Customer>> {
        let mut conn = self.pool.acquire().await?;
        fetch_customer(&mut conn, id).await
    }

    pub async fn insert(&self, customer: &Customer) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        insert_customer(&mut conn, customer).await
    }

    pub async fn get_reservation(&self, id: &str) -> DbResult<Option<Reservation>> {
        let mut conn = self.pool.acquire().await?;
        fetch_reservation(&mut conn, id).await
    }

    pub async fn insert_reservation(&self, reservation: &Reservation) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        insert_reservation(&mut conn, reservation).await
    }
}
