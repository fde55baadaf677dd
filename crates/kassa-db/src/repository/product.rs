//! # Product Repository
//!
//! Products, their stock lots, and their promotions.
//!
//! ## Conditional Decrement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  UPDATE stock_lots                                                      │
//! │     SET quantity = quantity - :amount                                   │
//! │   WHERE id = :lot AND quantity >= :amount                               │
//! │                                                                         │
//! │  1 row  → the take happened                                             │
//! │  0 rows → another order got there first → DbError::Conflict            │
//! │                                                                         │
//! │  Two concurrent orders can never jointly push a lot below zero.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use crate::repository::{expect_one_row, parse_decimal};
use kassa_core::pricing::{DiscountKind, Promotion};
use kassa_core::{Currency, Money, Product, StockLot};

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, FromRow)]
struct ProductRow {
    id: String,
    name: String,
    price: i64,
    currency: Currency,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            name: row.name,
            price: Money::from_minor(row.price),
            currency: row.currency,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct StockLotRow {
    id: String,
    product_id: String,
    quantity: i64,
    initial_quantity: i64,
    cost: i64,
    currency: Currency,
    option: Option<String>,
    color: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<StockLotRow> for StockLot {
    fn from(row: StockLotRow) -> Self {
        StockLot {
            id: row.id,
            product_id: row.product_id,
            quantity: row.quantity,
            initial_quantity: row.initial_quantity,
            cost: Money::from_minor(row.cost),
            currency: row.currency,
            option: row.option,
            color: row.color,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct PromotionRow {
    id: String,
    product_id: String,
    value: String,
    kind: DiscountKind,
    is_fixed: bool,
    currency: Currency,
    start_at: DateTime<Utc>,
    expire_at: DateTime<Utc>,
}

impl TryFrom<PromotionRow> for Promotion {
    type Error = crate::DbError;

    fn try_from(row: PromotionRow) -> Result<Self, Self::Error> {
        Ok(Promotion {
            value: parse_decimal("promotions.value", &row.value)?,
            id: row.id,
            product_id: row.product_id,
            kind: row.kind,
            is_fixed: row.is_fixed,
            currency: row.currency,
            start_at: row.start_at,
            expire_at: row.expire_at,
        })
    }
}

// =============================================================================
// Connection-Level Operations
// =============================================================================

pub async fn insert_product(conn: &mut SqliteConnection, product: &Product) -> DbResult<()> {
    debug!(id = %product.id, name = %product.name, "Inserting product");

    sqlx::query(
        r#"
        INSERT INTO products (id, name, price, currency, is_active, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(&product.id)
    .bind(&product.name)
    .bind(product.price.minor())
    .bind(product.currency)
    .bind(product.is_active)
    .bind(product.created_at)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn fetch_product(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Product>> {
    let row: Option<ProductRow> = sqlx::query_as("SELECT * FROM products WHERE id = ?1")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(row.map(Product::from))
}

pub async fn insert_lot(conn: &mut SqliteConnection, lot: &StockLot) -> DbResult<()> {
    debug!(id = %lot.id, product_id = %lot.product_id, quantity = lot.quantity, "Inserting stock lot");

    sqlx::query(
        r#"
        INSERT INTO stock_lots (
            id, product_id, quantity, initial_quantity,
            cost, currency, option, color, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&lot.id)
    .bind(&lot.product_id)
    .bind(lot.quantity)
    .bind(lot.initial_quantity)
    .bind(lot.cost.minor())
    .bind(lot.currency)
    .bind(&lot.option)
    .bind(&lot.color)
    .bind(lot.created_at)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn fetch_lot(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<StockLot>> {
    let row: Option<StockLotRow> = sqlx::query_as("SELECT * FROM stock_lots WHERE id = ?1")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(row.map(StockLot::from))
}

/// All lots of a product, oldest first.
pub async fn fetch_lots_for_product(
    conn: &mut SqliteConnection,
    product_id: &str,
) -> DbResult<Vec<StockLot>> {
    let rows: Vec<StockLotRow> = sqlx::query_as(
        "SELECT * FROM stock_lots WHERE product_id = ?1 ORDER BY created_at, id",
    )
    .bind(product_id)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(StockLot::from).collect())
}

/// Takes `amount` units from a lot if it still holds them.
pub async fn decrement_lot(conn: &mut SqliteConnection, lot_id: &str, amount: i64) -> DbResult<()> {
    let result = sqlx::query(
        "UPDATE stock_lots SET quantity = quantity - ?2 WHERE id = ?1 AND quantity >= ?2",
    )
    .bind(lot_id)
    .bind(amount)
    .execute(conn)
    .await?;

    debug!(lot_id, amount, rows = result.rows_affected(), "Decremented stock lot");
    expect_one_row(result, "StockLot", lot_id)
}

/// Returns `amount` units to a lot.
pub async fn restore_lot(conn: &mut SqliteConnection, lot_id: &str, amount: i64) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE stock_lots SET quantity = quantity + ?2
        WHERE id = ?1 AND quantity + ?2 <= initial_quantity
        "#,
    )
    .bind(lot_id)
    .bind(amount)
    .execute(conn)
    .await?;

    debug!(lot_id, amount, rows = result.rows_affected(), "Restored stock lot");
    expect_one_row(result, "StockLot", lot_id)
}

pub async fn insert_promotion(conn: &mut SqliteConnection, promotion: &Promotion) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO promotions (
            id, product_id, value, kind, is_fixed, currency, start_at, expire_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&promotion.id)
    .bind(&promotion.product_id)
    .bind(promotion.value.to_string())
    .bind(promotion.kind)
    .bind(promotion.is_fixed)
    .bind(promotion.currency)
    .bind(promotion.start_at)
    .bind(promotion.expire_at)
    .execute(conn)
    .await?;

    Ok(())
}

/// Promotions of a product, earliest start first.
pub async fn fetch_promotions_for_product(
    conn: &mut SqliteConnection,
    product_id: &str,
) -> DbResult<Vec<Promotion>> {
    let rows: Vec<PromotionRow> = sqlx::query_as(
        "SELECT * FROM promotions WHERE product_id = ?1 ORDER BY start_at, id",
    )
    .bind(product_id)
    .fetch_all(conn)
    .await?;
    rows.into_iter().map(Promotion::try_from).collect()
}

// =============================================================================
// Pooled Repository
// =============================================================================

/// Repository for product, lot and promotion reads outside a unit of work.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        fetch_product(&mut conn, id).await
    }

    pub async fn insert(&self, product: &Product) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        insert_product(&mut conn, product).await
    }

    pub async fn get_lot(&self, id: &str) -> DbResult<Option<StockLot>> {
        let mut conn = self.pool.acquire().await?;
        fetch_lot(&mut conn, id).await
    }

    pub async fn lots(&self, product_id: &str) -> DbResult<Vec<StockLot>> {
        let mut conn = self.pool.acquire().await?;
        fetch_lots_for_product(&mut conn, product_id).await
    }

    pub async fn insert_lot(&self, lot: &StockLot) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        insert_lot(&mut conn, lot).await
    }

    pub async fn promotions(&self, product_id: &str) -> DbResult<Vec<Promotion>> {
        let mut conn = self.pool.acquire().await?;
        fetch_promotions_for_product(&mut conn, product_id).await
    }

    pub async fn insert_promotion(&self, promotion: &Promotion) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        insert_promotion(&mut conn, promotion).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{db, minutes_ago, seed_lot, seed_product};
    use crate::DbError;
    use chrono::Duration;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_lots_come_back_oldest_first() {
        let db = db().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let product = seed_product(&mut conn, 1250).await;
        let newer = seed_lot(&mut conn, &product.id, 3, minutes_ago(1)).await;
        let older = seed_lot(&mut conn, &product.id, 2, minutes_ago(10)).await;

        let lots = fetch_lots_for_product(&mut conn, &product.id).await.unwrap();
        let ids: Vec<&str> = lots.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec![older.id.as_str(), newer.id.as_str()]);
        let stored = fetch_product(&mut conn, &product.id).await.unwrap().unwrap();
        assert_eq!(stored.price, product.price);
        assert_eq!(stored.currency, Currency::Usd);
    }

    #[tokio::test]
    async fn test_decrement_is_conditional() {
        let db = db().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let product = seed_product(&mut conn, 1250).await;
        let lot = seed_lot(&mut conn, &product.id, 3, minutes_ago(1)).await;

        decrement_lot(&mut conn, &lot.id, 2).await.unwrap();
        let err = decrement_lot(&mut conn, &lot.id, 2).await.unwrap_err();
        assert!(matches!(err, DbError::Conflict { .. }));

        let lot = fetch_lot(&mut conn, &lot.id).await.unwrap().unwrap();
        assert_eq!(lot.quantity, 1);
    }

    #[tokio::test]
    async fn test_restore_never_exceeds_initial() {
        let db = db().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let product = seed_product(&mut conn, 1250).await;
        let lot = seed_lot(&mut conn, &product.id, 3, minutes_ago(1)).await;

        decrement_lot(&mut conn, &lot.id, 2).await.unwrap();
        restore_lot(&mut conn, &lot.id, 2).await.unwrap();
        assert!(restore_lot(&mut conn, &lot.id, 1).await.is_err());

        let lot = fetch_lot(&mut conn, &lot.id).await.unwrap().unwrap();
        assert_eq!(lot.quantity, 3);
    }

    #[tokio::test]
    async fn test_promotion_round_trips_decimal() {
        let db = db().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let product = seed_product(&mut conn, 1250).await;

        let promotion = Promotion {
            id: uuid::Uuid::new_v4().to_string(),
            product_id: product.id.clone(),
            value: Decimal::new(125, 1),
            kind: DiscountKind::Percentage,
            is_fixed: false,
            currency: Currency::Usd,
            start_at: minutes_ago(60),
            expire_at: minutes_ago(60) + Duration::days(7),
        };
        insert_promotion(&mut conn, &promotion).await.unwrap();

        let stored = fetch_promotions_for_product(&mut conn, &product.id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].value, Decimal::new(125, 1));
        assert_eq!(stored[0].kind, DiscountKind::Percentage);
    }
}
