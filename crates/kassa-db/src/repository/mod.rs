//! # Repository Module
//!
//! Database repository implementations for Kassa.
//!
//! ## Two Entry Points Per Repository
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Pooled reads                      Unit of work                        │
//! │  ────────────                      ────────────                        │
//! │  db.payments().get_by_id(id)       let mut tx = db.begin().await?;     │
//! │       │                            payment::fetch_payment(&mut tx, id) │
//! │       │ acquires a connection      drawer::update_drawer(&mut tx, ..)  │
//! │       ▼                            payment::finalize(&mut tx, ..)      │
//! │  payment::fetch_payment(conn, id)  tx.commit().await?;                 │
//! │                                                                         │
//! │  Every write lives in a free function over `&mut SqliteConnection`,    │
//! │  so several repositories compose inside one SQLite transaction.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](product::ProductRepository) - Products, stock lots, promotions
//! - [`AllocationRepository`](allocation::AllocationRepository) - Lot allocation records
//! - [`TransactionRepository`](transaction::TransactionRepository) - Order lines
//! - [`PaymentRepository`](payment::PaymentRepository) - Invoices
//! - [`DrawerRepository`](drawer::DrawerRepository) - Cash drawers
//! - [`CustomerRepository`](customer::CustomerRepository) - Customers and reservations

use std::str::FromStr;

use kassa_core::ExchangeRate;
use rust_decimal::Decimal;

use crate::error::{DbError, DbResult};

pub mod allocation;
pub mod customer;
pub mod drawer;
pub mod payment;
pub mod product;
pub mod transaction;

/// Parses a stored decimal column.
pub(crate) fn parse_decimal(column: &str, raw: &str) -> DbResult<Decimal> {
    Decimal::from_str(raw).map_err(|e| DbError::decode(column, e))
}

/// Rebuilds a rate pair from its two TEXT columns.
pub(crate) fn parse_rate(buy: &str, sell: &str) -> DbResult<ExchangeRate> {
    let buy = parse_decimal("buy_rate", buy)?;
    let sell = parse_decimal("sell_rate", sell)?;
    ExchangeRate::new(buy, sell).map_err(|e| DbError::decode("rate", e))
}

/// Maps a zero-row conditional write to a conflict.
pub(crate) fn expect_one_row(
    result: sqlx::sqlite::SqliteQueryResult,
    entity: &str,
    id: &str,
) -> DbResult<()> {
    if result.rows_affected() == 0 {
        return Err(DbError::conflict(entity, id));
    }
    Ok(())
}
