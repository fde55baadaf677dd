//! # Drawer Repository
//!
//! Cash drawers: denomination inventories, rate pair, open/closed state.
//!
//! ## Single Writer Per Drawer
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  checkout A reads drawer v7          checkout B reads drawer v7        │
//! │        │                                    │                          │
//! │        ▼                                    ▼                          │
//! │  UPDATE ... WHERE version = 7  ✓      UPDATE ... WHERE version = 7  ✗  │
//! │  (now v8)                             0 rows → Conflict → re-read v8   │
//! │                                                                         │
//! │  Two settlements never interleave their inventory updates.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The one-open-drawer-per-user rule is a partial unique index; opening a
//! second drawer surfaces as `DbError::UniqueViolation`.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::{expect_one_row, parse_rate};
use kassa_core::drawer::DenominationInventory;
use kassa_core::{Amount, Drawer};

#[derive(Debug, FromRow)]
struct DrawerRow {
    id: String,
    user_id: String,
    inventories: Json<Vec<DenominationInventory>>,
    buy_rate: String,
    sell_rate: String,
    is_open: bool,
    checkpoint: Json<Vec<Amount>>,
    opened_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    version: i64,
}

impl TryFrom<DrawerRow> for Drawer {
    type Error = DbError;

    fn try_from(row: DrawerRow) -> Result<Self, Self::Error> {
        Ok(Drawer {
            rate: parse_rate(&row.buy_rate, &row.sell_rate)?,
            id: row.id,
            user_id: row.user_id,
            inventories: row.inventories.0,
            is_open: row.is_open,
            checkpoint: row.checkpoint.0,
            opened_at: row.opened_at,
            closed_at: row.closed_at,
            version: row.version,
        })
    }
}

pub async fn insert_drawer(conn: &mut SqliteConnection, drawer: &Drawer) -> DbResult<()> {
    debug!(id = %drawer.id, user_id = %drawer.user_id, "Inserting drawer");

    sqlx::query(
        r#"
        INSERT INTO drawers (
            id, user_id, inventories, buy_rate, sell_rate,
            is_open, checkpoint, opened_at, closed_at, version
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&drawer.id)
    .bind(&drawer.user_id)
    .bind(Json(&drawer.inventories))
    .bind(drawer.rate.buy().to_string())
    .bind(drawer.rate.sell().to_string())
    .bind(drawer.is_open)
    .bind(Json(&drawer.checkpoint))
    .bind(drawer.opened_at)
    .bind(drawer.closed_at)
    .bind(drawer.version)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn fetch_drawer(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Drawer>> {
    let row: Option<DrawerRow> = sqlx::query_as("SELECT * FROM drawers WHERE id = ?1")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    row.map(Drawer::try_from).transpose()
}

/// The user's open drawer, if any.
pub async fn fetch_open_for_user(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> DbResult<Option<Drawer>> {
    let row: Option<DrawerRow> =
        sqlx::query_as("SELECT * FROM drawers WHERE user_id = ?1 AND is_open = 1")
            .bind(user_id)
            .fetch_optional(conn)
            .await?;
    row.map(Drawer::try_from).transpose()
}

/// Writes inventories, rate and checkpoint of an open drawer.
///
/// `drawer.version` is the version that was read.
pub async fn update_drawer(conn: &mut SqliteConnection, drawer: &Drawer) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE drawers SET
            inventories = ?3,
            buy_rate = ?4,
            sell_rate = ?5,
            checkpoint = ?6,
            version = version + 1
        WHERE id = ?1 AND version = ?2 AND is_open = 1
        "#,
    )
    .bind(&drawer.id)
    .bind(drawer.version)
    .bind(Json(&drawer.inventories))
    .bind(drawer.rate.buy().to_string())
    .bind(drawer.rate.sell().to_string())
    .bind(Json(&drawer.checkpoint))
    .execute(conn)
    .await?;

    debug!(id = %drawer.id, rows = result.rows_affected(), "Updated drawer");
    expect_one_row(result, "Drawer", &drawer.id)
}

/// Closes an open drawer, detaching it from its user.
pub async fn close_drawer(
    conn: &mut SqliteConnection,
    drawer: &Drawer,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE drawers SET is_open = 0, closed_at = ?3, version = version + 1
        WHERE id = ?1 AND version = ?2 AND is_open = 1
        "#,
    )
    .bind(&drawer.id)
    .bind(drawer.version)
    .bind(now)
    .execute(conn)
    .await?;

    debug!(id = %drawer.id, rows = result.rows_affected(), "Closed drawer");
    expect_one_row(result, "Drawer", &drawer.id)
}

/// Repository for drawer reads outside a unit of work.
#[derive(Debug, Clone)]
pub struct DrawerRepository {
    pool: SqlitePool,
}

impl DrawerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        DrawerRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Drawer>> {
        let mut conn = self.pool.acquire().await?;
        fetch_drawer(&mut conn, id).await
    }

    pub async fn open_for_user(&self, user_id: &str) -> DbResult<Option<Drawer>> {
        let mut conn = self.pool.acquire().await?;
        fetch_open_for_user(&mut conn, user_id).await
    }
}
