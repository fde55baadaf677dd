//! # Stock Allocator
//!
//! Takes stock from lots oldest-first and gives it back.
//!
//! ## Allocation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  allocate 5 × T-SHIRT (L, red)                                         │
//! │                                                                         │
//! │  lots (FIFO):   lot-A 2 ──┐                                            │
//! │                 lot-B 4 ──┼── plan: A×2, B×3                           │
//! │                 lot-C 9   │                                             │
//! │                           ▼                                             │
//! │  UPDATE stock_lots SET quantity = quantity - 2                          │
//! │    WHERE id = 'lot-A' AND quantity >= 2          ── 0 rows? Conflict   │
//! │  INSERT lot_allocations (lot-A, 2)                  whole attempt      │
//! │  ... same for lot-B ...                             rolls back and     │
//! │  COMMIT                                             is retried         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Less matching stock than requested fails with `InsufficientStock` before
//! any lot is touched.
//!
//! ## Release
//! Each allocation record is stamped `released_at` with a conditional update;
//! only the caller that wins the stamp restores the lot. Releasing the same
//! record twice restores the lot once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::ServiceResult;
use crate::retry::with_retry;
use crate::service::{found, Kassa};
use kassa_core::allocation::plan_allocation;
use kassa_core::validation::{validate_id, validate_quantity, validate_tag, Validator};
use kassa_core::{LotAllocation, TransactionStatus, ValidationError};
use kassa_db::repository::{allocation, product, transaction};

/// Request to reserve stock of one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocateStock {
    pub product_id: String,
    pub quantity: i64,
    #[serde(default)]
    pub option: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

impl AllocateStock {
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut v = Validator::new();
        v.check(validate_id("product_id", &self.product_id))
            .check(validate_quantity(self.quantity))
            .check(validate_tag("option", self.option.as_deref()))
            .check(validate_tag("color", self.color.as_deref()));
        v.finish()
    }
}

// =============================================================================
// Unit-of-Work Steps
// =============================================================================

/// Plans and applies an allocation on `conn`, recording one allocation per
/// lot touched.
pub(crate) async fn allocate_in(
    conn: &mut SqliteConnection,
    request: &AllocateStock,
    transaction_id: Option<&str>,
    now: DateTime<Utc>,
) -> ServiceResult<Vec<LotAllocation>> {
    found(
        product::fetch_product(conn, &request.product_id).await?,
        "Product",
        &request.product_id,
    )?;

    let lots = product::fetch_lots_for_product(conn, &request.product_id).await?;
    let plan = plan_allocation(
        &request.product_id,
        request.quantity,
        request.option.as_deref(),
        request.color.as_deref(),
        &lots,
    )?;

    let mut allocations = Vec::with_capacity(plan.len());
    for take in plan {
        product::decrement_lot(conn, &take.lot_id, take.amount).await?;

        let record = LotAllocation {
            id: Uuid::new_v4().to_string(),
            lot_id: take.lot_id,
            transaction_id: transaction_id.map(str::to_string),
            amount: take.amount,
            created_at: now,
            released_at: None,
        };
        allocation::insert_allocation(conn, &record).await?;
        allocations.push(record);
    }

    Ok(allocations)
}

/// Releases allocation records by id on `conn`; returns the units restored.
///
/// Records already released are skipped, as are records whose transaction
/// was paid: that stock has left the store.
pub(crate) async fn release_in(
    conn: &mut SqliteConnection,
    allocation_ids: &[String],
    now: DateTime<Utc>,
) -> ServiceResult<i64> {
    let mut restored = 0;

    for id in allocation_ids {
        let record = found(allocation::fetch_allocation(conn, id).await?, "Allocation", id)?;
        if record.is_released() {
            continue;
        }

        if let Some(transaction_id) = &record.transaction_id {
            let owner = transaction::fetch_transaction(conn, transaction_id).await?;
            if owner.is_some_and(|t| t.status == TransactionStatus::Completed) {
                debug!(allocation_id = %id, %transaction_id, "Skipping release of sold stock");
                continue;
            }
        }

        if allocation::mark_released(conn, &record.id, now).await? {
            product::restore_lot(conn, &record.lot_id, record.amount).await?;
            restored += record.amount;
        }
    }

    Ok(restored)
}

// =============================================================================
// Operations
// =============================================================================

impl Kassa {
    /// Reserves `quantity` units, all-or-nothing, oldest lots first.
    ///
    /// The returned records are not yet tied to a transaction; pass their ids
    /// to [`Kassa::release_stock`] to give the stock back.
    #[instrument(skip(self, request), fields(product_id = %request.product_id, quantity = request.quantity))]
    pub async fn allocate_stock(&self, request: &AllocateStock) -> ServiceResult<Vec<LotAllocation>> {
        request.validate()?;

        let allocations = with_retry(self.retry(), "allocate_stock", move || async move {
            let mut tx = self.db().begin().await?;
            let allocations = allocate_in(&mut *tx, request, None, Utc::now()).await?;
            tx.commit().await?;
            Ok(allocations)
        })
        .await?;

        info!(lots = allocations.len(), "Stock allocated");
        Ok(allocations)
    }

    /// Gives back the stock held by the given allocation records.
    ///
    /// Idempotent per record. Returns the number of units restored by this
    /// call.
    #[instrument(skip(self, allocation_ids), fields(count = allocation_ids.len()))]
    pub async fn release_stock(&self, allocation_ids: &[String]) -> ServiceResult<i64> {
        let mut v = Validator::new();
        for id in allocation_ids {
            v.check(validate_id("allocation_id", id));
        }
        v.finish()?;

        let restored = with_retry(self.retry(), "release_stock", move || async move {
            let mut tx = self.db().begin().await?;
            let restored = release_in(&mut *tx, allocation_ids, Utc::now()).await?;
            tx.commit().await?;
            Ok(restored)
        })
        .await?;

        info!(restored, "Stock released");
        Ok(restored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::testing::{kassa, seed_lot, seed_product};
    use chrono::Duration;
    use kassa_core::CoreError;

    #[tokio::test]
    async fn test_allocates_oldest_first() {
        let kassa = kassa().await;
        let product = seed_product(&kassa, 1000).await;
        let newer = seed_lot(&kassa, &product.id, 5, Utc::now() - Duration::hours(1)).await;
        let older = seed_lot(&kassa, &product.id, 2, Utc::now() - Duration::hours(2)).await;

        let request = AllocateStock {
            product_id: product.id.clone(),
            quantity: 4,
            option: None,
            color: None,
        };
        let allocations = kassa.allocate_stock(&request).await.unwrap();

        let taken: Vec<(String, i64)> = allocations
            .iter()
            .map(|a| (a.lot_id.clone(), a.amount))
            .collect();
        assert_eq!(taken, vec![(older.id.clone(), 2), (newer.id.clone(), 2)]);

        let lots = kassa.db().products().lots(&product.id).await.unwrap();
        assert_eq!(lots[0].quantity, 0);
        assert_eq!(lots[1].quantity, 3);
    }

    #[tokio::test]
    async fn test_insufficient_stock_touches_nothing() {
        let kassa = kassa().await;
        let product = seed_product(&kassa, 1000).await;
        seed_lot(&kassa, &product.id, 2, Utc::now()).await;

        let request = AllocateStock {
            product_id: product.id.clone(),
            quantity: 3,
            option: None,
            color: None,
        };
        let err = kassa.allocate_stock(&request).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::BusinessRule(CoreError::InsufficientStock { available: 2, requested: 3, .. })
        ));

        let lots = kassa.db().products().lots(&product.id).await.unwrap();
        assert_eq!(lots[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_release_restores_exactly_once() {
        let kassa = kassa().await;
        let product = seed_product(&kassa, 1000).await;
        seed_lot(&kassa, &product.id, 3, Utc::now() - Duration::hours(2)).await;
        seed_lot(&kassa, &product.id, 3, Utc::now() - Duration::hours(1)).await;

        let request = AllocateStock {
            product_id: product.id.clone(),
            quantity: 5,
            option: None,
            color: None,
        };
        let allocations = kassa.allocate_stock(&request).await.unwrap();
        let ids: Vec<String> = allocations.iter().map(|a| a.id.clone()).collect();

        assert_eq!(kassa.release_stock(&ids).await.unwrap(), 5);
        assert_eq!(kassa.release_stock(&ids).await.unwrap(), 0);

        let lots = kassa.db().products().lots(&product.id).await.unwrap();
        assert!(lots.iter().all(|l| l.quantity == 3));
    }

    #[tokio::test]
    async fn test_unknown_product_and_bad_input() {
        let kassa = kassa().await;

        let request = AllocateStock {
            product_id: Uuid::new_v4().to_string(),
            quantity: 1,
            option: None,
            color: None,
        };
        assert!(matches!(
            kassa.allocate_stock(&request).await,
            Err(ServiceError::NotFound { .. })
        ));

        let request = AllocateStock {
            product_id: "nope".into(),
            quantity: 0,
            option: Some(String::new()),
            color: None,
        };
        match kassa.allocate_stock(&request).await {
            Err(ServiceError::Validation(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected validation errors, got {other:?}"),
        }
    }
}
