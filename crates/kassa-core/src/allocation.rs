//! # Stock Allocation
//!
//! Plans how an order quantity is taken from a product's stock lots.
//!
//! Planning is pure: it reads a snapshot of the candidate lots and returns the
//! list of `(lot, amount)` takes. The db layer applies each take with a
//! conditional decrement, so a plan computed from a stale snapshot fails with
//! a conflict instead of over-depleting a lot.
//!
//! ## FIFO Walk
//! ```text
//! Order 5, lots oldest-first: [A:2] [B:1] [C:4]
//!
//!   A: take 2  (remaining 3)
//!   B: take 1  (remaining 2)
//!   C: take 2  (remaining 0)  → plan [(A,2) (B,1) (C,2)]
//!
//! Order 8 against the same lots: available 7 < 8 → InsufficientStock,
//! nothing is taken.
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::StockLot;

/// One take from one lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationTake {
    pub lot_id: String,
    pub amount: i64,
}

/// Plans an all-or-nothing FIFO allocation of `quantity` units.
///
/// `lots` may be in any order and may include lots of other products or with
/// non-matching tags; they are filtered and sorted oldest-first here.
pub fn plan_allocation(
    product_id: &str,
    quantity: i64,
    option: Option<&str>,
    color: Option<&str>,
    lots: &[StockLot],
) -> CoreResult<Vec<AllocationTake>> {
    if quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        }
        .into());
    }

    let mut candidates: Vec<&StockLot> = lots
        .iter()
        .filter(|lot| lot.product_id == product_id)
        .filter(|lot| lot.quantity > 0)
        .filter(|lot| lot.matches(option, color))
        .collect();
    candidates.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    let available: i64 = candidates.iter().map(|lot| lot.quantity).sum();
    if available < quantity {
        return Err(CoreError::InsufficientStock {
            product_id: product_id.to_string(),
            available,
            requested: quantity,
        });
    }

    let mut remaining = quantity;
    let mut plan = Vec::new();
    for lot in candidates {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(lot.quantity);
        plan.push(AllocationTake {
            lot_id: lot.id.clone(),
            amount: take,
        });
        remaining -= take;
    }

    Ok(plan)
}
