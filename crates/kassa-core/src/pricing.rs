//! # Pricing Engine
//!
//! Computes a transaction's payable total from its base total and an optional
//! discount.
//!
//! ## Discount Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  base total (unit price × quantity)                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  discount?  ── none ──────────────────────────► base total             │
//! │       │                                                                 │
//! │       ├── percentage v ─► base × (1 − v/100)                           │
//! │       │                                                                 │
//! │       └── fixed v ──────► normalize v into the base's currency         │
//! │                           (KHR→USD ÷ buy, USD→KHR × sell)              │
//! │                           then base − v                                 │
//! │                                   │                                     │
//! │                                   ▼                                     │
//! │                        clamp at 0, round half to even                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::currency::{decimal_to_minor, Amount, Currency, ExchangeRate};
use crate::error::{CoreError, CoreResult};
use crate::money::Money;

// =============================================================================
// Discount
// =============================================================================

/// How a discount value is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    /// `value` is a percentage of the base total (0..=100).
    Percentage,
    /// `value` is an amount in major units of the discount's currency.
    Fixed,
}

/// A discount snapshot, stored on the transaction it was applied to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discount {
    pub value: Decimal,
    pub kind: DiscountKind,
    /// Keyed in manually at the counter; never replaced by a promotion.
    pub is_fixed: bool,
    /// Currency of `value` for fixed discounts. Ignored for percentages.
    pub currency: Currency,
}

impl Discount {
    /// A percentage discount, e.g. `percentage(10)` for 10% off.
    pub fn percentage(value: Decimal) -> Self {
        Discount {
            value,
            kind: DiscountKind::Percentage,
            is_fixed: false,
            currency: Currency::BASE,
        }
    }

    /// A fixed-amount discount in major units of `currency`.
    pub fn fixed(value: Decimal, currency: Currency) -> Self {
        Discount {
            value,
            kind: DiscountKind::Fixed,
            is_fixed: false,
            currency,
        }
    }

    /// Marks the discount as manually keyed.
    pub fn manual(mut self) -> Self {
        self.is_fixed = true;
        self
    }
}

// =============================================================================
// Promotion
// =============================================================================

/// A time-boxed promotion on a product.
///
/// Read-only input to pricing; catalog management owns its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    pub id: String,
    pub product_id: String,
    pub value: Decimal,
    pub kind: DiscountKind,
    pub is_fixed: bool,
    pub currency: Currency,
    /// Inclusive start of the validity window.
    pub start_at: DateTime<Utc>,
    /// Exclusive end of the validity window.
    pub expire_at: DateTime<Utc>,
}

impl Promotion {
    /// True when `at` falls inside `[start_at, expire_at)`.
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.start_at <= at && at < self.expire_at
    }

    /// The discount snapshot this promotion yields.
    pub fn to_discount(&self) -> Discount {
        Discount {
            value: self.value,
            kind: self.kind,
            is_fixed: self.is_fixed,
            currency: self.currency,
        }
    }
}

/// Picks the discount for a new order line.
///
/// A manual discount always wins. Otherwise the first promotion active at
/// `at` applies.
pub fn choose_discount(
    manual: Option<Discount>,
    promotions: &[Promotion],
    at: DateTime<Utc>,
) -> Option<Discount> {
    if let Some(discount) = manual {
        return Some(discount.manual());
    }
    promotions
        .iter()
        .find(|p| p.is_active_at(at))
        .map(Promotion::to_discount)
}

// =============================================================================
// Transaction Total
// =============================================================================

/// Computes the payable total of one order line.
///
/// The result is in `base.currency` and never negative.
///
/// ## Errors
/// - `AmountOutOfRange` when normalizing a fixed discount overflows
///
/// ## Example
/// ```rust
/// use kassa_core::currency::{Amount, Currency, ExchangeRate};
/// use kassa_core::money::Money;
/// use kassa_core::pricing::{compute_transaction_total, Discount};
/// use rust_decimal::Decimal;
///
/// let rate = ExchangeRate::new(Decimal::from(4000), Decimal::from(4100)).unwrap();
/// let base = Amount::new(Money::from_cents(10000), Currency::Usd);
///
/// let five_off = Discount::fixed(Decimal::from(5), Currency::Usd);
/// let total = compute_transaction_total(base, Some(&five_off), &rate).unwrap();
/// assert_eq!(total.value.minor(), 9500);
/// ```
pub fn compute_transaction_total(
    base: Amount,
    discount: Option<&Discount>,
    rate: &ExchangeRate,
) -> CoreResult<Amount> {
    let Some(discount) = discount else {
        return Ok(base);
    };

    let exponent = base.currency.minor_exponent();
    let base_major = Decimal::new(base.value.minor(), exponent);

    let discounted = match discount.kind {
        DiscountKind::Percentage => {
            let keep = Decimal::ONE - discount.value / Decimal::ONE_HUNDRED;
            base_major.checked_mul(keep)
        }
        DiscountKind::Fixed => rate
            .convert_major(discount.value, discount.currency, base.currency)
            .and_then(|off| base_major.checked_sub(off)),
    }
    .ok_or(CoreError::AmountOutOfRange("transaction total"))?;

    if discounted <= Decimal::ZERO {
        return Ok(Amount::zero(base.currency));
    }
    let value: Money = decimal_to_minor(discounted, exponent)
        .ok_or(CoreError::AmountOutOfRange("transaction total"))?;
    Ok(Amount::new(value, base.currency))
}

// =============================================================================
// Unit Tests
// =============================================================================
