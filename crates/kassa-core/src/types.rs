//! # Domain Types
//!
//! Core domain entities of the order-to-cash pipeline.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌───────────────┐ 1..n ┌───────────────┐       ┌───────────────────┐  │
//! │  │   Product     │─────►│   StockLot    │◄──────│  LotAllocation    │  │
//! │  │  price        │      │  quantity     │       │  amount, released │  │
//! │  └───────────────┘      └───────────────┘       └─────────┬─────────┘  │
//! │                                                           │ owned by   │
//! │  ┌───────────────┐ 1..n ┌───────────────┐                 │            │
//! │  │   Payment     │─────►│  Transaction  │◄────────────────┘            │
//! │  │  totals, rate │      │  total, disc. │                              │
//! │  └──────┬────────┘      └───────────────┘                              │
//! │         │ owned by                                                      │
//! │  ┌──────▼────────┐      ┌───────────────┐       ┌───────────────────┐  │
//! │  │    Drawer     │      │   Customer    │       │   Reservation     │  │
//! │  │  inventories  │      │  loyalty pts  │       │  pending/completed│  │
//! │  └───────────────┘      └───────────────┘       └───────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every entity uses a UUID v4 string as its identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::currency::{Amount, Currency, ExchangeRate};
use crate::drawer::{DenominationCount, DenominationInventory};
use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::payment::Charge;
use crate::pricing::Discount;

// =============================================================================
// Session
// =============================================================================

/// The authenticated actor behind an operation.
///
/// Passed explicitly into every operation instead of being read from
/// ambient request state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Acting staff user.
    pub user_id: String,

    /// The user's currently open drawer, if any.
    pub open_drawer_id: Option<String>,
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Self {
        Session {
            user_id: user_id.into(),
            open_drawer_id: None,
        }
    }

    pub fn with_drawer(mut self, drawer_id: impl Into<String>) -> Self {
        self.open_drawer_id = Some(drawer_id.into());
        self
    }

    /// Returns the open drawer id or `NoOpenDrawer`.
    pub fn require_drawer(&self) -> CoreResult<&str> {
        self.open_drawer_id
            .as_deref()
            .ok_or_else(|| CoreError::NoOpenDrawer(self.user_id.clone()))
    }
}

// =============================================================================
// Product & Stock
// =============================================================================

/// A product available for sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    /// Unit price in minor units of `currency`.
    pub price: Money,
    pub currency: Currency,
    /// Soft delete flag from the catalog.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Unit price tagged with its currency.
    pub fn unit_price(&self) -> Amount {
        Amount::new(self.price, self.currency)
    }
}

/// A discrete batch of stock for a product/option/color combination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLot {
    pub id: String,
    pub product_id: String,
    /// Quantity on hand. Never negative.
    pub quantity: i64,
    /// Quantity the lot was received with.
    pub initial_quantity: i64,
    /// Unit cost in minor units of `currency`.
    pub cost: Money,
    pub currency: Currency,
    pub option: Option<String>,
    pub color: Option<String>,
    /// FIFO key: older lots are depleted first.
    pub created_at: DateTime<Utc>,
}

impl StockLot {
    /// Checks the lot against optional option/color filters.
    pub fn matches(&self, option: Option<&str>, color: Option<&str>) -> bool {
        let option_ok = option.map_or(true, |o| self.option.as_deref() == Some(o));
        let color_ok = color.map_or(true, |c| self.color.as_deref() == Some(c));
        option_ok && color_ok
    }
}

/// A persisted record of stock taken from a lot.
///
/// Owned by its transaction until released or completed. Release is recorded
/// by stamping `released_at`, which makes a second release a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotAllocation {
    pub id: String,
    pub lot_id: String,
    pub transaction_id: Option<String>,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
}

impl LotAllocation {
    pub fn is_released(&self) -> bool {
        self.released_at.is_some()
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// Completion status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Ordered, stock reserved, not yet paid.
    #[default]
    Pending,
    /// Paid at checkout.
    Completed,
}

/// One order line: a product, a quantity and the stock reserved for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub product_id: String,
    pub payment_id: Option<String>,
    pub quantity: i64,
    /// Unit price snapshot.
    pub unit_price: Money,
    /// unit_price × quantity, before discount.
    pub base_total: Money,
    /// Payable total after discount, never negative.
    pub total: Money,
    pub currency: Currency,
    /// Discount snapshot taken at order time.
    pub discount: Option<Discount>,
    pub status: TransactionStatus,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn total_amount(&self) -> Amount {
        Amount::new(self.total, self.currency)
    }

    /// Pending and not yet reclaimed by the sweeper.
    pub fn is_open(&self) -> bool {
        self.status == TransactionStatus::Pending && !self.is_deleted
    }
}

// =============================================================================
// Payment
// =============================================================================

/// Cash handed over by the customer, or returned as change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashTender {
    pub currency: Currency,
    pub denomination: Money,
    pub count: i64,
}

impl CashTender {
    /// Face value of the line; `AmountOutOfRange` when it does not fit.
    pub fn value(&self) -> CoreResult<Amount> {
        self.denomination
            .multiply_quantity(self.count)
            .map(|value| Amount::new(value, self.currency))
            .ok_or(CoreError::AmountOutOfRange("tender value"))
    }
}

/// An invoice aggregating transactions, fees and deductions.
///
/// Once `is_finalized` is true the totals are immutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub drawer_id: String,
    pub customer_id: Option<String>,
    pub reservation_id: Option<String>,
    /// Ordered transaction references.
    pub transaction_ids: Vec<String>,
    pub services: Vec<Charge>,
    pub vouchers: Vec<Charge>,
    pub discounts: Vec<Charge>,
    pub subtotal: Money,
    pub total: Money,
    /// Display currency of subtotal and total.
    pub currency: Currency,
    /// Rate snapshot at creation time.
    pub rate: ExchangeRate,
    pub is_finalized: bool,
    pub received_cash: Vec<CashTender>,
    pub returned_change: Vec<CashTender>,
    pub created_at: DateTime<Utc>,
    pub finalized_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency version.
    pub version: i64,
}

impl Payment {
    pub fn total_amount(&self) -> Amount {
        Amount::new(self.total, self.currency)
    }

    pub fn subtotal_amount(&self) -> Amount {
        Amount::new(self.subtotal, self.currency)
    }

    /// Rejects mutation of a finalized payment.
    pub fn ensure_open(&self) -> CoreResult<()> {
        if self.is_finalized {
            return Err(CoreError::PaymentFinalized(self.id.clone()));
        }
        Ok(())
    }
}

// =============================================================================
// Drawer
// =============================================================================

/// A cash-till session opened by a staff user for a shift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Drawer {
    pub id: String,
    pub user_id: String,
    /// One inventory per currency held.
    pub inventories: Vec<DenominationInventory>,
    pub rate: ExchangeRate,
    pub is_open: bool,
    /// Per-currency sum recorded with the last inventory write.
    pub checkpoint: Vec<Amount>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl Drawer {
    /// Inventory for a currency, if held.
    pub fn inventory(&self, currency: Currency) -> Option<&DenominationInventory> {
        self.inventories.iter().find(|i| i.currency == currency)
    }

    /// Replaces (or adds) the inventory for its currency.
    pub fn set_inventory(&mut self, inventory: DenominationInventory) {
        match self
            .inventories
            .iter_mut()
            .find(|i| i.currency == inventory.currency)
        {
            Some(slot) => *slot = inventory,
            None => self.inventories.push(inventory),
        }
    }

    /// Per-currency sums of the current inventories.
    pub fn computed_sums(&self) -> Vec<Amount> {
        self.inventories.iter().map(|i| i.total()).collect()
    }

    /// Records the current sums as the settlement checkpoint.
    pub fn record_checkpoint(&mut self) {
        self.checkpoint = self.computed_sums();
    }

    /// Fails when the inventory drifted from the last checkpoint.
    pub fn verify_checkpoint(&self) -> CoreResult<()> {
        let sums = self.computed_sums();
        let matches = sums.len() == self.checkpoint.len()
            && sums.iter().all(|s| self.checkpoint.contains(s));
        if !matches {
            return Err(CoreError::CheckpointMismatch {
                drawer_id: self.id.clone(),
            });
        }
        Ok(())
    }

    /// Rejects mutation of a closed drawer.
    pub fn ensure_open(&self) -> CoreResult<()> {
        if !self.is_open {
            return Err(CoreError::DrawerClosed(self.id.clone()));
        }
        Ok(())
    }

    /// Adds received notes and coins to the matching inventories.
    ///
    /// On `AmountOutOfRange` the drawer may be partly updated; callers work
    /// on a copy.
    pub fn receive(&mut self, tendered: &[CashTender]) -> CoreResult<()> {
        for cash in tendered {
            let index = match self
                .inventories
                .iter()
                .position(|i| i.currency == cash.currency)
            {
                Some(index) => index,
                None => {
                    self.inventories
                        .push(DenominationInventory::empty(cash.currency));
                    self.inventories.len() - 1
                }
            };
            let inventory = &mut self.inventories[index];
            inventory
                .count_of(cash.denomination)
                .checked_add(cash.count)
                .ok_or(CoreError::AmountOutOfRange("drawer inventory"))?;
            inventory.add(cash.denomination, cash.count);
        }
        Ok(())
    }
}

/// Converts change-making output into tender records.
pub fn tenders_from(currency: Currency, counts: &[DenominationCount]) -> Vec<CashTender> {
    counts
        .iter()
        .map(|c| CashTender {
            currency,
            denomination: c.value,
            count: c.count,
        })
        .collect()
}

// =============================================================================
// Customer & Reservation
// =============================================================================

/// A customer with a loyalty balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub name: String,
    /// Incremented only by checkout.
    pub loyalty_points: i64,
    pub created_at: DateTime<Utc>,
}

/// Status of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    #[default]
    Pending,
    Completed,
    Cancelled,
}

/// A booking that a payment can settle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: String,
    pub customer_id: Option<String>,
    pub status: ReservationStatus,
    pub reserved_for: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn drawer() -> Drawer {
        let mut usd = DenominationInventory::empty(Currency::Usd);
        usd.add(Money::from_major(1, 2), 10);
        usd.add(Money::from_major(5, 2), 2);
        let mut drawer = Drawer {
            id: "d-1".into(),
            user_id: "u-1".into(),
            inventories: vec![usd],
            rate: ExchangeRate::new(dec!(4000), dec!(4100)).unwrap(),
            is_open: true,
            checkpoint: vec![],
            opened_at: Utc::now(),
            closed_at: None,
            version: 0,
        };
        drawer.record_checkpoint();
        drawer
    }

    #[test]
    fn test_lot_filters() {
        let lot = StockLot {
            id: "l".into(),
            product_id: "p".into(),
            quantity: 3,
            initial_quantity: 3,
            cost: Money::zero(),
            currency: Currency::Usd,
            option: Some("L".into()),
            color: Some("red".into()),
            created_at: Utc::now(),
        };
        assert!(lot.matches(None, None));
        assert!(lot.matches(Some("L"), None));
        assert!(lot.matches(Some("L"), Some("red")));
        assert!(!lot.matches(Some("M"), Some("red")));
        assert!(!lot.matches(None, Some("blue")));
    }

    #[test]
    fn test_session_requires_drawer() {
        assert!(matches!(
            Session::new("u").require_drawer(),
            Err(CoreError::NoOpenDrawer(_))
        ));
        assert_eq!(Session::new("u").with_drawer("d").require_drawer().unwrap(), "d");
    }

    #[test]
    fn test_checkpoint_detects_drift() {
        let mut drawer = drawer();
        assert!(drawer.verify_checkpoint().is_ok());

        drawer.inventories[0].add(Money::from_major(1, 2), 1);
        assert!(matches!(
            drawer.verify_checkpoint(),
            Err(CoreError::CheckpointMismatch { .. })
        ));

        drawer.record_checkpoint();
        assert!(drawer.verify_checkpoint().is_ok());
    }

    #[test]
    fn test_receive_creates_missing_inventory() {
        let mut drawer = drawer();
        drawer.receive(&[
            CashTender {
                currency: Currency::Khr,
                denomination: Money::from_minor(5000),
                count: 2,
            },
            CashTender {
                currency: Currency::Usd,
                denomination: Money::from_major(5, 2),
                count: 1,
            },
        ])
        .unwrap();

        let khr = drawer.inventory(Currency::Khr).unwrap();
        assert_eq!(khr.total().value.minor(), 10_000);
        let usd = drawer.inventory(Currency::Usd).unwrap();
        assert_eq!(usd.total().value.minor(), 2500);
    }

    #[test]
    fn test_tender_value_overflow_is_an_error() {
        let tender = CashTender {
            currency: Currency::Usd,
            denomination: Money::from_cents(10_000),
            count: i64::MAX / 2,
        };
        assert!(matches!(tender.value(), Err(CoreError::AmountOutOfRange(_))));

        let mut drawer = drawer();
        let one = Money::from_major(1, 2);
        let held = drawer.inventories[0].count_of(one);
        let err = drawer
            .receive(&[CashTender {
                currency: Currency::Usd,
                denomination: one,
                count: i64::MAX,
            }])
            .unwrap_err();
        assert!(matches!(err, CoreError::AmountOutOfRange("drawer inventory")));
        assert!(held > 0);
    }
}
