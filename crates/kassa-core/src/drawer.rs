//! # Cash Drawer Ledger
//!
//! Denomination inventories and change-making.
//!
//! ## Change-Making
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  owe 27.00 USD, inventory {20:1, 10:0, 5:3, 1:4}                        │
//! │                                                                         │
//! │   20 × 1  → remaining  7.00                                             │
//! │   10 × 0  → (none left)                                                 │
//! │    5 × 1  → remaining  2.00                                             │
//! │    1 × 2  → remaining  0.00   ✓ returned {20:1, 5:1, 1:2}               │
//! │                                                                         │
//! │  A remainder left after the smallest denomination fails the whole      │
//! │  call with InsufficientChange; the inventory is not touched.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The walk is greedy, largest denomination first. It does not backtrack, so
//! an inventory that could pay exactly through a different combination may
//! still be rejected; the result is deterministic for a given inventory.

use serde::{Deserialize, Serialize};

use crate::currency::{Amount, Currency, ExchangeRate};
use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{tenders_from, CashTender, Drawer};

// =============================================================================
// Inventory
// =============================================================================

/// Units held of one note or coin value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenominationCount {
    /// Face value in minor units.
    pub value: Money,
    pub count: i64,
}

impl DenominationCount {
    pub fn new(value: Money, count: i64) -> Self {
        DenominationCount { value, count }
    }
}

/// The notes and coins a drawer holds in one currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenominationInventory {
    pub currency: Currency,
    pub denominations: Vec<DenominationCount>,
}

impl DenominationInventory {
    pub fn empty(currency: Currency) -> Self {
        DenominationInventory {
            currency,
            denominations: Vec::new(),
        }
    }

    pub fn new(currency: Currency, denominations: Vec<DenominationCount>) -> Self {
        DenominationInventory {
            currency,
            denominations,
        }
    }

    /// Sum of value × count.
    pub fn total(&self) -> Amount {
        let value = self
            .denominations
            .iter()
            .map(|d| d.value * d.count)
            .sum();
        Amount::new(value, self.currency)
    }

    /// Units held of `value`, zero when absent.
    pub fn count_of(&self, value: Money) -> i64 {
        self.denominations
            .iter()
            .find(|d| d.value == value)
            .map_or(0, |d| d.count)
    }

    /// Adds units of a denomination, creating the entry if missing.
    pub fn add(&mut self, value: Money, count: i64) {
        match self.denominations.iter_mut().find(|d| d.value == value) {
            Some(d) => d.count += count,
            None => self.denominations.push(DenominationCount::new(value, count)),
        }
    }
}

// =============================================================================
// Change-Making
// =============================================================================

/// Outcome of a successful [`change_for`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeResult {
    /// Inventory after the returned denominations were removed.
    pub inventory: DenominationInventory,
    /// Denominations handed back, largest first.
    pub returned: Vec<DenominationCount>,
}

/// Pays `owe` out of `inventory`, all-or-nothing.
///
/// When `owe` is in another currency than the inventory it is converted with
/// `rate` first.
///
/// ## Example
/// ```rust
/// use kassa_core::currency::{Amount, Currency, ExchangeRate};
/// use kassa_core::drawer::{change_for, DenominationCount, DenominationInventory};
/// use kassa_core::money::Money;
/// use rust_decimal::Decimal;
///
/// let rate = ExchangeRate::new(Decimal::from(4000), Decimal::from(4100)).unwrap();
/// let inventory = DenominationInventory::new(
///     Currency::Usd,
///     vec![
///         DenominationCount::new(Money::from_cents(500), 2),
///         DenominationCount::new(Money::from_cents(100), 5),
///     ],
/// );
///
/// let owe = Amount::new(Money::from_cents(700), Currency::Usd);
/// let change = change_for(owe, &inventory, &rate).unwrap();
/// assert_eq!(change.inventory.count_of(Money::from_cents(500)), 1);
/// assert_eq!(change.inventory.count_of(Money::from_cents(100)), 3);
/// ```
pub fn change_for(
    owe: Amount,
    inventory: &DenominationInventory,
    rate: &ExchangeRate,
) -> CoreResult<ChangeResult> {
    let owed = owe.convert_to(inventory.currency, rate);

    let mut ordered: Vec<DenominationCount> = inventory
        .denominations
        .iter()
        .copied()
        .filter(|d| d.value.is_positive())
        .collect();
    ordered.sort_by(|a, b| b.value.cmp(&a.value));

    let mut remaining = owed.value;
    let mut returned = Vec::new();
    let mut updated = inventory.clone();

    for denomination in ordered {
        if !remaining.is_positive() {
            break;
        }
        let wanted = remaining.minor() / denomination.value.minor();
        let taken = wanted.min(denomination.count.max(0));
        if taken == 0 {
            continue;
        }
        remaining -= denomination.value * taken;
        updated.add(denomination.value, -taken);
        returned.push(DenominationCount::new(denomination.value, taken));
    }

    if !remaining.is_zero() {
        return Err(CoreError::InsufficientChange {
            currency: inventory.currency,
            owed,
            remaining: Amount::new(remaining, inventory.currency),
        });
    }

    Ok(ChangeResult {
        inventory: updated,
        returned,
    })
}

// =============================================================================
// Settlement
// =============================================================================

/// Outcome of settling a cash payment against a drawer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub drawer: Drawer,
    pub returned: Vec<CashTender>,
}

/// Sum of the tender lines, converted into `currency`.
///
/// ## Errors
/// - `AmountOutOfRange` when a line or the sum does not fit in `Money`
pub fn tendered_value(
    received: &[CashTender],
    currency: Currency,
    rate: &ExchangeRate,
) -> CoreResult<Money> {
    received.iter().try_fold(Money::zero(), |sum, cash| {
        let value = cash.value()?.checked_convert_to(currency, rate)?.value;
        sum.checked_add(value)
            .ok_or(CoreError::AmountOutOfRange("tender value"))
    })
}

/// Rejects a tender that, less the change handed back, is worth less than
/// `total`. Both sides are compared in the currency of `change`.
///
/// ## Errors
/// - `TenderShort` when the cash kept does not cover `total`
/// - `AmountOutOfRange` when an amount cannot be represented
pub fn ensure_tender_covers(
    total: Amount,
    received: &[CashTender],
    change: Amount,
    rate: &ExchangeRate,
) -> CoreResult<()> {
    let tendered = tendered_value(received, change.currency, rate)?;
    let due = total.checked_convert_to(change.currency, rate)?;
    let kept = tendered
        .checked_sub(change.value)
        .ok_or(CoreError::AmountOutOfRange("tender value"))?;
    if kept < due.value {
        return Err(CoreError::TenderShort {
            total,
            tendered: Amount::new(tendered, change.currency),
        });
    }
    Ok(())
}

/// Takes the customer's cash into the drawer and pays `change` back out of
/// the `pay_from` inventory.
///
/// Works on a copy; `drawer` is only replaced by the caller once the whole
/// settlement succeeded. The returned drawer carries a fresh checkpoint.
///
/// ## Errors
/// - `DrawerClosed`, `CheckpointMismatch` for an unusable drawer
/// - `ChangeExceedsTender` when change is worth more than the cash received
/// - `NoInventoryForCurrency`, `InsufficientChange` from change-making
/// - `AmountOutOfRange` when the tender cannot be represented
pub fn settle(
    drawer: &Drawer,
    received: &[CashTender],
    change: Amount,
    pay_from: Currency,
) -> CoreResult<Settlement> {
    drawer.ensure_open()?;
    drawer.verify_checkpoint()?;

    let tendered = tendered_value(received, change.currency, &drawer.rate)?;
    if change.value.is_positive() && change.value > tendered {
        return Err(CoreError::ChangeExceedsTender {
            change,
            tendered: Amount::new(tendered, change.currency),
        });
    }

    let mut next = drawer.clone();
    next.receive(received)?;

    let mut returned = Vec::new();
    if change.value.is_positive() {
        let inventory = next
            .inventory(pay_from)
            .ok_or(CoreError::NoInventoryForCurrency(pay_from))?;
        let result = change_for(change, inventory, &next.rate)?;
        returned = tenders_from(pay_from, &result.returned);
        next.set_inventory(result.inventory);
    }

    next.record_checkpoint();
    Ok(Settlement {
        drawer: next,
        returned,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn rate() -> ExchangeRate {
        ExchangeRate::new(dec!(4000), dec!(4100)).unwrap()
    }

    fn usd(cents: i64) -> Amount {
        Amount::new(Money::from_cents(cents), Currency::Usd)
    }

    /// {1:10, 5:10, 10:10, 20:10, 50:10, 100:10} in whole dollars.
    fn dollar_notes() -> DenominationInventory {
        DenominationInventory::new(
            Currency::Usd,
            [1, 5, 10, 20, 50, 100]
                .into_iter()
                .map(|d| DenominationCount::new(Money::from_major(d, 2), 10))
                .collect(),
        )
    }

    fn riel_notes() -> DenominationInventory {
        DenominationInventory::new(
            Currency::Khr,
            [100, 500, 1000, 5000]
                .into_iter()
                .map(|d| DenominationCount::new(Money::from_minor(d), 10))
                .collect(),
        )
    }

    fn open_drawer() -> Drawer {
        let mut drawer = Drawer {
            id: "d-1".into(),
            user_id: "u-1".into(),
            inventories: vec![dollar_notes(), riel_notes()],
            rate: rate(),
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
    fn test_fractional_owe_fails_without_mutation() {
        let inventory = dollar_notes();
        let before = inventory.clone();

        let err = change_for(usd(735), &inventory, &rate()).unwrap_err();
        match err {
            CoreError::InsufficientChange { owed, remaining, .. } => {
                assert_eq!(owed, usd(735));
                assert_eq!(remaining, usd(35));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(inventory, before);
    }

    #[rstest]
    #[case(usd(700), vec![(500, 1), (100, 2)])]
    #[case(usd(18_600), vec![(10_000, 1), (5_000, 1), (2_000, 1), (1_000, 1), (500, 1), (100, 1)])]
    #[case(usd(4_000), vec![(2_000, 2)])]
    fn test_exact_change_sums_to_owed(#[case] owe: Amount, #[case] expected: Vec<(i64, i64)>) {
        let result = change_for(owe, &dollar_notes(), &rate()).unwrap();

        let returned: Vec<(i64, i64)> = result
            .returned
            .iter()
            .map(|d| (d.value.minor(), d.count))
            .collect();
        assert_eq!(returned, expected);

        let paid: Money = result.returned.iter().map(|d| d.value * d.count).sum();
        assert_eq!(paid, owe.value);
        assert_eq!(
            result.inventory.total().value,
            dollar_notes().total().value - owe.value
        );
    }

    #[test]
    fn test_greedy_falls_through_exhausted_denominations() {
        let inventory = DenominationInventory::new(
            Currency::Usd,
            vec![
                DenominationCount::new(Money::from_major(20, 2), 1),
                DenominationCount::new(Money::from_major(10, 2), 0),
                DenominationCount::new(Money::from_major(5, 2), 3),
                DenominationCount::new(Money::from_major(1, 2), 4),
            ],
        );
        let result = change_for(usd(2_700), &inventory, &rate()).unwrap();
        assert_eq!(
            result.returned,
            vec![
                DenominationCount::new(Money::from_major(20, 2), 1),
                DenominationCount::new(Money::from_major(5, 2), 1),
                DenominationCount::new(Money::from_major(1, 2), 2),
            ]
        );
        assert_eq!(result.inventory.count_of(Money::from_major(1, 2)), 2);
    }

    #[test]
    fn test_owe_in_other_currency_is_converted() {
        // 1.00 USD owed, paid in riel: 1 × 4100 (sell) = 4100 KHR
        let result = change_for(usd(100), &riel_notes(), &rate()).unwrap();
        let paid: Money = result.returned.iter().map(|d| d.value * d.count).sum();
        assert_eq!(paid, Money::from_minor(4100));
    }

    #[test]
    fn test_zero_owe_returns_nothing() {
        let result = change_for(usd(0), &dollar_notes(), &rate()).unwrap();
        assert!(result.returned.is_empty());
        assert_eq!(result.inventory, dollar_notes());
    }

    #[test]
    fn test_settle_adds_tender_before_change() {
        let mut drawer = open_drawer();
        // Drawer holds no 50-dollar change beyond what the customer hands over.
        drawer.inventories[0] = DenominationInventory::new(
            Currency::Usd,
            vec![DenominationCount::new(Money::from_major(1, 2), 0)],
        );
        drawer.record_checkpoint();

        let received = [CashTender {
            currency: Currency::Usd,
            denomination: Money::from_major(1, 2),
            count: 10,
        }];
        let settlement = settle(&drawer, &received, usd(300), Currency::Usd).unwrap();

        assert_eq!(settlement.returned.len(), 1);
        assert_eq!(settlement.returned[0].count, 3);
        let usd_inv = settlement.drawer.inventory(Currency::Usd).unwrap();
        assert_eq!(usd_inv.count_of(Money::from_major(1, 2)), 7);
        assert!(settlement.drawer.verify_checkpoint().is_ok());
    }

    #[test]
    fn test_settle_rejects_change_above_tender() {
        let drawer = open_drawer();
        let received = [CashTender {
            currency: Currency::Usd,
            denomination: Money::from_major(5, 2),
            count: 1,
        }];
        assert!(matches!(
            settle(&drawer, &received, usd(1_000), Currency::Usd),
            Err(CoreError::ChangeExceedsTender { .. })
        ));
    }

    #[test]
    fn test_settle_closed_drawer_rejected() {
        let mut drawer = open_drawer();
        drawer.is_open = false;
        assert!(matches!(
            settle(&drawer, &[], usd(0), Currency::Usd),
            Err(CoreError::DrawerClosed(_))
        ));
    }

    #[test]
    fn test_settle_failure_leaves_drawer_untouched() {
        let drawer = open_drawer();
        let before = drawer.clone();
        let received = [CashTender {
            currency: Currency::Usd,
            denomination: Money::from_major(10, 2),
            count: 1,
        }];
        assert!(settle(&drawer, &received, usd(735), Currency::Usd).is_err());
        assert_eq!(drawer, before);
    }

    #[test]
    fn test_settle_rejects_unrepresentable_tender() {
        let drawer = open_drawer();
        let received = [CashTender {
            currency: Currency::Usd,
            denomination: Money::from_cents(10_000),
            count: i64::MAX / 2,
        }];
        assert!(matches!(
            settle(&drawer, &received, usd(0), Currency::Usd),
            Err(CoreError::AmountOutOfRange(_))
        ));
        assert!(matches!(
            settle(&drawer, &received, usd(500), Currency::Usd),
            Err(CoreError::AmountOutOfRange(_))
        ));
    }

    #[test]
    fn test_tendered_value_mixes_currencies() {
        let received = [
            CashTender {
                currency: Currency::Usd,
                denomination: Money::from_major(5, 2),
                count: 2,
            },
            CashTender {
                currency: Currency::Khr,
                denomination: Money::from_minor(4000),
                count: 1,
            },
        ];
        assert_eq!(
            tendered_value(&received, Currency::Usd, &rate()).unwrap(),
            Money::from_cents(1100)
        );
    }

    #[test]
    fn test_tender_must_cover_total() {
        let fives = |count| {
            [CashTender {
                currency: Currency::Usd,
                denomination: Money::from_major(5, 2),
                count,
            }]
        };

        assert!(ensure_tender_covers(usd(1000), &fives(2), usd(0), &rate()).is_ok());
        assert!(ensure_tender_covers(usd(725), &fives(2), usd(275), &rate()).is_ok());
        assert!(ensure_tender_covers(usd(0), &[], usd(0), &rate()).is_ok());
        assert!(matches!(
            ensure_tender_covers(usd(1000), &fives(1), usd(0), &rate()),
            Err(CoreError::TenderShort { .. })
        ));
        assert!(matches!(
            ensure_tender_covers(usd(1000), &[], usd(0), &rate()),
            Err(CoreError::TenderShort { .. })
        ));
        assert!(matches!(
            ensure_tender_covers(usd(1000), &fives(2), usd(100), &rate()),
            Err(CoreError::TenderShort { .. })
        ));
    }

    #[test]
    fn test_tender_cover_with_change_in_riel() {
        // 5.00 USD in, 1.00 USD due, 4.00 USD back as riel at the sell rate.
        let change = Amount::new(Money::from_minor(16_400), Currency::Khr);
        let received = [CashTender {
            currency: Currency::Usd,
            denomination: Money::from_major(5, 2),
            count: 1,
        }];
        assert!(ensure_tender_covers(usd(100), &received, change, &rate()).is_ok());

        let too_much = Amount::new(Money::from_minor(16_500), Currency::Khr);
        assert!(matches!(
            ensure_tender_covers(usd(100), &received, too_much, &rate()),
            Err(CoreError::TenderShort { .. })
        ));
    }
}
