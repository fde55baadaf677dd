//! # Payment Aggregation
//!
//! Combines transaction totals, service fees, vouchers and payment-level
//! discounts into an invoice's subtotal and total.
//!
//! ## Formula
//! ```text
//! subtotal = Σ normalize(transaction.total)
//! total    = max(0, subtotal + Σ services − Σ vouchers − Σ discounts)
//!
//! normalize(x) = x converted into the payment's display currency with the
//!                payment's rate snapshot (KHR→USD ÷ buy, USD→KHR × sell)
//! ```
//!
//! Every amount is normalized on its own before summing, so appending one
//! transaction to a running subtotal gives the same result as recomputing
//! from scratch.

use serde::{Deserialize, Serialize};

use crate::currency::{Amount, Currency, ExchangeRate};
use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{Payment, Transaction, TransactionStatus};
use crate::MAX_PAYMENT_TRANSACTIONS;

/// A service fee, voucher or payment-level discount line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charge {
    pub label: String,
    pub amount: Amount,
}

impl Charge {
    pub fn new(label: impl Into<String>, amount: Amount) -> Self {
        Charge {
            label: label.into(),
            amount,
        }
    }
}

/// Result of [`compute_payment_total`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTotals {
    pub subtotal: Amount,
    pub total: Amount,
}

fn normalized_sum<'a>(
    amounts: impl Iterator<Item = &'a Amount>,
    currency: Currency,
    rate: &ExchangeRate,
) -> Money {
    amounts.map(|a| a.convert_to(currency, rate).value).sum()
}

/// Computes subtotal and total in `currency`.
pub fn compute_payment_total(
    transactions: &[Amount],
    services: &[Charge],
    vouchers: &[Charge],
    discounts: &[Charge],
    currency: Currency,
    rate: &ExchangeRate,
) -> PaymentTotals {
    let subtotal = normalized_sum(transactions.iter(), currency, rate);
    let total = total_from_subtotal(subtotal, services, vouchers, discounts, currency, rate);

    PaymentTotals {
        subtotal: Amount::new(subtotal, currency),
        total: Amount::new(total, currency),
    }
}

fn total_from_subtotal(
    subtotal: Money,
    services: &[Charge],
    vouchers: &[Charge],
    discounts: &[Charge],
    currency: Currency,
    rate: &ExchangeRate,
) -> Money {
    let fees = normalized_sum(services.iter().map(|c| &c.amount), currency, rate);
    let off = normalized_sum(vouchers.iter().map(|c| &c.amount), currency, rate)
        + normalized_sum(discounts.iter().map(|c| &c.amount), currency, rate);
    (subtotal + fees - off).clamp_non_negative()
}

/// Adds a transaction to an open payment and recomputes its totals.
///
/// Appending a transaction the payment already references is a no-op.
///
/// ## Errors
/// - `PaymentFinalized` if the payment is finalized
/// - `TransactionAbandoned` if the transaction was swept
/// - `TransactionCompleted` if the transaction was already paid
/// - `TransactionAssigned` if another payment references the transaction
/// - `PaymentTooLarge` past [`MAX_PAYMENT_TRANSACTIONS`]
pub fn append_transaction(payment: &mut Payment, transaction: &Transaction) -> CoreResult<()> {
    payment.ensure_open()?;

    if transaction.is_deleted {
        return Err(CoreError::TransactionAbandoned(transaction.id.clone()));
    }
    if transaction.status == TransactionStatus::Completed {
        return Err(CoreError::TransactionCompleted(transaction.id.clone()));
    }
    if let Some(owner) = &transaction.payment_id {
        if owner != &payment.id {
            return Err(CoreError::TransactionAssigned {
                transaction_id: transaction.id.clone(),
                payment_id: owner.clone(),
            });
        }
    }
    if payment.transaction_ids.contains(&transaction.id) {
        return Ok(());
    }
    if payment.transaction_ids.len() >= MAX_PAYMENT_TRANSACTIONS {
        return Err(CoreError::PaymentTooLarge {
            max: MAX_PAYMENT_TRANSACTIONS,
        });
    }

    let added = transaction
        .total_amount()
        .convert_to(payment.currency, &payment.rate);

    payment.transaction_ids.push(transaction.id.clone());
    payment.subtotal += added.value;
    recompute_total(payment);
    Ok(())
}

/// Replaces the service, voucher and discount lists of an open payment and
/// recomputes its total. The subtotal is left alone.
///
/// ## Errors
/// - `PaymentFinalized` if the payment is finalized
pub fn set_charges(
    payment: &mut Payment,
    services: Vec<Charge>,
    vouchers: Vec<Charge>,
    discounts: Vec<Charge>,
) -> CoreResult<()> {
    payment.ensure_open()?;
    payment.services = services;
    payment.vouchers = vouchers;
    payment.discounts = discounts;
    recompute_total(payment);
    Ok(())
}

/// Recomputes `total` from the payment's subtotal and charge lists.
pub fn recompute_total(payment: &mut Payment) {
    payment.total = total_from_subtotal(
        payment.subtotal,
        &payment.services,
        &payment.vouchers,
        &payment.discounts,
        payment.currency,
        &payment.rate,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn rate() -> ExchangeRate {
        ExchangeRate::new(dec!(4000), dec!(4100)).unwrap()
    }

    fn usd(cents: i64) -> Amount {
        Amount::new(Money::from_cents(cents), Currency::Usd)
    }

    fn khr(riel: i64) -> Amount {
        Amount::new(Money::from_minor(riel), Currency::Khr)
    }

    fn payment() -> Payment {
        Payment {
            id: "pay-1".into(),
            drawer_id: "d-1".into(),
            customer_id: None,
            reservation_id: None,
            transaction_ids: vec![],
            services: vec![],
            vouchers: vec![],
            discounts: vec![],
            subtotal: Money::zero(),
            total: Money::zero(),
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

    fn transaction(id: &str, total: Amount) -> Transaction {
        Transaction {
            id: id.into(),
            product_id: "p-1".into(),
            payment_id: None,
            quantity: 1,
            unit_price: total.value,
            base_total: total.value,
            total: total.value,
            currency: total.currency,
            discount: None,
            status: TransactionStatus::Pending,
            is_deleted: false,
            created_at: Utc::now(),
            completed_at: None,
            deleted_at: None,
        }
    }

    #[test]
    fn test_mixed_currency_totals() {
        let totals = compute_payment_total(
            &[usd(1000), khr(8000)],
            &[Charge::new("delivery", usd(150))],
            &[Charge::new("voucher", khr(4000))],
            &[Charge::new("staff", usd(50))],
            Currency::Usd,
            &rate(),
        );

        // 10.00 + 8000/4000 = 12.00
        assert_eq!(totals.subtotal, usd(1200));
        // 12.00 + 1.50 − 1.00 − 0.50
        assert_eq!(totals.total, usd(1200));
    }

    #[test]
    fn test_local_display_currency_uses_sell() {
        let totals = compute_payment_total(&[usd(200)], &[], &[], &[], Currency::Khr, &rate());
        assert_eq!(totals.subtotal, khr(8200));
        assert_eq!(totals.total, khr(8200));
    }

    #[test]
    fn test_total_clamped_at_zero() {
        let totals = compute_payment_total(
            &[usd(500)],
            &[],
            &[Charge::new("voucher", usd(2000))],
            &[],
            Currency::Usd,
            &rate(),
        );
        assert_eq!(totals.subtotal, usd(500));
        assert_eq!(totals.total, usd(0));
    }

    #[test]
    fn test_append_matches_full_recompute() {
        let mut p = payment();
        p.services.push(Charge::new("service", usd(100)));

        let t1 = transaction("t-1", usd(1000));
        let t2 = transaction("t-2", khr(6000));
        append_transaction(&mut p, &t1).unwrap();
        append_transaction(&mut p, &t2).unwrap();

        let full = compute_payment_total(
            &[t1.total_amount(), t2.total_amount()],
            &p.services,
            &p.vouchers,
            &p.discounts,
            Currency::Usd,
            &rate(),
        );
        assert_eq!(p.subtotal_amount(), full.subtotal);
        assert_eq!(p.total_amount(), full.total);
        assert_eq!(p.transaction_ids, vec!["t-1", "t-2"]);
    }

    #[test]
    fn test_append_twice_is_noop() {
        let mut p = payment();
        let t = transaction("t-1", usd(1000));
        append_transaction(&mut p, &t).unwrap();
        append_transaction(&mut p, &t).unwrap();
        assert_eq!(p.transaction_ids.len(), 1);
        assert_eq!(p.subtotal, Money::from_cents(1000));
    }

    #[test]
    fn test_append_to_finalized_rejected() {
        let mut p = payment();
        p.is_finalized = true;
        let err = append_transaction(&mut p, &transaction("t-1", usd(1000))).unwrap_err();
        assert_eq!(err.to_string(), "Payment pay-1 already finalized");
        assert!(p.transaction_ids.is_empty());
    }

    #[test]
    fn test_append_swept_transaction_rejected() {
        let mut p = payment();
        let mut t = transaction("t-1", usd(1000));
        t.is_deleted = true;
        assert!(matches!(
            append_transaction(&mut p, &t),
            Err(CoreError::TransactionAbandoned(_))
        ));
    }

    #[test]
    fn test_append_paid_transaction_rejected() {
        let mut p = payment();
        let mut t = transaction("t-1", usd(1000));
        t.status = TransactionStatus::Completed;
        assert!(matches!(
            append_transaction(&mut p, &t),
            Err(CoreError::TransactionCompleted(_))
        ));
        assert_eq!(p.subtotal, Money::zero());
    }

    #[test]
    fn test_append_foreign_transaction_rejected() {
        let mut p = payment();
        let mut t = transaction("t-1", usd(1000));
        t.payment_id = Some("pay-2".into());
        assert!(matches!(
            append_transaction(&mut p, &t),
            Err(CoreError::TransactionAssigned { .. })
        ));

        t.payment_id = Some(p.id.clone());
        append_transaction(&mut p, &t).unwrap();
        assert_eq!(p.transaction_ids, vec!["t-1".to_string()]);
    }

    #[test]
    fn test_set_charges_recomputes_total() {
        let mut p = payment();
        append_transaction(&mut p, &transaction("t-1", usd(3000))).unwrap();

        set_charges(
            &mut p,
            vec![Charge::new("alteration", usd(500))],
            vec![Charge::new("gift card", khr(4000))],
            vec![],
        )
        .unwrap();
        assert_eq!(p.subtotal, Money::from_cents(3000));
        assert_eq!(p.total, Money::from_cents(3400));

        set_charges(&mut p, vec![], vec![], vec![]).unwrap();
        assert_eq!(p.total, Money::from_cents(3000));

        p.is_finalized = true;
        assert!(matches!(
            set_charges(&mut p, vec![], vec![Charge::new("gift card", usd(100))], vec![]),
            Err(CoreError::PaymentFinalized(_))
        ));
        assert!(p.vouchers.is_empty());
    }
}
