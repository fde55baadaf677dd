//! # Pricing & Payment Aggregation
//!
//! Totals priced with the acting drawer's live rate pair, and adding order
//! lines to an open payment.
//!
//! ```text
//! session ──► open drawer ──► rate (buy / sell)
//!                                  │
//!         ┌────────────────────────┼───────────────────────────┐
//!         ▼                        ▼                           ▼
//!  compute_transaction_total  compute_payment_total     append_transaction
//!  (read only)                (read only)               set_payment_charges
//!                                                       (payment v → v+1)
//! ```
//!
//! `append_transaction` and `set_payment_charges` price with the rate
//! snapshot stored on the payment, not the drawer's current rate.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::drawer::session_drawer;
use crate::error::ServiceResult;
use crate::retry::with_retry;
use crate::service::{found, validate_session, Kassa};
use kassa_core::payment::{self, compute_payment_total, Charge, PaymentTotals};
use kassa_core::pricing::{compute_transaction_total, Discount};
use kassa_core::validation::{validate_charges, validate_discount, validate_id, Validator};
use kassa_core::{Amount, CoreError, Currency, Payment, Session, ValidationError};
use kassa_db::repository::{payment as payments, transaction};

/// Inputs of a payment total preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDraft {
    pub transaction_ids: Vec<String>,
    #[serde(default)]
    pub services: Vec<Charge>,
    #[serde(default)]
    pub vouchers: Vec<Charge>,
    #[serde(default)]
    pub discounts: Vec<Charge>,
    /// Display currency of the totals.
    pub currency: Currency,
}

impl PaymentDraft {
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut v = Validator::new();
        for id in &self.transaction_ids {
            v.check(validate_id("transaction_id", id));
        }
        v.check(validate_charges("services", &self.services))
            .check(validate_charges("vouchers", &self.vouchers))
            .check(validate_charges("discounts", &self.discounts));
        v.finish()
    }
}

/// Replacement charge lists for an open payment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCharges {
    #[serde(default)]
    pub services: Vec<Charge>,
    #[serde(default)]
    pub vouchers: Vec<Charge>,
    #[serde(default)]
    pub discounts: Vec<Charge>,
}

impl PaymentCharges {
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut v = Validator::new();
        v.check(validate_charges("services", &self.services))
            .check(validate_charges("vouchers", &self.vouchers))
            .check(validate_charges("discounts", &self.discounts));
        v.finish()
    }
}

impl Kassa {
    /// Applies `discount` to `base` with the session drawer's rate.
    #[instrument(skip(self, session, discount), fields(user_id = %session.user_id))]
    pub async fn compute_transaction_total(
        &self,
        session: &Session,
        base: Amount,
        discount: Option<&Discount>,
    ) -> ServiceResult<Amount> {
        let mut v = Validator::new();
        v.check(validate_session(session));
        if base.value.is_negative() {
            v.check(Err(ValidationError::MustNotBeNegative {
                field: "base".to_string(),
            }));
        }
        if let Some(discount) = discount {
            v.check(validate_discount(discount));
        }
        v.finish()?;

        let mut conn = self.db().pool().acquire().await?;
        let drawer = session_drawer(&mut conn, session).await?;

        Ok(compute_transaction_total(base, discount, &drawer.rate)?)
    }

    /// Previews subtotal and total for a set of transactions and charges.
    ///
    /// ## Errors
    /// - `NotFound` for an unknown transaction
    /// - `TransactionAbandoned` for a swept transaction
    #[instrument(skip(self, session, draft), fields(user_id = %session.user_id))]
    pub async fn compute_payment_total(
        &self,
        session: &Session,
        draft: &PaymentDraft,
    ) -> ServiceResult<PaymentTotals> {
        validate_session(session)?;
        draft.validate()?;

        let mut conn = self.db().pool().acquire().await?;
        let drawer = session_drawer(&mut conn, session).await?;

        let mut amounts = Vec::with_capacity(draft.transaction_ids.len());
        for id in &draft.transaction_ids {
            let t = found(transaction::fetch_transaction(&mut conn, id).await?, "Transaction", id)?;
            if t.is_deleted {
                return Err(CoreError::TransactionAbandoned(t.id).into());
            }
            amounts.push(t.total_amount());
        }

        Ok(compute_payment_total(
            &amounts,
            &draft.services,
            &draft.vouchers,
            &draft.discounts,
            draft.currency,
            &drawer.rate,
        ))
    }

    /// Adds a transaction to an open payment and stores the new totals.
    ///
    /// ## Errors
    /// - `PaymentFinalized` once the payment was checked out
    /// - `TransactionAbandoned`, `TransactionCompleted`, `TransactionAssigned`
    ///   for a transaction that cannot join this payment
    #[instrument(skip(self))]
    pub async fn append_transaction(
        &self,
        payment_id: &str,
        transaction_id: &str,
    ) -> ServiceResult<Payment> {
        let mut v = Validator::new();
        v.check(validate_id("payment_id", payment_id))
            .check(validate_id("transaction_id", transaction_id));
        v.finish()?;

        let payment = with_retry(self.retry(), "append_transaction", move || async move {
            let mut tx = self.db().begin().await?;

            let mut payment = found(
                payments::fetch_payment(&mut *tx, payment_id).await?,
                "Payment",
                payment_id,
            )?;
            let line = found(
                transaction::fetch_transaction(&mut *tx, transaction_id).await?,
                "Transaction",
                transaction_id,
            )?;

            payment::append_transaction(&mut payment, &line)?;
            transaction::set_payment(&mut *tx, &line.id, &payment.id).await?;
            payments::update_totals(&mut *tx, &payment).await?;
            tx.commit().await?;

            payment.version += 1;
            Ok(payment)
        })
        .await?;

        info!(payment_id = %payment.id, total = %payment.total_amount(), "Transaction appended");
        Ok(payment)
    }

    /// Replaces the service fees, vouchers and payment-level discounts of an
    /// open payment and stores the recomputed total.
    ///
    /// ## Errors
    /// - `NotFound` for an unknown payment
    /// - `PaymentFinalized` once the payment was checked out
    #[instrument(skip(self, charges))]
    pub async fn set_payment_charges(
        &self,
        payment_id: &str,
        charges: &PaymentCharges,
    ) -> ServiceResult<Payment> {
        let mut v = Validator::new();
        v.check(validate_id("payment_id", payment_id));
        v.finish()?;
        charges.validate()?;

        let payment = with_retry(self.retry(), "set_payment_charges", move || async move {
            let mut tx = self.db().begin().await?;

            let mut payment = found(
                payments::fetch_payment(&mut *tx, payment_id).await?,
                "Payment",
                payment_id,
            )?;
            payment::set_charges(
                &mut payment,
                charges.services.clone(),
                charges.vouchers.clone(),
                charges.discounts.clone(),
            )?;
            payments::update_totals(&mut *tx, &payment).await?;
            tx.commit().await?;

            payment.version += 1;
            Ok(payment)
        })
        .await?;

        info!(payment_id = %payment.id, total = %payment.total_amount(), "Payment charges set");
        Ok(payment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::testing::{kassa, open_session, place, seed_lot, seed_product};
    use chrono::Utc;
    use kassa_core::Money;
    use rust_decimal_macros::dec;

    fn usd(cents: i64) -> Amount {
        Amount::new(Money::from_cents(cents), Currency::Usd)
    }

    #[tokio::test]
    async fn test_transaction_total_uses_drawer_rate() {
        let kassa = kassa().await;
        let (session, _) = open_session(&kassa, "cashier-1").await;

        let ten_percent = Discount::percentage(dec!(10));
        let total = kassa
            .compute_transaction_total(&session, usd(10000), Some(&ten_percent))
            .await
            .unwrap();
        assert_eq!(total, usd(9000));

        // 8000 KHR at a 4000 buy rate is 2 USD
        let riel_off = Discount::fixed(dec!(8000), Currency::Khr);
        let total = kassa
            .compute_transaction_total(&session, usd(10000), Some(&riel_off))
            .await
            .unwrap();
        assert_eq!(total, usd(9800));
    }

    #[tokio::test]
    async fn test_transaction_total_needs_drawer() {
        let kassa = kassa().await;
        let err = kassa
            .compute_transaction_total(&Session::new("cashier-1"), usd(100), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::BusinessRule(CoreError::NoOpenDrawer(_))));
    }

    #[tokio::test]
    async fn test_payment_total_preview() {
        let kassa = kassa().await;
        let (session, _) = open_session(&kassa, "cashier-1").await;
        let product = seed_product(&kassa, 2500).await;
        seed_lot(&kassa, &product.id, 10, Utc::now()).await;

        let first = place(&kassa, &session, &product.id, 2, None).await;
        let second = place(&kassa, &session, &product.id, 1, None).await;

        let draft = PaymentDraft {
            transaction_ids: vec![first.transaction.id.clone(), second.transaction.id.clone()],
            services: vec![Charge::new("alteration", usd(500))],
            vouchers: vec![Charge::new("gift card", usd(1000))],
            discounts: vec![],
            currency: Currency::Usd,
        };
        let totals = kassa.compute_payment_total(&session, &draft).await.unwrap();
        assert_eq!(totals.subtotal, usd(7500));
        assert_eq!(totals.total, usd(7000));
    }

    #[tokio::test]
    async fn test_append_moves_totals_and_version() {
        let kassa = kassa().await;
        let (session, _) = open_session(&kassa, "cashier-1").await;
        let product = seed_product(&kassa, 1000).await;
        seed_lot(&kassa, &product.id, 10, Utc::now()).await;

        let first = place(&kassa, &session, &product.id, 1, None).await;
        let second = place(&kassa, &session, &product.id, 2, Some(&first.payment.id)).await;
        assert_eq!(second.payment.id, first.payment.id);
        assert_eq!(second.payment.total, Money::from_cents(3000));

        // Re-appending a member is a no-op apart from the version bump
        let again = kassa
            .append_transaction(&first.payment.id, &second.transaction.id)
            .await
            .unwrap();
        assert_eq!(again.total, Money::from_cents(3000));
        assert_eq!(again.version, second.payment.version + 1);

        let stored = kassa.db().payments().get_by_id(&first.payment.id).await.unwrap().unwrap();
        assert_eq!(stored.version, again.version);
        assert_eq!(stored.transaction_ids.len(), 2);
    }

    #[tokio::test]
    async fn test_append_to_other_payment_rejected() {
        let kassa = kassa().await;
        let (session, _) = open_session(&kassa, "cashier-1").await;
        let product = seed_product(&kassa, 1000).await;
        seed_lot(&kassa, &product.id, 10, Utc::now()).await;

        let first = place(&kassa, &session, &product.id, 1, None).await;
        let second = place(&kassa, &session, &product.id, 1, None).await;

        let err = kassa
            .append_transaction(&first.payment.id, &second.transaction.id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::BusinessRule(CoreError::TransactionAssigned { .. })
        ));
    }

    #[tokio::test]
    async fn test_charges_land_on_open_payment_only() {
        let kassa = kassa().await;
        let (session, _) = open_session(&kassa, "cashier-1").await;
        let product = seed_product(&kassa, 2500).await;
        seed_lot(&kassa, &product.id, 10, Utc::now()).await;

        let placed = place(&kassa, &session, &product.id, 2, None).await;
        let charges = PaymentCharges {
            services: vec![Charge::new("alteration", usd(500))],
            vouchers: vec![Charge::new("gift card", usd(1000))],
            discounts: vec![],
        };
        let priced = kassa
            .set_payment_charges(&placed.payment.id, &charges)
            .await
            .unwrap();
        assert_eq!(priced.subtotal, Money::from_cents(5000));
        assert_eq!(priced.total, Money::from_cents(4500));
        assert_eq!(priced.version, placed.payment.version + 1);

        let stored = kassa.db().payments().get_by_id(&placed.payment.id).await.unwrap().unwrap();
        assert_eq!(stored, priced);

        // Later lines keep the charges in the total
        let more = place(&kassa, &session, &product.id, 1, Some(&placed.payment.id)).await;
        assert_eq!(more.payment.total, Money::from_cents(7000));
    }

    #[tokio::test]
    async fn test_charges_validated_before_lookup() {
        let kassa = kassa().await;
        let charges = PaymentCharges {
            vouchers: vec![Charge::new("", usd(100))],
            ..PaymentCharges::default()
        };
        let err = kassa
            .set_payment_charges(&uuid::Uuid::new_v4().to_string(), &charges)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err = kassa
            .set_payment_charges(&uuid::Uuid::new_v4().to_string(), &PaymentCharges::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }
}
