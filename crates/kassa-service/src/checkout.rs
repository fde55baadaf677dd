//! # Checkout Orchestrator
//!
//! Finalizes a payment: takes the customer's cash, pays change out of the
//! drawer, completes the order lines, the reservation and the loyalty
//! accrual, all in one SQLite transaction.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  checkout(payment_id, received_cash, remain_total)                     │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │   1. payment      finalized already? ──► PaymentFinalized              │
//! │   2. drawer       the payment's drawer, open, checkpoint intact        │
//! │   3. lines        swept? ──► TransactionAbandoned                      │
//! │   4. settle       cash in, change out (all-or-nothing)                 │
//! │                   cash kept < total? ──► TenderShort                   │
//! │   5. drawer       UPDATE ... WHERE version = v                         │
//! │   6. payment      UPDATE ... WHERE version = v AND is_finalized = 0    │
//! │   7. lines        pending ──► completed                                │
//! │   8. reservation  pending ──► completed                                │
//! │   9. customer     loyalty += whole base units of the total             │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  then: PaymentCompleted notification (spawned, best-effort)            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A checkout racing another checkout of the same payment loses the
//! compare-and-set in step 6, rolls back, re-reads, and stops at step 1. A
//! caller that timed out can therefore simply look at the payment: it is
//! either finalized with every side effect, or untouched.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::ServiceResult;
use crate::notify::NotificationEvent;
use crate::retry::with_retry;
use crate::service::{found, Kassa};
use kassa_core::drawer::{ensure_tender_covers, settle};
use kassa_core::validation::{validate_change, validate_id, validate_tender, Validator};
use kassa_core::{Amount, CashTender, CoreError, Currency, Payment, TransactionStatus, ValidationError};
use kassa_db::repository::{customer, drawer, payment, transaction};

/// Settlement instructions for one payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkout {
    pub payment_id: String,
    /// Notes and coins handed over by the customer.
    pub received_cash: Vec<CashTender>,
    /// Change owed back to the customer.
    pub remain_total: Amount,
    /// Drawer currency to pay change from. Defaults to the currency of
    /// `remain_total`.
    #[serde(default)]
    pub pay_change_from: Option<Currency>,
}

impl Checkout {
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut v = Validator::new();
        v.check(validate_id("payment_id", &self.payment_id))
            .check(validate_tender(&self.received_cash))
            .check(validate_change(self.remain_total.value));
        v.finish()
    }
}

impl Kassa {
    /// Finalizes a payment against its drawer.
    ///
    /// ## Errors
    /// - `PaymentFinalized` on a second checkout of the same payment
    /// - `TransactionAbandoned` when a line was swept
    /// - `ChangeExceedsTender`, `NoInventoryForCurrency`, `InsufficientChange`
    ///   when change cannot be paid; nothing is written
    /// - `TenderShort` when the cash kept is worth less than the total
    /// - `DrawerClosed`, `CheckpointMismatch` for an unusable drawer
    #[instrument(skip(self, request), fields(payment_id = %request.payment_id))]
    pub async fn checkout(&self, request: &Checkout) -> ServiceResult<Payment> {
        request.validate()?;

        let paid = with_retry(self.retry(), "checkout", move || async move {
            let mut tx = self.db().begin().await?;
            let now = Utc::now();

            let mut paying = found(
                payment::fetch_payment(&mut *tx, &request.payment_id).await?,
                "Payment",
                &request.payment_id,
            )?;
            paying.ensure_open()?;

            let till = found(
                drawer::fetch_drawer(&mut *tx, &paying.drawer_id).await?,
                "Drawer",
                &paying.drawer_id,
            )?;

            for id in &paying.transaction_ids {
                let line = found(
                    transaction::fetch_transaction(&mut *tx, id).await?,
                    "Transaction",
                    id,
                )?;
                if line.is_deleted {
                    return Err(CoreError::TransactionAbandoned(line.id).into());
                }
                if line.status == TransactionStatus::Completed {
                    return Err(CoreError::TransactionCompleted(line.id).into());
                }
            }

            let pay_from = request
                .pay_change_from
                .unwrap_or(request.remain_total.currency);
            let settlement = settle(&till, &request.received_cash, request.remain_total, pay_from)?;
            ensure_tender_covers(
                paying.total_amount(),
                &request.received_cash,
                request.remain_total,
                &till.rate,
            )?;
            drawer::update_drawer(&mut *tx, &settlement.drawer).await?;

            paying.received_cash = request.received_cash.clone();
            paying.returned_change = settlement.returned;
            payment::finalize(&mut *tx, &paying, now).await?;

            for id in &paying.transaction_ids {
                transaction::mark_completed(&mut *tx, id, now).await?;
            }

            if let Some(reservation_id) = &paying.reservation_id {
                if !customer::complete_reservation(&mut *tx, reservation_id, now).await? {
                    debug!(%reservation_id, "Reservation was not pending");
                }
            }

            if let Some(customer_id) = &paying.customer_id {
                let points = paying
                    .total_amount()
                    .convert_to(Currency::BASE, &till.rate)
                    .whole_units();
                if points > 0 {
                    customer::add_loyalty_points(&mut *tx, customer_id, points).await?;
                }
            }

            tx.commit().await?;

            paying.is_finalized = true;
            paying.finalized_at = Some(now);
            paying.version += 1;
            Ok(paying)
        })
        .await?;

        info!(
            total = %paid.total_amount(),
            lines = paid.transaction_ids.len(),
            "Payment finalized"
        );
        self.notifier().notify(NotificationEvent::PaymentCompleted {
            payment_id: paid.id.clone(),
            total: paid.total_amount(),
            change: paid.returned_change.clone(),
        });
        Ok(paid)
    }
}
