//! # Order Placement
//!
//! Rings up one order line: price it, take the stock, put it on a payment.
//!
//! ## One Unit of Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │   1. session drawer   open, owned by the user, checkpoint intact       │
//! │   2. product          must exist and be active                         │
//! │   3. discount         manual if given, else the active promotion       │
//! │   4. total            price × qty, discounted with the drawer's rate   │
//! │   5. payment          the given open payment, or a new one on the      │
//! │                       drawer (rate snapshot taken here)                │
//! │   6. transaction      inserted pending, linked to the payment          │
//! │   7. stock            FIFO allocation recorded against the transaction │
//! │   8. payment totals   append + compare-and-set on version              │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  Any failure rolls back every step; conflicts re-run the whole list.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::drawer::session_drawer;
use crate::error::{ServiceError, ServiceResult};
use crate::retry::with_retry;
use crate::service::{found, validate_session, Kassa};
use crate::stock::{allocate_in, AllocateStock};
use kassa_core::payment::append_transaction;
use kassa_core::pricing::{choose_discount, compute_transaction_total, Discount};
use kassa_core::validation::{validate_discount, validate_id, validate_quantity, validate_tag, Validator};
use kassa_core::{
    Amount, CoreError, Currency, Drawer, LotAllocation, Money, Payment, Session, Transaction,
    TransactionStatus, ValidationError,
};
use kassa_db::repository::{customer, payment, product, transaction};

/// One order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub product_id: String,
    pub quantity: i64,
    #[serde(default)]
    pub option: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    /// Manually keyed discount; overrides any promotion.
    #[serde(default)]
    pub discount: Option<Discount>,
    /// Open payment to add the line to. A new payment is started when absent.
    #[serde(default)]
    pub payment_id: Option<String>,
    /// Only used when a new payment is started.
    #[serde(default)]
    pub customer_id: Option<String>,
    /// Only used when a new payment is started.
    #[serde(default)]
    pub reservation_id: Option<String>,
    /// Display currency of a new payment. Defaults to the product's currency.
    #[serde(default)]
    pub currency: Option<Currency>,
}

impl PlaceOrder {
    /// A plain order for `quantity` units with no filters or extras.
    pub fn new(product_id: impl Into<String>, quantity: i64) -> Self {
        PlaceOrder {
            product_id: product_id.into(),
            quantity,
            option: None,
            color: None,
            discount: None,
            payment_id: None,
            customer_id: None,
            reservation_id: None,
            currency: None,
        }
    }

    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut v = Validator::new();
        v.check(validate_id("product_id", &self.product_id))
            .check(validate_quantity(self.quantity))
            .check(validate_tag("option", self.option.as_deref()))
            .check(validate_tag("color", self.color.as_deref()));
        if let Some(discount) = &self.discount {
            v.check(validate_discount(discount));
        }
        if let Some(id) = &self.payment_id {
            v.check(validate_id("payment_id", id));
        }
        if let Some(id) = &self.customer_id {
            v.check(validate_id("customer_id", id));
        }
        if let Some(id) = &self.reservation_id {
            v.check(validate_id("reservation_id", id));
        }
        v.finish()
    }

    fn stock(&self) -> AllocateStock {
        AllocateStock {
            product_id: self.product_id.clone(),
            quantity: self.quantity,
            option: self.option.clone(),
            color: self.color.clone(),
        }
    }
}

/// What [`Kassa::place_order`] created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedOrder {
    pub transaction: Transaction,
    pub allocations: Vec<LotAllocation>,
    /// The payment after the line was added.
    pub payment: Payment,
}

/// Fetches the target payment or inserts a new one on `drawer`.
async fn payment_for(
    conn: &mut SqliteConnection,
    request: &PlaceOrder,
    drawer: &Drawer,
    currency: Currency,
) -> ServiceResult<Payment> {
    if let Some(id) = &request.payment_id {
        let existing = found(payment::fetch_payment(conn, id).await?, "Payment", id)?;
        existing.ensure_open()?;
        if existing.drawer_id != drawer.id {
            return Err(CoreError::PaymentOnOtherDrawer {
                payment_id: existing.id,
                drawer_id: existing.drawer_id,
            }
            .into());
        }
        return Ok(existing);
    }

    if let Some(id) = &request.customer_id {
        found(customer::fetch_customer(conn, id).await?, "Customer", id)?;
    }
    if let Some(id) = &request.reservation_id {
        found(customer::fetch_reservation(conn, id).await?, "Reservation", id)?;
    }

    let created = Payment {
        id: Uuid::new_v4().to_string(),
        drawer_id: drawer.id.clone(),
        customer_id: request.customer_id.clone(),
        reservation_id: request.reservation_id.clone(),
        transaction_ids: Vec::new(),
        services: Vec::new(),
        vouchers: Vec::new(),
        discounts: Vec::new(),
        subtotal: Money::zero(),
        total: Money::zero(),
        currency,
        rate: drawer.rate,
        is_finalized: false,
        received_cash: Vec::new(),
        returned_change: Vec::new(),
        created_at: Utc::now(),
        finalized_at: None,
        version: 0,
    };
    payment::insert_payment(conn, &created).await?;
    Ok(created)
}

impl Kassa {
    /// Creates a priced, stocked transaction on an open payment.
    ///
    /// ## Errors
    /// - `NoOpenDrawer` without an open session drawer
    /// - `NotFound` for an unknown or inactive product, payment, customer or
    ///   reservation
    /// - `InsufficientStock` when the matching lots cannot cover `quantity`
    /// - `PaymentFinalized` when adding to a checked-out payment
    /// - `PaymentOnOtherDrawer` when the payment belongs to another drawer
    /// - `AmountOutOfRange` when the line total cannot be represented
    #[instrument(
        skip(self, session, request),
        fields(user_id = %session.user_id, product_id = %request.product_id, quantity = request.quantity)
    )]
    pub async fn place_order(&self, session: &Session, request: &PlaceOrder) -> ServiceResult<PlacedOrder> {
        validate_session(session)?;
        request.validate()?;

        let placed = with_retry(self.retry(), "place_order", move || async move {
            let mut tx = self.db().begin().await?;
            let now = Utc::now();

            let drawer = session_drawer(&mut *tx, session).await?;

            let item = found(
                product::fetch_product(&mut *tx, &request.product_id).await?,
                "Product",
                &request.product_id,
            )?;
            if !item.is_active {
                return Err(ServiceError::not_found("Product", &item.id));
            }

            let promotions = product::fetch_promotions_for_product(&mut *tx, &item.id).await?;
            let discount = choose_discount(request.discount.clone(), &promotions, now);

            let gross = item
                .price
                .multiply_quantity(request.quantity)
                .ok_or(CoreError::AmountOutOfRange("order line"))?;
            let base = Amount::new(gross, item.currency);
            let total = compute_transaction_total(base, discount.as_ref(), &drawer.rate)?;

            let currency = request.currency.unwrap_or(item.currency);
            let mut target = payment_for(&mut *tx, request, &drawer, currency).await?;

            let line = Transaction {
                id: Uuid::new_v4().to_string(),
                product_id: item.id.clone(),
                payment_id: Some(target.id.clone()),
                quantity: request.quantity,
                unit_price: item.price,
                base_total: base.value,
                total: total.value,
                currency: item.currency,
                discount,
                status: TransactionStatus::Pending,
                is_deleted: false,
                created_at: now,
                completed_at: None,
                deleted_at: None,
            };
            transaction::insert_transaction(&mut *tx, &line).await?;

            let allocations = allocate_in(&mut *tx, &request.stock(), Some(&line.id), now).await?;

            append_transaction(&mut target, &line)?;
            payment::update_totals(&mut *tx, &target).await?;
            tx.commit().await?;

            target.version += 1;
            Ok(PlacedOrder {
                transaction: line,
                allocations,
                payment: target,
            })
        })
        .await?;

        info!(
            transaction_id = %placed.transaction.id,
            payment_id = %placed.payment.id,
            total = %placed.transaction.total_amount(),
            "Order placed"
        );
        Ok(placed)
    }
}
