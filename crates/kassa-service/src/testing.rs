//! Fixtures shared by the unit tests of this crate.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use crate::config::{KassaConfig, RetrySettings};
use crate::drawer::OpenDrawer;
use crate::notify::Notifier;
use crate::orders::{PlaceOrder, PlacedOrder};
use crate::service::Kassa;
use kassa_core::drawer::{DenominationCount, DenominationInventory};
use kassa_core::pricing::{DiscountKind, Promotion};
use kassa_core::{
    Currency, Customer, Drawer, ExchangeRate, Money, Product, Reservation, ReservationStatus,
    Session, StockLot,
};
use kassa_db::{Database, DbConfig};

pub fn fast_retry() -> RetrySettings {
    RetrySettings {
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
        max_elapsed_ms: 500,
    }
}

pub async fn kassa() -> Kassa {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let config = KassaConfig {
        retry: fast_retry(),
        ..Default::default()
    };
    let notifier = Notifier::log(config.notifications.clone());
    Kassa::new(db, config, notifier)
}

pub fn rate() -> ExchangeRate {
    ExchangeRate::new(dec!(4000), dec!(4100)).unwrap()
}

/// Coins and notes up to $20, enough to pay any change under $100.
pub fn usd_inventory() -> DenominationInventory {
    DenominationInventory::new(
        Currency::Usd,
        vec![
            DenominationCount::new(Money::from_cents(1), 20),
            DenominationCount::new(Money::from_cents(5), 20),
            DenominationCount::new(Money::from_cents(10), 20),
            DenominationCount::new(Money::from_cents(25), 20),
            DenominationCount::new(Money::from_cents(100), 20),
            DenominationCount::new(Money::from_cents(500), 10),
            DenominationCount::new(Money::from_cents(1000), 10),
            DenominationCount::new(Money::from_cents(2000), 5),
        ],
    )
}

pub async fn open_session(kassa: &Kassa, user_id: &str) -> (Session, Drawer) {
    let session = Session::new(user_id);
    let request = OpenDrawer {
        inventories: vec![usd_inventory()],
        rate: rate(),
    };
    let drawer = kassa.open_drawer(&session, &request).await.unwrap();
    (session.with_drawer(drawer.id.clone()), drawer)
}

pub async fn seed_product(kassa: &Kassa, price_cents: i64) -> Product {
    let product = Product {
        id: Uuid::new_v4().to_string(),
        name: "Linen Shirt".to_string(),
        price: Money::from_cents(price_cents),
        currency: Currency::Usd,
        is_active: true,
        created_at: Utc::now(),
    };
    kassa.db().products().insert(&product).await.unwrap();
    product
}

pub async fn seed_lot(
    kassa: &Kassa,
    product_id: &str,
    quantity: i64,
    created_at: DateTime<Utc>,
) -> StockLot {
    let lot = StockLot {
        id: Uuid::new_v4().to_string(),
        product_id: product_id.to_string(),
        quantity,
        initial_quantity: quantity,
        cost: Money::from_cents(400),
        currency: Currency::Usd,
        option: None,
        color: None,
        created_at,
    };
    kassa.db().products().insert_lot(&lot).await.unwrap();
    lot
}

/// A percentage promotion running for a week from `start_at`.
pub async fn seed_promotion(
    kassa: &Kassa,
    product_id: &str,
    percent: Decimal,
    start_at: DateTime<Utc>,
) -> Promotion {
    let promotion = Promotion {
        id: Uuid::new_v4().to_string(),
        product_id: product_id.to_string(),
        value: percent,
        kind: DiscountKind::Percentage,
        is_fixed: false,
        currency: Currency::Usd,
        start_at,
        expire_at: start_at + Duration::days(7),
    };
    kassa.db().products().insert_promotion(&promotion).await.unwrap();
    promotion
}

pub async fn seed_customer(kassa: &Kassa) -> Customer {
    let customer = Customer {
        id: Uuid::new_v4().to_string(),
        name: "Sokha".to_string(),
        loyalty_points: 0,
        created_at: Utc::now(),
    };
    kassa.db().customers().insert(&customer).await.unwrap();
    customer
}

pub async fn seed_reservation(kassa: &Kassa, customer_id: &str) -> Reservation {
    let reservation = Reservation {
        id: Uuid::new_v4().to_string(),
        customer_id: Some(customer_id.to_string()),
        status: ReservationStatus::Pending,
        reserved_for: Utc::now() + Duration::hours(2),
        created_at: Utc::now(),
        completed_at: None,
    };
    kassa.db().customers().insert_reservation(&reservation).await.unwrap();
    reservation
}

/// Places a plain order, optionally onto an existing payment.
pub async fn place(
    kassa: &Kassa,
    session: &Session,
    product_id: &str,
    quantity: i64,
    payment_id: Option<&str>,
) -> PlacedOrder {
    let request = PlaceOrder {
        payment_id: payment_id.map(str::to_string),
        ..PlaceOrder::new(product_id, quantity)
    };
    kassa.place_order(session, &request).await.unwrap()
}
