//! Shared setup for the integration suites: a file-backed store in a
//! temporary directory, so several pooled connections really race.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal_macros::dec;
use tempfile::TempDir;
use uuid::Uuid;

use kassa_core::drawer::{DenominationCount, DenominationInventory};
use kassa_core::{Currency, Customer, Drawer, ExchangeRate, Money, Product, Session, StockLot};
use kassa_db::Database;
use kassa_service::config::{NotificationSettings, RetrySettings};
use kassa_service::{Kassa, KassaConfig, NotificationSink, Notifier, OpenDrawer};

/// Keeps the temporary directory alive as long as the service.
pub struct Harness {
    pub kassa: Kassa,
    _dir: TempDir,
}

fn config(dir: &TempDir) -> KassaConfig {
    let mut config = KassaConfig::default();
    config.database.path = dir.path().join("kassa.db");
    config.database.max_connections = 8;
    config.retry = RetrySettings {
        initial_backoff_ms: 2,
        max_backoff_ms: 50,
        max_elapsed_ms: 10_000,
    };
    config
}

pub async fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let kassa = Kassa::connect(config(&dir)).await.unwrap();
    Harness { kassa, _dir: dir }
}

pub async fn harness_with_sink(
    sink: Arc<dyn NotificationSink>,
    notifications: NotificationSettings,
) -> Harness {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir);
    config.notifications = notifications;
    let db = Database::new(config.database.db_config()).await.unwrap();
    let notifier = Notifier::new(sink, config.notifications.clone());
    Harness {
        kassa: Kassa::new(db, config, notifier),
        _dir: dir,
    }
}

pub fn rate() -> ExchangeRate {
    ExchangeRate::new(dec!(4000), dec!(4100)).unwrap()
}

pub fn usd_inventory() -> DenominationInventory {
    DenominationInventory::new(
        Currency::Usd,
        vec![
            DenominationCount::new(Money::from_cents(25), 40),
            DenominationCount::new(Money::from_cents(100), 40),
            DenominationCount::new(Money::from_cents(500), 20),
            DenominationCount::new(Money::from_cents(1000), 20),
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
        name: "Denim Jacket".to_string(),
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
        cost: Money::from_cents(1500),
        currency: Currency::Usd,
        option: None,
        color: None,
        created_at,
    };
    kassa.db().products().insert_lot(&lot).await.unwrap();
    lot
}

pub async fn seed_customer(kassa: &Kassa) -> Customer {
    let customer = Customer {
        id: Uuid::new_v4().to_string(),
        name: "Dara".to_string(),
        loyalty_points: 0,
        created_at: Utc::now(),
    };
    kassa.db().customers().insert(&customer).await.unwrap();
    customer
}
