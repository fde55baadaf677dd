//! # kassa-service: Order-to-Cash Operations
//!
//! Every operation the rest of the store system calls: one `impl Kassa`
//! block per component, each operation one retried unit of work.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Kassa Architecture                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │               ★ kassa-service (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   stock      allocate_stock, release_stock                     │   │
//! │  │   pricing    compute_transaction_total, compute_payment_total,  │   │
//! │  │              append_transaction, set_payment_charges            │   │
//! │  │   drawer     open_drawer, save_drawer, close_drawer, change_for │   │
//! │  │   orders     place_order                                        │   │
//! │  │   checkout   checkout                                           │   │
//! │  │   sweeper    sweep, sweep_before                                │   │
//! │  │   queries    search_transactions, search_payments               │   │
//! │  │                                                                 │   │
//! │  │   retry • error boundary • config • notifications • tracing    │   │
//! │  └───────────────┬─────────────────────────────┬───────────────────┘   │
//! │                  │                             │                        │
//! │  ┌───────────────▼─────────────┐ ┌─────────────▼───────────────────┐   │
//! │  │ kassa-core (pure rules)     │ │ kassa-db (SQLite, sqlx)         │   │
//! │  └─────────────────────────────┘ └─────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Outcome of Every Operation
//! ```text
//! Ok(data)
//! Err(Validation)    caller-correctable input, field-level list
//! Err(BusinessRule)  choose a different action; retrying fails the same way
//! Err(NotFound)      unknown id
//! Err(Transient)     conflicts exhausted or store unreachable; nothing was
//!                    written, retry the whole operation
//! ```
//!
//! ## Example
//! ```rust,ignore
//! use kassa_service::{telemetry, Checkout, Kassa, KassaConfig, OpenDrawer, PlaceOrder};
//!
//! let config = KassaConfig::load(None)?;
//! telemetry::init(&config.logging);
//! let kassa = Kassa::connect(config).await?;
//!
//! let drawer = kassa.open_drawer(&Session::new("cashier-1"), &opening).await?;
//! let session = Session::new("cashier-1").with_drawer(drawer.id);
//!
//! let order = kassa.place_order(&session, &PlaceOrder::new(product_id, 2)).await?;
//! let paid = kassa.checkout(&Checkout { payment_id: order.payment.id, .. }).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod checkout;
pub mod config;
pub mod drawer;
pub mod error;
pub mod notify;
pub mod orders;
pub mod pricing;
pub mod queries;
pub mod retry;
pub mod service;
pub mod stock;
pub mod sweeper;
pub mod telemetry;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use checkout::Checkout;
pub use config::KassaConfig;
pub use drawer::{OpenDrawer, SaveDrawer};
pub use error::{ErrorCode, ErrorResponse, ServiceError, ServiceResult};
pub use notify::{ChannelSink, LogSink, NotificationEvent, NotificationSink, Notifier, NotifyError};
pub use orders::{PlaceOrder, PlacedOrder};
pub use pricing::{PaymentCharges, PaymentDraft};
pub use service::Kassa;
pub use stock::AllocateStock;
pub use sweeper::SweepReport;
