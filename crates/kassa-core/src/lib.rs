//! # kassa-core: Pure Order-to-Cash Logic
//!
//! This crate holds every calculation the order-to-cash pipeline performs,
//! as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Kassa Architecture                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    kassa-service (operations)                   │   │
//! │  │  place_order, allocate_stock, open_drawer, checkout, sweep     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ kassa-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────┐         │   │
//! │  │   │ currency │ │allocation│ │ pricing  │ │ payment  │         │   │
//! │  │   │ Amount   │ │ FIFO plan│ │ Discount │ │ totals   │         │   │
//! │  │   │ Rate     │ │          │ │ Promotion│ │ append   │         │   │
//! │  │   └──────────┘ └──────────┘ └──────────┘ └──────────┘         │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌──────────┐                      │   │
//! │  │   │  drawer  │ │  query   │ │validation│                      │   │
//! │  │   │change_for│ │ typed    │ │  rules   │                      │   │
//! │  │   └──────────┘ └──────────┘ └──────────┘                      │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    kassa-db (Database Layer)                    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - `Money` in minor units (no floating point!)
//! - [`currency`] - Currency pair, buy/sell rates, `Amount`
//! - [`types`] - Domain entities (Product, StockLot, Transaction, ...)
//! - [`allocation`] - FIFO lot allocation planning
//! - [`pricing`] - Discounts, promotions, transaction totals
//! - [`payment`] - Payment aggregation and `append_transaction`
//! - [`drawer`] - Denomination inventories and change-making
//! - [`query`] - Typed list queries validated at the boundary
//! - [`validation`] - Input validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use kassa_core::currency::{Amount, Currency, ExchangeRate};
//! use kassa_core::money::Money;
//! use kassa_core::pricing::{compute_transaction_total, Discount};
//! use rust_decimal::Decimal;
//!
//! let rate = ExchangeRate::new(Decimal::from(4000), Decimal::from(4100)).unwrap();
//! let base = Amount::new(Money::from_cents(10000), Currency::Usd);
//! let ten_percent = Discount::percentage(Decimal::from(10));
//!
//! let total = compute_transaction_total(base, Some(&ten_percent), &rate).unwrap();
//! assert_eq!(total, Amount::new(Money::from_cents(9000), Currency::Usd));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod allocation;
pub mod currency;
pub mod drawer;
pub mod error;
pub mod money;
pub mod payment;
pub mod pricing;
pub mod query;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use currency::{Amount, Currency, ExchangeRate};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum quantity of a single product on one order line.
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Maximum number of transactions one payment may aggregate.
pub const MAX_PAYMENT_TRANSACTIONS: usize = 100;

/// Largest note or coin value, in minor units of its currency.
pub const MAX_DENOMINATION: i64 = 1_000_000_000;

/// Most units of one denomination on a single tender line.
pub const MAX_TENDER_COUNT: i64 = 10_000;

/// Most units of one denomination a drawer may be opened or saved with.
pub const MAX_DRAWER_COUNT: i64 = 1_000_000;

/// Largest fixed discount, in major units of its currency.
pub const MAX_DISCOUNT_VALUE: i64 = 1_000_000_000;

/// Largest service fee, voucher or discount line, in minor units.
pub const MAX_CHARGE_AMOUNT: i64 = 1_000_000_000_000;

/// Most lines in each of a payment's service, voucher and discount lists.
pub const MAX_PAYMENT_CHARGES: usize = 50;
