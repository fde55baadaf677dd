//! # kassa-db: Database Layer for Kassa
//!
//! SQLite storage for the order-to-cash core, with sqlx for async access.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Kassa Data Flow                                │
//! │                                                                         │
//! │  kassa-service operation (checkout, place_order, ...)                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     kassa-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ product       │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ allocation    │    │ 001_initial  │  │   │
//! │  │   │ begin()       │    │ transaction   │    │  _schema.sql │  │   │
//! │  │   │               │    │ payment       │    │              │  │   │
//! │  │   │               │    │ drawer        │    │              │  │   │
//! │  │   │               │    │ customer      │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database file (WAL mode)                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and units of work
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kassa_db::{Database, DbConfig};
//! use kassa_db::repository::{payment, transaction};
//!
//! let db = Database::new(DbConfig::new("path/to/kassa.db")).await?;
//!
//! let mut tx = db.begin().await?;
//! transaction::mark_completed(&mut tx, &id, now).await?;
//! payment::finalize(&mut tx, &payment, now).await?;
//! tx.commit().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::allocation::AllocationRepository;
pub use repository::customer::CustomerRepository;
pub use repository::drawer::DrawerRepository;
pub use repository::payment::PaymentRepository;
pub use repository::product::ProductRepository;
pub use repository::transaction::TransactionRepository;
