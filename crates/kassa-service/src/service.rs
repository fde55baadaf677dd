//! # Service Handle
//!
//! `Kassa` bundles the database, configuration and notifier every operation
//! needs. Operations are `impl Kassa` blocks in their own modules.
//!
//! ```rust,ignore
//! let config = KassaConfig::load(None)?;
//! telemetry::init(&config.logging);
//! let kassa = Kassa::connect(config).await?;
//!
//! let drawer = kassa.open_drawer(&Session::new("u-1"), request).await?;
//! ```

use std::sync::Arc;

use tracing::info;

use crate::config::{KassaConfig, RetrySettings};
use crate::error::{ServiceError, ServiceResult};
use crate::notify::Notifier;
use kassa_core::{Session, ValidationError};
use kassa_db::Database;

/// Entry point for all order-to-cash operations. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Kassa {
    db: Database,
    config: Arc<KassaConfig>,
    notifier: Notifier,
}

impl Kassa {
    pub fn new(db: Database, config: KassaConfig, notifier: Notifier) -> Self {
        Kassa {
            db,
            config: Arc::new(config),
            notifier,
        }
    }

    /// Opens the configured database (running migrations) and logs
    /// notifications.
    pub async fn connect(config: KassaConfig) -> ServiceResult<Self> {
        config.validate()?;
        let db = Database::new(config.database.db_config()).await?;
        let notifier = Notifier::log(config.notifications.clone());

        info!(path = %config.database.path.display(), "Kassa service ready");
        Ok(Kassa::new(db, config, notifier))
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &KassaConfig {
        &self.config
    }

    pub(crate) fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub(crate) fn retry(&self) -> &RetrySettings {
        &self.config.retry
    }
}

/// Turns a missing row into `NotFound`.
pub(crate) fn found<T>(value: Option<T>, entity: &str, id: &str) -> ServiceResult<T> {
    value.ok_or_else(|| ServiceError::not_found(entity, id))
}

/// Every operation acts on behalf of a named user.
pub(crate) fn validate_session(session: &Session) -> Result<(), ValidationError> {
    if session.user_id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "user_id".to_string(),
        });
    }
    Ok(())
}
