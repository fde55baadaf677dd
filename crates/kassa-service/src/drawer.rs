//! # Cash Drawer Ledger
//!
//! Open, amend and close a user's drawer; preview change.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Closed ──open_drawer──► Open ──save_drawer──► Open ──close_drawer──► Closed
//! │              │                   (any number                          │
//! │              │                    of times)                           │
//! │              └── user already has an open drawer: DrawerAlreadyOpen   │
//! │                                                                         │
//! │  Every write stores a fresh checkpoint (per-currency sums) and bumps   │
//! │  `version`; a drawer whose inventory drifted from its checkpoint is    │
//! │  refused with CheckpointMismatch.                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The drawer an operation acts on always comes from the [`Session`]; there is
//! no ambient "current drawer".

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::notify::NotificationEvent;
use crate::retry::with_retry;
use crate::service::{found, validate_session, Kassa};
use kassa_core::drawer::{change_for, ChangeResult, DenominationInventory};
use kassa_core::validation::{validate_inventory, Validator};
use kassa_core::{Amount, CoreError, Currency, Drawer, ExchangeRate, Session, ValidationError};
use kassa_db::repository::drawer;
use kassa_db::DbError;

/// Starting cash and rate pair for a new drawer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenDrawer {
    pub inventories: Vec<DenominationInventory>,
    pub rate: ExchangeRate,
}

/// Amendments to an open drawer. `None` leaves the field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveDrawer {
    #[serde(default)]
    pub inventories: Option<Vec<DenominationInventory>>,
    #[serde(default)]
    pub rate: Option<ExchangeRate>,
}

fn check_inventories(v: &mut Validator, inventories: &[DenominationInventory]) {
    for (i, inventory) in inventories.iter().enumerate() {
        v.check(validate_inventory(inventory));
        if inventories[..i].iter().any(|p| p.currency == inventory.currency) {
            v.check(Err(ValidationError::InvalidFormat {
                field: "inventories".to_string(),
                reason: format!("{} listed twice", inventory.currency),
            }));
        }
    }
}

impl OpenDrawer {
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut v = Validator::new();
        check_inventories(&mut v, &self.inventories);
        v.finish()
    }
}

impl SaveDrawer {
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut v = Validator::new();
        if let Some(inventories) = &self.inventories {
            check_inventories(&mut v, inventories);
        }
        v.finish()
    }
}

/// Loads the session's drawer and checks it is open, owned by the session
/// user, and consistent with its checkpoint.
pub(crate) async fn session_drawer(
    conn: &mut SqliteConnection,
    session: &Session,
) -> ServiceResult<Drawer> {
    let drawer_id = session.require_drawer()?;
    let drawer = found(drawer::fetch_drawer(conn, drawer_id).await?, "Drawer", drawer_id)?;

    if drawer.user_id != session.user_id {
        return Err(CoreError::NoOpenDrawer(session.user_id.clone()).into());
    }
    drawer.ensure_open()?;
    drawer.verify_checkpoint()?;
    Ok(drawer)
}

impl Kassa {
    /// Opens a drawer for the session user.
    ///
    /// ## Errors
    /// - `DrawerAlreadyOpen` when the user owns an open drawer
    #[instrument(skip(self, session, request), fields(user_id = %session.user_id))]
    pub async fn open_drawer(&self, session: &Session, request: &OpenDrawer) -> ServiceResult<Drawer> {
        validate_session(session)?;
        request.validate()?;

        let drawer = with_retry(self.retry(), "open_drawer", move || async move {
            let mut tx = self.db().begin().await?;

            if drawer::fetch_open_for_user(&mut *tx, &session.user_id).await?.is_some() {
                return Err(CoreError::DrawerAlreadyOpen {
                    user_id: session.user_id.clone(),
                }
                .into());
            }

            let mut drawer = Drawer {
                id: Uuid::new_v4().to_string(),
                user_id: session.user_id.clone(),
                inventories: request.inventories.clone(),
                rate: request.rate,
                is_open: true,
                checkpoint: Vec::new(),
                opened_at: Utc::now(),
                closed_at: None,
                version: 0,
            };
            drawer.record_checkpoint();

            // A concurrent open that committed first trips the unique index;
            // the retry then sees its drawer.
            drawer::insert_drawer(&mut *tx, &drawer)
                .await
                .map_err(|e| match e {
                    DbError::UniqueViolation { .. } => DbError::conflict("Drawer", &session.user_id),
                    other => other,
                })?;

            tx.commit().await?;
            Ok(drawer)
        })
        .await?;

        info!(drawer_id = %drawer.id, "Drawer opened");
        self.notifier().notify(NotificationEvent::DrawerOpened {
            drawer_id: drawer.id.clone(),
            user_id: drawer.user_id.clone(),
        });
        Ok(drawer)
    }

    /// Amends the inventories and/or rate of the session's open drawer.
    #[instrument(skip(self, session, request), fields(user_id = %session.user_id))]
    pub async fn save_drawer(&self, session: &Session, request: &SaveDrawer) -> ServiceResult<Drawer> {
        validate_session(session)?;
        request.validate()?;

        let drawer = with_retry(self.retry(), "save_drawer", move || async move {
            let mut tx = self.db().begin().await?;
            let mut drawer = session_drawer(&mut *tx, session).await?;

            if let Some(inventories) = &request.inventories {
                for inventory in inventories {
                    drawer.set_inventory(inventory.clone());
                }
            }
            if let Some(rate) = request.rate {
                drawer.rate = rate;
            }
            drawer.record_checkpoint();

            drawer::update_drawer(&mut *tx, &drawer).await?;
            tx.commit().await?;

            drawer.version += 1;
            Ok(drawer)
        })
        .await?;

        info!(drawer_id = %drawer.id, version = drawer.version, "Drawer saved");
        Ok(drawer)
    }

    /// Closes the session's drawer. The session must drop its drawer id
    /// afterwards.
    #[instrument(skip(self, session), fields(user_id = %session.user_id))]
    pub async fn close_drawer(&self, session: &Session) -> ServiceResult<Drawer> {
        validate_session(session)?;

        let drawer = with_retry(self.retry(), "close_drawer", move || async move {
            let mut tx = self.db().begin().await?;
            let mut drawer = session_drawer(&mut *tx, session).await?;

            let now = Utc::now();
            drawer::close_drawer(&mut *tx, &drawer, now).await?;
            tx.commit().await?;

            drawer.is_open = false;
            drawer.closed_at = Some(now);
            drawer.version += 1;
            Ok(drawer)
        })
        .await?;

        info!(drawer_id = %drawer.id, "Drawer closed");
        self.notifier().notify(NotificationEvent::DrawerClosed {
            drawer_id: drawer.id.clone(),
            user_id: drawer.user_id.clone(),
            sums: drawer.computed_sums(),
        });
        Ok(drawer)
    }

    /// Works out which notes and coins of `pay_from` would pay `owe`, without
    /// touching the drawer.
    ///
    /// ## Errors
    /// - `NoInventoryForCurrency` when the drawer holds no `pay_from` cash
    /// - `InsufficientChange` when no exact greedy combination exists
    #[instrument(skip(self, session), fields(user_id = %session.user_id))]
    pub async fn change_for(
        &self,
        session: &Session,
        owe: Amount,
        pay_from: Currency,
    ) -> ServiceResult<ChangeResult> {
        validate_session(session)?;
        if owe.value.is_negative() {
            return Err(ValidationError::MustNotBeNegative {
                field: "owe".to_string(),
            }
            .into());
        }

        let mut conn = self.db().pool().acquire().await?;
        let drawer = session_drawer(&mut conn, session).await?;
        let inventory = drawer
            .inventory(pay_from)
            .ok_or(CoreError::NoInventoryForCurrency(pay_from))?;

        change_for(owe, inventory, &drawer.rate).map_err(ServiceError::from)
    }
}
