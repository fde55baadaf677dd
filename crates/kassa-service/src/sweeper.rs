//! # Pending-Transaction Sweeper
//!
//! Gives back the stock of order lines that were rung up but never paid.
//!
//! ```text
//! candidates: pending, not deleted, created before cutoff
//!      │
//!      ▼  one unit of work per candidate
//! ┌──────────────────────────────────────────────────────────────┐
//! │ soft_delete (WHERE status = 'pending' AND is_deleted = 0)    │
//! │    │                                                         │
//! │    ├── 0 rows: a checkout or another sweep got there ──► skip│
//! │    │                                                         │
//! │    └── 1 row: release every unreleased allocation ──► COMMIT │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The soft delete and the release commit together, so a second run finds
//! no candidates and releases nothing. One failing candidate is logged and
//! skipped; the rest of the batch still runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::error::ServiceResult;
use crate::retry::with_retry;
use crate::service::Kassa;
use crate::stock::release_in;
use kassa_db::repository::{allocation, transaction};

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Transactions soft-deleted by this run.
    pub swept: Vec<String>,
    /// Stock units returned to lots.
    pub released_units: i64,
    /// Candidates that failed and were left for the next run.
    pub failed: Vec<String>,
}

impl Kassa {
    /// Sweeps pending transactions older than the configured threshold.
    pub async fn sweep(&self, now: DateTime<Utc>) -> ServiceResult<SweepReport> {
        self.sweep_before(now - self.config().abandon_after()).await
    }

    /// Sweeps pending transactions created before `cutoff`.
    #[instrument(skip(self))]
    pub async fn sweep_before(&self, cutoff: DateTime<Utc>) -> ServiceResult<SweepReport> {
        let candidates = self.db().transactions().pending_before(cutoff).await?;
        let mut report = SweepReport::default();

        for candidate in &candidates {
            let id = candidate.id.as_str();
            let outcome = with_retry(self.retry(), "sweep", move || async move {
                let mut tx = self.db().begin().await?;
                let now = Utc::now();

                if !transaction::soft_delete(&mut *tx, id, now).await? {
                    return Ok(None);
                }

                let held: Vec<String> = allocation::fetch_unreleased_for_transaction(&mut *tx, id)
                    .await?
                    .into_iter()
                    .map(|a| a.id)
                    .collect();
                let released = release_in(&mut *tx, &held, now).await?;

                tx.commit().await?;
                Ok(Some(released))
            })
            .await;

            match outcome {
                Ok(Some(units)) => {
                    report.swept.push(candidate.id.clone());
                    report.released_units += units;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(transaction_id = %candidate.id, error = %e, "Sweep of transaction failed");
                    report.failed.push(candidate.id.clone());
                }
            }
        }

        if !report.swept.is_empty() || !report.failed.is_empty() {
            info!(
                swept = report.swept.len(),
                released_units = report.released_units,
                failed = report.failed.len(),
                "Sweep finished"
            );
        }
        Ok(report)
    }
}
