//! # Notifications
//!
//! Fire-and-forget messages about drawer and payment events.
//!
//! ```text
//! operation commits ──► Notifier::notify(event)
//!                             │
//!                             ├── event disabled in config ──► dropped
//!                             │
//!                             └── tokio::spawn ──► sink.send(text)
//!                                                     │
//!                                                     └── Err ──► warn!, swallowed
//! ```
//!
//! Dispatch happens after commit on its own task; the operation has already
//! returned its result by the time the sink runs.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::NotificationSettings;
use kassa_core::{Amount, CashTender};

// =============================================================================
// Sink
// =============================================================================

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification sink closed")]
    Closed,

    #[error("Notification sink full")]
    Full,

    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

/// Accepts plain-text messages.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, message: String) -> Result<(), NotifyError>;
}

/// Writes messages to the log.
#[derive(Debug, Default, Clone)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, message: String) -> Result<(), NotifyError> {
        info!(target: "kassa::notify", "{}", message);
        Ok(())
    }
}

/// Hands messages to an in-process consumer over a bounded channel.
///
/// Never waits: a full channel is a delivery failure.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<String>,
}

impl ChannelSink {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(buffer);
        (ChannelSink { tx }, rx)
    }
}

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn send(&self, message: String) -> Result<(), NotifyError> {
        self.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => NotifyError::Full,
            mpsc::error::TrySendError::Closed(_) => NotifyError::Closed,
        })
    }
}

// =============================================================================
// Events
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    DrawerOpened {
        drawer_id: String,
        user_id: String,
    },
    DrawerClosed {
        drawer_id: String,
        user_id: String,
        sums: Vec<Amount>,
    },
    PaymentCompleted {
        payment_id: String,
        total: Amount,
        change: Vec<CashTender>,
    },
}

impl NotificationEvent {
    /// Text sent to the sink.
    pub fn message(&self) -> String {
        match self {
            NotificationEvent::DrawerOpened { drawer_id, user_id } => {
                format!("Drawer {} opened by {}", drawer_id, user_id)
            }
            NotificationEvent::DrawerClosed {
                drawer_id,
                user_id,
                sums,
            } => {
                let sums = sums
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("Drawer {} closed by {} with {}", drawer_id, user_id, sums)
            }
            NotificationEvent::PaymentCompleted {
                payment_id,
                total,
                change,
            } => {
                let notes: i64 = change.iter().map(|c| c.count).sum();
                format!(
                    "Payment {} completed: {} ({} notes returned)",
                    payment_id, total, notes
                )
            }
        }
    }

    fn enabled(&self, settings: &NotificationSettings) -> bool {
        match self {
            NotificationEvent::DrawerOpened { .. } => settings.drawer_opened,
            NotificationEvent::DrawerClosed { .. } => settings.drawer_closed,
            NotificationEvent::PaymentCompleted { .. } => settings.payment_completed,
        }
    }
}

// =============================================================================
// Notifier
// =============================================================================

/// Sink plus per-event toggles.
#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
    settings: NotificationSettings,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>, settings: NotificationSettings) -> Self {
        Notifier { sink, settings }
    }

    /// Notifier writing to the log.
    pub fn log(settings: NotificationSettings) -> Self {
        Notifier::new(Arc::new(LogSink), settings)
    }

    /// Dispatches `event` on its own task. Must be called inside a tokio
    /// runtime.
    pub fn notify(&self, event: NotificationEvent) {
        if !event.enabled(&self.settings) {
            return;
        }

        let sink = Arc::clone(&self.sink);
        let message = event.message();
        tokio::spawn(async move {
            if let Err(e) = sink.send(message).await {
                warn!(error = %e, "Notification dropped");
            }
        });
    }
}
