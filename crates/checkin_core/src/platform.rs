//! Platform notification boundary.
//!
//! # Responsibility
//! - Describe the OS notification queue and background scheduler the core
//!   talks to, without binding to any concrete platform.
//! - Define the payloads exchanged with it.
//!
//! # Invariants
//! - At most `MAX_PENDING_NOTIFICATIONS` requests are outstanding at once.
//! - Delivered records read during a reconciliation pass are purged by the
//!   same pass.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Title shown on every reminder.
pub const NOTIFICATION_TITLE: &str = "Time for a check-in!";
/// Category carrying the reply action.
pub const REMINDER_CATEGORY: &str = "REMINDER_CATEGORY";
/// Action identifier of the inline text reply.
pub const REPLY_ACTION_ID: &str = "REPLY_ACTION";
/// Earliest delay before the next background wake.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Error reported by a platform adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformError {
    pub operation: &'static str,
    pub message: String,
}

impl PlatformError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

impl Display for PlatformError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "platform {} failed: {}", self.operation, self.message)
    }
}

impl Error for PlatformError {}

pub type PlatformResult<T> = Result<T, PlatformError>;

/// Visible payload of a reminder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    pub category: String,
}

impl NotificationContent {
    pub fn reminder(body: impl Into<String>) -> Self {
        Self {
            title: NOTIFICATION_TITLE.to_string(),
            body: body.into(),
            category: REMINDER_CATEGORY.to_string(),
        }
    }
}

/// One request submitted to the platform queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledNotification {
    pub id: String,
    pub fire_at: DateTime<Utc>,
    pub content: NotificationContent,
}

/// A notification the platform delivered and still remembers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredRecord {
    pub id: String,
    pub content: Option<NotificationContent>,
    pub delivered_at: DateTime<Utc>,
}

/// OS notification queue.
#[async_trait]
pub trait NotificationCenter: Send + Sync {
    async fn submit(&self, notification: ScheduledNotification) -> PlatformResult<()>;
    async fn cancel_all(&self) -> PlatformResult<()>;
    async fn list_delivered(&self) -> PlatformResult<Vec<DeliveredRecord>>;
    async fn purge_delivered(&self, ids: &[String]) -> PlatformResult<()>;
}

/// OS facility that wakes the app periodically.
#[async_trait]
pub trait BackgroundScheduler: Send + Sync {
    async fn schedule_refresh(&self, earliest: DateTime<Utc>) -> PlatformResult<()>;
}
