//! Journal record model.
//!
//! # Invariants
//! - `id` is assigned at creation and never reused.
//! - `timestamp` is the logical delivery time, not the write time.
//! - Synthetic source ids (`Backfill`, `Manual`) are always freshly
//!   generated and therefore never collide with platform ids.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of one journal record.
pub type EntryId = Uuid;

/// Text stored when a reminder delivery is logged without user input.
pub const DEFAULT_DELIVERY_TEXT: &str = "Reminder delivered";

/// Origin of a journal record; doubles as its deduplication key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SourceId {
    /// Identifier of a notification the platform scheduled or delivered.
    Delivery(String),
    /// Fire-time reconstructed while the app was not running.
    Backfill(Uuid),
    /// Note typed by the user in the journal editor.
    Manual(Uuid),
}

impl SourceId {
    pub fn delivery(id: impl Into<String>) -> Self {
        Self::Delivery(id.into())
    }

    pub fn backfill() -> Self {
        Self::Backfill(Uuid::new_v4())
    }

    pub fn manual() -> Self {
        Self::Manual(Uuid::new_v4())
    }

    /// Returns whether this id was generated locally instead of by the
    /// platform.
    pub fn is_synthetic(&self) -> bool {
        !matches!(self, Self::Delivery(_))
    }
}

impl Display for SourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Delivery(id) => write!(f, "delivery:{id}"),
            Self::Backfill(id) => write!(f, "backfill:{id}"),
            Self::Manual(id) => write!(f, "manual:{id}"),
        }
    }
}

/// One journal record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderEntry {
    pub id: EntryId,
    pub source_id: SourceId,
    /// Logical delivery time.
    pub timestamp: DateTime<Utc>,
    /// Delivery message, reply text or manual note.
    pub text: String,
}

impl ReminderEntry {
    /// Creates a record with a freshly generated id.
    pub fn new(source_id: SourceId, timestamp: DateTime<Utc>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_id,
            timestamp,
            text: text.into(),
        }
    }

    /// Creates the default "delivered" record for a platform notification.
    pub fn delivered(source_id: SourceId, timestamp: DateTime<Utc>) -> Self {
        Self::new(source_id, timestamp, DEFAULT_DELIVERY_TEXT)
    }
}
