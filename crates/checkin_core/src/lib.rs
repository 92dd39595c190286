//! Core domain logic for Check-in reminders.
//! This crate is the single source of truth for journal and scheduling
//! invariants; hosts only forward platform events and render results.

pub mod db;
pub mod logging;
pub mod model;
pub mod platform;
pub mod repo;
pub mod schedule;
pub mod service;
pub mod settings;

pub use logging::{default_log_level, init_logging, logging_status};
pub use model::entry::{EntryId, ReminderEntry, SourceId, DEFAULT_DELIVERY_TEXT};
pub use model::recurrence::{RecurrenceConfig, RecurrenceValidationError, DEFAULT_MESSAGE_TEXT};
pub use platform::{
    BackgroundScheduler, DeliveredRecord, NotificationCenter, NotificationContent, PlatformError,
    PlatformResult, ScheduledNotification,
};
pub use repo::journal_repo::{JournalRepository, KvJournalRepository};
pub use repo::kv_repo::{KeyValueRepository, RepoError, RepoResult, SqliteKeyValueRepository};
pub use schedule::planner::{plan_forward, reconstruct_between, MAX_PENDING_NOTIFICATIONS};
pub use service::entry_store::{AppendOutcome, EntryStore, ManualEntryError};
pub use service::rearm::{plan_batch, rearm, RearmError, RearmOutcome};
pub use service::reconciler::{ReconcileReport, Reconciler, ReminderEvent, ResponseAction};
pub use service::worker::{
    system_clock, Clock, ReconcileHandle, ReconcileWorker, WakeOutcome, WorkerClosed,
};
pub use settings::{CheckpointStore, KvSettingsStore, SettingsError, SettingsStore};

/// SQLite-backed reconciler used by hosts.
pub type SqliteReconciler<Tz> = Reconciler<
    KvJournalRepository<SqliteKeyValueRepository>,
    KvSettingsStore<SqliteKeyValueRepository>,
    Tz,
>;

/// Builds a reconciler over one migrated connection.
///
/// # Errors
/// - Returns an error when the connection is not migrated or the stored
///   journal cannot be read.
pub fn open_reconciler<Tz: chrono::TimeZone>(
    conn: rusqlite::Connection,
    tz: Tz,
) -> RepoResult<SqliteReconciler<Tz>> {
    let kv = SqliteKeyValueRepository::try_new(conn)?;
    let store = EntryStore::load(KvJournalRepository::new(kv.clone()))?;
    Ok(Reconciler::new(store, KvSettingsStore::new(kv), tz))
}

/// Minimal health-check API for host integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
