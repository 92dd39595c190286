//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose reminder settings, delivery events and journal edits to Dart
//!   via FRB.
//! - Translate epoch-millisecond times and string ids at the boundary.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Every journal call runs under one process-wide lock, so the host's
//!   notification callbacks and UI edits never interleave.
//! - Delivered-record ids returned in `purge_ids` must be removed from the
//!   platform by the host after each call.

use checkin_core::db::open_db;
use checkin_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, open_reconciler,
    ping as ping_inner, plan_batch, DeliveredRecord, EntryId, ReconcileReport,
    RecurrenceConfig, ResponseAction, SettingsError, SettingsStore, SourceId, SqliteReconciler,
};
use chrono::{DateTime, Local, NaiveDate, NaiveTime, Timelike, Utc};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use uuid::Uuid;

const JOURNAL_DB_FILE_NAME: &str = "checkin.sqlite3";
const DB_PATH_ENV: &str = "CHECKIN_DB_PATH";

static JOURNAL_DB_PATH: OnceLock<PathBuf> = OnceLock::new();
static JOURNAL: Mutex<Option<SqliteReconciler<Local>>> = Mutex::new(None);

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir`.
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// Reminder configuration as edited in the settings form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderSettings {
    pub message_text: String,
    pub interval_minutes: u32,
    /// Weekday indices, 1 = Sunday ... 7 = Saturday.
    pub weekdays: Vec<u8>,
    /// Minutes after local midnight.
    pub daily_start_minute: u32,
    /// Minutes after local midnight; inclusive upper bound.
    pub daily_end_minute: u32,
}

/// Settings read envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsResponse {
    pub ok: bool,
    /// `None` until the user saves a configuration.
    pub settings: Option<ReminderSettings>,
    pub log_default_delivery: bool,
    pub message: String,
}

/// Generic action response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResponse {
    pub ok: bool,
    /// Human-readable response message for diagnostics/UI.
    pub message: String,
}

impl ActionResponse {
    fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// A delivered notification as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredNotification {
    pub id: String,
    pub delivered_at_epoch_ms: i64,
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileResponse {
    pub ok: bool,
    pub appended: u32,
    pub updated: u32,
    pub duplicates: u32,
    pub backfilled: u32,
    /// Delivered ids the host must remove from the notification center.
    pub purge_ids: Vec<String>,
    pub message: String,
}

impl ReconcileResponse {
    fn from_report(report: ReconcileReport) -> Self {
        Self {
            ok: true,
            appended: count(report.appended.len()),
            updated: count(report.updated.len()),
            duplicates: count(report.duplicates),
            backfilled: count(report.backfilled),
            purge_ids: report.purge_ids,
            message: String::new(),
        }
    }

    fn failure(message: String) -> Self {
        Self {
            ok: false,
            appended: 0,
            updated: 0,
            duplicates: 0,
            backfilled: 0,
            purge_ids: Vec::new(),
            message,
        }
    }
}

/// One notification request the host should submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedNotification {
    pub id: String,
    pub fire_at_epoch_ms: i64,
    pub title: String,
    pub body: String,
    pub category: String,
}

/// Next batch envelope. The host cancels pending requests before submitting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanResponse {
    pub ok: bool,
    pub items: Vec<PlannedNotification>,
    pub message: String,
}

/// Journal row projection for the history view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntryItem {
    pub entry_id: String,
    /// `delivery|backfill|manual`.
    pub source_kind: String,
    pub timestamp_epoch_ms: i64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntriesResponse {
    pub ok: bool,
    /// Newest first.
    pub items: Vec<JournalEntryItem>,
    pub message: String,
}

/// Result of logging a manual note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryActionResponse {
    pub ok: bool,
    pub entry_id: Option<String>,
    pub message: String,
}

/// Reads the saved configuration and the logging flag.
#[flutter_rust_bridge::frb(sync)]
pub fn settings_get() -> SettingsResponse {
    let result = with_journal(|journal| {
        let settings = journal.settings();
        let config = settings.recurrence_config().map_err(|err| err.to_string())?;
        let logging = settings.logging_enabled().map_err(|err| err.to_string())?;
        Ok((config, logging))
    });
    match result {
        Ok((config, log_default_delivery)) => SettingsResponse {
            ok: true,
            settings: config.as_ref().map(to_settings_dto),
            log_default_delivery,
            message: String::new(),
        },
        Err(err) => SettingsResponse {
            ok: false,
            settings: None,
            log_default_delivery: true,
            message: format!("settings_get failed: {err}"),
        },
    }
}

/// Validates and saves the reminder configuration.
///
/// # FFI contract
/// - On validation failure nothing is written and `message` carries a
///   user-facing explanation.
#[flutter_rust_bridge::frb(sync)]
pub fn settings_save(settings: ReminderSettings) -> ActionResponse {
    let config = match from_settings_dto(settings) {
        Ok(config) => config,
        Err(message) => return ActionResponse::failure(message),
    };
    let result = with_journal(|journal| match journal.settings().save_recurrence_config(&config) {
        Ok(()) => Ok(()),
        Err(SettingsError::Invalid(err)) => Err(err.user_message().to_string()),
        Err(err) => Err(format!("settings_save failed: {err}")),
    });
    match result {
        Ok(()) => ActionResponse::success("Settings saved."),
        Err(message) => ActionResponse::failure(message),
    }
}

/// Toggles logging of default deliveries.
#[flutter_rust_bridge::frb(sync)]
pub fn settings_set_logging_enabled(enabled: bool) -> ActionResponse {
    match with_journal(|journal| {
        journal
            .settings()
            .set_logging_enabled(enabled)
            .map_err(|err| err.to_string())
    }) {
        Ok(()) => ActionResponse::success("Logging preference saved."),
        Err(err) => ActionResponse::failure(format!("settings_set_logging_enabled failed: {err}")),
    }
}

/// A notification was presented while the app was in the foreground.
///
/// `others` are the remaining delivered records read from the platform.
#[flutter_rust_bridge::frb(sync)]
pub fn journal_on_presented(
    source_id: String,
    others: Vec<DeliveredNotification>,
    now_epoch_ms: i64,
) -> ReconcileResponse {
    reconcile("journal_on_presented", now_epoch_ms, |journal, now| {
        let others = to_delivered_records(others)?;
        Ok(journal.on_presented(&source_id, others, now))
    })
}

/// The user interacted with a delivered notification.
///
/// Input semantics:
/// - `action`: `reply|default|dismiss`.
/// - `reply_text`: required for `reply`, ignored otherwise.
#[flutter_rust_bridge::frb(sync)]
pub fn journal_on_response(
    source_id: String,
    action: String,
    reply_text: Option<String>,
    now_epoch_ms: i64,
) -> ReconcileResponse {
    let action = match parse_response_action(&action, reply_text) {
        Ok(action) => action,
        Err(message) => return ReconcileResponse::failure(message),
    };
    reconcile("journal_on_response", now_epoch_ms, |journal, now| {
        Ok(journal.on_response(&source_id, action, now))
    })
}

/// Foreground-resume pass over the platform's delivered list.
#[flutter_rust_bridge::frb(sync)]
pub fn journal_on_resumed(
    delivered: Vec<DeliveredNotification>,
    now_epoch_ms: i64,
) -> ReconcileResponse {
    reconcile("journal_on_resumed", now_epoch_ms, |journal, now| {
        let delivered = to_delivered_records(delivered)?;
        Ok(journal.on_resumed(delivered, now))
    })
}

/// Catch-up pass run from an OS background wake. The host re-registers the
/// next refresh and re-arms after purging the returned ids.
#[flutter_rust_bridge::frb(sync)]
pub fn journal_on_background_wake(
    delivered: Vec<DeliveredNotification>,
    now_epoch_ms: i64,
) -> ReconcileResponse {
    reconcile("journal_on_background_wake", now_epoch_ms, |journal, now| {
        let delivered = to_delivered_records(delivered)?;
        Ok(journal.on_background_wake(delivered, now))
    })
}

/// The app is going to the background.
#[flutter_rust_bridge::frb(sync)]
pub fn journal_on_backgrounded(now_epoch_ms: i64) -> ActionResponse {
    let result = parse_epoch_ms(now_epoch_ms).and_then(|now| {
        with_journal(|journal| {
            journal.advance_checkpoint(now);
            if let Err(err) = journal.store_mut().flush() {
                warn!("event=journal_flush module=ffi status=error error={err}");
            }
            Ok(())
        })
    });
    match result {
        Ok(()) => ActionResponse::success("Checkpoint saved."),
        Err(err) => ActionResponse::failure(format!("journal_on_backgrounded failed: {err}")),
    }
}

/// Plans the next notification batch (at most 64 requests).
#[flutter_rust_bridge::frb(sync)]
pub fn journal_plan_next_batch(now_epoch_ms: i64) -> PlanResponse {
    let result = parse_epoch_ms(now_epoch_ms).and_then(|now| {
        with_journal(|journal| {
            plan_batch(journal.settings(), journal.time_zone(), now).map_err(|err| err.to_string())
        })
    });
    match result {
        Ok(batch) => PlanResponse {
            ok: true,
            message: format!("Planned {} notification(s).", batch.len()),
            items: batch
                .into_iter()
                .map(|notification| PlannedNotification {
                    id: notification.id,
                    fire_at_epoch_ms: notification.fire_at.timestamp_millis(),
                    title: notification.content.title,
                    body: notification.content.body,
                    category: notification.content.category,
                })
                .collect(),
        },
        Err(err) => PlanResponse {
            ok: false,
            items: Vec::new(),
            message: format!("journal_plan_next_batch failed: {err}"),
        },
    }
}

/// Lists journal entries of one local calendar day, newest first.
#[flutter_rust_bridge::frb(sync)]
pub fn journal_entries_for_day(year: i32, month: u32, day: u32) -> JournalEntriesResponse {
    let Some(date) = NaiveDate::from_ymd_opt(year, month, day) else {
        return JournalEntriesResponse {
            ok: false,
            items: Vec::new(),
            message: format!("invalid date {year:04}-{month:02}-{day:02}"),
        };
    };
    match with_journal(|journal| Ok(journal.store().entries_on(date, journal.time_zone()))) {
        Ok(entries) => JournalEntriesResponse {
            ok: true,
            items: entries
                .into_iter()
                .map(|entry| JournalEntryItem {
                    entry_id: entry.id.to_string(),
                    source_kind: source_kind_label(&entry.source_id).to_string(),
                    timestamp_epoch_ms: entry.timestamp.timestamp_millis(),
                    text: entry.text,
                })
                .collect(),
            message: String::new(),
        },
        Err(err) => JournalEntriesResponse {
            ok: false,
            items: Vec::new(),
            message: format!("journal_entries_for_day failed: {err}"),
        },
    }
}

/// Logs a note typed by the user. Text is trimmed; empty text is rejected.
#[flutter_rust_bridge::frb(sync)]
pub fn journal_log_manual(text: String, now_epoch_ms: i64) -> EntryActionResponse {
    let result = parse_epoch_ms(now_epoch_ms).and_then(|now| {
        with_journal(|journal| {
            journal
                .store_mut()
                .log_manual(&text, now)
                .map_err(|err| err.to_string())
        })
    });
    match result {
        Ok(id) => EntryActionResponse {
            ok: true,
            entry_id: Some(id.to_string()),
            message: "Entry logged.".to_string(),
        },
        Err(err) => EntryActionResponse {
            ok: false,
            entry_id: None,
            message: format!("journal_log_manual failed: {err}"),
        },
    }
}

/// Replaces an entry's text and, when given, its timestamp.
#[flutter_rust_bridge::frb(sync)]
pub fn journal_update_entry(
    entry_id: String,
    text: String,
    timestamp_epoch_ms: Option<i64>,
) -> ActionResponse {
    let result = parse_entry_id(&entry_id).and_then(|id| {
        let timestamp = timestamp_epoch_ms.map(parse_epoch_ms).transpose()?;
        with_journal(|journal| Ok(journal.store_mut().update(id, &text, timestamp)))
    });
    match result {
        Ok(true) => ActionResponse::success("Entry updated."),
        Ok(false) => ActionResponse::failure(format!("entry `{entry_id}` not found")),
        Err(err) => ActionResponse::failure(format!("journal_update_entry failed: {err}")),
    }
}

/// Deletes one entry.
#[flutter_rust_bridge::frb(sync)]
pub fn journal_remove_entry(entry_id: String) -> ActionResponse {
    let result = parse_entry_id(&entry_id)
        .and_then(|id| with_journal(|journal| Ok(journal.store_mut().remove(id))));
    match result {
        Ok(true) => ActionResponse::success("Entry removed."),
        Ok(false) => ActionResponse::failure(format!("entry `{entry_id}` not found")),
        Err(err) => ActionResponse::failure(format!("journal_remove_entry failed: {err}")),
    }
}

fn reconcile(
    operation: &'static str,
    now_epoch_ms: i64,
    f: impl FnOnce(&mut SqliteReconciler<Local>, DateTime<Utc>) -> Result<ReconcileReport, String>,
) -> ReconcileResponse {
    match parse_epoch_ms(now_epoch_ms).and_then(|now| with_journal(|journal| f(journal, now))) {
        Ok(report) => ReconcileResponse::from_report(report),
        Err(err) => ReconcileResponse::failure(format!("{operation} failed: {err}")),
    }
}

/// Runs `f` against the process-wide reconciler, opening it on first use.
fn with_journal<T>(
    f: impl FnOnce(&mut SqliteReconciler<Local>) -> Result<T, String>,
) -> Result<T, String> {
    let mut guard = JOURNAL
        .lock()
        .map_err(|_| "journal lock poisoned".to_string())?;
    if guard.is_none() {
        let db_path = resolve_journal_db_path();
        let conn = open_db(&db_path).map_err(|err| format!("journal DB open failed: {err}"))?;
        let reconciler = open_reconciler(conn, Local)
            .map_err(|err| format!("journal init failed: {err}"))?;
        info!(
            "event=journal_open module=ffi status=ok entries={}",
            reconciler.store().len()
        );
        *guard = Some(reconciler);
    }
    match guard.as_mut() {
        Some(journal) => f(journal),
        None => Err("journal unavailable".to_string()),
    }
}

fn resolve_journal_db_path() -> PathBuf {
    JOURNAL_DB_PATH
        .get_or_init(|| {
            if let Ok(raw) = std::env::var(DB_PATH_ENV) {
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    return PathBuf::from(trimmed);
                }
            }
            std::env::temp_dir().join(JOURNAL_DB_FILE_NAME)
        })
        .clone()
}

fn to_settings_dto(config: &RecurrenceConfig) -> ReminderSettings {
    ReminderSettings {
        message_text: config.message_text.clone(),
        interval_minutes: config.interval_minutes,
        weekdays: config.weekdays.iter().copied().collect(),
        daily_start_minute: minute_of_day(config.daily_start),
        daily_end_minute: minute_of_day(config.daily_end),
    }
}

fn from_settings_dto(settings: ReminderSettings) -> Result<RecurrenceConfig, String> {
    Ok(RecurrenceConfig {
        message_text: settings.message_text.trim().to_string(),
        interval_minutes: settings.interval_minutes,
        weekdays: settings.weekdays.into_iter().collect(),
        daily_start: time_from_minute(settings.daily_start_minute)?,
        daily_end: time_from_minute(settings.daily_end_minute)?,
    })
}

fn minute_of_day(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

fn time_from_minute(minute: u32) -> Result<NaiveTime, String> {
    NaiveTime::from_hms_opt(minute / 60, minute % 60, 0)
        .ok_or_else(|| format!("minute of day {minute} is outside 0..1440"))
}

fn parse_response_action(
    action: &str,
    reply_text: Option<String>,
) -> Result<ResponseAction, String> {
    match action.trim().to_ascii_lowercase().as_str() {
        "reply" => reply_text
            .map(ResponseAction::Reply)
            .ok_or_else(|| "reply action requires reply_text".to_string()),
        "default" => Ok(ResponseAction::DefaultAction),
        "dismiss" => Ok(ResponseAction::Dismissed),
        other => Err(format!("unsupported response action `{other}`")),
    }
}

fn to_delivered_records(items: Vec<DeliveredNotification>) -> Result<Vec<DeliveredRecord>, String> {
    items
        .into_iter()
        .map(|item| {
            Ok(DeliveredRecord {
                id: item.id,
                content: None,
                delivered_at: parse_epoch_ms(item.delivered_at_epoch_ms)?,
            })
        })
        .collect()
}

fn parse_epoch_ms(value: i64) -> Result<DateTime<Utc>, String> {
    DateTime::from_timestamp_millis(value)
        .ok_or_else(|| format!("timestamp {value} is out of range"))
}

fn parse_entry_id(raw: &str) -> Result<EntryId, String> {
    Uuid::parse_str(raw.trim()).map_err(|_| format!("invalid entry id `{raw}`"))
}

fn source_kind_label(source_id: &SourceId) -> &'static str {
    match source_id {
        SourceId::Delivery(_) => "delivery",
        SourceId::Backfill(_) => "backfill",
        SourceId::Manual(_) => "manual",
    }
}

fn count(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}
