//! Settings and checkpoint persistence.
//!
//! # Responsibility
//! - Persist the user's `RecurrenceConfig` and the logging-enabled flag as
//!   simple key-value pairs.
//! - Persist the single process-wide reconciliation checkpoint.
//!
//! # Invariants
//! - A configuration is only written after `validate()` succeeds.
//! - Logging-enabled defaults to `true` when never set.
//! - Any missing configuration key means "no configuration".

use crate::model::recurrence::{RecurrenceConfig, RecurrenceValidationError};
use crate::repo::kv_repo::{KeyValueRepository, RepoError, RepoResult};
use chrono::{DateTime, NaiveTime, Utc};
use log::info;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

const KEY_REMINDER_TEXT: &str = "reminder_text";
const KEY_REMINDER_INTERVAL: &str = "reminder_interval";
const KEY_REMINDER_START_TIME: &str = "reminder_start_time";
const KEY_REMINDER_END_TIME: &str = "reminder_end_time";
const KEY_REMINDER_DAYS: &str = "reminder_days";
const KEY_LOG_DEFAULT_DELIVERY: &str = "log_default_delivery";
const KEY_RECONCILE_CHECKPOINT: &str = "reconcile_checkpoint";

const TIME_FORMAT: &str = "%H:%M";

/// Errors returned when saving a configuration.
#[derive(Debug)]
pub enum SettingsError {
    Invalid(RecurrenceValidationError),
    Repo(RepoError),
}

impl Display for SettingsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invalid(err) => write!(f, "invalid reminder configuration: {err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SettingsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Invalid(err) => Some(err),
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<RecurrenceValidationError> for SettingsError {
    fn from(value: RecurrenceValidationError) -> Self {
        Self::Invalid(value)
    }
}

impl From<RepoError> for SettingsError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// User settings consumed by the planner and reconciler.
pub trait SettingsStore {
    fn recurrence_config(&self) -> RepoResult<Option<RecurrenceConfig>>;
    fn save_recurrence_config(&self, config: &RecurrenceConfig) -> Result<(), SettingsError>;
    fn logging_enabled(&self) -> RepoResult<bool>;
    fn set_logging_enabled(&self, enabled: bool) -> RepoResult<()>;
}

/// Last instant up to which deliveries are known to be reconciled.
pub trait CheckpointStore {
    fn checkpoint(&self) -> RepoResult<Option<DateTime<Utc>>>;
    fn set_checkpoint(&self, at: DateTime<Utc>) -> RepoResult<()>;
}

/// Settings and checkpoint store over a key-value repository.
#[derive(Clone)]
pub struct KvSettingsStore<K: KeyValueRepository> {
    kv: K,
}

impl<K: KeyValueRepository> KvSettingsStore<K> {
    pub fn new(kv: K) -> Self {
        Self { kv }
    }

    fn get_text(&self, key: &str) -> RepoResult<Option<String>> {
        match self.kv.get(key)? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| RepoError::InvalidData(format!("`{key}` is not valid UTF-8"))),
            None => Ok(None),
        }
    }

    fn put_text(&self, key: &str, value: &str) -> RepoResult<()> {
        self.kv.put(key, value.as_bytes())
    }
}

impl<K: KeyValueRepository> SettingsStore for KvSettingsStore<K> {
    fn recurrence_config(&self) -> RepoResult<Option<RecurrenceConfig>> {
        let (Some(text), Some(interval), Some(start), Some(end), Some(days)) = (
            self.get_text(KEY_REMINDER_TEXT)?,
            self.get_text(KEY_REMINDER_INTERVAL)?,
            self.get_text(KEY_REMINDER_START_TIME)?,
            self.get_text(KEY_REMINDER_END_TIME)?,
            self.get_text(KEY_REMINDER_DAYS)?,
        ) else {
            return Ok(None);
        };

        let interval_minutes = interval.parse::<u32>().map_err(|_| {
            RepoError::InvalidData(format!("invalid `{KEY_REMINDER_INTERVAL}` value `{interval}`"))
        })?;
        let weekdays: BTreeSet<u8> = serde_json::from_str(&days)?;
        let config = RecurrenceConfig {
            interval_minutes,
            weekdays,
            daily_start: parse_time(KEY_REMINDER_START_TIME, &start)?,
            daily_end: parse_time(KEY_REMINDER_END_TIME, &end)?,
            message_text: text,
        };
        config
            .validate()
            .map_err(|err| RepoError::InvalidData(format!("stored configuration: {err}")))?;
        Ok(Some(config))
    }

    fn save_recurrence_config(&self, config: &RecurrenceConfig) -> Result<(), SettingsError> {
        config.validate()?;

        self.put_text(KEY_REMINDER_TEXT, &config.message_text)?;
        self.put_text(KEY_REMINDER_INTERVAL, &config.interval_minutes.to_string())?;
        self.put_text(
            KEY_REMINDER_START_TIME,
            &config.daily_start.format(TIME_FORMAT).to_string(),
        )?;
        self.put_text(
            KEY_REMINDER_END_TIME,
            &config.daily_end.format(TIME_FORMAT).to_string(),
        )?;
        let days = serde_json::to_string(&config.weekdays).map_err(RepoError::from)?;
        self.put_text(KEY_REMINDER_DAYS, &days)?;

        info!(
            "event=settings_save module=settings status=ok interval_minutes={} weekdays={}",
            config.interval_minutes,
            config.weekdays.len()
        );
        Ok(())
    }

    fn logging_enabled(&self) -> RepoResult<bool> {
        match self.get_text(KEY_LOG_DEFAULT_DELIVERY)?.as_deref() {
            None => Ok(true),
            Some("true") => Ok(true),
            Some("false") => Ok(false),
            Some(other) => Err(RepoError::InvalidData(format!(
                "invalid `{KEY_LOG_DEFAULT_DELIVERY}` value `{other}`"
            ))),
        }
    }

    fn set_logging_enabled(&self, enabled: bool) -> RepoResult<()> {
        self.put_text(KEY_LOG_DEFAULT_DELIVERY, if enabled { "true" } else { "false" })
    }
}

impl<K: KeyValueRepository> CheckpointStore for KvSettingsStore<K> {
    fn checkpoint(&self) -> RepoResult<Option<DateTime<Utc>>> {
        let Some(raw) = self.get_text(KEY_RECONCILE_CHECKPOINT)? else {
            return Ok(None);
        };
        DateTime::parse_from_rfc3339(&raw)
            .map(|at| Some(at.with_timezone(&Utc)))
            .map_err(|_| RepoError::InvalidData(format!("invalid checkpoint `{raw}`")))
    }

    fn set_checkpoint(&self, at: DateTime<Utc>) -> RepoResult<()> {
        self.put_text(KEY_RECONCILE_CHECKPOINT, &at.to_rfc3339())
    }
}

fn parse_time(key: &str, raw: &str) -> RepoResult<NaiveTime> {
    NaiveTime::parse_from_str(raw, TIME_FORMAT)
        .map_err(|_| RepoError::InvalidData(format!("invalid `{key}` value `{raw}`")))
}

#[cfg(test)]
mod tests {
    use super::{CheckpointStore, KvSettingsStore, SettingsError, SettingsStore};
    use crate::db::open_db_in_memory;
    use crate::model::recurrence::RecurrenceConfig;
    use crate::repo::kv_repo::SqliteKeyValueRepository;
    use chrono::{NaiveTime, TimeZone, Utc};

    fn store() -> KvSettingsStore<SqliteKeyValueRepository> {
        let kv = SqliteKeyValueRepository::try_new(open_db_in_memory().unwrap()).unwrap();
        KvSettingsStore::new(kv)
    }

    fn weekday_config() -> RecurrenceConfig {
        RecurrenceConfig {
            interval_minutes: 45,
            weekdays: [2, 4, 6].into_iter().collect(),
            daily_start: NaiveTime::from_hms_opt(8, 15, 0).unwrap(),
            daily_end: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            message_text: "drink water".to_string(),
        }
    }

    #[test]
    fn missing_config_reads_as_none() {
        assert_eq!(store().recurrence_config().unwrap(), None);
    }

    #[test]
    fn saved_config_reads_back() {
        let store = store();
        store.save_recurrence_config(&weekday_config()).unwrap();
        assert_eq!(store.recurrence_config().unwrap(), Some(weekday_config()));
    }

    #[test]
    fn invalid_config_is_not_written() {
        let store = store();
        let mut config = weekday_config();
        config.daily_end = config.daily_start;

        let err = store.save_recurrence_config(&config).unwrap_err();
        assert!(matches!(err, SettingsError::Invalid(_)));
        assert_eq!(store.recurrence_config().unwrap(), None);
    }

    #[test]
    fn logging_flag_defaults_to_enabled() {
        let store = store();
        assert!(store.logging_enabled().unwrap());
        store.set_logging_enabled(false).unwrap();
        assert!(!store.logging_enabled().unwrap());
    }

    #[test]
    fn checkpoint_roundtrips() {
        let store = store();
        assert_eq!(store.checkpoint().unwrap(), None);
        let at = Utc.with_ymd_and_hms(2025, 7, 7, 9, 30, 0).unwrap();
        store.set_checkpoint(at).unwrap();
        assert_eq!(store.checkpoint().unwrap(), Some(at));
    }
}
