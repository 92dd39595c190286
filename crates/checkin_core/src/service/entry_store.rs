//! Journal entry store.
//!
//! # Responsibility
//! - Hold the authoritative in-memory journal for the session.
//! - Deduplicate appends by source id and persist every mutation before
//!   returning.
//!
//! # Invariants
//! - At most one entry exists per `SourceId`.
//! - Entries change only through `update` and disappear only through
//!   `remove`.
//! - A failed write never rolls back the in-memory journal; the store stays
//!   dirty until a later write (or `flush`) succeeds.

use crate::model::entry::{EntryId, ReminderEntry, SourceId};
use crate::repo::journal_repo::JournalRepository;
use crate::repo::kv_repo::RepoResult;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Result of an `append` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended(EntryId),
    /// An entry for the same source already exists; carries its id.
    Duplicate(EntryId),
}

impl AppendOutcome {
    pub fn is_appended(&self) -> bool {
        matches!(self, Self::Appended(_))
    }
}

/// Rejection of a manually typed note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualEntryError {
    EmptyText,
}

impl Display for ManualEntryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyText => write!(f, "manual entry text is empty"),
        }
    }
}

impl Error for ManualEntryError {}

/// Durable, deduplicating journal.
pub struct EntryStore<R: JournalRepository> {
    repo: R,
    entries: Vec<ReminderEntry>,
    dirty: bool,
}

impl<R: JournalRepository> EntryStore<R> {
    /// Reads the full journal from `repo`.
    ///
    /// # Errors
    /// - Returns repository errors unchanged; an unreadable journal is never
    ///   replaced by an empty one.
    pub fn load(repo: R) -> RepoResult<Self> {
        let entries = repo.load_entries().inspect_err(|err| {
            error!("event=journal_load module=entry_store status=error error={err}");
        })?;
        info!(
            "event=journal_load module=entry_store status=ok entries={}",
            entries.len()
        );
        Ok(Self {
            repo,
            entries,
            dirty: false,
        })
    }

    /// Appends `entry` unless its source id was already logged.
    pub fn append(&mut self, entry: ReminderEntry) -> AppendOutcome {
        if let Some(existing) = self.find_by_source(&entry.source_id) {
            warn!(
                "event=journal_append module=entry_store status=skip reason=duplicate source={}",
                entry.source_id
            );
            return AppendOutcome::Duplicate(existing.id);
        }

        let id = entry.id;
        info!(
            "event=journal_append module=entry_store status=ok source={}",
            entry.source_id
        );
        self.entries.push(entry);
        self.persist("journal_append");
        AppendOutcome::Appended(id)
    }

    /// Replaces the text (and optionally the timestamp) of entry `id`.
    ///
    /// Returns `false` without side effects when `id` is unknown.
    pub fn update(&mut self, id: EntryId, new_text: &str, new_date: Option<DateTime<Utc>>) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|entry| entry.id == id) else {
            return false;
        };
        entry.text = new_text.to_string();
        if let Some(date) = new_date {
            entry.timestamp = date;
        }
        self.persist("journal_update");
        true
    }

    /// Deletes entry `id`. Returns `false` when `id` is unknown.
    pub fn remove(&mut self, id: EntryId) -> bool {
        let Some(index) = self.entries.iter().position(|entry| entry.id == id) else {
            return false;
        };
        self.entries.remove(index);
        self.persist("journal_remove");
        true
    }

    /// Logs a note typed by the user at `now`.
    pub fn log_manual(
        &mut self,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<EntryId, ManualEntryError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ManualEntryError::EmptyText);
        }
        let entry = ReminderEntry::new(SourceId::manual(), now, trimmed);
        let id = entry.id;
        self.append(entry);
        Ok(id)
    }

    /// Entries with `from <= timestamp < to`, newest first.
    pub fn query(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<ReminderEntry> {
        self.newest_first(|entry| entry.timestamp >= from && entry.timestamp < to)
    }

    /// Entries whose timestamp falls on local calendar day `date`, newest first.
    pub fn entries_on<Tz: TimeZone>(&self, date: NaiveDate, tz: &Tz) -> Vec<ReminderEntry> {
        self.newest_first(|entry| entry.timestamp.with_timezone(tz).date_naive() == date)
    }

    pub fn get(&self, id: EntryId) -> Option<&ReminderEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn find_by_source(&self, source_id: &SourceId) -> Option<&ReminderEntry> {
        self.entries
            .iter()
            .find(|entry| &entry.source_id == source_id)
    }

    pub fn has_logged(&self, source_id: &SourceId) -> bool {
        self.find_by_source(source_id).is_some()
    }

    /// All entries in insertion order.
    pub fn entries(&self) -> &[ReminderEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the last write failed and storage lags the session state.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Rewrites the journal if a previous write failed.
    pub fn flush(&mut self) -> RepoResult<()> {
        if !self.dirty {
            return Ok(());
        }
        self.repo.save_entries(&self.entries)?;
        self.dirty = false;
        Ok(())
    }

    fn newest_first(&self, keep: impl Fn(&ReminderEntry) -> bool) -> Vec<ReminderEntry> {
        let mut matched: Vec<ReminderEntry> =
            self.entries.iter().filter(|entry| keep(entry)).cloned().collect();
        matched.sort_by(|left, right| right.timestamp.cmp(&left.timestamp));
        matched
    }

    fn persist(&mut self, event: &'static str) {
        match self.repo.save_entries(&self.entries) {
            Ok(()) => self.dirty = false,
            Err(err) => {
                self.dirty = true;
                error!(
                    "event={event} module=entry_store status=error \
                     error_code=persist_failed entries={} error={err}",
                    self.entries.len()
                );
            }
        }
    }
}
