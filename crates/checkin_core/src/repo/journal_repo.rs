//! Journal blob persistence.
//!
//! # Responsibility
//! - Load the full journal on startup and rewrite it on every mutation.
//!
//! # Invariants
//! - The journal is one JSON array under `JOURNAL_KEY`; record order is
//!   insertion order.
//! - A missing key means an empty journal; an unreadable blob is an error.

use crate::model::entry::ReminderEntry;
use crate::repo::kv_repo::{KeyValueRepository, RepoResult};

/// Storage key holding the serialized journal.
pub const JOURNAL_KEY: &str = "reminder_entries";

/// Whole-collection persistence for journal records.
pub trait JournalRepository {
    fn load_entries(&self) -> RepoResult<Vec<ReminderEntry>>;
    fn save_entries(&self, entries: &[ReminderEntry]) -> RepoResult<()>;
}

/// Journal repository serializing into a key-value store.
#[derive(Clone)]
pub struct KvJournalRepository<K: KeyValueRepository> {
    kv: K,
}

impl<K: KeyValueRepository> KvJournalRepository<K> {
    pub fn new(kv: K) -> Self {
        Self { kv }
    }
}

impl<K: KeyValueRepository> JournalRepository for KvJournalRepository<K> {
    fn load_entries(&self) -> RepoResult<Vec<ReminderEntry>> {
        match self.kv.get(JOURNAL_KEY)? {
            Some(blob) => Ok(serde_json::from_slice(&blob)?),
            None => Ok(Vec::new()),
        }
    }

    fn save_entries(&self, entries: &[ReminderEntry]) -> RepoResult<()> {
        let blob = serde_json::to_vec(entries)?;
        self.kv.put(JOURNAL_KEY, &blob)
    }
}

#[cfg(test)]
mod tests {
    use super::{JournalRepository, KvJournalRepository, JOURNAL_KEY};
    use crate::db::open_db_in_memory;
    use crate::model::entry::{ReminderEntry, SourceId};
    use crate::repo::kv_repo::{KeyValueRepository, RepoError, SqliteKeyValueRepository};
    use chrono::Utc;

    fn kv() -> SqliteKeyValueRepository {
        SqliteKeyValueRepository::try_new(open_db_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn missing_blob_loads_as_empty_journal() {
        let repo = KvJournalRepository::new(kv());
        assert!(repo.load_entries().unwrap().is_empty());
    }

    #[test]
    fn save_then_load_preserves_order() {
        let repo = KvJournalRepository::new(kv());
        let entries = vec![
            ReminderEntry::delivered(SourceId::delivery("b"), Utc::now()),
            ReminderEntry::new(SourceId::manual(), Utc::now(), "note"),
        ];
        repo.save_entries(&entries).unwrap();
        assert_eq!(repo.load_entries().unwrap(), entries);
    }

    #[test]
    fn corrupt_blob_is_reported() {
        let store = kv();
        store.put(JOURNAL_KEY, b"not json").unwrap();
        let err = KvJournalRepository::new(store).load_entries().unwrap_err();
        assert!(matches!(err, RepoError::Serialization(_)));
    }
}
