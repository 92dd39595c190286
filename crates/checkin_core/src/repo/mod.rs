//! Repository layer over the key-value journal database.
//!
//! # Responsibility
//! - Own every SQL statement issued by core.
//! - Serialize the journal and settings into stable storage keys.
//!
//! # Invariants
//! - Repositories only accept connections at the latest schema version.
//! - The journal is stored as one blob and rewritten in full on save.

pub mod journal_repo;
pub mod kv_repo;
