//! Domain model for the reminder journal.
//!
//! # Responsibility
//! - Define the journal record (`ReminderEntry`) and its provenance
//!   (`SourceId`).
//! - Define the user's scheduling intent (`RecurrenceConfig`) and its
//!   edit-time validation.
//!
//! # Invariants
//! - Every journal record is identified by a stable `EntryId`.
//! - At most one record exists per `SourceId::Delivery` value.

pub mod entry;
pub mod recurrence;
