//! Reminder journal use-case services.
//!
//! # Responsibility
//! - `entry_store`: deduplicating, persisted journal.
//! - `reconciler`: delivery events and missed-delivery backfill.
//! - `rearm`: next-batch planning handed to the platform queue.
//! - `worker`: single-writer task serializing all triggers.

pub mod entry_store;
pub mod rearm;
pub mod reconciler;
pub mod worker;
