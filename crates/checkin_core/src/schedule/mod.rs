//! Fire-time planning for recurring reminders.
//!
//! # Responsibility
//! - Map a `RecurrenceConfig` to concrete fire-times, forward (to arm the
//!   platform queue) and backward (to reconstruct missed deliveries).
//!
//! # Invariants
//! - Planning is pure: no clock reads, no I/O.
//! - The grid is always anchored at `daily_start` of each eligible day.

pub mod planner;
