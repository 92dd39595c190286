//! Recurrence configuration model.
//!
//! # Responsibility
//! - Describe when reminders should fire: interval, weekdays and a daily
//!   wall-clock window.
//! - Reject invalid configurations at edit time so the planner never sees
//!   them.
//!
//! # Invariants
//! - Weekday indices follow the host calendar: 1 = Sunday ... 7 = Saturday.
//! - A saved configuration always passes `validate()`.

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Default reminder body shown on first launch.
pub const DEFAULT_MESSAGE_TEXT: &str = "Don't let TIME slide.";

/// Edit-time validation errors for `RecurrenceConfig`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecurrenceValidationError {
    ZeroInterval,
    NoWeekdays,
    WeekdayOutOfRange(u8),
    EndNotAfterStart { start: NaiveTime, end: NaiveTime },
}

impl RecurrenceValidationError {
    /// Message suitable for an alert in the configuration form.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::ZeroInterval => "The reminder interval must be at least one minute.",
            Self::NoWeekdays => "Select at least one day for reminders.",
            Self::WeekdayOutOfRange(_) => "Selected days are not valid.",
            Self::EndNotAfterStart { .. } => "The end time should be later than the start time.",
        }
    }
}

impl Display for RecurrenceValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroInterval => write!(f, "interval_minutes must be greater than zero"),
            Self::NoWeekdays => write!(f, "weekdays must not be empty"),
            Self::WeekdayOutOfRange(day) => write!(f, "weekday index {day} is outside 1..=7"),
            Self::EndNotAfterStart { start, end } => {
                write!(f, "daily_end ({end}) must be after daily_start ({start})")
            }
        }
    }
}

impl Error for RecurrenceValidationError {}

/// User's scheduling intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceConfig {
    /// Spacing between consecutive fire-times on one day.
    pub interval_minutes: u32,
    /// Eligible weekday indices (1 = Sunday).
    pub weekdays: BTreeSet<u8>,
    /// First fire-time of each eligible day; the grid is anchored here.
    pub daily_start: NaiveTime,
    /// Last allowed fire-time of each eligible day (inclusive).
    pub daily_end: NaiveTime,
    /// Reminder body.
    pub message_text: String,
}

impl RecurrenceConfig {
    /// Converts the hour/minute pickers into an interval in minutes.
    pub fn interval_from_parts(hours: u32, minutes: u32) -> u32 {
        hours.saturating_mul(60).saturating_add(minutes)
    }

    /// Checks every edit-time constraint, reporting the first failure.
    pub fn validate(&self) -> Result<(), RecurrenceValidationError> {
        if self.interval_minutes == 0 {
            return Err(RecurrenceValidationError::ZeroInterval);
        }
        if self.weekdays.is_empty() {
            return Err(RecurrenceValidationError::NoWeekdays);
        }
        if let Some(day) = self.weekdays.iter().find(|day| !(1..=7).contains(*day)) {
            return Err(RecurrenceValidationError::WeekdayOutOfRange(*day));
        }
        if self.daily_end <= self.daily_start {
            return Err(RecurrenceValidationError::EndNotAfterStart {
                start: self.daily_start,
                end: self.daily_end,
            });
        }
        Ok(())
    }

    /// Returns whether reminders may fire on `weekday`.
    pub fn fires_on(&self, weekday: Weekday) -> bool {
        u8::try_from(weekday.number_from_sunday())
            .map(|index| self.weekdays.contains(&index))
            .unwrap_or(false)
    }
}
