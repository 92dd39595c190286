//! Delivery reconciler.
//!
//! # Responsibility
//! - Turn platform delivery events into journal entries, exactly once per
//!   real notification id.
//! - Backfill fire-times that elapsed while the app was not running.
//! - Tell the host which delivered records to purge so the platform backlog
//!   stays bounded.
//!
//! # Invariants
//! - A `SourceId::Delivery` value produces at most one entry, whatever the
//!   trigger order.
//! - A fire-time `t` is backfilled only when no real entry sits in
//!   `[t, t + interval)`; replies and late deliveries stamped after `t`
//!   still represent it.
//! - Default-delivery logging honours the logging-enabled flag; replies are
//!   always logged.
//! - Every delivered record handed to a pass appears in that pass's
//!   `purge_ids`.
//! - The checkpoint only moves forward, and every resume or wake pass leaves
//!   it at the pass's `now`.
//! - All mutations go through `&mut self`; callers that receive events from
//!   several sources must funnel them through one owner (see
//!   `service::worker`).

use crate::model::entry::{EntryId, ReminderEntry, SourceId};
use crate::platform::DeliveredRecord;
use crate::repo::journal_repo::JournalRepository;
use crate::schedule::planner::reconstruct_between;
use crate::service::entry_store::{AppendOutcome, EntryStore};
use crate::settings::{CheckpointStore, SettingsStore};
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use log::{error, info, warn};

/// How the user reacted to a delivered notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseAction {
    /// Inline text reply.
    Reply(String),
    /// Tap on the notification body.
    DefaultAction,
    /// Notification swiped away; nothing is logged.
    Dismissed,
}

/// Typed trigger consumed by `Reconciler::handle_event`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReminderEvent {
    /// A notification was presented while the app was running. `others` are
    /// the remaining delivered records the platform still holds.
    Presented {
        source_id: String,
        others: Vec<DeliveredRecord>,
    },
    UserResponded {
        source_id: String,
        action: ResponseAction,
    },
    /// The app returned to the foreground; `delivered` is the platform's
    /// delivered-record list read just before.
    ForegroundResumed { delivered: Vec<DeliveredRecord> },
    /// The OS woke the app in the background.
    BackgroundWake { delivered: Vec<DeliveredRecord> },
    Backgrounded,
}

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Ids of entries created by this pass, backfilled ones included.
    pub appended: Vec<EntryId>,
    /// Entries whose text was replaced by a reply.
    pub updated: Vec<EntryId>,
    /// Source ids that were already logged.
    pub duplicates: usize,
    /// Default deliveries not logged because logging is disabled.
    pub skipped_disabled: usize,
    /// Reconstructed fire-times appended as synthetic entries.
    pub backfilled: usize,
    /// Delivered-record ids the host must purge from the platform.
    pub purge_ids: Vec<String>,
}

impl ReconcileReport {
    fn record(&mut self, outcome: AppendOutcome) {
        match outcome {
            AppendOutcome::Appended(id) => self.appended.push(id),
            AppendOutcome::Duplicate(_) => self.duplicates += 1,
        }
    }
}

/// Single owner of the journal and the checkpoint.
pub struct Reconciler<R, S, Tz>
where
    R: JournalRepository,
    S: SettingsStore + CheckpointStore,
    Tz: TimeZone,
{
    store: EntryStore<R>,
    settings: S,
    tz: Tz,
}

impl<R, S, Tz> Reconciler<R, S, Tz>
where
    R: JournalRepository,
    S: SettingsStore + CheckpointStore,
    Tz: TimeZone,
{
    pub fn new(store: EntryStore<R>, settings: S, tz: Tz) -> Self {
        Self {
            store,
            settings,
            tz,
        }
    }

    /// Dispatches one event. This is the only entry point hosts need.
    pub fn handle_event(&mut self, event: ReminderEvent, now: DateTime<Utc>) -> ReconcileReport {
        match event {
            ReminderEvent::Presented { source_id, others } => {
                self.on_presented(&source_id, others, now)
            }
            ReminderEvent::UserResponded { source_id, action } => {
                self.on_response(&source_id, action, now)
            }
            ReminderEvent::ForegroundResumed { delivered } => self.on_resumed(delivered, now),
            ReminderEvent::BackgroundWake { delivered } => self.on_background_wake(delivered, now),
            ReminderEvent::Backgrounded => {
                self.advance_checkpoint(now);
                ReconcileReport::default()
            }
        }
    }

    /// Logs a live delivery and drains every other delivered record.
    pub fn on_presented(
        &mut self,
        source_id: &str,
        others: Vec<DeliveredRecord>,
        now: DateTime<Utc>,
    ) -> ReconcileReport {
        let logging = self.logging_enabled();
        let mut report = ReconcileReport::default();

        if logging {
            let outcome = self
                .store
                .append(ReminderEntry::delivered(SourceId::delivery(source_id), now));
            report.record(outcome);
        } else {
            report.skipped_disabled += 1;
        }

        let stale: Vec<DeliveredRecord> = others
            .into_iter()
            .filter(|record| record.id != source_id)
            .collect();
        self.reconcile_delivered(&mut report, stale, logging);

        info!(
            "event=reconcile_presented module=reconciler status=ok \
             logging={} appended={} purged={}",
            logging,
            report.appended.len(),
            report.purge_ids.len()
        );
        report
    }

    /// Logs a user interaction with a delivered notification.
    pub fn on_response(
        &mut self,
        source_id: &str,
        action: ResponseAction,
        now: DateTime<Utc>,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let source = SourceId::delivery(source_id);

        match action {
            ResponseAction::Reply(text) => {
                if let Some(existing) = self.store.find_by_source(&source).map(|entry| entry.id) {
                    if self.store.update(existing, &text, None) {
                        report.updated.push(existing);
                    }
                } else {
                    let outcome = self.store.append(ReminderEntry::new(source, now, text));
                    report.record(outcome);
                }
                info!("event=reconcile_reply module=reconciler status=ok");
            }
            ResponseAction::DefaultAction => {
                if self.logging_enabled() {
                    let outcome = self.store.append(ReminderEntry::delivered(source, now));
                    report.record(outcome);
                } else {
                    report.skipped_disabled += 1;
                }
            }
            ResponseAction::Dismissed => {}
        }
        report
    }

    /// Runs the foreground-resume pass.
    ///
    /// Delivered records are logged first with their real ids. Fire-times in
    /// `[checkpoint, now)` not already represented by a real entry are then
    /// backfilled with synthetic ids. The checkpoint is left at `now`.
    pub fn on_resumed(
        &mut self,
        delivered: Vec<DeliveredRecord>,
        now: DateTime<Utc>,
    ) -> ReconcileReport {
        self.catch_up("reconcile_resume", delivered, now)
    }

    /// Same catch-up pass as `on_resumed`, run from a background wake.
    pub fn on_background_wake(
        &mut self,
        delivered: Vec<DeliveredRecord>,
        now: DateTime<Utc>,
    ) -> ReconcileReport {
        self.catch_up("reconcile_wake", delivered, now)
    }

    /// Moves the checkpoint to `at` unless it already is at or past it.
    pub fn advance_checkpoint(&mut self, at: DateTime<Utc>) {
        match self.settings.checkpoint() {
            Ok(Some(current)) if current >= at => return,
            Ok(_) => {}
            Err(err) => {
                warn!("event=checkpoint_read module=reconciler status=error error={err}");
            }
        }
        if let Err(err) = self.settings.set_checkpoint(at) {
            error!("event=checkpoint_write module=reconciler status=error error={err}");
        }
    }

    pub fn store(&self) -> &EntryStore<R> {
        &self.store
    }

    /// Direct journal access for user edits (manual notes, text changes,
    /// deletions).
    pub fn store_mut(&mut self) -> &mut EntryStore<R> {
        &mut self.store
    }

    pub fn settings(&self) -> &S {
        &self.settings
    }

    pub fn time_zone(&self) -> &Tz {
        &self.tz
    }

    fn catch_up(
        &mut self,
        event: &'static str,
        delivered: Vec<DeliveredRecord>,
        now: DateTime<Utc>,
    ) -> ReconcileReport {
        let logging = self.logging_enabled();
        let mut report = ReconcileReport::default();

        self.reconcile_delivered(&mut report, delivered, logging);
        self.backfill_missed(&mut report, now, logging);
        self.advance_checkpoint(now);

        info!(
            "event={event} module=reconciler status=ok logging={} appended={} backfilled={} \
             duplicates={} purged={}",
            logging,
            report.appended.len(),
            report.backfilled,
            report.duplicates,
            report.purge_ids.len()
        );
        report
    }

    fn reconcile_delivered(
        &mut self,
        report: &mut ReconcileReport,
        delivered: Vec<DeliveredRecord>,
        logging: bool,
    ) {
        for record in delivered {
            let source = SourceId::delivery(record.id.as_str());
            if self.store.has_logged(&source) {
                report.duplicates += 1;
            } else if logging {
                let outcome = self
                    .store
                    .append(ReminderEntry::delivered(source, record.delivered_at));
                report.record(outcome);
            } else {
                report.skipped_disabled += 1;
            }
            report.purge_ids.push(record.id);
        }
    }

    fn backfill_missed(&mut self, report: &mut ReconcileReport, now: DateTime<Utc>, logging: bool) {
        let checkpoint = match self.settings.checkpoint() {
            Ok(Some(checkpoint)) => checkpoint,
            Ok(None) => return,
            Err(err) => {
                error!(
                    "event=reconcile_backfill module=reconciler status=error \
                     error_code=checkpoint_unreadable error={err}"
                );
                return;
            }
        };
        let config = match self.settings.recurrence_config() {
            Ok(Some(config)) => config,
            Ok(None) => {
                info!("event=reconcile_backfill module=reconciler status=skip reason=no_config");
                return;
            }
            Err(err) => {
                error!(
                    "event=reconcile_backfill module=reconciler status=error \
                     error_code=config_unreadable error={err}"
                );
                return;
            }
        };

        let slot = TimeDelta::minutes(i64::from(config.interval_minutes.max(1)));
        for fire_at in reconstruct_between(&config, &self.tz, checkpoint, now) {
            if self.is_represented(fire_at, slot) {
                continue;
            }
            if !logging {
                report.skipped_disabled += 1;
                continue;
            }
            let outcome = self
                .store
                .append(ReminderEntry::delivered(SourceId::backfill(), fire_at));
            if outcome.is_appended() {
                report.backfilled += 1;
            }
            report.record(outcome);
        }
    }

    /// Whether a real entry was stamped in `[fire_at, fire_at + slot)`.
    fn is_represented(&self, fire_at: DateTime<Utc>, slot: TimeDelta) -> bool {
        let slot_end = fire_at + slot;
        self.store.entries().iter().any(|entry| {
            !entry.source_id.is_synthetic()
                && entry.timestamp >= fire_at
                && entry.timestamp < slot_end
        })
    }

    fn logging_enabled(&self) -> bool {
        self.settings.logging_enabled().unwrap_or_else(|err| {
            warn!(
                "event=settings_read module=reconciler status=error key=log_default_delivery \
                 error={err}"
            );
            true
        })
    }
}
