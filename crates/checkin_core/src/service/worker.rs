//! Single-writer reconciliation worker.
//!
//! # Responsibility
//! - Own the `Reconciler` on one tokio task and serialize every trigger
//!   (live delivery, user response, resume, background wake, user edits)
//!   through one command queue.
//! - Perform the platform round trips (`list_delivered`, `purge_delivered`,
//!   re-arming) around the synchronous journal mutations.
//!
//! # Invariants
//! - Only the worker task touches the journal, so a duplicate check and the
//!   matching append can never interleave with another trigger.
//! - Platform failures degrade a pass (nothing read, nothing purged) but
//!   never stop the worker.
//! - The worker exits once every `ReconcileHandle` is dropped.

use crate::model::entry::{EntryId, ReminderEntry};
use crate::platform::{BackgroundScheduler, DeliveredRecord, NotificationCenter, REFRESH_INTERVAL};
use crate::repo::journal_repo::JournalRepository;
use crate::service::entry_store::ManualEntryError;
use crate::service::rearm::{rearm, RearmError, RearmOutcome};
use crate::service::reconciler::{ReconcileReport, Reconciler, ResponseAction};
use crate::settings::{CheckpointStore, SettingsStore};
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const COMMAND_QUEUE_CAPACITY: usize = 64;

/// Source of "now" for the worker.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Wall clock used outside tests.
pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// The worker task is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerClosed;

impl Display for WorkerClosed {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "reconcile worker is not running")
    }
}

impl Error for WorkerClosed {}

/// Result of one background wake.
#[derive(Debug)]
pub struct WakeOutcome {
    /// Catch-up pass over the delivered records read during the wake.
    pub report: ReconcileReport,
    pub rearm: Result<RearmOutcome, RearmError>,
}

enum Command {
    Presented {
        source_id: String,
        reply: oneshot::Sender<ReconcileReport>,
    },
    Responded {
        source_id: String,
        action: ResponseAction,
        reply: oneshot::Sender<ReconcileReport>,
    },
    Resumed {
        reply: oneshot::Sender<ReconcileReport>,
    },
    Backgrounded {
        reply: oneshot::Sender<()>,
    },
    BackgroundWake {
        reply: oneshot::Sender<WakeOutcome>,
    },
    Rearm {
        reply: oneshot::Sender<Result<RearmOutcome, RearmError>>,
    },
    Query {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        reply: oneshot::Sender<Vec<ReminderEntry>>,
    },
    LogManual {
        text: String,
        reply: oneshot::Sender<Result<EntryId, ManualEntryError>>,
    },
    Update {
        id: EntryId,
        text: String,
        date: Option<DateTime<Utc>>,
        reply: oneshot::Sender<bool>,
    },
    Remove {
        id: EntryId,
        reply: oneshot::Sender<bool>,
    },
}

/// Cloneable sender side of the worker queue.
#[derive(Clone)]
pub struct ReconcileHandle {
    tx: mpsc::Sender<Command>,
}

impl ReconcileHandle {
    pub async fn presented(
        &self,
        source_id: impl Into<String>,
    ) -> Result<ReconcileReport, WorkerClosed> {
        let source_id = source_id.into();
        self.request(|reply| Command::Presented { source_id, reply }).await
    }

    pub async fn responded(
        &self,
        source_id: impl Into<String>,
        action: ResponseAction,
    ) -> Result<ReconcileReport, WorkerClosed> {
        let source_id = source_id.into();
        self.request(|reply| Command::Responded {
            source_id,
            action,
            reply,
        })
        .await
    }

    pub async fn resumed(&self) -> Result<ReconcileReport, WorkerClosed> {
        self.request(|reply| Command::Resumed { reply }).await
    }

    pub async fn backgrounded(&self) -> Result<(), WorkerClosed> {
        self.request(|reply| Command::Backgrounded { reply }).await
    }

    /// Handles an OS background wake: re-registers the next wake, reconciles
    /// and purges delivered records, then re-arms the notification queue.
    pub async fn background_wake(&self) -> Result<WakeOutcome, WorkerClosed> {
        self.request(|reply| Command::BackgroundWake { reply }).await
    }

    /// Re-arms the queue immediately, e.g. after the configuration changed.
    pub async fn rearm(&self) -> Result<Result<RearmOutcome, RearmError>, WorkerClosed> {
        self.request(|reply| Command::Rearm { reply }).await
    }

    pub async fn query(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ReminderEntry>, WorkerClosed> {
        self.request(|reply| Command::Query { from, to, reply }).await
    }

    pub async fn log_manual(
        &self,
        text: impl Into<String>,
    ) -> Result<Result<EntryId, ManualEntryError>, WorkerClosed> {
        let text = text.into();
        self.request(|reply| Command::LogManual { text, reply }).await
    }

    pub async fn update_entry(
        &self,
        id: EntryId,
        text: impl Into<String>,
        date: Option<DateTime<Utc>>,
    ) -> Result<bool, WorkerClosed> {
        let text = text.into();
        self.request(|reply| Command::Update {
            id,
            text,
            date,
            reply,
        })
        .await
    }

    pub async fn remove_entry(&self, id: EntryId) -> Result<bool, WorkerClosed> {
        self.request(|reply| Command::Remove { id, reply }).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, WorkerClosed> {
        let (reply, response) = oneshot::channel();
        self.tx.send(build(reply)).await.map_err(|_| WorkerClosed)?;
        response.await.map_err(|_| WorkerClosed)
    }
}

/// Task that owns the reconciler and its platform collaborators.
pub struct ReconcileWorker<R, S, Tz>
where
    R: JournalRepository,
    S: SettingsStore + CheckpointStore,
    Tz: TimeZone,
{
    reconciler: Reconciler<R, S, Tz>,
    center: Arc<dyn NotificationCenter>,
    scheduler: Arc<dyn BackgroundScheduler>,
    clock: Clock,
}

impl<R, S, Tz> ReconcileWorker<R, S, Tz>
where
    R: JournalRepository + Send + Sync + 'static,
    S: SettingsStore + CheckpointStore + Send + Sync + 'static,
    Tz: TimeZone + Send + Sync + 'static,
{
    pub fn new(
        reconciler: Reconciler<R, S, Tz>,
        center: Arc<dyn NotificationCenter>,
        scheduler: Arc<dyn BackgroundScheduler>,
        clock: Clock,
    ) -> Self {
        Self {
            reconciler,
            center,
            scheduler,
            clock,
        }
    }

    /// Spawns the worker on the current tokio runtime.
    pub fn spawn(self) -> (ReconcileHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let task = tokio::spawn(self.run(rx));
        (ReconcileHandle { tx }, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        info!("event=worker_start module=worker status=ok");
        while let Some(command) = rx.recv().await {
            self.dispatch(command).await;
        }
        if let Err(err) = self.reconciler.store_mut().flush() {
            error!(
                "event=worker_stop module=worker status=error error_code=flush_failed error={err}"
            );
        }
        info!("event=worker_stop module=worker status=ok");
    }

    async fn dispatch(&mut self, command: Command) {
        let now = (self.clock)();
        // A dropped receiver only means the caller stopped waiting.
        match command {
            Command::Presented { source_id, reply } => {
                let others = self.read_delivered().await;
                let report = self.reconciler.on_presented(&source_id, others, now);
                self.purge(&report.purge_ids).await;
                let _ = reply.send(report);
            }
            Command::Responded {
                source_id,
                action,
                reply,
            } => {
                let _ = reply.send(self.reconciler.on_response(&source_id, action, now));
            }
            Command::Resumed { reply } => {
                self.retry_flush();
                let delivered = self.read_delivered().await;
                let report = self.reconciler.on_resumed(delivered, now);
                self.purge(&report.purge_ids).await;
                let _ = reply.send(report);
            }
            Command::Backgrounded { reply } => {
                self.reconciler.advance_checkpoint(now);
                self.retry_flush();
                let _ = reply.send(());
            }
            Command::BackgroundWake { reply } => {
                let refresh = TimeDelta::from_std(REFRESH_INTERVAL).unwrap_or(TimeDelta::hours(1));
                if let Err(err) = self.scheduler.schedule_refresh(now + refresh).await {
                    warn!(
                        "event=background_wake module=worker status=error \
                         error_code=refresh_register_failed error={err}"
                    );
                }
                self.retry_flush();
                let delivered = self.read_delivered().await;
                let report = self.reconciler.on_background_wake(delivered, now);
                self.purge(&report.purge_ids).await;
                let rearm = self.rearm(now).await;
                let _ = reply.send(WakeOutcome { report, rearm });
            }
            Command::Rearm { reply } => {
                let _ = reply.send(self.rearm(now).await);
            }
            Command::Query { from, to, reply } => {
                let _ = reply.send(self.reconciler.store().query(from, to));
            }
            Command::LogManual { text, reply } => {
                let _ = reply.send(self.reconciler.store_mut().log_manual(&text, now));
            }
            Command::Update {
                id,
                text,
                date,
                reply,
            } => {
                let _ = reply.send(self.reconciler.store_mut().update(id, &text, date));
            }
            Command::Remove { id, reply } => {
                let _ = reply.send(self.reconciler.store_mut().remove(id));
            }
        }
    }

    async fn rearm(&self, now: DateTime<Utc>) -> Result<RearmOutcome, RearmError> {
        rearm(
            self.center.as_ref(),
            self.reconciler.settings(),
            self.reconciler.time_zone(),
            now,
        )
        .await
    }

    async fn read_delivered(&self) -> Vec<DeliveredRecord> {
        self.center.list_delivered().await.unwrap_or_else(|err| {
            warn!("event=list_delivered module=worker status=error error={err}");
            Vec::new()
        })
    }

    async fn purge(&self, ids: &[String]) {
        if ids.is_empty() {
            return;
        }
        if let Err(err) = self.center.purge_delivered(ids).await {
            warn!(
                "event=purge_delivered module=worker status=error count={} error={err}",
                ids.len()
            );
        }
    }

    fn retry_flush(&mut self) {
        let store = self.reconciler.store_mut();
        if store.is_dirty() {
            if let Err(err) = store.flush() {
                warn!("event=journal_flush module=worker status=error error={err}");
            }
        }
    }
}
