use async_trait::async_trait;
use checkin_core::db::open_db_in_memory;
use checkin_core::{
    open_reconciler, rearm, BackgroundScheduler, Clock, DeliveredRecord, NotificationCenter,
    PlatformError, PlatformResult, RearmOutcome, RecurrenceConfig, ReconcileHandle,
    ReconcileWorker, ResponseAction, ScheduledNotification, SettingsStore, SourceId,
    MAX_PENDING_NOTIFICATIONS,
};
use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;

#[derive(Default)]
struct FakeCenter {
    submitted: Mutex<Vec<ScheduledNotification>>,
    cancel_calls: Mutex<usize>,
    delivered: Mutex<Vec<DeliveredRecord>>,
    purged: Mutex<Vec<String>>,
    fail_submit: bool,
}

#[async_trait]
impl NotificationCenter for FakeCenter {
    async fn submit(&self, notification: ScheduledNotification) -> PlatformResult<()> {
        if self.fail_submit {
            return Err(PlatformError::new("submit", "queue unavailable"));
        }
        self.submitted.lock().unwrap().push(notification);
        Ok(())
    }

    async fn cancel_all(&self) -> PlatformResult<()> {
        *self.cancel_calls.lock().unwrap() += 1;
        self.submitted.lock().unwrap().clear();
        Ok(())
    }

    async fn list_delivered(&self) -> PlatformResult<Vec<DeliveredRecord>> {
        Ok(self.delivered.lock().unwrap().clone())
    }

    async fn purge_delivered(&self, ids: &[String]) -> PlatformResult<()> {
        self.delivered
            .lock()
            .unwrap()
            .retain(|record| !ids.contains(&record.id));
        self.purged.lock().unwrap().extend_from_slice(ids);
        Ok(())
    }
}

#[derive(Default)]
struct FakeScheduler {
    requests: Mutex<Vec<DateTime<Utc>>>,
}

#[async_trait]
impl BackgroundScheduler for FakeScheduler {
    async fn schedule_refresh(&self, earliest: DateTime<Utc>) -> PlatformResult<()> {
        self.requests.lock().unwrap().push(earliest);
        Ok(())
    }
}

fn monday_at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, 7, hour, minute, 0).unwrap()
}

fn every_fifteen_minutes() -> RecurrenceConfig {
    RecurrenceConfig {
        interval_minutes: 15,
        weekdays: (1..=7).collect(),
        daily_start: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        daily_end: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
        message_text: "Check in".to_string(),
    }
}

fn fixed_clock(now: DateTime<Utc>) -> Clock {
    Arc::new(move || now)
}

fn spawn_worker(
    center: Arc<FakeCenter>,
    scheduler: Arc<FakeScheduler>,
    now: DateTime<Utc>,
    config: Option<RecurrenceConfig>,
) -> ReconcileHandle {
    let reconciler = open_reconciler(open_db_in_memory().unwrap(), Utc).unwrap();
    if let Some(config) = config {
        reconciler.settings().save_recurrence_config(&config).unwrap();
    }
    let (handle, _task) =
        ReconcileWorker::new(reconciler, center, scheduler, fixed_clock(now)).spawn();
    handle
}

#[tokio::test]
async fn rearm_without_config_leaves_queue_untouched() {
    let center = Arc::new(FakeCenter::default());
    let handle = spawn_worker(
        center.clone(),
        Arc::new(FakeScheduler::default()),
        monday_at(9, 0),
        None,
    );

    let outcome = handle.rearm().await.unwrap().unwrap();
    assert_eq!(outcome, RearmOutcome::NotConfigured);
    assert_eq!(*center.cancel_calls.lock().unwrap(), 0);
}

#[tokio::test]
async fn rearm_replaces_queue_with_capped_batch() {
    let center = Arc::new(FakeCenter::default());
    let handle = spawn_worker(
        center.clone(),
        Arc::new(FakeScheduler::default()),
        monday_at(9, 5),
        Some(every_fifteen_minutes()),
    );

    handle.rearm().await.unwrap().unwrap();
    let outcome = handle.rearm().await.unwrap().unwrap();

    assert_eq!(
        outcome,
        RearmOutcome::Armed {
            submitted: MAX_PENDING_NOTIFICATIONS,
            failed: 0
        }
    );
    assert_eq!(*center.cancel_calls.lock().unwrap(), 2);
    let submitted = center.submitted.lock().unwrap();
    assert_eq!(submitted.len(), MAX_PENDING_NOTIFICATIONS);
    assert_eq!(submitted[0].fire_at, monday_at(9, 15));
    assert_eq!(submitted[0].content.body, "Check in");
}

#[tokio::test]
async fn submit_failures_are_counted_not_fatal() {
    let center = FakeCenter {
        fail_submit: true,
        ..FakeCenter::default()
    };
    let reconciler = open_reconciler(open_db_in_memory().unwrap(), Utc).unwrap();
    reconciler
        .settings()
        .save_recurrence_config(&every_fifteen_minutes())
        .unwrap();

    let outcome = rearm(&center, reconciler.settings(), &Utc, monday_at(19, 40))
        .await
        .unwrap();

    // Monday 19:45 and 20:00 remain, then 49 slots per following day.
    assert_eq!(
        outcome,
        RearmOutcome::Armed {
            submitted: 0,
            failed: MAX_PENDING_NOTIFICATIONS
        }
    );
}

#[tokio::test]
async fn resume_logs_and_purges_delivered_records() {
    let center = Arc::new(FakeCenter::default());
    center.delivered.lock().unwrap().extend([
        DeliveredRecord {
            id: "a".to_string(),
            content: None,
            delivered_at: monday_at(8, 0),
        },
        DeliveredRecord {
            id: "b".to_string(),
            content: None,
            delivered_at: monday_at(8, 15),
        },
    ]);
    let handle = spawn_worker(
        center.clone(),
        Arc::new(FakeScheduler::default()),
        monday_at(8, 20),
        None,
    );

    let first = handle.resumed().await.unwrap();
    assert_eq!(first.appended.len(), 2);
    assert_eq!(center.purged.lock().unwrap().len(), 2);
    assert!(center.delivered.lock().unwrap().is_empty());

    let second = handle.resumed().await.unwrap();
    assert!(second.appended.is_empty());

    let entries = handle
        .query(monday_at(0, 0), monday_at(23, 59))
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].source_id, SourceId::delivery("b"));
}

#[tokio::test]
async fn presented_then_reply_keeps_one_entry() {
    let center = Arc::new(FakeCenter::default());
    let handle = spawn_worker(
        center,
        Arc::new(FakeScheduler::default()),
        monday_at(10, 0),
        None,
    );

    let first = handle.presented("live").await.unwrap();
    let again = handle.presented("live").await.unwrap();
    assert_eq!(first.appended.len(), 1);
    assert_eq!(again.duplicates, 1);

    let reply = handle
        .responded("live", ResponseAction::Reply("Deep work".to_string()))
        .await
        .unwrap();
    assert_eq!(reply.updated, first.appended);

    let entries = handle
        .query(monday_at(0, 0), monday_at(23, 59))
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].text, "Deep work");
}

#[tokio::test]
async fn background_wake_registers_next_refresh_and_rearms() {
    let center = Arc::new(FakeCenter::default());
    let scheduler = Arc::new(FakeScheduler::default());
    let handle = spawn_worker(
        center.clone(),
        scheduler.clone(),
        monday_at(12, 0),
        Some(every_fifteen_minutes()),
    );

    center.delivered.lock().unwrap().push(DeliveredRecord {
        id: "overnight".to_string(),
        content: None,
        delivered_at: monday_at(11, 45),
    });

    let outcome = handle.background_wake().await.unwrap();
    assert_eq!(outcome.report.appended.len(), 1);
    assert_eq!(outcome.report.purge_ids, vec!["overnight".to_string()]);
    assert!(matches!(
        outcome.rearm,
        Ok(RearmOutcome::Armed { failed: 0, .. })
    ));
    assert_eq!(*center.purged.lock().unwrap(), vec!["overnight".to_string()]);
    assert!(center.delivered.lock().unwrap().is_empty());
    assert_eq!(*scheduler.requests.lock().unwrap(), vec![monday_at(13, 0)]);
    assert_eq!(*center.cancel_calls.lock().unwrap(), 1);

    let entries = handle
        .query(monday_at(0, 0), monday_at(23, 59))
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].source_id, SourceId::delivery("overnight"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_presented_and_tap_log_one_entry() {
    let handle = spawn_worker(
        Arc::new(FakeCenter::default()),
        Arc::new(FakeScheduler::default()),
        monday_at(10, 0),
        None,
    );

    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let presented = handle.clone();
        tasks.spawn(async move { presented.presented("same").await.unwrap() });
        let tapped = handle.clone();
        tasks.spawn(async move {
            tapped
                .responded("same", ResponseAction::DefaultAction)
                .await
                .unwrap()
        });
    }

    let mut appended = 0;
    let mut duplicates = 0;
    while let Some(report) = tasks.join_next().await {
        let report = report.unwrap();
        appended += report.appended.len();
        duplicates += report.duplicates;
    }
    assert_eq!(appended, 1);
    assert_eq!(duplicates, 15);

    let entries = handle
        .query(monday_at(0, 0), monday_at(23, 59))
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].source_id, SourceId::delivery("same"));
}

#[tokio::test]
async fn manual_edits_go_through_the_worker() {
    let handle = spawn_worker(
        Arc::new(FakeCenter::default()),
        Arc::new(FakeScheduler::default()),
        monday_at(15, 0),
        None,
    );

    assert!(handle.log_manual("  ").await.unwrap().is_err());
    let id = handle.log_manual("Wrote tests").await.unwrap().unwrap();
    assert!(handle.update_entry(id, "Wrote more tests", None).await.unwrap());
    assert!(handle.remove_entry(id).await.unwrap());
    assert!(!handle.remove_entry(id).await.unwrap());
}
