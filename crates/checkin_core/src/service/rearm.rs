//! Re-arming of the platform notification queue.
//!
//! # Responsibility
//! - Turn the saved configuration into the next batch of scheduled
//!   notifications and hand it to the platform.
//!
//! # Invariants
//! - Missing configuration is "nothing to do", never an error.
//! - A batch never exceeds `MAX_PENDING_NOTIFICATIONS`.
//! - Pending requests are cancelled before a new batch is submitted.

use crate::model::recurrence::RecurrenceConfig;
use crate::platform::{
    NotificationCenter, NotificationContent, PlatformError, ScheduledNotification,
};
use crate::repo::kv_repo::{RepoError, RepoResult};
use crate::schedule::planner::plan_forward;
use crate::settings::SettingsStore;
use chrono::{DateTime, TimeZone, Utc};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

#[derive(Debug)]
pub enum RearmError {
    Settings(RepoError),
    Platform(PlatformError),
}

impl Display for RearmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Settings(err) => write!(f, "cannot read reminder settings: {err}"),
            Self::Platform(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RearmError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Settings(err) => Some(err),
            Self::Platform(err) => Some(err),
        }
    }
}

impl From<RepoError> for RearmError {
    fn from(value: RepoError) -> Self {
        Self::Settings(value)
    }
}

impl From<PlatformError> for RearmError {
    fn from(value: PlatformError) -> Self {
        Self::Platform(value)
    }
}

/// Result of a re-arm attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RearmOutcome {
    NotConfigured,
    Armed { submitted: usize, failed: usize },
}

/// Builds the next batch of notifications without touching the platform.
///
/// Returns an empty batch when no configuration is saved.
pub fn plan_batch<S, Tz>(
    settings: &S,
    tz: &Tz,
    now: DateTime<Utc>,
) -> RepoResult<Vec<ScheduledNotification>>
where
    S: SettingsStore + ?Sized,
    Tz: TimeZone,
{
    Ok(settings
        .recurrence_config()?
        .map(|config| build_batch(&config, tz, now))
        .unwrap_or_default())
}

/// Replaces every pending notification with a freshly planned batch.
///
/// Individual submit failures are logged and counted; the remaining
/// notifications are still submitted.
pub async fn rearm<C, S, Tz>(
    center: &C,
    settings: &S,
    tz: &Tz,
    now: DateTime<Utc>,
) -> Result<RearmOutcome, RearmError>
where
    C: NotificationCenter + ?Sized,
    S: SettingsStore + ?Sized,
    Tz: TimeZone,
{
    let Some(config) = settings.recurrence_config()? else {
        info!("event=rearm module=rearm status=skip reason=no_config");
        return Ok(RearmOutcome::NotConfigured);
    };
    let batch = build_batch(&config, tz, now);

    center.cancel_all().await.inspect_err(|err| {
        error!("event=rearm module=rearm status=error error_code=cancel_failed error={err}");
    })?;

    let mut submitted = 0;
    let mut failed = 0;
    for notification in batch {
        match center.submit(notification).await {
            Ok(()) => submitted += 1,
            Err(err) => {
                failed += 1;
                warn!("event=rearm_submit module=rearm status=error error={err}");
            }
        }
    }

    info!("event=rearm module=rearm status=ok submitted={submitted} failed={failed}");
    Ok(RearmOutcome::Armed { submitted, failed })
}

fn build_batch<Tz: TimeZone>(
    config: &RecurrenceConfig,
    tz: &Tz,
    now: DateTime<Utc>,
) -> Vec<ScheduledNotification> {
    let content = NotificationContent::reminder(config.message_text.as_str());
    plan_forward(config, tz, now)
        .into_iter()
        .map(|fire_at| ScheduledNotification {
            id: Uuid::new_v4().to_string(),
            fire_at,
            content: content.clone(),
        })
        .collect()
}
