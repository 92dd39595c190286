//! Recurrence planner.
//!
//! Fire-times of one eligible day are `daily_start + k * interval` for every
//! `k >= 0` that stays at or before `daily_end`, evaluated in the caller's
//! time zone and reported in UTC. Local times that do not exist (DST gap)
//! are skipped; ambiguous local times use their earliest instant.
//!
//! Forward planning covers `[now, ..)` over a fixed day horizon and stops at
//! the platform queue cap. Backward reconstruction covers `[from, to)` with
//! no cap. The two windows meet at the boundary instant without overlap.

use crate::model::recurrence::RecurrenceConfig;
use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, TimeZone, Utc};

/// Platform limit on outstanding scheduled notifications.
pub const MAX_PENDING_NOTIFICATIONS: usize = 64;
/// Days covered by one forward-planned batch, starting with today.
pub const FORWARD_HORIZON_DAYS: usize = 7;

/// Plans the next batch of fire-times starting at `now`.
pub fn plan_forward<Tz: TimeZone>(
    config: &RecurrenceConfig,
    tz: &Tz,
    now: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    plan_forward_with(
        config,
        tz,
        now,
        FORWARD_HORIZON_DAYS,
        MAX_PENDING_NOTIFICATIONS,
    )
}

/// Plans fire-times `>= from` over `horizon_days` local days, stopping once
/// `max_count` fire-times were produced.
pub fn plan_forward_with<Tz: TimeZone>(
    config: &RecurrenceConfig,
    tz: &Tz,
    from: DateTime<Utc>,
    horizon_days: usize,
    max_count: usize,
) -> Vec<DateTime<Utc>> {
    let first_day = from.with_timezone(tz).date_naive();
    first_day
        .iter_days()
        .take(horizon_days)
        .flat_map(|day| day_fire_times(config, tz, day))
        .filter(|at| *at >= from)
        .take(max_count)
        .collect()
}

/// Reconstructs every fire-time in `[from, to)`.
///
/// Returns an empty list when `to <= from`.
pub fn reconstruct_between<Tz: TimeZone>(
    config: &RecurrenceConfig,
    tz: &Tz,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    if to <= from {
        return Vec::new();
    }

    let first_day = from.with_timezone(tz).date_naive();
    let last_day = to.with_timezone(tz).date_naive();
    first_day
        .iter_days()
        .take_while(|day| *day <= last_day)
        .flat_map(|day| day_fire_times(config, tz, day))
        .filter(|at| *at >= from && *at < to)
        .collect()
}

fn day_fire_times<'a, Tz: TimeZone>(
    config: &'a RecurrenceConfig,
    tz: &'a Tz,
    day: NaiveDate,
) -> impl Iterator<Item = DateTime<Utc>> + 'a {
    let eligible = config.interval_minutes > 0 && config.fires_on(day.weekday());
    let first = day.and_time(config.daily_start);
    let last = day.and_time(config.daily_end);
    let step = TimeDelta::minutes(i64::from(config.interval_minutes));

    std::iter::successors(eligible.then_some(first), move |at| Some(*at + step))
        .take_while(move |at| *at <= last)
        .filter_map(move |local| tz.from_local_datetime(&local).earliest())
        .map(|at| at.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::{
        plan_forward, plan_forward_with, reconstruct_between, MAX_PENDING_NOTIFICATIONS,
    };
    use crate::model::recurrence::RecurrenceConfig;
    use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, TimeZone, Timelike, Utc};
    use chrono_tz::America::New_York;
    use std::collections::BTreeSet;

    const WORKDAYS: [u8; 5] = [2, 3, 4, 5, 6];

    fn config(interval: u32, days: &[u8], start: (u32, u32), end: (u32, u32)) -> RecurrenceConfig {
        RecurrenceConfig {
            interval_minutes: interval,
            weekdays: days.iter().copied().collect::<BTreeSet<_>>(),
            daily_start: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            daily_end: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
            message_text: "check in".to_string(),
        }
    }

    // 2025-07-07 is a Monday.
    fn monday(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 7, hour, minute, 0).unwrap()
    }

    fn hm(at: &DateTime<Utc>) -> (u32, u32) {
        (at.hour(), at.minute())
    }

    #[test]
    fn backward_example_from_checkpoint_to_now() {
        let cfg = config(60, &WORKDAYS, (9, 0), (17, 0));
        let times = reconstruct_between(&cfg, &Utc, monday(9, 30), monday(13, 5));
        let hours: Vec<_> = times.iter().map(hm).collect();
        assert_eq!(hours, vec![(10, 0), (11, 0), (12, 0), (13, 0)]);
    }

    #[test]
    fn forward_planning_respects_cap_and_constraints() {
        let windows = [((0, 0), (23, 59)), ((9, 0), (17, 0)), ((6, 30), (7, 0))];
        let intervals = [1, 5, 15, 60, 240];
        let day_sets: [&[u8]; 3] = [&[1, 2, 3, 4, 5, 6, 7], &WORKDAYS, &[1]];

        for (start, end) in windows {
            for interval in intervals {
                for days in day_sets {
                    let cfg = config(interval, days, start, end);
                    let now = monday(11, 17);
                    let times = plan_forward(&cfg, &Utc, now);

                    assert!(times.len() <= MAX_PENDING_NOTIFICATIONS);
                    assert!(times.windows(2).all(|pair| pair[0] < pair[1]));
                    for at in &times {
                        assert!(*at >= now);
                        assert!(cfg.fires_on(at.weekday()));
                        assert!(at.time() >= cfg.daily_start && at.time() <= cfg.daily_end);
                        let offset = at.time() - cfg.daily_start;
                        assert_eq!(offset.num_minutes() % i64::from(interval), 0);
                    }
                }
            }
        }
    }

    #[test]
    fn forward_stops_early_at_the_cap() {
        let cfg = config(1, &[1, 2, 3, 4, 5, 6, 7], (0, 0), (23, 59));
        let times = plan_forward(&cfg, &Utc, monday(8, 0));
        assert_eq!(times.len(), MAX_PENDING_NOTIFICATIONS);
        assert_eq!(hm(&times[0]), (8, 0));
        assert_eq!(hm(&times[63]), (9, 3));
    }

    #[test]
    fn forward_anchor_day_keeps_phase_of_daily_start() {
        let cfg = config(45, &WORKDAYS, (9, 0), (17, 0));
        let times = plan_forward_with(&cfg, &Utc, monday(10, 0), 1, 100);
        let slots: Vec<_> = times.iter().map(hm).collect();
        assert_eq!(slots[0], (10, 30));
        assert_eq!(slots[1], (11, 15));
        assert_eq!(*slots.last().unwrap(), (16, 30));
    }

    #[test]
    fn zero_length_window_or_long_interval_yields_one_per_day() {
        for cfg in [
            config(30, &WORKDAYS, (9, 0), (9, 0)),
            config(600, &WORKDAYS, (9, 0), (17, 0)),
        ] {
            let week_end = monday(0, 0) + chrono::TimeDelta::days(7);
            let times = reconstruct_between(&cfg, &Utc, monday(0, 0), week_end);
            assert_eq!(times.len(), 5);
            assert!(times.iter().all(|at| hm(at) == (9, 0)));
        }
    }

    #[test]
    fn backward_reconstruction_spans_earlier_days_fully() {
        let cfg = config(120, &WORKDAYS, (9, 0), (13, 0));
        let friday_evening = Utc.with_ymd_and_hms(2025, 7, 4, 20, 0, 0).unwrap();
        let times = reconstruct_between(&cfg, &Utc, friday_evening, monday(12, 0));
        let slots: Vec<_> = times.iter().map(|at| (at.day(), at.hour())).collect();
        assert_eq!(slots, vec![(7, 9), (7, 11)]);
    }

    #[test]
    fn backward_then_forward_meet_without_gap_or_overlap() {
        let cfg = config(30, &WORKDAYS, (9, 0), (17, 0));
        let t0 = monday(9, 0);
        for boundary in [monday(11, 0), monday(11, 10), monday(17, 0)] {
            let past = reconstruct_between(&cfg, &Utc, t0, boundary);
            let future = plan_forward_with(&cfg, &Utc, boundary, 1, 100);
            let whole = reconstruct_between(&cfg, &Utc, t0, monday(23, 59));

            let mut joined = past.clone();
            joined.extend(future);
            assert_eq!(joined, whole, "boundary {boundary}");
        }
    }

    #[test]
    fn empty_or_reversed_range_yields_nothing() {
        let cfg = config(60, &WORKDAYS, (9, 0), (17, 0));
        assert!(reconstruct_between(&cfg, &Utc, monday(12, 0), monday(12, 0)).is_empty());
        assert!(reconstruct_between(&cfg, &Utc, monday(13, 0), monday(12, 0)).is_empty());
    }

    #[test]
    fn zero_interval_never_loops() {
        let cfg = config(0, &WORKDAYS, (9, 0), (17, 0));
        assert!(plan_forward(&cfg, &Utc, monday(8, 0)).is_empty());
    }

    #[test]
    fn window_is_evaluated_in_local_time() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let cfg = config(60, &WORKDAYS, (9, 0), (10, 0));
        // 2025-07-07 06:00 UTC is 08:00 local.
        let times = plan_forward_with(&cfg, &tz, monday(6, 0), 1, 10);
        let slots: Vec<_> = times.iter().map(hm).collect();
        assert_eq!(slots, vec![(7, 0), (8, 0)]);
    }

    #[test]
    fn spring_forward_skips_nonexistent_local_times() {
        // 2025-03-09 (Sunday): New York clocks jump from 02:00 to 03:00.
        let cfg = config(30, &[1], (2, 0), (3, 0));
        let day_start = Utc.with_ymd_and_hms(2025, 3, 9, 5, 0, 0).unwrap();
        let day_end = Utc.with_ymd_and_hms(2025, 3, 10, 4, 0, 0).unwrap();

        let times = reconstruct_between(&cfg, &New_York, day_start, day_end);
        assert_eq!(times, vec![Utc.with_ymd_and_hms(2025, 3, 9, 7, 0, 0).unwrap()]);

        let planned = plan_forward_with(&cfg, &New_York, day_start, 1, 10);
        assert_eq!(planned, times);
    }

    #[test]
    fn fall_back_uses_earliest_mapping_once() {
        // 2025-11-02 (Sunday): New York repeats 01:00-02:00.
        let cfg = config(30, &[1], (1, 0), (1, 30));
        let day_start = Utc.with_ymd_and_hms(2025, 11, 2, 4, 0, 0).unwrap();
        let day_end = Utc.with_ymd_and_hms(2025, 11, 3, 5, 0, 0).unwrap();

        let times = reconstruct_between(&cfg, &New_York, day_start, day_end);
        assert_eq!(
            times,
            vec![
                Utc.with_ymd_and_hms(2025, 11, 2, 5, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 11, 2, 5, 30, 0).unwrap(),
            ]
        );

        let planned = plan_forward_with(&cfg, &New_York, day_start, 1, 10);
        assert_eq!(planned, times);
    }
}
