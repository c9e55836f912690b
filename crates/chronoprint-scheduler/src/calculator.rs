//! Next-run calculation.
//!
//! Everything here is pure: given a recurrence, its start time and a
//! reference instant, work out the first occurrence strictly after the
//! reference. Arithmetic happens on the wall clock of the reference's zone.

use chrono::{DateTime, Duration, NaiveDate, TimeZone};

use crate::time::{day_of_week, is_strictly_after, resolve_local, set_time_of_day};
use crate::types::{Recurrence, Schedule, StartTime};

/// Days scanned looking for a weekly occurrence. Eight covers today plus a
/// full week, so the same weekday one week out is always reachable.
const WEEKLY_SCAN_DAYS: i64 = 8;

/// The next time `schedule` should fire after `reference`.
///
/// Disabled schedules never fire, so this returns `None` for them.
pub fn compute_next_run<Tz: TimeZone>(
    schedule: &Schedule,
    reference: &DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    if !schedule.is_enabled {
        return None;
    }
    next_occurrence(&schedule.recurrence, schedule.start_time, reference)
}

/// First occurrence of `recurrence` anchored at `start` strictly after `reference`.
///
/// Returns `None` when the rule can never produce an instant (an empty weekly
/// day set or a zero hourly interval).
pub fn next_occurrence<Tz: TimeZone>(
    recurrence: &Recurrence,
    start: StartTime,
    reference: &DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    match recurrence {
        Recurrence::Daily => Some(next_daily(start, reference)),
        Recurrence::Weekly { days } => {
            let tz = reference.timezone();
            let today = reference.date_naive();
            (0..WEEKLY_SCAN_DAYS)
                .map(|offset| anchor_on(&tz, today + Duration::days(offset), start))
                .filter(|candidate| {
                    days.iter().any(|day| day.number() == day_of_week(candidate))
                })
                .find(|candidate| is_strictly_after(candidate, reference))
        }
        Recurrence::Hourly { interval_minutes } => {
            next_hourly(i64::from(*interval_minutes), start, reference)
        }
    }
}

fn anchor_on<Tz: TimeZone>(tz: &Tz, date: NaiveDate, start: StartTime) -> DateTime<Tz> {
    resolve_local(tz, date.and_time(start.time()))
}

fn next_daily<Tz: TimeZone>(start: StartTime, reference: &DateTime<Tz>) -> DateTime<Tz> {
    let anchor = set_time_of_day(reference, start.time());
    if is_strictly_after(&anchor, reference) {
        anchor
    } else {
        anchor_on(
            &reference.timezone(),
            reference.date_naive() + Duration::days(1),
            start,
        )
    }
}

/// Occurrences on day D are `D@start + k * interval` for `k >= 0` while the
/// wall clock stays on D. Past the last one, the next is tomorrow's anchor.
fn next_hourly<Tz: TimeZone>(
    interval: i64,
    start: StartTime,
    reference: &DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    if interval <= 0 {
        return None;
    }

    let tz = reference.timezone();
    let today = reference.date_naive();
    let anchor = anchor_on(&tz, today, start);
    if is_strictly_after(&anchor, reference) {
        return Some(anchor);
    }

    let tomorrow = || anchor_on(&tz, today + Duration::days(1), start);
    let anchor_wall = today.and_time(start.time());
    let elapsed = (reference.naive_local() - anchor_wall).num_minutes();
    let mut wall = anchor_wall + Duration::minutes((elapsed / interval + 1) * interval);

    // A DST transition can make the arithmetic candidate land at or before
    // the reference; step along the grid until it doesn't.
    loop {
        if wall.date() != today {
            return Some(tomorrow());
        }
        let candidate = resolve_local(&tz, wall);
        if is_strictly_after(&candidate, reference) {
            return Some(candidate);
        }
        wall += Duration::minutes(interval);
    }
}
