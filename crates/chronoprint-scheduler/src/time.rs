//! Wall-clock time arithmetic.
//!
//! Every helper works on the local wall-clock fields of a `DateTime<Tz>`, so
//! the same code runs against `Local` in production and `Utc` or a fixed
//! offset in tests. None of them can fail.

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDateTime, NaiveTime, TimeZone};

/// Longest daylight-saving gap we will step over, in minutes.
const MAX_GAP_MINUTES: i64 = 24 * 60;

/// Resolve a wall-clock reading in `tz`.
///
/// Ambiguous readings (clocks going back) take the earlier instant. Readings
/// that fall in a gap (clocks going forward) move to the first minute that
/// exists after it.
pub fn resolve_local<Tz: TimeZone>(tz: &Tz, wall: NaiveDateTime) -> DateTime<Tz> {
    match tz.from_local_datetime(&wall) {
        LocalResult::Single(at) => at,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => (1..=MAX_GAP_MINUTES)
            .find_map(|m| tz.from_local_datetime(&(wall + Duration::minutes(m))).earliest())
            .unwrap_or_else(|| tz.from_utc_datetime(&wall)),
    }
}

/// Same calendar day as `at`, at `time` with seconds and sub-seconds zeroed.
pub fn set_time_of_day<Tz: TimeZone>(at: &DateTime<Tz>, time: NaiveTime) -> DateTime<Tz> {
    resolve_local(&at.timezone(), at.date_naive().and_time(time))
}

/// Move the wall clock forward (or back, for negative values) by `minutes`.
pub fn add_minutes<Tz: TimeZone>(at: &DateTime<Tz>, minutes: i64) -> DateTime<Tz> {
    resolve_local(&at.timezone(), at.naive_local() + Duration::minutes(minutes))
}

/// Move the calendar date by `days`, keeping the wall-clock time.
pub fn add_days<Tz: TimeZone>(at: &DateTime<Tz>, days: i64) -> DateTime<Tz> {
    resolve_local(&at.timezone(), at.naive_local() + Duration::days(days))
}

/// Local day of the week, 0-6 with Sunday = 0.
pub fn day_of_week<Tz: TimeZone>(at: &DateTime<Tz>) -> u32 {
    at.weekday().num_days_from_sunday()
}

/// Whether `a` is later than `b`. Equal instants are not.
pub fn is_strictly_after<Tz: TimeZone>(a: &DateTime<Tz>, b: &DateTime<Tz>) -> bool {
    a > b
}
