//! Pure date-range helpers. Every function takes an explicit
//! reference instant and the viewing user's zone so callers (and
//! tests) control what "now" and "today" mean. Wall-clock boundaries
//! are interpreted in the viewing zone and returned as UTC instants.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use super::models::WorkingHours;

/// Interpret a wall-clock time in `tz`. Nonexistent local times (DST
/// spring-forward gap) fall back to the UTC interpretation.
fn to_utc(tz: Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

fn local_midnight(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    to_utc(tz, date.and_time(NaiveTime::MIN))
}

/// The calendar date of `now` in the viewing zone.
pub fn local_date(now: DateTime<Utc>, tz: Tz) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}

/// `[00:00, next 00:00)` of a calendar day in the viewing zone.
pub fn day_bounds(date: NaiveDate, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    (local_midnight(date, tz), local_midnight(date + Duration::days(1), tz))
}

pub fn today_bounds(now: DateTime<Utc>, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    day_bounds(local_date(now, tz), tz)
}

pub fn yesterday_bounds(now: DateTime<Utc>, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    day_bounds(local_date(now, tz) - Duration::days(1), tz)
}

pub fn tomorrow_bounds(now: DateTime<Utc>, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    day_bounds(local_date(now, tz) + Duration::days(1), tz)
}

/// A 7-day window starting on the most recent Sunday at the current
/// wall-clock time. The window is not midnight-aligned.
pub fn week_bounds(now: DateTime<Utc>, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let days_since_sunday = now.with_timezone(&tz).weekday().num_days_from_sunday() as i64;
    let start = now - Duration::days(days_since_sunday);
    (start, start + Duration::days(7))
}

/// `[1st 00:00, 1st of next month 00:00)` in the viewing zone.
pub fn month_bounds(now: DateTime<Utc>, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let local = now.with_timezone(&tz).date_naive();
    let first = NaiveDate::from_ymd_opt(local.year(), local.month(), 1)
        .expect("first of month is always a valid date");
    let next_first = if local.month() == 12 {
        NaiveDate::from_ymd_opt(local.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(local.year(), local.month() + 1, 1)
    }
    .expect("first of month is always a valid date");
    (local_midnight(first, tz), local_midnight(next_first, tz))
}

/// A calendar day clipped to the working-hours window.
pub fn working_hours_bounds(
    date: NaiveDate,
    working_hours: &WorkingHours,
    tz: Tz,
) -> (DateTime<Utc>, DateTime<Utc>) {
    (
        to_utc(tz, date.and_time(working_hours.start)),
        to_utc(tz, date.and_time(working_hours.end)),
    )
}
