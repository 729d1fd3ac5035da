//! Next-fire arithmetic for partially specified calendars.

use std::time::Duration;

use chrono::{Datelike, Days, Months, NaiveDate, NaiveDateTime, TimeDelta, Timelike};

use crate::config::CalendarSpec;

/// Compute the next instant strictly after `after` that matches `calendar`.
///
/// Set fields overwrite the corresponding field of `after`; unset fields keep
/// the value `after` already has, except the minute, which always takes the
/// configured value (0 when unset). Seconds and subseconds are zeroed. Fields
/// are applied coarse to fine, so an impossible combination (week 6 of a
/// five-week month) rolls into the following month rather than failing.
///
/// Returns `None` only when the arithmetic leaves the representable date
/// range.
#[must_use]
pub fn next_occurrence(after: NaiveDateTime, calendar: &CalendarSpec) -> Option<NaiveDateTime> {
    // Shifting a candidate backward (week or weekday set below the current
    // position) can undo one advance step, so a single advance is not always
    // enough. Two extra rounds cover the worst case.
    let mut base = after;
    for _ in 0..4 {
        let candidate = apply(base, calendar)?;
        if candidate > after {
            return Some(candidate);
        }
        base = advance(base, calendar)?;
    }
    None
}

/// Non-negative wall-clock delay from `now` to `target`, floored to whole
/// milliseconds. A target at or before `now` yields zero.
pub(crate) fn delay_until(now: NaiveDateTime, target: NaiveDateTime) -> Duration {
    let millis = target.signed_duration_since(now).num_milliseconds().max(0);
    Duration::from_millis(u64::try_from(millis).unwrap_or(0))
}

fn apply(base: NaiveDateTime, calendar: &CalendarSpec) -> Option<NaiveDateTime> {
    let mut date = base.date();
    if let Some(month) = calendar.month {
        date = set_month(date, month)?;
    }
    if let Some(week) = calendar.week {
        date = set_week_of_month(date, week)?;
    }
    if let Some(day) = calendar.day {
        date = set_day_of_week(date, day)?;
    }
    let hour = calendar.hour.unwrap_or_else(|| base.time().hour());
    let minute = calendar.minute.unwrap_or(0);
    date.and_hms_opt(hour, minute, 0)
}

/// Step `base` forward by one unit of the coarsest set field.
fn advance(base: NaiveDateTime, calendar: &CalendarSpec) -> Option<NaiveDateTime> {
    if calendar.month.is_some() {
        base.checked_add_months(Months::new(12))
    } else if calendar.week.is_some() {
        base.checked_add_months(Months::new(1))
    } else if calendar.day.is_some() {
        base.checked_add_days(Days::new(7))
    } else if calendar.hour.is_some() {
        base.checked_add_days(Days::new(1))
    } else {
        base.checked_add_signed(TimeDelta::hours(1))
    }
}

/// Move `date` into `month` of the same year, clamping the day of month.
fn set_month(date: NaiveDate, month: u32) -> Option<NaiveDate> {
    let day = date.day().min(last_day_of_month(date.year(), month)?);
    NaiveDate::from_ymd_opt(date.year(), month, day)
}

fn last_day_of_month(year: i32, month: u32) -> Option<u32> {
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    next.and_then(|d| d.pred_opt()).map(|d| d.day())
}

/// Week of month for `date`: week 1 is the Monday-aligned week containing
/// the 1st.
fn week_of_month(date: NaiveDate) -> Option<u32> {
    let offset = date.with_day(1)?.weekday().num_days_from_monday();
    Some((date.day0() + offset) / 7 + 1)
}

/// Shift `date` by whole weeks to land in week `week` of its month,
/// preserving the day of week. May cross into an adjacent month.
fn set_week_of_month(date: NaiveDate, week: u32) -> Option<NaiveDate> {
    let current = week_of_month(date)?;
    let delta = i64::from(week) - i64::from(current);
    shift_days(date, delta * 7)
}

/// Shift `date` within its Monday-based week to the given day, 1 = Monday.
fn set_day_of_week(date: NaiveDate, day: u32) -> Option<NaiveDate> {
    let current = date.weekday().number_from_monday();
    shift_days(date, i64::from(day) - i64::from(current))
}

fn shift_days(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    if days >= 0 {
        date.checked_add_days(Days::new(days.unsigned_abs()))
    } else {
        date.checked_sub_days(Days::new(days.unsigned_abs()))
    }
}
