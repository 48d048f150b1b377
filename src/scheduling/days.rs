use chrono::{Datelike, NaiveDate, Weekday};
use chrono_tz::Tz;

use super::time::{Interval, TimeWindow, is_weekend};
use crate::db::models::SchedulingPreferences;

/// A calendar day that gets slots, with its resolved working window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDay {
    pub date: NaiveDate,
    pub weekday: Weekday,
    pub window: Interval,
}

/// Walk `start..=end` and resolve the working window of every day that
/// should get slots.
///
/// Weekends are skipped only while the user has no preferred-time entries
/// at all; a single entry for any weekday opens every day of the week.
/// Blackout dates are always skipped.
pub fn work_days(
    start: NaiveDate,
    end: NaiveDate,
    preferences: Option<&SchedulingPreferences>,
    default_window: TimeWindow,
    tz: Tz,
) -> Vec<WorkDay> {
    let skip_weekends = !preferences.is_some_and(SchedulingPreferences::has_preferred_times);

    start
        .iter_days()
        .take_while(|date| *date <= end)
        .filter(|date| !(skip_weekends && is_weekend(date.weekday())))
        .filter(|date| !preferences.is_some_and(|p| p.blackout_dates.contains(date)))
        .map(|date| {
            let weekday = date.weekday();
            let window = preferences
                .and_then(|p| p.preferred_time_for(weekday))
                .map(|pt| pt.window())
                .unwrap_or(default_window);
            WorkDay {
                date,
                weekday,
                window: window.on(date, tz),
            }
        })
        .collect()
}
