//! Slot computation: turns a user's events, availability records, and
//! scheduling preferences into the list of open, fixed-length slots in a
//! date range.
//!
//! The computation itself is pure; `loader` fetches the records it runs
//! against.

mod conflict;
mod days;
mod loader;
mod slots;
mod time;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;

pub use time::{Interval, TimeOfDay, TimeWindow, day_span, deserialize_weekdays};

pub use loader::find_available_slots;

use conflict::DayCommitments;
use days::{WorkDay, work_days};
use slots::candidate_slots;

use crate::db::models::{
    AvailabilitySlot, CalendarEvent, DEFAULT_BUFFER_MINUTES, SchedulingPreferences,
};

/// Slot length used when a request doesn't name one.
pub const DEFAULT_SLOT_MINUTES: u32 = 120;

/// Longest accepted slot length.
pub const MAX_SLOT_MINUTES: u32 = 24 * 60;

/// Longest accepted date range, in days.
pub const MAX_RANGE_DAYS: i64 = 366;

/// Years a query date may fall in. Keeps the padded UTC search bounds and
/// every local day span representable.
const SUPPORTED_YEARS: std::ops::RangeInclusive<i32> = 1..=9999;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("invalid date '{0}', expected YYYY-MM-DD or an RFC 3339 timestamp")]
    InvalidDate(String),

    #[error("duration must be between 1 and {} minutes", MAX_SLOT_MINUTES)]
    InvalidDuration,

    #[error("date range must not exceed {} days", MAX_RANGE_DAYS)]
    RangeTooLong,
}

/// A validated request for open slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub duration_minutes: u32,
}

impl SlotQuery {
    pub fn new(
        start_date: NaiveDate,
        end_date: NaiveDate,
        duration_minutes: u32,
    ) -> Result<Self, QueryError> {
        if duration_minutes == 0 || duration_minutes > MAX_SLOT_MINUTES {
            return Err(QueryError::InvalidDuration);
        }
        let start_date = supported(start_date)?;
        let end_date = supported(end_date)?;
        if (end_date - start_date).num_days() >= MAX_RANGE_DAYS {
            return Err(QueryError::RangeTooLong);
        }
        Ok(Self {
            start_date,
            end_date,
            duration_minutes,
        })
    }

    fn duration(&self) -> Duration {
        Duration::minutes(i64::from(self.duration_minutes))
    }

    /// UTC bounds wide enough to hold every requested day in any timezone.
    pub fn search_bounds(&self) -> Interval {
        let midnight = |date: NaiveDate| date.and_time(NaiveTime::MIN).and_utc();
        Interval::new(
            midnight(self.start_date) - Duration::days(1),
            midnight(self.end_date) + Duration::days(2),
        )
    }
}

/// Parse a `startDate`/`endDate` value: either a plain date or an RFC 3339
/// timestamp, whose date as written (in its own offset) is used.
pub fn parse_date(raw: &str) -> Result<NaiveDate, QueryError> {
    let raw = raw.trim();
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.date_naive()))
        .map_err(|_| QueryError::InvalidDate(raw.to_string()))?;
    supported(date)
}

fn supported(date: NaiveDate) -> Result<NaiveDate, QueryError> {
    if SUPPORTED_YEARS.contains(&date.year()) {
        Ok(date)
    } else {
        Err(QueryError::InvalidDate(date.to_string()))
    }
}

/// Parse an optional `duration` query value, falling back to the default.
pub fn parse_duration(raw: Option<&str>) -> Result<u32, QueryError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(DEFAULT_SLOT_MINUTES),
        Some(s) => s.parse().map_err(|_| QueryError::InvalidDuration),
    }
}

/// Server-wide scheduling defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleSettings {
    /// Timezone for users whose preferences don't name one.
    pub default_timezone: Tz,
    /// Working hours for weekdays without a preferred-time entry.
    pub workday: TimeWindow,
}

/// The records a slot computation runs against.
#[derive(Debug, Clone, Copy)]
pub struct Schedule<'a> {
    pub events: &'a [CalendarEvent],
    pub availability: &'a [AvailabilitySlot],
    pub preferences: Option<&'a SchedulingPreferences>,
    pub timezone: Tz,
    /// Working hours for weekdays without a preferred-time entry.
    pub default_window: TimeWindow,
}

/// One open slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableTimeSlot {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration: u32,
    pub is_preferred: bool,
    /// Always empty: conflicting candidates never become slots.
    pub conflicts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityResponse {
    pub slots: Vec<AvailableTimeSlot>,
    pub total: usize,
}

/// Compute every open slot for `query`, in chronological order.
pub fn available_slots(query: &SlotQuery, schedule: &Schedule<'_>) -> AvailabilityResponse {
    let buffer = Duration::minutes(
        schedule
            .preferences
            .map(SchedulingPreferences::effective_buffer_minutes)
            .unwrap_or(DEFAULT_BUFFER_MINUTES),
    );

    let days = work_days(
        query.start_date,
        query.end_date,
        schedule.preferences,
        schedule.default_window,
        schedule.timezone,
    );

    let mut slots = Vec::new();
    for day in days {
        let commitments = DayCommitments::for_day(
            day.date,
            schedule.timezone,
            schedule.events,
            schedule.availability,
            schedule.preferences,
        );
        let open = candidate_slots(day.window, query.duration(), buffer)
            .into_iter()
            .filter(|candidate| !commitments.conflicts_with(candidate))
            .map(|candidate| AvailableTimeSlot {
                start_time: candidate.start,
                end_time: candidate.end,
                duration: query.duration_minutes,
                is_preferred: is_preferred(&candidate, &day, schedule),
                conflicts: Vec::new(),
            });
        slots.extend(open);
    }

    tracing::debug!(
        start = %query.start_date,
        end = %query.end_date,
        duration = query.duration_minutes,
        total = slots.len(),
        "computed available slots"
    );

    let total = slots.len();
    AvailabilityResponse { slots, total }
}

/// A slot is preferred when some preferred-time entry covers its weekday and
/// fully contains it on that date.
fn is_preferred(candidate: &Interval, day: &WorkDay, schedule: &Schedule<'_>) -> bool {
    schedule.preferences.is_some_and(|prefs| {
        prefs
            .preferred_times
            .iter()
            .filter(|pt| pt.applies_to(day.weekday))
            .any(|pt| pt.window().on(day.date, schedule.timezone).contains(candidate))
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, NaiveDateTime, Utc};

    use crate::db::models::{
        AvailabilitySlot, CalendarEvent, EventSource, EventStatus, EventType, PreferredTime,
        SchedulingPreferences, SlotType,
    };

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn stamp() -> NaiveDateTime {
        utc("2026-01-01T00:00:00Z").naive_utc()
    }

    pub fn event(start: &str, end: &str) -> CalendarEvent {
        CalendarEvent {
            id: uuid::Uuid::now_v7().to_string(),
            owner_email: "agent@example.com".into(),
            title: "Showing".into(),
            description: None,
            start_time: utc(start),
            end_time: utc(end),
            all_day: false,
            location: None,
            attendees: vec![],
            event_type: EventType::Viewing,
            status: EventStatus::Confirmed,
            source: EventSource::Internal,
            external_id: None,
            color: None,
            created_at: stamp(),
            updated_at: stamp(),
        }
    }

    pub fn availability(start: &str, end: &str, slot_type: SlotType) -> AvailabilitySlot {
        AvailabilitySlot {
            id: uuid::Uuid::now_v7().to_string(),
            owner_email: "agent@example.com".into(),
            start_time: utc(start),
            end_time: utc(end),
            slot_type,
            created_at: stamp(),
            updated_at: stamp(),
        }
    }

    pub fn preferences(buffer_minutes: i64, preferred_times: Vec<PreferredTime>) -> SchedulingPreferences {
        SchedulingPreferences {
            owner_email: "agent@example.com".into(),
            buffer_minutes,
            preferred_times,
            blackout_dates: vec![],
            blackout_times: vec![],
            timezone: None,
            created_at: stamp(),
            updated_at: stamp(),
        }
    }
}
