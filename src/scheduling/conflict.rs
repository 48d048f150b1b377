use chrono::NaiveDate;
use chrono_tz::Tz;

use super::time::{Interval, day_span};
use crate::db::models::{AvailabilitySlot, CalendarEvent, SchedulingPreferences};

/// Everything already committed on one day that a candidate slot must not
/// touch.
#[derive(Debug, Default)]
pub struct DayCommitments {
    events: Vec<Interval>,
    blocks: Vec<Interval>,
    blackouts: Vec<Interval>,
}

impl DayCommitments {
    /// Collect the events, availability records, and daily blackout windows
    /// that intersect `date` in `tz`.
    pub fn for_day(
        date: NaiveDate,
        tz: Tz,
        events: &[CalendarEvent],
        availability: &[AvailabilitySlot],
        preferences: Option<&SchedulingPreferences>,
    ) -> Self {
        let day = day_span(date, tz);

        let events = events
            .iter()
            .map(|e| Interval::new(e.start_time, e.end_time))
            .filter(|span| span.overlaps(&day))
            .collect();

        // Every record type takes part, free included.
        let blocks = availability
            .iter()
            .map(|a| Interval::new(a.start_time, a.end_time))
            .filter(|span| span.overlaps(&day))
            .collect();

        let blackouts = preferences
            .map(|p| p.blackout_times.iter().map(|w| w.on(date, tz)).collect())
            .unwrap_or_default();

        Self {
            events,
            blocks,
            blackouts,
        }
    }

    pub fn conflicts_with(&self, candidate: &Interval) -> bool {
        self.events
            .iter()
            .chain(&self.blocks)
            .chain(&self.blackouts)
            .any(|span| span.overlaps(candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::SlotType;
    use crate::scheduling::test_support::{availability, event, preferences};
    use crate::scheduling::{TimeOfDay, TimeWindow};
    use chrono::{DateTime, Utc};

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn span(start: &str, end: &str) -> Interval {
        Interval::new(utc(start), utc(end))
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    #[test]
    fn test_event_conflict() {
        let events = [event("2026-03-02T10:00:00Z", "2026-03-02T11:00:00Z")];
        let day = DayCommitments::for_day(monday(), Tz::UTC, &events, &[], None);
        assert!(day.conflicts_with(&span("2026-03-02T09:30:00Z", "2026-03-02T10:30:00Z")));
        assert!(day.conflicts_with(&span("2026-03-02T10:45:00Z", "2026-03-02T11:45:00Z")));
        assert!(!day.conflicts_with(&span("2026-03-02T09:00:00Z", "2026-03-02T10:00:00Z")));
        assert!(!day.conflicts_with(&span("2026-03-02T11:00:00Z", "2026-03-02T12:00:00Z")));
    }

    #[test]
    fn test_events_on_other_days_ignored() {
        let events = [event("2026-03-03T10:00:00Z", "2026-03-03T11:00:00Z")];
        let day = DayCommitments::for_day(monday(), Tz::UTC, &events, &[], None);
        assert!(!day.conflicts_with(&span("2026-03-02T10:00:00Z", "2026-03-02T11:00:00Z")));
    }

    #[test]
    fn test_multi_day_event_blocks_middle_day() {
        let events = [event("2026-03-01T12:00:00Z", "2026-03-03T12:00:00Z")];
        let day = DayCommitments::for_day(monday(), Tz::UTC, &events, &[], None);
        assert!(day.conflicts_with(&span("2026-03-02T09:00:00Z", "2026-03-02T10:00:00Z")));
    }

    #[test]
    fn test_every_availability_type_conflicts_on_overlap() {
        for slot_type in [SlotType::Busy, SlotType::Blocked, SlotType::Free] {
            let records = [availability("2026-03-02T12:00:00Z", "2026-03-02T13:00:00Z", slot_type)];
            let day = DayCommitments::for_day(monday(), Tz::UTC, &[], &records, None);
            assert!(
                day.conflicts_with(&span("2026-03-02T12:30:00Z", "2026-03-02T13:30:00Z")),
                "{slot_type:?} should conflict"
            );
            assert!(!day.conflicts_with(&span("2026-03-02T13:00:00Z", "2026-03-02T14:00:00Z")));
        }
    }

    #[test]
    fn test_blackout_times_conflict() {
        let mut prefs = preferences(15, vec![]);
        prefs.blackout_times = vec![TimeWindow {
            start: TimeOfDay::new(12, 0).unwrap(),
            end: TimeOfDay::new(13, 0).unwrap(),
        }];
        let day = DayCommitments::for_day(monday(), Tz::UTC, &[], &[], Some(&prefs));
        assert!(day.conflicts_with(&span("2026-03-02T11:30:00Z", "2026-03-02T12:30:00Z")));
        assert!(!day.conflicts_with(&span("2026-03-02T13:00:00Z", "2026-03-02T13:30:00Z")));
    }
}
