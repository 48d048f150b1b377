use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A wall-clock time of day with minute precision, written as `HH:MM`.
/// `24:00` is accepted so a window can run to the end of the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub const MIDNIGHT: TimeOfDay = TimeOfDay(0);
    pub const END_OF_DAY: TimeOfDay = TimeOfDay(24 * 60);

    pub fn new(hour: u16, minute: u16) -> Option<Self> {
        let total = hour.checked_mul(60)?.checked_add(minute)?;
        (minute < 60 && total <= Self::END_OF_DAY.0).then_some(TimeOfDay(total))
    }

    /// The local date-time this time of day falls on for `date`.
    pub fn on(self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(NaiveTime::MIN) + Duration::minutes(i64::from(self.0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid time of day '{0}', expected HH:MM")]
pub struct ParseTimeOfDayError(String);

impl FromStr for TimeOfDay {
    type Err = ParseTimeOfDayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseTimeOfDayError(s.to_string());
        let mut parts = s.trim().split(':');
        let hour: u16 = parts.next().and_then(|h| h.parse().ok()).ok_or_else(err)?;
        let minute: u16 = parts.next().and_then(|m| m.parse().ok()).ok_or_else(err)?;
        // Tolerate a trailing ":00" seconds component.
        match parts.next() {
            None => {}
            Some(sec) if sec.parse::<u16>().is_ok_and(|v| v == 0) => {}
            Some(_) => return Err(err()),
        }
        if parts.next().is_some() {
            return Err(err());
        }
        TimeOfDay::new(hour, minute).ok_or_else(err)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A time-of-day range, e.g. working hours or a daily blackout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    #[serde(rename = "startTime")]
    pub start: TimeOfDay,
    #[serde(rename = "endTime")]
    pub end: TimeOfDay,
}

impl TimeWindow {
    /// Resolve this window on `date` in `tz` to absolute instants.
    pub fn on(&self, date: NaiveDate, tz: Tz) -> Interval {
        Interval::new(
            local_to_utc(tz, self.start.on(date)),
            local_to_utc(tz, self.end.on(date)),
        )
    }
}

/// A half-open `[start, end)` span of absolute time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        intervals_overlap(self, other)
    }

    /// Whether `other` lies entirely inside this interval.
    pub fn contains(&self, other: &Interval) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Half-open overlap test shared by every conflict check.
pub fn intervals_overlap(a: &Interval, b: &Interval) -> bool {
    a.start < b.end && b.start < a.end
}

/// The local calendar day `date` as an absolute interval.
pub fn day_span(date: NaiveDate, tz: Tz) -> Interval {
    TimeWindow {
        start: TimeOfDay::MIDNIGHT,
        end: TimeOfDay::END_OF_DAY,
    }
    .on(date, tz)
}

/// Convert a local wall-clock time to UTC. Ambiguous times (DST fall-back)
/// take the earlier instant; times inside a DST gap move forward an hour.
pub fn local_to_utc(tz: Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

const SUNDAY_FIRST: [Weekday; 7] = [
    Weekday::Sun,
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
];

pub fn is_weekend(weekday: Weekday) -> bool {
    matches!(weekday, Weekday::Sat | Weekday::Sun)
}

/// Deserialize a list of weekdays given either as names (`"monday"`, `"Mon"`)
/// or as numbers with Sunday as 0.
pub fn deserialize_weekdays<'de, D>(deserializer: D) -> Result<Vec<Weekday>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawDay {
        Number(u8),
        Name(String),
    }

    let raw = Vec::<RawDay>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|day| match day {
            RawDay::Number(n) if n < 7 => Ok(SUNDAY_FIRST[usize::from(n)]),
            RawDay::Number(n) => Err(serde::de::Error::custom(format!(
                "weekday number {n} out of range 0-6"
            ))),
            RawDay::Name(name) => name
                .parse::<Weekday>()
                .map_err(|_| serde::de::Error::custom(format!("unknown weekday '{name}'"))),
        })
        .collect()
}
