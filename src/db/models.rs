use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{AppError, AppResult};
use crate::scheduling::{TimeOfDay, TimeWindow, deserialize_weekdays};

/// Default spacing between generated slot starts when no preference is set.
pub const DEFAULT_BUFFER_MINUTES: i64 = 15;

/// A registered user. The e-mail address is the identity every record is
/// scoped by.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: NaiveDateTime,
}

/// An API token used as a bearer credential.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ApiToken {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub name: String,
    pub created_at: NaiveDateTime,
    pub expires_at: Option<NaiveDateTime>,
}

/// Error for a stored string that doesn't name a known variant.
#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

/// Declares a string-backed enum stored as TEXT and sent as a lowercase
/// JSON string.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident ($kind:literal) {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Return the wire-format string for this variant.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            /// Parse a variant from its wire-format string.
            pub fn from_str_value(s: &str) -> Option<Self> {
                match s {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = UnknownVariant;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                $name::from_str_value(&value).ok_or(UnknownVariant { kind: $kind, value })
            }
        }
    };
}

text_enum! {
    /// What kind of appointment a calendar event is.
    #[derive(Default)]
    EventType("event type") {
        #[default]
        Appointment => "appointment",
        Viewing => "viewing",
        Meeting => "meeting",
        Call => "call",
        Other => "other",
    }
}

text_enum! {
    #[derive(Default)]
    EventStatus("event status") {
        #[default]
        Confirmed => "confirmed",
        Pending => "pending",
        Cancelled => "cancelled",
    }
}

text_enum! {
    /// Where an event came from. Non-internal sources carry an external id.
    #[derive(Default)]
    EventSource("event source") {
        #[default]
        Internal => "internal",
        Google => "google",
        Calendly => "calendly",
    }
}

text_enum! {
    /// Participation type of a user-declared availability span.
    SlotType("slot type") {
        Busy => "busy",
        Blocked => "blocked",
        Free => "free",
    }
}

/// A scheduled occurrence owned by a user.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    pub owner_email: String,
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub all_day: bool,
    pub location: Option<String>,
    #[sqlx(json)]
    pub attendees: Vec<String>,
    #[serde(rename = "type")]
    #[sqlx(try_from = "String")]
    pub event_type: EventType,
    #[sqlx(try_from = "String")]
    pub status: EventStatus,
    #[sqlx(try_from = "String")]
    pub source: EventSource,
    pub external_id: Option<String>,
    pub color: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A user-declared time span with a participation type.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilitySlot {
    pub id: String,
    pub owner_email: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(rename = "type")]
    #[sqlx(try_from = "String")]
    pub slot_type: SlotType,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A weekday + time-of-day range within which slots count as preferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferredTime {
    #[serde(deserialize_with = "deserialize_weekdays")]
    pub days: Vec<Weekday>,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
}

impl PreferredTime {
    pub fn applies_to(&self, weekday: Weekday) -> bool {
        self.days.contains(&weekday)
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow {
            start: self.start_time,
            end: self.end_time,
        }
    }
}

/// Per-user scheduling defaults. At most one record per user.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingPreferences {
    pub owner_email: String,
    pub buffer_minutes: i64,
    #[sqlx(json)]
    pub preferred_times: Vec<PreferredTime>,
    #[sqlx(json)]
    pub blackout_dates: Vec<NaiveDate>,
    #[sqlx(json)]
    pub blackout_times: Vec<TimeWindow>,
    pub timezone: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl SchedulingPreferences {
    /// Buffer between slot starts, never less than one minute so slot
    /// generation always advances.
    pub fn effective_buffer_minutes(&self) -> i64 {
        self.buffer_minutes.max(1)
    }

    /// First preferred-time entry covering `weekday`.
    pub fn preferred_time_for(&self, weekday: Weekday) -> Option<&PreferredTime> {
        self.preferred_times.iter().find(|pt| pt.applies_to(weekday))
    }

    pub fn has_preferred_times(&self) -> bool {
        !self.preferred_times.is_empty()
    }

    /// The user's timezone, if one is set and recognised.
    pub fn tz(&self) -> Option<Tz> {
        self.timezone.as_deref().and_then(|name| name.parse().ok())
    }
}

/// Body for creating or replacing a calendar event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInput {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub all_day: bool,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub attendees: Vec<String>,
    #[serde(default, rename = "type")]
    pub event_type: EventType,
    #[serde(default)]
    pub status: EventStatus,
    #[serde(default)]
    pub source: EventSource,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

impl EventInput {
    pub fn validate(&self) -> AppResult<()> {
        if self.title.trim().is_empty() {
            return Err(AppError::BadRequest("title must not be empty".into()));
        }
        check_order(self.start_time, self.end_time)
    }
}

/// Body for creating or replacing an availability span.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotInput {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(rename = "type")]
    pub slot_type: SlotType,
}

impl SlotInput {
    pub fn validate(&self) -> AppResult<()> {
        check_order(self.start_time, self.end_time)
    }
}

/// Partial preferences update. Absent fields keep their stored (or default)
/// value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesInput {
    pub buffer_minutes: Option<i64>,
    pub preferred_times: Option<Vec<PreferredTime>>,
    pub blackout_dates: Option<Vec<NaiveDate>>,
    pub blackout_times: Option<Vec<TimeWindow>>,
    /// `None` keeps the stored timezone; `Some(None)` (an explicit `null`)
    /// clears it back to the server default.
    #[serde(default, deserialize_with = "present")]
    pub timezone: Option<Option<String>>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl PreferencesInput {
    pub fn validate(&self) -> AppResult<()> {
        if self.buffer_minutes.is_some_and(|b| b < 0) {
            return Err(AppError::BadRequest(
                "bufferMinutes must not be negative".into(),
            ));
        }
        let windows = self
            .preferred_times
            .iter()
            .flatten()
            .map(PreferredTime::window)
            .chain(self.blackout_times.iter().flatten().copied());
        for window in windows {
            if window.start >= window.end {
                return Err(AppError::BadRequest(format!(
                    "time window {}-{} must start before it ends",
                    window.start, window.end
                )));
            }
        }
        if let Some(Some(tz)) = &self.timezone
            && tz.parse::<Tz>().is_err()
        {
            return Err(AppError::BadRequest(format!("unknown timezone '{tz}'")));
        }
        Ok(())
    }
}

fn check_order(start: DateTime<Utc>, end: DateTime<Utc>) -> AppResult<()> {
    if start > end {
        return Err(AppError::BadRequest(
            "startTime must not be after endTime".into(),
        ));
    }
    Ok(())
}
