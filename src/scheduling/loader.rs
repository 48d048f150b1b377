use sqlx::SqlitePool;

use super::{AvailabilityResponse, Schedule, ScheduleSettings, SlotQuery, available_slots};
use crate::db::{availability, events, preferences};
use crate::error::AppResult;

/// Load the owner's events, availability records, and preferences, then
/// compute the open slots for `query`.
///
/// The three reads don't depend on each other and run concurrently. A failure
/// in any of them fails the whole request.
pub async fn find_available_slots(
    pool: &SqlitePool,
    settings: ScheduleSettings,
    owner_email: &str,
    query: &SlotQuery,
) -> AppResult<AvailabilityResponse> {
    let bounds = query.search_bounds();
    let (events, records, prefs) = tokio::try_join!(
        events::list_events_in_range(pool, owner_email, bounds.start, bounds.end),
        availability::list_slots_in_range(pool, owner_email, bounds.start, bounds.end),
        preferences::get_preferences(pool, owner_email),
    )?;

    let timezone = prefs
        .as_ref()
        .and_then(|p| p.tz())
        .unwrap_or(settings.default_timezone);

    tracing::debug!(
        owner = owner_email,
        events = events.len(),
        availability = records.len(),
        has_preferences = prefs.is_some(),
        timezone = timezone.name(),
        "loaded schedule"
    );

    let schedule = Schedule {
        events: &events,
        availability: &records,
        preferences: prefs.as_ref(),
        timezone,
        default_window: settings.workday,
    };
    Ok(available_slots(query, &schedule))
}
