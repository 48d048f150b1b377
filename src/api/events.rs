use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Extension, Query, State};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::auth::Identity;
use super::envelope::Envelope;
use super::{ApiState, parse_body, parse_value, query_params, require_param};
use crate::db::models::{CalendarEvent, EventInput, EventSource};
use crate::db::{events, preferences};
use crate::error::{AppError, AppResult};
use crate::scheduling::{self, Interval, day_span};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventParams {
    start_date: Option<String>,
    end_date: Option<String>,
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateBody {
    id: Option<String>,
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct SyncBody {
    source: EventSource,
    events: Vec<EventInput>,
}

#[derive(Debug, Serialize)]
struct SyncSummary {
    created: usize,
    updated: usize,
    events: Vec<CalendarEvent>,
}

/// GET /api/calendar/events, optionally limited to `startDate..=endDate`
/// (whole days in the caller's timezone).
pub async fn list_events(
    State(state): State<ApiState>,
    Extension(identity): Extension<Identity>,
    params: Result<Query<EventParams>, QueryRejection>,
) -> AppResult<Response> {
    let params = query_params(params)?;

    let events = match (params.start_date.as_deref(), params.end_date.as_deref()) {
        (None, None) => events::list_events(&state.pool, &identity.email).await?,
        (Some(start), Some(end)) => {
            let range = date_range(&state, &identity, start, end).await?;
            events::list_events_in_range(&state.pool, &identity.email, range.start, range.end)
                .await?
        }
        _ => {
            return Err(AppError::BadRequest(
                "startDate and endDate must be given together".to_string(),
            ));
        }
    };
    Ok(Envelope::ok(events).into_response())
}

async fn date_range(
    state: &ApiState,
    identity: &Identity,
    start: &str,
    end: &str,
) -> AppResult<Interval> {
    let start = scheduling::parse_date(start)?;
    let end = scheduling::parse_date(end)?;
    let tz = preferences::get_preferences(&state.pool, &identity.email)
        .await?
        .and_then(|p| p.tz())
        .unwrap_or(state.settings.default_timezone);
    Ok(Interval::new(day_span(start, tz).start, day_span(end, tz).end))
}

/// POST /api/calendar/events
pub async fn create_event(
    State(state): State<ApiState>,
    Extension(identity): Extension<Identity>,
    body: Bytes,
) -> AppResult<Response> {
    let input: EventInput = parse_body(&body)?;
    let event = events::create_event(&state.pool, &identity.email, &input).await?;
    tracing::info!(owner = %identity.email, id = %event.id, "event created");
    Ok(Envelope::created(event).into_response())
}

/// PUT /api/calendar/events: `{ "id", "data" }`
pub async fn update_event(
    State(state): State<ApiState>,
    Extension(identity): Extension<Identity>,
    body: Bytes,
) -> AppResult<Response> {
    let body: UpdateBody = parse_body(&body)?;
    let id = require_param(body.id.as_deref(), "id")?;
    let input: EventInput = parse_value(body.data)?;
    let event = events::update_event(&state.pool, &identity.email, id, &input).await?;
    Ok(Envelope::ok(event).into_response())
}

/// DELETE /api/calendar/events?id=
pub async fn delete_event(
    State(state): State<ApiState>,
    Extension(identity): Extension<Identity>,
    params: Result<Query<EventParams>, QueryRejection>,
) -> AppResult<Response> {
    let params = query_params(params)?;
    let id = require_param(params.id.as_deref(), "id")?;

    events::delete_event(&state.pool, &identity.email, id).await?;
    tracing::info!(owner = %identity.email, id, "event deleted");
    Ok(Envelope::ok(json!({ "id": id })).into_response())
}

/// POST /api/calendar/events/sync: `{ "source", "events" }`
///
/// Each event is upserted by its `externalId` under `source`. Events are
/// written one at a time; a failure stops the sync and earlier writes stay.
pub async fn sync_events(
    State(state): State<ApiState>,
    Extension(identity): Extension<Identity>,
    body: Bytes,
) -> AppResult<Response> {
    let body: SyncBody = parse_body(&body)?;
    if body.source == EventSource::Internal {
        return Err(AppError::BadRequest(
            "source must name an external calendar".to_string(),
        ));
    }

    let mut summary = SyncSummary {
        created: 0,
        updated: 0,
        events: Vec::with_capacity(body.events.len()),
    };
    for mut input in body.events {
        input.source = body.source;
        let (event, created) =
            events::upsert_synced_event(&state.pool, &identity.email, &input).await?;
        if created {
            summary.created += 1;
        } else {
            summary.updated += 1;
        }
        summary.events.push(event);
    }

    tracing::info!(
        owner = %identity.email,
        source = body.source.as_str(),
        created = summary.created,
        updated = summary.updated,
        "events synced"
    );
    Ok(Envelope::ok(summary).into_response())
}
