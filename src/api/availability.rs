use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Extension, Query, State};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::auth::Identity;
use super::envelope::Envelope;
use super::{ApiState, parse_body, parse_value, query_params, require_param};
use crate::db::models::{AvailabilitySlot, PreferencesInput, SchedulingPreferences, SlotInput};
use crate::db::{availability, preferences};
use crate::error::{AppError, AppResult};
use crate::scheduling::{self, SlotQuery};

const ACTION_AVAILABLE_SLOTS: &str = "available-slots";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityParams {
    action: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    duration: Option<String>,
    id: Option<String>,
}

#[derive(Debug, Serialize)]
struct AvailabilityOverview {
    slots: Vec<AvailabilitySlot>,
    preferences: Option<SchedulingPreferences>,
}

/// Which record a POST/PUT body targets.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum MutationKind {
    Slot,
    Preferences,
}

#[derive(Debug, Deserialize)]
struct MutationBody {
    #[serde(rename = "type")]
    kind: MutationKind,
    #[serde(default)]
    id: Option<String>,
    data: serde_json::Value,
}

/// GET /api/calendar/availability
///
/// Without an `action`, returns the caller's availability records and
/// preferences. With `action=available-slots`, runs the slot computation.
pub async fn get_availability(
    State(state): State<ApiState>,
    Extension(identity): Extension<Identity>,
    params: Result<Query<AvailabilityParams>, QueryRejection>,
) -> AppResult<Response> {
    let params = query_params(params)?;

    match params.action.as_deref() {
        None => {
            let (slots, prefs) = tokio::try_join!(
                availability::list_slots(&state.pool, &identity.email),
                preferences::get_preferences(&state.pool, &identity.email),
            )?;
            Ok(Envelope::ok(AvailabilityOverview {
                slots,
                preferences: prefs,
            })
            .into_response())
        }
        Some(ACTION_AVAILABLE_SLOTS) => {
            let query = slot_query(&params)?;
            let response = scheduling::find_available_slots(
                &state.pool,
                state.settings,
                &identity.email,
                &query,
            )
            .await?;
            Ok(Envelope::ok(response).into_response())
        }
        Some(other) => Err(AppError::BadRequest(format!("Unknown action '{other}'"))),
    }
}

fn slot_query(params: &AvailabilityParams) -> AppResult<SlotQuery> {
    let (Some(start), Some(end)) = (params.start_date.as_deref(), params.end_date.as_deref())
    else {
        return Err(AppError::BadRequest(
            "startDate and endDate are required".to_string(),
        ));
    };
    let start_date = scheduling::parse_date(start)?;
    let end_date = scheduling::parse_date(end)?;
    let duration = scheduling::parse_duration(params.duration.as_deref())?;
    Ok(SlotQuery::new(start_date, end_date, duration)?)
}

/// POST /api/calendar/availability: `{ "type": "slot" | "preferences", "data": ... }`
pub async fn create_availability(
    State(state): State<ApiState>,
    Extension(identity): Extension<Identity>,
    body: Bytes,
) -> AppResult<Response> {
    let body: MutationBody = parse_body(&body)?;

    match body.kind {
        MutationKind::Slot => {
            let input: SlotInput = parse_value(body.data)?;
            let slot = availability::create_slot(&state.pool, &identity.email, &input).await?;
            tracing::info!(owner = %identity.email, id = %slot.id, "availability slot created");
            Ok(Envelope::created(slot).into_response())
        }
        MutationKind::Preferences => {
            let input: PreferencesInput = parse_value(body.data)?;
            let prefs =
                preferences::upsert_preferences(&state.pool, &identity.email, &input).await?;
            tracing::info!(owner = %identity.email, "scheduling preferences saved");
            Ok(Envelope::ok(prefs).into_response())
        }
    }
}

/// PUT /api/calendar/availability: `{ "type", "id", "data" }`. Preferences
/// are keyed by the caller, so `id` only matters for slots.
pub async fn update_availability(
    State(state): State<ApiState>,
    Extension(identity): Extension<Identity>,
    body: Bytes,
) -> AppResult<Response> {
    let body: MutationBody = parse_body(&body)?;

    match body.kind {
        MutationKind::Slot => {
            let id = require_param(body.id.as_deref(), "id")?;
            let input: SlotInput = parse_value(body.data)?;
            let slot = availability::update_slot(&state.pool, &identity.email, id, &input).await?;
            Ok(Envelope::ok(slot).into_response())
        }
        MutationKind::Preferences => {
            let input: PreferencesInput = parse_value(body.data)?;
            let prefs =
                preferences::upsert_preferences(&state.pool, &identity.email, &input).await?;
            Ok(Envelope::ok(prefs).into_response())
        }
    }
}

/// DELETE /api/calendar/availability?id=
pub async fn delete_availability(
    State(state): State<ApiState>,
    Extension(identity): Extension<Identity>,
    params: Result<Query<AvailabilityParams>, QueryRejection>,
) -> AppResult<Response> {
    let params = query_params(params)?;
    let id = require_param(params.id.as_deref(), "id")?;

    availability::delete_slot(&state.pool, &identity.email, id).await?;
    tracing::info!(owner = %identity.email, id, "availability slot deleted");
    Ok(Envelope::ok(json!({ "id": id })).into_response())
}
