//! JSON HTTP API. Every route under `/api` requires an authenticated caller
//! and answers with the `{ success, data | error, status }` envelope.

mod auth;
mod availability;
mod envelope;
mod events;

use axum::Router;
use axum::extract::Query;
use axum::extract::rejection::QueryRejection;
use axum::middleware;
use axum::routing::{get, post};
use serde::de::DeserializeOwned;
use serde_json::json;
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::{AppError, AppResult};
use crate::scheduling::ScheduleSettings;
use envelope::Envelope;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub pool: SqlitePool,
    pub settings: ScheduleSettings,
}

/// Build the API router.
pub fn router(pool: SqlitePool, settings: ScheduleSettings) -> Router {
    let state = ApiState {
        pool: pool.clone(),
        settings,
    };

    let api = Router::new()
        .route(
            "/api/calendar/availability",
            get(availability::get_availability)
                .post(availability::create_availability)
                .put(availability::update_availability)
                .delete(availability::delete_availability),
        )
        .route(
            "/api/calendar/events",
            get(events::list_events)
                .post(events::create_event)
                .put(events::update_event)
                .delete(events::delete_event),
        )
        .route("/api/calendar/events/sync", post(events::sync_events))
        .route_layer(middleware::from_fn_with_state(
            pool,
            auth::require_identity,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(api)
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Envelope<serde_json::Value> {
    Envelope::ok(json!({ "status": "ok" }))
}

async fn not_found() -> AppError {
    AppError::NotFound("No such route".to_string())
}

fn query_params<T>(params: Result<Query<T>, QueryRejection>) -> AppResult<T> {
    params
        .map(|Query(p)| p)
        .map_err(|e| AppError::BadRequest(e.body_text()))
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> AppResult<T> {
    serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid request body: {e}")))
}

fn parse_value<T: DeserializeOwned>(data: serde_json::Value) -> AppResult<T> {
    serde_json::from_value(data).map_err(|e| AppError::BadRequest(format!("Invalid data: {e}")))
}

fn require_param<'a>(value: Option<&'a str>, name: &str) -> AppResult<&'a str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("{name} is required")))
}
