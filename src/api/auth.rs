use axum::{
    extract::{Request, State},
    http::{HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::Engine;
use sqlx::SqlitePool;

use crate::db::models::User;
use crate::db::{tokens, users};
use crate::error::{AppError, AppResult};

/// The authenticated caller. Every record an API request touches is scoped to
/// `email`.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
    pub email: String,
}

impl From<User> for Identity {
    fn from(user: User) -> Self {
        Self {
            user_id: user.id,
            email: user.email,
        }
    }
}

/// Middleware that resolves the caller from a Bearer token or Basic
/// credentials and stores an [`Identity`] in the request extensions.
/// Requests without a valid identity are rejected before any handler runs.
pub async fn require_identity(
    State(pool): State<SqlitePool>,
    mut request: Request,
    next: Next,
) -> Result<Response, Response> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| unauthorized_response("missing Authorization header"))?;

    let user = if let Some(token) = auth_header.strip_prefix("Bearer ") {
        bearer_user(&pool, token.trim()).await
    } else if let Some(encoded) = auth_header.strip_prefix("Basic ") {
        basic_user(&pool, encoded.trim()).await
    } else {
        return Err(unauthorized_response("unsupported authorization scheme"));
    };

    let user = user
        .map_err(|e| {
            tracing::warn!(error = %e, "authentication lookup failed");
            unauthorized_response("lookup failed")
        })?
        .ok_or_else(|| unauthorized_response("invalid credentials"))?;

    let identity = Identity::from(user);
    tracing::debug!(user_id = %identity.user_id, "request authenticated");
    request.extensions_mut().insert(identity);

    Ok(next.run(request).await)
}

async fn bearer_user(pool: &SqlitePool, token: &str) -> AppResult<Option<User>> {
    match tokens::validate_token(pool, token).await? {
        Some(user_id) => users::get_user_by_id(pool, &user_id).await,
        None => Ok(None),
    }
}

async fn basic_user(pool: &SqlitePool, encoded: &str) -> AppResult<Option<User>> {
    let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded) else {
        return Ok(None);
    };
    let Ok(credentials) = String::from_utf8(decoded) else {
        return Ok(None);
    };
    let Some((email, password)) = credentials.split_once(':') else {
        return Ok(None);
    };
    users::verify_user(pool, email, password).await
}

fn unauthorized_response(reason: &str) -> Response {
    tracing::debug!(reason, "rejecting unauthenticated request");
    let mut response = AppError::Unauthorized.into_response();
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Bearer realm=\"realty-scheduler\""),
    );
    response
}
