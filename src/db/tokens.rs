//! API tokens. A raw token is `sched_<token id>.<secret>`: the id locates the
//! record, and only an Argon2 hash of the secret is stored.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::Engine;
use chrono::{Duration, Utc};
use rand::RngCore;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::models::ApiToken;
use crate::error::{AppError, AppResult};

/// Prefix carried by every raw API token.
pub const TOKEN_PREFIX: &str = "sched_";

/// Create a token for a user, optionally expiring after `valid_for`.
/// Returns the raw token (shown once) and the stored record.
pub async fn create_token(
    pool: &SqlitePool,
    user_id: &str,
    name: &str,
    valid_for: Option<Duration>,
) -> AppResult<(String, ApiToken)> {
    let id = Uuid::now_v7().to_string();
    let secret = generate_secret();
    let secret_hash = hash_secret(&secret)?;
    let expires_at = valid_for.map(|d| (Utc::now() + d).naive_utc());

    sqlx::query(
        "INSERT INTO api_tokens (id, user_id, token_hash, name, expires_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(user_id)
    .bind(&secret_hash)
    .bind(name)
    .bind(expires_at)
    .execute(pool)
    .await?;

    let record = sqlx::query_as::<_, ApiToken>("SELECT * FROM api_tokens WHERE id = ?")
        .bind(&id)
        .fetch_one(pool)
        .await?;

    Ok((format!("{TOKEN_PREFIX}{id}.{secret}"), record))
}

/// Resolve a raw token to its owner's user ID. Malformed, unknown, expired,
/// and mismatched tokens all give `None`.
pub async fn validate_token(pool: &SqlitePool, raw_token: &str) -> AppResult<Option<String>> {
    let Some((id, secret)) = raw_token
        .strip_prefix(TOKEN_PREFIX)
        .and_then(|rest| rest.split_once('.'))
    else {
        return Ok(None);
    };

    let token = sqlx::query_as::<_, ApiToken>(
        "SELECT * FROM api_tokens
         WHERE id = ? AND (expires_at IS NULL OR expires_at > datetime('now'))",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match token {
        Some(token) if verify_secret(secret, &token.token_hash)? => Ok(Some(token.user_id)),
        _ => Ok(None),
    }
}

/// Delete an API token by ID.
pub async fn delete_token(pool: &SqlitePool, token_id: &str) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM api_tokens WHERE id = ?")
        .bind(token_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Token '{token_id}' not found")));
    }
    Ok(())
}

/// A user's tokens, oldest first. Raw values are never stored.
pub async fn list_tokens_for_user(pool: &SqlitePool, user_id: &str) -> AppResult<Vec<ApiToken>> {
    let tokens = sqlx::query_as::<_, ApiToken>(
        "SELECT * FROM api_tokens WHERE user_id = ? ORDER BY created_at, id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(tokens)
}

fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn hash_secret(secret: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Token hashing failed: {e}")))?;
    Ok(hash.to_string())
}

fn verify_secret(secret: &str, hash: &str) -> AppResult<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid token hash: {e}")))?;
    Ok(Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok())
}
