use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::models::{AvailabilitySlot, SlotInput};
use crate::error::{AppError, AppResult};

/// Create an availability record owned by `owner_email`.
pub async fn create_slot(
    pool: &SqlitePool,
    owner_email: &str,
    input: &SlotInput,
) -> AppResult<AvailabilitySlot> {
    input.validate()?;
    let id = Uuid::now_v7().to_string();

    sqlx::query(
        "INSERT INTO availability_slots (id, owner_email, start_time, end_time, slot_type)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(owner_email)
    .bind(input.start_time)
    .bind(input.end_time)
    .bind(input.slot_type.as_str())
    .execute(pool)
    .await?;

    get_slot(pool, owner_email, &id)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Slot created but not found")))
}

/// Get one of the owner's availability records by ID.
pub async fn get_slot(
    pool: &SqlitePool,
    owner_email: &str,
    id: &str,
) -> AppResult<Option<AvailabilitySlot>> {
    let slot = sqlx::query_as::<_, AvailabilitySlot>(
        "SELECT * FROM availability_slots WHERE owner_email = ? AND id = ?",
    )
    .bind(owner_email)
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(slot)
}

/// List all of the owner's availability records.
pub async fn list_slots(pool: &SqlitePool, owner_email: &str) -> AppResult<Vec<AvailabilitySlot>> {
    let slots = sqlx::query_as::<_, AvailabilitySlot>(
        "SELECT * FROM availability_slots WHERE owner_email = ? ORDER BY start_time, id",
    )
    .bind(owner_email)
    .fetch_all(pool)
    .await?;
    Ok(slots)
}

/// List the owner's availability records that intersect `[start, end)`.
pub async fn list_slots_in_range(
    pool: &SqlitePool,
    owner_email: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> AppResult<Vec<AvailabilitySlot>> {
    let slots = sqlx::query_as::<_, AvailabilitySlot>(
        "SELECT * FROM availability_slots
         WHERE owner_email = ?
           AND start_time < ?
           AND end_time >= ?
         ORDER BY start_time, id",
    )
    .bind(owner_email)
    .bind(end)
    .bind(start)
    .fetch_all(pool)
    .await?;
    Ok(slots)
}

/// Replace an existing availability record.
pub async fn update_slot(
    pool: &SqlitePool,
    owner_email: &str,
    id: &str,
    input: &SlotInput,
) -> AppResult<AvailabilitySlot> {
    input.validate()?;

    let result = sqlx::query(
        "UPDATE availability_slots SET start_time = ?, end_time = ?, slot_type = ?,
         updated_at = datetime('now')
         WHERE owner_email = ? AND id = ?",
    )
    .bind(input.start_time)
    .bind(input.end_time)
    .bind(input.slot_type.as_str())
    .bind(owner_email)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Availability slot '{id}' not found")));
    }

    get_slot(pool, owner_email, id)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Slot updated but not found")))
}

/// Delete one of the owner's availability records.
pub async fn delete_slot(pool: &SqlitePool, owner_email: &str, id: &str) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM availability_slots WHERE owner_email = ? AND id = ?")
        .bind(owner_email)
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Availability slot '{id}' not found")));
    }
    Ok(())
}
