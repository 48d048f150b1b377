use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::types::Json;
use uuid::Uuid;

use super::models::{CalendarEvent, EventInput, EventSource};
use crate::error::{AppError, AppResult};

/// Create a calendar event owned by `owner_email`.
pub async fn create_event(
    pool: &SqlitePool,
    owner_email: &str,
    input: &EventInput,
) -> AppResult<CalendarEvent> {
    input.validate()?;
    let id = Uuid::now_v7().to_string();

    sqlx::query(
        "INSERT INTO calendar_events
         (id, owner_email, title, description, start_time, end_time, all_day, location,
          attendees, event_type, status, source, external_id, color)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(owner_email)
    .bind(&input.title)
    .bind(&input.description)
    .bind(input.start_time)
    .bind(input.end_time)
    .bind(input.all_day)
    .bind(&input.location)
    .bind(Json(&input.attendees))
    .bind(input.event_type.as_str())
    .bind(input.status.as_str())
    .bind(input.source.as_str())
    .bind(&input.external_id)
    .bind(&input.color)
    .execute(pool)
    .await
    .map_err(map_unique_violation)?;

    get_event(pool, owner_email, &id)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Event created but not found")))
}

/// Get one of the owner's events by ID.
pub async fn get_event(
    pool: &SqlitePool,
    owner_email: &str,
    id: &str,
) -> AppResult<Option<CalendarEvent>> {
    let event = sqlx::query_as::<_, CalendarEvent>(
        "SELECT * FROM calendar_events WHERE owner_email = ? AND id = ?",
    )
    .bind(owner_email)
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(event)
}

/// List all of the owner's events.
pub async fn list_events(pool: &SqlitePool, owner_email: &str) -> AppResult<Vec<CalendarEvent>> {
    let events = sqlx::query_as::<_, CalendarEvent>(
        "SELECT * FROM calendar_events WHERE owner_email = ? ORDER BY start_time, id",
    )
    .bind(owner_email)
    .fetch_all(pool)
    .await?;
    Ok(events)
}

/// List the owner's events that intersect `[start, end)`. Zero-length
/// events sitting at `start` are included.
pub async fn list_events_in_range(
    pool: &SqlitePool,
    owner_email: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> AppResult<Vec<CalendarEvent>> {
    let events = sqlx::query_as::<_, CalendarEvent>(
        "SELECT * FROM calendar_events
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
    Ok(events)
}

/// Replace an existing event.
pub async fn update_event(
    pool: &SqlitePool,
    owner_email: &str,
    id: &str,
    input: &EventInput,
) -> AppResult<CalendarEvent> {
    input.validate()?;

    let result = sqlx::query(
        "UPDATE calendar_events SET title = ?, description = ?, start_time = ?, end_time = ?,
         all_day = ?, location = ?, attendees = ?, event_type = ?, status = ?, source = ?,
         external_id = ?, color = ?, updated_at = datetime('now')
         WHERE owner_email = ? AND id = ?",
    )
    .bind(&input.title)
    .bind(&input.description)
    .bind(input.start_time)
    .bind(input.end_time)
    .bind(input.all_day)
    .bind(&input.location)
    .bind(Json(&input.attendees))
    .bind(input.event_type.as_str())
    .bind(input.status.as_str())
    .bind(input.source.as_str())
    .bind(&input.external_id)
    .bind(&input.color)
    .bind(owner_email)
    .bind(id)
    .execute(pool)
    .await
    .map_err(map_unique_violation)?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Event '{id}' not found")));
    }

    get_event(pool, owner_email, id)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Event updated but not found")))
}

/// Create or update an event pulled from an external calendar, keyed by its
/// source and external ID. Returns the event and whether it was created.
pub async fn upsert_synced_event(
    pool: &SqlitePool,
    owner_email: &str,
    input: &EventInput,
) -> AppResult<(CalendarEvent, bool)> {
    input.validate()?;
    if input.source == EventSource::Internal {
        return Err(AppError::BadRequest(
            "synced events need a non-internal source".to_string(),
        ));
    }
    let external_id = input
        .external_id
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("synced events need an externalId".to_string()))?;

    let new_id = Uuid::now_v7().to_string();
    let id: String = sqlx::query_scalar(
        "INSERT INTO calendar_events
         (id, owner_email, title, description, start_time, end_time, all_day, location,
          attendees, event_type, status, source, external_id, color)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (owner_email, source, external_id) DO UPDATE SET
           title = excluded.title,
           description = excluded.description,
           start_time = excluded.start_time,
           end_time = excluded.end_time,
           all_day = excluded.all_day,
           location = excluded.location,
           attendees = excluded.attendees,
           event_type = excluded.event_type,
           status = excluded.status,
           color = excluded.color,
           updated_at = datetime('now')
         RETURNING id",
    )
    .bind(&new_id)
    .bind(owner_email)
    .bind(&input.title)
    .bind(&input.description)
    .bind(input.start_time)
    .bind(input.end_time)
    .bind(input.all_day)
    .bind(&input.location)
    .bind(Json(&input.attendees))
    .bind(input.event_type.as_str())
    .bind(input.status.as_str())
    .bind(input.source.as_str())
    .bind(external_id)
    .bind(&input.color)
    .fetch_one(pool)
    .await?;

    let event = get_event(pool, owner_email, &id)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Event upserted but not found")))?;
    Ok((event, id == new_id))
}

/// Delete one of the owner's events.
pub async fn delete_event(pool: &SqlitePool, owner_email: &str, id: &str) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM calendar_events WHERE owner_email = ? AND id = ?")
        .bind(owner_email)
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Event '{id}' not found")));
    }
    Ok(())
}

fn map_unique_violation(e: sqlx::Error) -> AppError {
    match e {
        sqlx::Error::Database(ref db_err) if db_err.message().contains("UNIQUE") => {
            AppError::Conflict("An event with this external id already exists".to_string())
        }
        _ => AppError::Database(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::db::models::{EventStatus, EventType};

    const OWNER: &str = "agent@example.com";

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn input(title: &str, start: &str, end: &str) -> EventInput {
        EventInput {
            title: title.to_string(),
            description: None,
            start_time: utc(start),
            end_time: utc(end),
            all_day: false,
            location: Some("12 Elm St".to_string()),
            attendees: vec!["buyer@example.com".to_string()],
            event_type: EventType::Viewing,
            status: EventStatus::Confirmed,
            source: EventSource::Internal,
            external_id: None,
            color: None,
        }
    }

    fn synced(external_id: &str, title: &str, start: &str, end: &str) -> EventInput {
        EventInput {
            source: EventSource::Google,
            external_id: Some(external_id.to_string()),
            ..input(title, start, end)
        }
    }

    #[tokio::test]
    async fn test_create_and_get_event() {
        let pool = db::test_pool().await;

        let event = create_event(
            &pool,
            OWNER,
            &input("Viewing", "2026-03-02T10:00:00Z", "2026-03-02T11:00:00Z"),
        )
        .await
        .unwrap();

        assert_eq!(event.title, "Viewing");
        assert_eq!(event.owner_email, OWNER);
        assert_eq!(event.start_time, utc("2026-03-02T10:00:00Z"));
        assert_eq!(event.attendees, vec!["buyer@example.com".to_string()]);
        assert_eq!(event.event_type, EventType::Viewing);

        let fetched = get_event(&pool, OWNER, &event.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, event.id);

        // Other users can't see it.
        let other = get_event(&pool, "other@example.com", &event.id).await.unwrap();
        assert!(other.is_none());
    }

    #[tokio::test]
    async fn test_create_rejects_reversed_times() {
        let pool = db::test_pool().await;

        let result = create_event(
            &pool,
            OWNER,
            &input("Backwards", "2026-03-02T11:00:00Z", "2026-03-02T10:00:00Z"),
        )
        .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_list_events_in_range() {
        let pool = db::test_pool().await;

        create_event(&pool, OWNER, &input("March", "2026-03-02T10:00:00Z", "2026-03-02T11:00:00Z"))
            .await
            .unwrap();
        create_event(&pool, OWNER, &input("April", "2026-04-01T10:00:00Z", "2026-04-01T11:00:00Z"))
            .await
            .unwrap();
        create_event(
            &pool,
            OWNER,
            &input("Spanning", "2026-02-28T10:00:00Z", "2026-03-03T11:00:00Z"),
        )
        .await
        .unwrap();

        let events = list_events_in_range(
            &pool,
            OWNER,
            utc("2026-03-01T00:00:00Z"),
            utc("2026-03-31T00:00:00Z"),
        )
        .await
        .unwrap();
        let titles: Vec<_> = events.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Spanning", "March"]);

        assert_eq!(list_events(&pool, OWNER).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_update_event() {
        let pool = db::test_pool().await;

        let event = create_event(
            &pool,
            OWNER,
            &input("Viewing", "2026-03-02T10:00:00Z", "2026-03-02T11:00:00Z"),
        )
        .await
        .unwrap();

        let mut changed = input("Second viewing", "2026-03-02T14:00:00Z", "2026-03-02T15:00:00Z");
        changed.status = EventStatus::Pending;
        let updated = update_event(&pool, OWNER, &event.id, &changed).await.unwrap();

        assert_eq!(updated.title, "Second viewing");
        assert_eq!(updated.status, EventStatus::Pending);
        assert_eq!(updated.start_time, utc("2026-03-02T14:00:00Z"));

        let missing = update_event(&pool, OWNER, "nope", &changed).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_upsert_synced_event() {
        let pool = db::test_pool().await;

        let (first, created) = upsert_synced_event(
            &pool,
            OWNER,
            &synced("g-123", "Call", "2026-03-02T10:00:00Z", "2026-03-02T10:30:00Z"),
        )
        .await
        .unwrap();
        assert!(created);

        let (second, created) = upsert_synced_event(
            &pool,
            OWNER,
            &synced("g-123", "Call (moved)", "2026-03-02T11:00:00Z", "2026-03-02T11:30:00Z"),
        )
        .await
        .unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
        assert_eq!(second.title, "Call (moved)");
        assert_eq!(list_events(&pool, OWNER).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_requires_external_identity() {
        let pool = db::test_pool().await;

        let internal = input("Local", "2026-03-02T10:00:00Z", "2026-03-02T11:00:00Z");
        let result = upsert_synced_event(&pool, OWNER, &internal).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));

        let mut no_id = synced("", "Call", "2026-03-02T10:00:00Z", "2026-03-02T10:30:00Z");
        no_id.external_id = None;
        let result = upsert_synced_event(&pool, OWNER, &no_id).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_delete_event() {
        let pool = db::test_pool().await;

        let event = create_event(
            &pool,
            OWNER,
            &input("Viewing", "2026-03-02T10:00:00Z", "2026-03-02T11:00:00Z"),
        )
        .await
        .unwrap();

        delete_event(&pool, OWNER, &event.id).await.unwrap();
        assert!(get_event(&pool, OWNER, &event.id).await.unwrap().is_none());

        let again = delete_event(&pool, OWNER, &event.id).await;
        assert!(matches!(again, Err(AppError::NotFound(_))));
    }
}
