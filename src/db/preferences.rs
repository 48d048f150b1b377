use sqlx::SqlitePool;
use sqlx::types::Json;

use super::models::{DEFAULT_BUFFER_MINUTES, PreferencesInput, SchedulingPreferences};
use crate::error::{AppError, AppResult};

/// Get the owner's scheduling preferences, if any were ever saved.
pub async fn get_preferences(
    pool: &SqlitePool,
    owner_email: &str,
) -> AppResult<Option<SchedulingPreferences>> {
    let prefs = sqlx::query_as::<_, SchedulingPreferences>(
        "SELECT * FROM scheduling_preferences WHERE owner_email = ?",
    )
    .bind(owner_email)
    .fetch_optional(pool)
    .await?;
    Ok(prefs)
}

/// Create the owner's preferences or merge `input` into the existing record.
///
/// This is a single statement, so two concurrent writers can't both decide
/// the record is missing. Fields absent from `input` keep their stored value
/// (or the default on first write). An explicit `null` timezone clears it.
pub async fn upsert_preferences(
    pool: &SqlitePool,
    owner_email: &str,
    input: &PreferencesInput,
) -> AppResult<SchedulingPreferences> {
    input.validate()?;

    sqlx::query(
        "INSERT INTO scheduling_preferences
         (owner_email, buffer_minutes, preferred_times, blackout_dates, blackout_times, timezone)
         VALUES (?1, COALESCE(?2, ?7), COALESCE(?3, '[]'), COALESCE(?4, '[]'), COALESCE(?5, '[]'), ?6)
         ON CONFLICT (owner_email) DO UPDATE SET
           buffer_minutes = COALESCE(?2, buffer_minutes),
           preferred_times = COALESCE(?3, preferred_times),
           blackout_dates = COALESCE(?4, blackout_dates),
           blackout_times = COALESCE(?5, blackout_times),
           timezone = CASE WHEN ?8 THEN ?6 ELSE timezone END,
           updated_at = datetime('now')",
    )
    .bind(owner_email)
    .bind(input.buffer_minutes)
    .bind(input.preferred_times.as_ref().map(Json))
    .bind(input.blackout_dates.as_ref().map(Json))
    .bind(input.blackout_times.as_ref().map(Json))
    .bind(input.timezone.as_ref().and_then(Option::as_deref))
    .bind(DEFAULT_BUFFER_MINUTES)
    .bind(input.timezone.is_some())
    .execute(pool)
    .await?;

    get_preferences(pool, owner_email)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Preferences saved but not found")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::db::models::PreferredTime;
    use crate::scheduling::{TimeOfDay, TimeWindow};
    use chrono::{NaiveDate, Weekday};

    const OWNER: &str = "agent@example.com";

    fn hm(h: u16, m: u16) -> TimeOfDay {
        TimeOfDay::new(h, m).unwrap()
    }

    #[tokio::test]
    async fn test_missing_preferences() {
        let pool = db::test_pool().await;
        assert!(get_preferences(&pool, OWNER).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_first_write_fills_defaults() {
        let pool = db::test_pool().await;

        let prefs = upsert_preferences(
            &pool,
            OWNER,
            &PreferencesInput {
                timezone: Some(Some("America/Chicago".to_string())),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(prefs.buffer_minutes, DEFAULT_BUFFER_MINUTES);
        assert!(prefs.preferred_times.is_empty());
        assert!(prefs.blackout_dates.is_empty());
        assert_eq!(prefs.tz(), Some(chrono_tz::America::Chicago));
    }

    #[tokio::test]
    async fn test_partial_update_keeps_other_fields() {
        let pool = db::test_pool().await;

        let preferred = vec![PreferredTime {
            days: vec![Weekday::Mon, Weekday::Thu],
            start_time: hm(9, 0),
            end_time: hm(12, 0),
        }];
        upsert_preferences(
            &pool,
            OWNER,
            &PreferencesInput {
                buffer_minutes: Some(30),
                preferred_times: Some(preferred.clone()),
                blackout_dates: Some(vec![NaiveDate::from_ymd_opt(2026, 12, 25).unwrap()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let prefs = upsert_preferences(
            &pool,
            OWNER,
            &PreferencesInput {
                blackout_times: Some(vec![TimeWindow {
                    start: hm(12, 0),
                    end: hm(13, 0),
                }]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(prefs.buffer_minutes, 30);
        assert_eq!(prefs.preferred_times, preferred);
        assert_eq!(prefs.blackout_dates.len(), 1);
        assert_eq!(prefs.blackout_times.len(), 1);

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM scheduling_preferences")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn test_null_timezone_clears_stored_value() {
        let pool = db::test_pool().await;
        let tokyo = PreferencesInput {
            timezone: Some(Some("Asia/Tokyo".to_string())),
            ..Default::default()
        };
        upsert_preferences(&pool, OWNER, &tokyo).await.unwrap();

        let untouched = upsert_preferences(
            &pool,
            OWNER,
            &PreferencesInput {
                buffer_minutes: Some(20),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(untouched.tz(), Some(chrono_tz::Asia::Tokyo));

        let cleared: PreferencesInput = serde_json::from_str(r#"{"timezone": null}"#).unwrap();
        let prefs = upsert_preferences(&pool, OWNER, &cleared).await.unwrap();
        assert_eq!(prefs.timezone, None);
        assert_eq!(prefs.buffer_minutes, 20);
    }

    #[tokio::test]
    async fn test_invalid_input_not_saved() {
        let pool = db::test_pool().await;

        let result = upsert_preferences(
            &pool,
            OWNER,
            &PreferencesInput {
                buffer_minutes: Some(-1),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert!(get_preferences(&pool, OWNER).await.unwrap().is_none());
    }
}
