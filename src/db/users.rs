use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::models::User;
use crate::error::{AppError, AppResult};

/// Create a new user with a hashed password. E-mail addresses are stored
/// lower-cased so lookups are case-insensitive.
pub async fn create_user(
    pool: &SqlitePool,
    email: &str,
    name: Option<&str>,
    password: &str,
) -> AppResult<User> {
    let email = normalize_email(email)?;
    let id = Uuid::now_v7().to_string();
    let password_hash = hash_password(password)?;

    sqlx::query("INSERT INTO users (id, email, name, password_hash) VALUES (?, ?, ?, ?)")
        .bind(&id)
        .bind(&email)
        .bind(name)
        .bind(&password_hash)
        .execute(pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.message().contains("UNIQUE") => {
                AppError::Conflict(format!("User '{email}' already exists"))
            }
            _ => AppError::Database(e),
        })?;

    get_user_by_email(pool, &email)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("User created but not found")))
}

/// Look up a user by e-mail address.
pub async fn get_user_by_email(pool: &SqlitePool, email: &str) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(email.trim().to_lowercase())
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

/// Look up a user by ID.
pub async fn get_user_by_id(pool: &SqlitePool, id: &str) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

/// List all users ordered by e-mail.
pub async fn list_users(pool: &SqlitePool) -> AppResult<Vec<User>> {
    let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY email")
        .fetch_all(pool)
        .await?;
    Ok(users)
}

/// Reset a user's password by hashing the new password and updating the DB.
pub async fn reset_password(pool: &SqlitePool, email: &str, new_password: &str) -> AppResult<()> {
    let hash = hash_password(new_password)?;
    let rows = sqlx::query("UPDATE users SET password_hash = ? WHERE email = ?")
        .bind(&hash)
        .bind(email.trim().to_lowercase())
        .execute(pool)
        .await?
        .rows_affected();
    if rows == 0 {
        Err(AppError::NotFound(format!("User '{email}' not found")))
    } else {
        Ok(())
    }
}

/// Verify a password against a user's stored hash. Returns the user if valid.
pub async fn verify_user(pool: &SqlitePool, email: &str, password: &str) -> AppResult<Option<User>> {
    let Some(user) = get_user_by_email(pool, email).await? else {
        return Ok(None);
    };

    if verify_password(password, &user.password_hash)? {
        Ok(Some(user))
    } else {
        Ok(None)
    }
}

fn normalize_email(email: &str) -> AppResult<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(AppError::BadRequest(format!(
            "'{email}' is not a valid e-mail address"
        ))),
    }
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Password hashing failed: {e}")))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored hash.
fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid password hash: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn test_create_and_get_user() {
        let pool = db::test_pool().await;

        let user = create_user(&pool, "Agent@Example.com", Some("Avery Agent"), "password123")
            .await
            .unwrap();

        assert_eq!(user.email, "agent@example.com");
        assert_eq!(user.name.as_deref(), Some("Avery Agent"));
        assert!(!user.password_hash.is_empty());

        let fetched = get_user_by_email(&pool, "AGENT@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.id, user.id);
    }

    #[tokio::test]
    async fn test_duplicate_email_fails() {
        let pool = db::test_pool().await;

        create_user(&pool, "agent@example.com", None, "pass1").await.unwrap();
        let result = create_user(&pool, "agent@example.com", None, "pass2").await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_invalid_email_rejected() {
        let pool = db::test_pool().await;

        let result = create_user(&pool, "not-an-email", None, "pass").await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_verify_correct_password() {
        let pool = db::test_pool().await;

        create_user(&pool, "agent@example.com", None, "secret123").await.unwrap();
        let user = verify_user(&pool, "agent@example.com", "secret123").await.unwrap();

        assert!(user.is_some());
        assert_eq!(user.unwrap().email, "agent@example.com");
    }

    #[tokio::test]
    async fn test_verify_wrong_password() {
        let pool = db::test_pool().await;

        create_user(&pool, "agent@example.com", None, "secret123").await.unwrap();
        let user = verify_user(&pool, "agent@example.com", "wrong").await.unwrap();

        assert!(user.is_none());
    }

    #[tokio::test]
    async fn test_verify_nonexistent_user() {
        let pool = db::test_pool().await;

        let user = verify_user(&pool, "nobody@example.com", "password").await.unwrap();
        assert!(user.is_none());
    }

    #[tokio::test]
    async fn test_reset_password() {
        let pool = db::test_pool().await;

        create_user(&pool, "agent@example.com", None, "old").await.unwrap();
        reset_password(&pool, "agent@example.com", "new").await.unwrap();

        assert!(verify_user(&pool, "agent@example.com", "old").await.unwrap().is_none());
        assert!(verify_user(&pool, "agent@example.com", "new").await.unwrap().is_some());
        assert!(matches!(
            reset_password(&pool, "ghost@example.com", "x").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_get_user_by_id_and_list() {
        let pool = db::test_pool().await;

        let created = create_user(&pool, "b@example.com", None, "pass").await.unwrap();
        create_user(&pool, "a@example.com", None, "pass").await.unwrap();
        let fetched = get_user_by_id(&pool, &created.id).await.unwrap().unwrap();
        assert_eq!(fetched.email, "b@example.com");

        let all = list_users(&pool).await.unwrap();
        let emails: Vec<_> = all.iter().map(|u| u.email.as_str()).collect();
        assert_eq!(emails, vec!["a@example.com", "b@example.com"]);
    }
}
