//! User aggregate persistence.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::{is_unique_violation, query_span};
use crate::models::User;

pub struct UserStore;

impl UserStore {
    /// Inserts a new user. Returns `None` when the email is already taken.
    ///
    /// # Errors
    /// Returns an error if database insertion fails.
    pub async fn create(
        pool: &PgPool,
        email: &str,
        name: &str,
        password_hash: &str,
    ) -> Result<Option<User>> {
        let query = r"
            INSERT INTO users (email, name, password_hash)
            VALUES ($1, $2, $3)
            RETURNING *
        ";
        let row = sqlx::query_as::<_, User>(query)
            .bind(email)
            .bind(name)
            .bind(password_hash)
            .fetch_one(pool)
            .instrument(query_span!("INSERT", query))
            .await;
        match row {
            Ok(user) => Ok(Some(user)),
            Err(err) if is_unique_violation(&err) => Ok(None),
            Err(err) => Err(err).context("failed to insert user"),
        }
    }

    /// # Errors
    /// Returns an error if database query fails.
    pub async fn get_by_id(pool: &PgPool, id: Uuid) -> Result<Option<User>> {
        let query = "SELECT * FROM users WHERE id = $1";
        sqlx::query_as::<_, User>(query)
            .bind(id)
            .fetch_optional(pool)
            .instrument(query_span!("SELECT", query))
            .await
            .context("failed to fetch user by id")
    }

    /// # Errors
    /// Returns an error if database query fails.
    pub async fn get_by_email(pool: &PgPool, email: &str) -> Result<Option<User>> {
        let query = "SELECT * FROM users WHERE email = $1";
        sqlx::query_as::<_, User>(query)
            .bind(email)
            .fetch_optional(pool)
            .instrument(query_span!("SELECT", query))
            .await
            .context("failed to fetch user by email")
    }

    /// Partial profile update: only provided fields overwrite.
    ///
    /// # Errors
    /// Returns an error if database update fails.
    pub async fn update_profile(
        pool: &PgPool,
        id: Uuid,
        name: Option<&str>,
        image: Option<&str>,
    ) -> Result<Option<User>> {
        let query = r"
            UPDATE users
            SET name = COALESCE($2, name),
                image = COALESCE($3, image),
                updated_at = now()
            WHERE id = $1
            RETURNING *
        ";
        sqlx::query_as::<_, User>(query)
            .bind(id)
            .bind(name)
            .bind(image)
            .fetch_optional(pool)
            .instrument(query_span!("UPDATE", query))
            .await
            .context("failed to update user profile")
    }

    /// Marks the email verified inside an open transaction, alongside the
    /// verification-row delete.
    ///
    /// # Errors
    /// Returns an error if database update fails.
    pub async fn set_email_verified_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: Uuid,
    ) -> Result<()> {
        let query = r"
            UPDATE users
            SET email_verified_at = now(), updated_at = now()
            WHERE id = $1
        ";
        sqlx::query(query)
            .bind(id)
            .execute(&mut **tx)
            .instrument(query_span!("UPDATE", query))
            .await
            .context("failed to mark email verified")?;
        Ok(())
    }

    /// Bumps the failed-login counter and stamps `locked_at` once the counter
    /// reaches the threshold. Returns the new counter value.
    ///
    /// # Errors
    /// Returns an error if database update fails.
    pub async fn record_login_failure(pool: &PgPool, id: Uuid, threshold: i32) -> Result<i32> {
        let query = r"
            UPDATE users
            SET failed_login_attempts = failed_login_attempts + 1,
                locked_at = CASE
                    WHEN failed_login_attempts + 1 >= $2 THEN now()
                    ELSE locked_at
                END,
                updated_at = now()
            WHERE id = $1
            RETURNING failed_login_attempts
        ";
        let row = sqlx::query(query)
            .bind(id)
            .bind(threshold)
            .fetch_one(pool)
            .instrument(query_span!("UPDATE", query))
            .await
            .context("failed to record login failure")?;
        Ok(row.get("failed_login_attempts"))
    }

    /// Clears lockout state and stamps login timestamps after a successful
    /// credential check.
    ///
    /// # Errors
    /// Returns an error if database update fails.
    pub async fn record_login_success(pool: &PgPool, id: Uuid) -> Result<()> {
        let query = r"
            UPDATE users
            SET failed_login_attempts = 0,
                locked_at = NULL,
                last_logged_in_at = now(),
                last_active_at = now(),
                updated_at = now()
            WHERE id = $1
        ";
        sqlx::query(query)
            .bind(id)
            .execute(pool)
            .instrument(query_span!("UPDATE", query))
            .await
            .context("failed to record login success")?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if database update fails.
    pub async fn update_password(pool: &PgPool, id: Uuid, password_hash: &str) -> Result<()> {
        let query = r"
            UPDATE users
            SET password_hash = $2,
                password_changed_at = now(),
                updated_at = now()
            WHERE id = $1
        ";
        sqlx::query(query)
            .bind(id)
            .bind(password_hash)
            .execute(pool)
            .instrument(query_span!("UPDATE", query))
            .await
            .context("failed to update password")?;
        Ok(())
    }

    /// Reset-flow password write: also clears any login lockout, so a user
    /// locked out of a forgotten password gets back in immediately.
    ///
    /// # Errors
    /// Returns an error if database update fails.
    pub async fn reset_password_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: Uuid,
        password_hash: &str,
    ) -> Result<()> {
        let query = r"
            UPDATE users
            SET password_hash = $2,
                failed_login_attempts = 0,
                locked_at = NULL,
                password_changed_at = now(),
                updated_at = now()
            WHERE id = $1
        ";
        sqlx::query(query)
            .bind(id)
            .bind(password_hash)
            .execute(&mut **tx)
            .instrument(query_span!("UPDATE", query))
            .await
            .context("failed to reset password")?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if database update fails.
    pub async fn touch_last_active(pool: &PgPool, id: Uuid) -> Result<()> {
        let query = "UPDATE users SET last_active_at = now() WHERE id = $1";
        sqlx::query(query)
            .bind(id)
            .execute(pool)
            .instrument(query_span!("UPDATE", query))
            .await
            .context("failed to touch last_active_at")?;
        Ok(())
    }
}
