//! Two-factor credential persistence.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::query_span;
use crate::models::TwoFactor;

pub struct TwoFactorStore;

impl TwoFactorStore {
    /// Stores a fresh secret and backup-code set for the user, replacing any
    /// unconfirmed setup and clearing throttle state. The service refuses to
    /// call this once the credential is enabled.
    ///
    /// # Errors
    /// Returns an error if database insertion fails.
    pub async fn upsert_setup(
        pool: &PgPool,
        user_id: Uuid,
        secret: &str,
        backup_codes: &[String],
    ) -> Result<TwoFactor> {
        let query = r"
            INSERT INTO two_factors (user_id, secret, backup_codes)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE
            SET secret = EXCLUDED.secret,
                backup_codes = EXCLUDED.backup_codes,
                failed_attempts = 0,
                last_failed_attempt_at = NULL,
                locked_until = NULL,
                updated_at = now()
            RETURNING *
        ";
        let codes = serde_json::to_value(backup_codes).context("encode backup codes")?;
        sqlx::query_as::<_, TwoFactor>(query)
            .bind(user_id)
            .bind(secret)
            .bind(codes)
            .fetch_one(pool)
            .instrument(query_span!("INSERT", query))
            .await
            .context("failed to upsert two-factor setup")
    }

    /// # Errors
    /// Returns an error if database query fails.
    pub async fn get_by_user(pool: &PgPool, user_id: Uuid) -> Result<Option<TwoFactor>> {
        let query = "SELECT * FROM two_factors WHERE user_id = $1";
        sqlx::query_as::<_, TwoFactor>(query)
            .bind(user_id)
            .fetch_optional(pool)
            .instrument(query_span!("SELECT", query))
            .await
            .context("failed to fetch two-factor credential")
    }

    /// # Errors
    /// Returns an error if database update fails.
    pub async fn enable(pool: &PgPool, user_id: Uuid) -> Result<Option<TwoFactor>> {
        let query = r"
            UPDATE two_factors
            SET enabled_at = now(), updated_at = now()
            WHERE user_id = $1
            RETURNING *
        ";
        sqlx::query_as::<_, TwoFactor>(query)
            .bind(user_id)
            .fetch_optional(pool)
            .instrument(query_span!("UPDATE", query))
            .await
            .context("failed to enable two-factor")
    }

    /// # Errors
    /// Returns an error if database deletion fails.
    pub async fn delete(pool: &PgPool, user_id: Uuid) -> Result<()> {
        let query = "DELETE FROM two_factors WHERE user_id = $1";
        sqlx::query(query)
            .bind(user_id)
            .execute(pool)
            .instrument(query_span!("DELETE", query))
            .await
            .context("failed to delete two-factor credential")?;
        Ok(())
    }

    /// Writes throttle state computed by the service after a failed code.
    ///
    /// # Errors
    /// Returns an error if database update fails.
    pub async fn update_failure_state(
        pool: &PgPool,
        id: Uuid,
        failed_attempts: i32,
        locked_until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let query = r"
            UPDATE two_factors
            SET failed_attempts = $2,
                last_failed_attempt_at = now(),
                locked_until = $3,
                updated_at = now()
            WHERE id = $1
        ";
        sqlx::query(query)
            .bind(id)
            .bind(failed_attempts)
            .bind(locked_until)
            .execute(pool)
            .instrument(query_span!("UPDATE", query))
            .await
            .context("failed to update two-factor failure state")?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if database update fails.
    pub async fn clear_failure_state(pool: &PgPool, id: Uuid) -> Result<()> {
        let query = r"
            UPDATE two_factors
            SET failed_attempts = 0,
                last_failed_attempt_at = NULL,
                locked_until = NULL,
                updated_at = now()
            WHERE id = $1
        ";
        sqlx::query(query)
            .bind(id)
            .execute(pool)
            .instrument(query_span!("UPDATE", query))
            .await
            .context("failed to clear two-factor failure state")?;
        Ok(())
    }

    /// Consume one backup code (atomic). The conditional update only fires
    /// while the code is still present, so two concurrent verifies with the
    /// same code cannot both succeed. Returns the remaining codes on a match,
    /// `None` on a mismatch or already-consumed code.
    ///
    /// # Errors
    /// Returns an error if database update fails.
    pub async fn consume_backup_code(
        pool: &PgPool,
        id: Uuid,
        code: &str,
    ) -> Result<Option<Vec<String>>> {
        let query = r"
            UPDATE two_factors
            SET backup_codes = backup_codes - $2::text,
                updated_at = now()
            WHERE id = $1 AND backup_codes ? $2::text
            RETURNING backup_codes
        ";
        let row = sqlx::query(query)
            .bind(id)
            .bind(code)
            .fetch_optional(pool)
            .instrument(query_span!("UPDATE", query))
            .await
            .context("failed to consume backup code")?;
        match row {
            Some(row) => {
                let raw: serde_json::Value = row.try_get("backup_codes")?;
                let remaining =
                    serde_json::from_value(raw).context("decode remaining backup codes")?;
                Ok(Some(remaining))
            }
            None => Ok(None),
        }
    }
}
