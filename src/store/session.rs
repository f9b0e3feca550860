//! Session persistence, including refresh-token rotation primitives.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::Instrument;
use uuid::Uuid;

use super::query_span;
use crate::{context::RequestContext, models::Session};

/// Parameters for a new session row; tokens are generated by the service.
pub struct NewSession<'a> {
    pub token: &'a str,
    pub refresh_token: &'a str,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    pub is_two_factor_pending: bool,
}

pub struct SessionStore;

impl SessionStore {
    /// # Errors
    /// Returns an error if database insertion fails.
    pub async fn create(
        pool: &PgPool,
        new: &NewSession<'_>,
        ctx: &RequestContext,
    ) -> Result<Session> {
        let mut tx = pool.begin().await.context("begin session transaction")?;
        let session = Self::create_tx(&mut tx, new, ctx).await?;
        tx.commit().await.context("commit session transaction")?;
        Ok(session)
    }

    /// Insert variant used inside the refresh-rotation transaction.
    ///
    /// # Errors
    /// Returns an error if database insertion fails.
    pub async fn create_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        new: &NewSession<'_>,
        ctx: &RequestContext,
    ) -> Result<Session> {
        let query = r"
            INSERT INTO sessions
                (token, refresh_token, user_id, expires_at, refresh_expires_at,
                 is_two_factor_pending, ip_address, country, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
        ";
        sqlx::query_as::<_, Session>(query)
            .bind(new.token)
            .bind(new.refresh_token)
            .bind(new.user_id)
            .bind(new.expires_at)
            .bind(new.refresh_expires_at)
            .bind(new.is_two_factor_pending)
            .bind(ctx.ip_address.as_deref())
            .bind(ctx.country.as_deref())
            .bind(ctx.user_agent.as_deref())
            .fetch_one(&mut **tx)
            .instrument(query_span!("INSERT", query))
            .await
            .context("failed to insert session")
    }

    /// # Errors
    /// Returns an error if database query fails.
    pub async fn get_by_token(pool: &PgPool, token: &str) -> Result<Option<Session>> {
        let query = "SELECT * FROM sessions WHERE token = $1";
        sqlx::query_as::<_, Session>(query)
            .bind(token)
            .fetch_optional(pool)
            .instrument(query_span!("SELECT", query))
            .await
            .context("failed to fetch session by token")
    }

    /// # Errors
    /// Returns an error if database query fails.
    pub async fn get_by_refresh_token(pool: &PgPool, refresh_token: &str) -> Result<Option<Session>> {
        let query = "SELECT * FROM sessions WHERE refresh_token = $1";
        sqlx::query_as::<_, Session>(query)
            .bind(refresh_token)
            .fetch_optional(pool)
            .instrument(query_span!("SELECT", query))
            .await
            .context("failed to fetch session by refresh token")
    }

    /// Live sessions for a user, newest first.
    ///
    /// # Errors
    /// Returns an error if database query fails.
    pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Session>> {
        let query = r"
            SELECT * FROM sessions
            WHERE user_id = $1 AND refresh_expires_at > now()
            ORDER BY created_at DESC
        ";
        sqlx::query_as::<_, Session>(query)
            .bind(user_id)
            .fetch_all(pool)
            .instrument(query_span!("SELECT", query))
            .await
            .context("failed to list sessions")
    }

    /// # Errors
    /// Returns an error if database deletion fails.
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<()> {
        let query = "DELETE FROM sessions WHERE id = $1";
        sqlx::query(query)
            .bind(id)
            .execute(pool)
            .instrument(query_span!("DELETE", query))
            .await
            .context("failed to delete session")?;
        Ok(())
    }

    /// Delete variant used inside the refresh-rotation transaction.
    ///
    /// # Errors
    /// Returns an error if database deletion fails.
    pub async fn delete_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: Uuid,
    ) -> Result<()> {
        let query = "DELETE FROM sessions WHERE id = $1";
        sqlx::query(query)
            .bind(id)
            .execute(&mut **tx)
            .instrument(query_span!("DELETE", query))
            .await
            .context("failed to delete session")?;
        Ok(())
    }

    /// Revoke one session, but only if it belongs to the user. Returns how
    /// many rows went away so callers can tell a no-op apart.
    ///
    /// # Errors
    /// Returns an error if database deletion fails.
    pub async fn delete_by_id_for_user(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<u64> {
        let query = "DELETE FROM sessions WHERE id = $1 AND user_id = $2";
        let result = sqlx::query(query)
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .instrument(query_span!("DELETE", query))
            .await
            .context("failed to delete session for user")?;
        Ok(result.rows_affected())
    }

    /// "Sign out everywhere else".
    ///
    /// # Errors
    /// Returns an error if database deletion fails.
    pub async fn delete_all_for_user_except(
        pool: &PgPool,
        user_id: Uuid,
        keep: Uuid,
    ) -> Result<u64> {
        let query = "DELETE FROM sessions WHERE user_id = $1 AND id != $2";
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(keep)
            .execute(pool)
            .instrument(query_span!("DELETE", query))
            .await
            .context("failed to delete other sessions")?;
        Ok(result.rows_affected())
    }

    /// Drops sessions whose refresh window has closed, and pending sessions
    /// whose short access window lapsed before the challenge was answered.
    ///
    /// # Errors
    /// Returns an error if database deletion fails.
    pub async fn clean_up_expired(pool: &PgPool) -> Result<u64> {
        let query = r"
            DELETE FROM sessions
            WHERE refresh_expires_at <= now()
               OR (is_two_factor_pending AND expires_at <= now())
        ";
        let result = sqlx::query(query)
            .execute(pool)
            .instrument(query_span!("DELETE", query))
            .await
            .context("failed to clean up expired sessions")?;
        Ok(result.rows_affected())
    }
}
