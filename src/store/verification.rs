//! Verification token persistence.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::Instrument;
use uuid::Uuid;

use super::query_span;
use crate::models::{Verification, VerificationContext};

pub struct VerificationStore;

impl VerificationStore {
    /// Creates a fresh token for (context, value), replacing any previous one
    /// so the partial-unique invariant holds.
    ///
    /// # Errors
    /// Returns an error if database insertion fails.
    pub async fn create(
        pool: &PgPool,
        context: VerificationContext,
        value: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Verification> {
        let mut tx = pool.begin().await.context("begin verification transaction")?;
        Self::delete_tx(&mut tx, context, value).await?;

        let query = r"
            INSERT INTO verifications (context, value, expires_at)
            VALUES ($1, $2, $3)
            RETURNING *
        ";
        let verification = sqlx::query_as::<_, Verification>(query)
            .bind(context.as_str())
            .bind(value)
            .bind(expires_at)
            .fetch_one(&mut *tx)
            .instrument(query_span!("INSERT", query))
            .await
            .context("failed to insert verification")?;

        tx.commit().await.context("commit verification transaction")?;
        Ok(verification)
    }

    /// # Errors
    /// Returns an error if database query fails.
    pub async fn get(
        pool: &PgPool,
        id: Uuid,
        context: VerificationContext,
    ) -> Result<Option<Verification>> {
        let query = "SELECT * FROM verifications WHERE id = $1 AND context = $2";
        sqlx::query_as::<_, Verification>(query)
            .bind(id)
            .bind(context.as_str())
            .fetch_optional(pool)
            .instrument(query_span!("SELECT", query))
            .await
            .context("failed to fetch verification")
    }

    /// # Errors
    /// Returns an error if database query fails.
    pub async fn get_by_value(
        pool: &PgPool,
        context: VerificationContext,
        value: &str,
    ) -> Result<Option<Verification>> {
        let query = "SELECT * FROM verifications WHERE context = $1 AND value = $2";
        sqlx::query_as::<_, Verification>(query)
            .bind(context.as_str())
            .bind(value)
            .fetch_optional(pool)
            .instrument(query_span!("SELECT", query))
            .await
            .context("failed to fetch verification by value")
    }

    /// Deletes the live token for (context, value) inside an open transaction.
    ///
    /// # Errors
    /// Returns an error if database deletion fails.
    pub async fn delete_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        context: VerificationContext,
        value: &str,
    ) -> Result<()> {
        let query = "DELETE FROM verifications WHERE context = $1 AND value = $2";
        sqlx::query(query)
            .bind(context.as_str())
            .bind(value)
            .execute(&mut **tx)
            .instrument(query_span!("DELETE", query))
            .await
            .context("failed to delete verification")?;
        Ok(())
    }
}
