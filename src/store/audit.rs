//! Append-only audit log.

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::Instrument;
use uuid::Uuid;

use super::query_span;
use crate::context::RequestContext;

/// Security-relevant actions recorded by the services.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuditAction {
    UserCreate,
    UserRead,
    UserUpdate,
    UserVerify,
    UserResetPassword,
    SessionCreate,
    SessionUpdate,
    SessionDelete,
    TwoFactorCreate,
    TwoFactorEnable,
    TwoFactorDisable,
    TwoFactorVerify,
}

impl AuditAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UserCreate => "user.create",
            Self::UserRead => "user.read",
            Self::UserUpdate => "user.update",
            Self::UserVerify => "user.verify",
            Self::UserResetPassword => "user.reset_password",
            Self::SessionCreate => "session.create",
            Self::SessionUpdate => "session.update",
            Self::SessionDelete => "session.delete",
            Self::TwoFactorCreate => "two_factor.create",
            Self::TwoFactorEnable => "two_factor.enable",
            Self::TwoFactorDisable => "two_factor.disable",
            Self::TwoFactorVerify => "two_factor.verify",
        }
    }

    /// The aggregate an action targets, recorded as `resource_type`.
    #[must_use]
    pub fn resource_type(self) -> &'static str {
        match self {
            Self::UserCreate
            | Self::UserRead
            | Self::UserUpdate
            | Self::UserVerify
            | Self::UserResetPassword => "user",
            Self::SessionCreate | Self::SessionUpdate | Self::SessionDelete => "session",
            Self::TwoFactorCreate
            | Self::TwoFactorEnable
            | Self::TwoFactorDisable
            | Self::TwoFactorVerify => "two_factor",
        }
    }
}

pub struct AuditStore;

impl AuditStore {
    /// # Errors
    /// Returns an error if database insertion fails.
    pub async fn append(
        pool: &PgPool,
        action: AuditAction,
        resource_id: &str,
        user_id: Option<Uuid>,
        ctx: &RequestContext,
        metadata: serde_json::Value,
    ) -> Result<()> {
        let query = r"
            INSERT INTO audit_logs
                (action, resource_type, resource_id, user_id, ip_address, user_agent, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        ";
        sqlx::query(query)
            .bind(action.as_str())
            .bind(action.resource_type())
            .bind(resource_id)
            .bind(user_id)
            .bind(ctx.ip_address.as_deref())
            .bind(ctx.user_agent.as_deref())
            .bind(metadata)
            .execute(pool)
            .instrument(query_span!("INSERT", query))
            .await
            .context("failed to write audit log")?;
        Ok(())
    }

    /// Audit write that joins an open transaction, for mutations whose audit
    /// entry must not outlive a rollback.
    ///
    /// # Errors
    /// Returns an error if database insertion fails.
    pub async fn append_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        action: AuditAction,
        resource_id: &str,
        user_id: Option<Uuid>,
        ctx: &RequestContext,
        metadata: serde_json::Value,
    ) -> Result<()> {
        let query = r"
            INSERT INTO audit_logs
                (action, resource_type, resource_id, user_id, ip_address, user_agent, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        ";
        sqlx::query(query)
            .bind(action.as_str())
            .bind(action.resource_type())
            .bind(resource_id)
            .bind(user_id)
            .bind(ctx.ip_address.as_deref())
            .bind(ctx.user_agent.as_deref())
            .bind(metadata)
            .execute(&mut **tx)
            .instrument(query_span!("INSERT", query))
            .await
            .context("failed to write audit log")?;
        Ok(())
    }
}
