//! Session issuance, validation, refresh rotation, invalidation.

use anyhow::Context;
use chrono::Utc;
use secrecy::SecretString;
use serde_json::json;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::{IdentityConfig, LOGIN_LOCKOUT_THRESHOLD},
    context::RequestContext,
    error::{Error, ErrorCode, Result},
    models::{Session, VerificationContext},
    password,
    service::user::UserService,
    store::{
        session::NewSession, AuditAction, AuditStore, MembershipStore, SessionStore,
        TwoFactorStore, UserStore, VerificationStore,
    },
    token,
};

/// How a sign-in or token lookup resolved. A pending session exists only to
/// complete the two-factor challenge and carries no authorization.
#[derive(Clone, Debug)]
pub enum LoginOutcome {
    Active(Session),
    TwoFactorPending(Session),
}

impl LoginOutcome {
    #[must_use]
    pub fn session(&self) -> &Session {
        match self {
            Self::Active(session) | Self::TwoFactorPending(session) => session,
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::TwoFactorPending(_))
    }
}

#[derive(Clone)]
pub struct SessionService {
    pool: PgPool,
    config: IdentityConfig,
    user: UserService,
}

impl SessionService {
    #[must_use]
    pub fn new(pool: PgPool, config: IdentityConfig, user: UserService) -> Self {
        Self { pool, config, user }
    }

    /// Password sign-in. Preconditions run in a fixed order: unknown email,
    /// unverified email (with verification auto-resend), lockout, then the
    /// bcrypt comparison with its failure counter.
    ///
    /// # Errors
    /// `invalid_credentials`, `email_not_verified`, `account_locked`.
    pub async fn sign_in(
        &self,
        ctx: &RequestContext,
        email: &str,
        password: &SecretString,
    ) -> Result<LoginOutcome> {
        let now = Utc::now();
        let Some(user) = UserStore::get_by_email(&self.pool, email).await? else {
            return Err(Error::Code(ErrorCode::InvalidCredentials));
        };

        if user.email_verified_at.is_none() {
            // Re-send the verification link when the previous one is gone or
            // stale; this is the only path that re-sends the welcome email.
            let live = VerificationStore::get_by_value(
                &self.pool,
                VerificationContext::EmailVerification,
                &user.email,
            )
            .await?
            .filter(|verification| !verification.is_expired(now));
            if live.is_none() {
                self.user.send_verification_email(ctx, &user).await?;
            }
            return Err(Error::Code(ErrorCode::EmailNotVerified));
        }

        if user.is_locked(now, LOGIN_LOCKOUT_THRESHOLD, self.config.login_lockout_window()) {
            return Err(Error::Code(ErrorCode::AccountLocked));
        }

        let Some(hash) = user.password_hash.as_deref() else {
            return Err(Error::Code(ErrorCode::InvalidCredentials));
        };
        if !password::verify_password(password, hash)? {
            let attempts =
                UserStore::record_login_failure(&self.pool, user.id, LOGIN_LOCKOUT_THRESHOLD)
                    .await?;
            info!(user_id = %user.id, attempts, "failed login attempt");
            return Err(Error::Code(ErrorCode::InvalidCredentials));
        }
        UserStore::record_login_success(&self.pool, user.id).await?;

        let memberships = MembershipStore::list_direct(&self.pool, user.id).await?;

        // Existence of a two-factor row gates the login, enabled or not.
        let two_factor = TwoFactorStore::get_by_user(&self.pool, user.id).await?;
        let access_token = token::generate_token()?;
        let refresh_token = token::generate_token()?;

        if two_factor.is_some() {
            let pending_until = now + self.config.two_factor_pending_ttl();
            let mut session = SessionStore::create(
                &self.pool,
                &NewSession {
                    token: &access_token,
                    refresh_token: &refresh_token,
                    user_id: user.id,
                    expires_at: pending_until,
                    refresh_expires_at: pending_until,
                    is_two_factor_pending: true,
                },
                ctx,
            )
            .await?;
            session.memberships = memberships;
            return Ok(LoginOutcome::TwoFactorPending(session));
        }

        let mut session = SessionStore::create(
            &self.pool,
            &NewSession {
                token: &access_token,
                refresh_token: &refresh_token,
                user_id: user.id,
                expires_at: now + self.config.session_ttl(),
                refresh_expires_at: now + self.config.refresh_ttl(),
                is_two_factor_pending: false,
            },
            ctx,
        )
        .await?;
        session.memberships = memberships;

        AuditStore::append(
            &self.pool,
            AuditAction::SessionCreate,
            &session.id.to_string(),
            Some(user.id),
            ctx,
            json!({}),
        )
        .await?;
        info!(user_id = %user.id, session_id = %session.id, "session created");
        Ok(LoginOutcome::Active(session))
    }

    /// Resolves an access token. When the request names an active entity the
    /// inherited memberships scoped to it are attached best-effort.
    ///
    /// # Errors
    /// `unauthenticated` when the token is unknown or expired.
    pub async fn get_by_token(&self, ctx: &RequestContext, token: &str) -> Result<LoginOutcome> {
        let mut session = self.load_live_session(token).await?;
        if session.is_two_factor_pending {
            return Ok(LoginOutcome::TwoFactorPending(session));
        }

        if let Err(err) = UserStore::touch_last_active(&self.pool, session.user_id).await {
            warn!(session_id = %session.id, "last_active_at update failed: {err}");
        }

        if let Some(entity_id) = ctx.active_entity_id {
            match MembershipStore::list_effective(&self.pool, session.user_id).await {
                Ok(memberships) => {
                    session.memberships = memberships
                        .into_iter()
                        .filter(|membership| membership.entity_id == entity_id)
                        .collect();
                }
                Err(err) => {
                    warn!(session_id = %session.id, "membership lookup failed: {err}");
                }
            }
        }
        Ok(LoginOutcome::Active(session))
    }

    /// Rotates a refresh token: deletes the old session and mints a new one
    /// in a single transaction, preserving the original client metadata. A
    /// replayed token finds no row and fails.
    ///
    /// # Errors
    /// `invalid_refresh_token`.
    pub async fn refresh(&self, ctx: &RequestContext, refresh_token: &str) -> Result<Session> {
        let now = Utc::now();
        let old = SessionStore::get_by_refresh_token(&self.pool, refresh_token)
            .await?
            .filter(|session| !session.is_two_factor_pending)
            .filter(|session| session.refresh_expires_at > now)
            .ok_or(Error::Code(ErrorCode::InvalidRefreshToken))?;

        let client = RequestContext {
            ip_address: old.ip_address.clone(),
            country: old.country.clone(),
            user_agent: old.user_agent.clone(),
            ..RequestContext::default()
        };

        let access_token = token::generate_token()?;
        let new_refresh_token = token::generate_token()?;
        let mut tx = self.pool.begin().await.context("begin session refresh")?;
        SessionStore::delete_tx(&mut tx, old.id).await?;
        let mut session = SessionStore::create_tx(
            &mut tx,
            &NewSession {
                token: &access_token,
                refresh_token: &new_refresh_token,
                user_id: old.user_id,
                expires_at: now + self.config.session_ttl(),
                refresh_expires_at: now + self.config.refresh_ttl(),
                is_two_factor_pending: false,
            },
            &client,
        )
        .await?;
        AuditStore::append_tx(
            &mut tx,
            AuditAction::SessionUpdate,
            &session.id.to_string(),
            Some(session.user_id),
            ctx,
            json!({ "rotated_from": old.id }),
        )
        .await?;
        tx.commit().await.context("commit session refresh")?;

        session.memberships = MembershipStore::list_direct(&self.pool, session.user_id).await?;
        info!(user_id = %session.user_id, session_id = %session.id, "session rotated");
        Ok(session)
    }

    /// Completes a two-factor challenge. The pending row is deleted and a
    /// fresh active session is minted in its place, rotating both tokens the
    /// same way `refresh` does, so the short-lived pending tokens never
    /// outlive the challenge. Activation is audited as the moment the
    /// session gained its privileges.
    ///
    /// # Errors
    /// `unauthenticated` when the token is unknown, expired, or not pending.
    pub async fn activate_pending(&self, ctx: &RequestContext, token: &str) -> Result<Session> {
        let now = Utc::now();
        let pending = SessionStore::get_by_token(&self.pool, token)
            .await?
            .filter(|session| session.is_two_factor_pending)
            .filter(|session| session.expires_at > now)
            .ok_or(Error::Code(ErrorCode::Unauthenticated))?;

        let client = RequestContext {
            ip_address: pending.ip_address.clone(),
            country: pending.country.clone(),
            user_agent: pending.user_agent.clone(),
            ..RequestContext::default()
        };

        let access_token = token::generate_token()?;
        let refresh_token = token::generate_token()?;
        let mut tx = self.pool.begin().await.context("begin session activation")?;
        SessionStore::delete_tx(&mut tx, pending.id).await?;
        let mut session = SessionStore::create_tx(
            &mut tx,
            &NewSession {
                token: &access_token,
                refresh_token: &refresh_token,
                user_id: pending.user_id,
                expires_at: now + self.config.session_ttl(),
                refresh_expires_at: now + self.config.refresh_ttl(),
                is_two_factor_pending: false,
            },
            &client,
        )
        .await?;
        AuditStore::append_tx(
            &mut tx,
            AuditAction::SessionCreate,
            &session.id.to_string(),
            Some(session.user_id),
            ctx,
            json!({ "two_factor": true }),
        )
        .await?;
        tx.commit().await.context("commit session activation")?;

        session.memberships = MembershipStore::list_direct(&self.pool, session.user_id).await?;
        info!(user_id = %session.user_id, session_id = %session.id, "pending session activated");
        Ok(session)
    }

    /// Sign-out.
    ///
    /// # Errors
    /// `unauthenticated` when the token is unknown.
    pub async fn invalidate(&self, ctx: &RequestContext, token: &str) -> Result<()> {
        let Some(session) = SessionStore::get_by_token(&self.pool, token).await? else {
            return Err(Error::Code(ErrorCode::Unauthenticated));
        };
        SessionStore::delete(&self.pool, session.id).await?;
        AuditStore::append(
            &self.pool,
            AuditAction::SessionDelete,
            &session.id.to_string(),
            Some(session.user_id),
            ctx,
            json!({}),
        )
        .await?;
        Ok(())
    }

    /// Revokes one of the caller's sessions by id. A target belonging to a
    /// different user (or none at all) is a silent no-op.
    pub async fn invalidate_by_id(
        &self,
        ctx: &RequestContext,
        target_session_id: Uuid,
        caller: &Session,
    ) -> Result<()> {
        let deleted =
            SessionStore::delete_by_id_for_user(&self.pool, target_session_id, caller.user_id)
                .await?;
        if deleted > 0 {
            AuditStore::append(
                &self.pool,
                AuditAction::SessionDelete,
                &target_session_id.to_string(),
                Some(caller.user_id),
                ctx,
                json!({}),
            )
            .await?;
        }
        Ok(())
    }

    /// "Sign out everywhere else": drops every session except the caller's.
    pub async fn invalidate_all(
        &self,
        ctx: &RequestContext,
        user_id: Uuid,
        except_session_id: Uuid,
    ) -> Result<u64> {
        let deleted =
            SessionStore::delete_all_for_user_except(&self.pool, user_id, except_session_id)
                .await?;
        AuditStore::append(
            &self.pool,
            AuditAction::SessionDelete,
            &user_id.to_string(),
            Some(user_id),
            ctx,
            json!({ "scope": "all_other", "deleted": deleted }),
        )
        .await?;
        Ok(deleted)
    }

    /// Live sessions for the caller, newest first.
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Session>> {
        Ok(SessionStore::list_for_user(&self.pool, user_id).await?)
    }

    async fn load_live_session(&self, token: &str) -> Result<Session> {
        SessionStore::get_by_token(&self.pool, token)
            .await?
            .filter(|session| session.expires_at > Utc::now())
            .ok_or(Error::Code(ErrorCode::Unauthenticated))
    }
}

#[cfg(test)]
mod tests {
    use super::LoginOutcome;
    use crate::models::Session;
    use chrono::Utc;
    use uuid::Uuid;

    fn session() -> Session {
        let now = Utc::now();
        Session {
            id: Uuid::new_v4(),
            token: "token".to_string(),
            refresh_token: "refresh".to_string(),
            user_id: Uuid::new_v4(),
            expires_at: now,
            refresh_expires_at: now,
            is_two_factor_pending: false,
            ip_address: None,
            country: None,
            user_agent: None,
            created_at: now,
            updated_at: now,
            memberships: Vec::new(),
        }
    }

    #[test]
    fn outcome_exposes_the_inner_session_either_way() {
        let active = LoginOutcome::Active(session());
        let pending = LoginOutcome::TwoFactorPending(session());
        assert!(!active.is_pending());
        assert!(pending.is_pending());
        assert_eq!(active.session().token, "token");
        assert_eq!(pending.session().token, "token");
    }
}
