//! User lifecycle: signup, profile, email verification, password flows.

use anyhow::Context;
use chrono::Utc;
use secrecy::SecretString;
use serde_json::json;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::{
    config::IdentityConfig,
    context::RequestContext,
    error::{Error, ErrorCode, Result},
    mail::{MailQueue, TEMPLATE_PASSWORD_RESET, TEMPLATE_WELCOME},
    models::{User, Verification, VerificationContext},
    password,
    store::{AuditAction, AuditStore, UserStore, VerificationStore},
};

#[derive(Clone)]
pub struct UserService {
    pool: PgPool,
    config: IdentityConfig,
    mail: MailQueue,
}

impl UserService {
    #[must_use]
    pub fn new(pool: PgPool, config: IdentityConfig, mail: MailQueue) -> Self {
        Self { pool, config, mail }
    }

    /// Registers a new user and mails the verification link.
    ///
    /// # Errors
    /// `email_exists` when the address is taken.
    pub async fn create(
        &self,
        ctx: &RequestContext,
        email: &str,
        name: &str,
        password: &SecretString,
    ) -> Result<User> {
        let password_hash = password::hash_password(password)?;
        let Some(user) = UserStore::create(&self.pool, email, name, &password_hash).await? else {
            return Err(Error::Code(ErrorCode::EmailExists));
        };

        self.send_verification_email(ctx, &user).await?;

        AuditStore::append(
            &self.pool,
            AuditAction::UserCreate,
            &user.id.to_string(),
            Some(user.id),
            ctx,
            json!({ "email": user.email }),
        )
        .await?;
        info!(user_id = %user.id, "user created");
        Ok(user)
    }

    /// # Errors
    /// `user_not_found` when the id is unknown.
    pub async fn get_by_id(&self, ctx: &RequestContext, id: Uuid) -> Result<User> {
        let Some(user) = UserStore::get_by_id(&self.pool, id).await? else {
            return Err(Error::Code(ErrorCode::UserNotFound));
        };
        AuditStore::append(
            &self.pool,
            AuditAction::UserRead,
            &user.id.to_string(),
            Some(user.id),
            ctx,
            json!({}),
        )
        .await?;
        Ok(user)
    }

    /// Partial profile update; absent fields are preserved.
    ///
    /// # Errors
    /// `user_not_found` when the id is unknown.
    pub async fn update(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        name: Option<&str>,
        image: Option<&str>,
    ) -> Result<User> {
        let Some(user) = UserStore::update_profile(&self.pool, id, name, image).await? else {
            return Err(Error::Code(ErrorCode::UserNotFound));
        };
        AuditStore::append(
            &self.pool,
            AuditAction::UserUpdate,
            &user.id.to_string(),
            Some(user.id),
            ctx,
            json!({ "name": name.is_some(), "image": image.is_some() }),
        )
        .await?;
        Ok(user)
    }

    /// Redeems an email-verification token: marks the user verified and
    /// deletes the token in one transaction.
    ///
    /// # Errors
    /// `invalid_or_expired_token`, `user_not_found`.
    pub async fn verify_email(&self, ctx: &RequestContext, token: Uuid) -> Result<User> {
        let verification =
            VerificationStore::get(&self.pool, token, VerificationContext::EmailVerification)
                .await?
                .filter(|verification| !verification.is_expired(Utc::now()))
                .ok_or(Error::Code(ErrorCode::InvalidOrExpiredToken))?;

        let Some(user) = UserStore::get_by_email(&self.pool, &verification.value).await? else {
            return Err(Error::Code(ErrorCode::UserNotFound));
        };

        let mut tx = self.pool.begin().await.context("begin verify-email")?;
        UserStore::set_email_verified_tx(&mut tx, user.id).await?;
        VerificationStore::delete_tx(
            &mut tx,
            VerificationContext::EmailVerification,
            &verification.value,
        )
        .await?;
        AuditStore::append_tx(
            &mut tx,
            AuditAction::UserVerify,
            &user.id.to_string(),
            Some(user.id),
            ctx,
            json!({ "email": user.email }),
        )
        .await?;
        tx.commit().await.context("commit verify-email")?;

        info!(user_id = %user.id, "email verified");
        UserStore::get_by_id(&self.pool, user.id)
            .await?
            .ok_or(Error::Code(ErrorCode::UserNotFound))
    }

    /// Starts the forgot-password flow. Unknown addresses succeed silently so
    /// the endpoint cannot be used to enumerate accounts.
    pub async fn initiate_password_reset(&self, ctx: &RequestContext, email: &str) -> Result<()> {
        let Some(user) = UserStore::get_by_email(&self.pool, email).await? else {
            return Ok(());
        };

        let verification = VerificationStore::create(
            &self.pool,
            VerificationContext::PasswordReset,
            &user.email,
            Utc::now() + self.config.password_reset_ttl(),
        )
        .await?;
        self.mail
            .enqueue(
                TEMPLATE_PASSWORD_RESET,
                &user.email,
                ctx.locale.as_deref().unwrap_or("en"),
                &format!("Reset your {} password", self.config.app_name()),
                json!({
                    "AppName": self.config.app_name(),
                    "AssetsURL": self.config.assets_url(),
                    "Name": user.name,
                    "Duration": "1 hour",
                    "ResetURL": self.config.reset_url(verification.id),
                }),
            )
            .await?;
        AuditStore::append(
            &self.pool,
            AuditAction::UserUpdate,
            &user.id.to_string(),
            Some(user.id),
            ctx,
            json!({ "password_reset_requested": true }),
        )
        .await?;
        Ok(())
    }

    /// Redeems a password-reset token: rewrites the hash, clears any login
    /// lockout, and deletes the token in one transaction.
    ///
    /// # Errors
    /// `invalid_or_expired_token`, `user_not_found`.
    pub async fn reset_password(
        &self,
        ctx: &RequestContext,
        token: Uuid,
        new_password: &SecretString,
    ) -> Result<()> {
        let verification =
            VerificationStore::get(&self.pool, token, VerificationContext::PasswordReset)
                .await?
                .filter(|verification| !verification.is_expired(Utc::now()))
                .ok_or(Error::Code(ErrorCode::InvalidOrExpiredToken))?;

        let Some(user) = UserStore::get_by_email(&self.pool, &verification.value).await? else {
            return Err(Error::Code(ErrorCode::UserNotFound));
        };

        let password_hash = password::hash_password(new_password)?;
        let mut tx = self.pool.begin().await.context("begin reset-password")?;
        UserStore::reset_password_tx(&mut tx, user.id, &password_hash).await?;
        VerificationStore::delete_tx(
            &mut tx,
            VerificationContext::PasswordReset,
            &verification.value,
        )
        .await?;
        AuditStore::append_tx(
            &mut tx,
            AuditAction::UserResetPassword,
            &user.id.to_string(),
            Some(user.id),
            ctx,
            json!({}),
        )
        .await?;
        tx.commit().await.context("commit reset-password")?;

        info!(user_id = %user.id, "password reset");
        Ok(())
    }

    /// Authenticated password change.
    ///
    /// # Errors
    /// `invalid_credentials` when the current password does not match.
    pub async fn update_password(
        &self,
        ctx: &RequestContext,
        user_id: Uuid,
        current_password: &SecretString,
        new_password: &SecretString,
    ) -> Result<()> {
        let Some(user) = UserStore::get_by_id(&self.pool, user_id).await? else {
            return Err(Error::Code(ErrorCode::UserNotFound));
        };
        let Some(hash) = user.password_hash.as_deref() else {
            return Err(Error::Code(ErrorCode::InvalidCredentials));
        };
        if !password::verify_password(current_password, hash)? {
            return Err(Error::Code(ErrorCode::InvalidCredentials));
        }

        let password_hash = password::hash_password(new_password)?;
        UserStore::update_password(&self.pool, user.id, &password_hash).await?;
        AuditStore::append(
            &self.pool,
            AuditAction::UserUpdate,
            &user.id.to_string(),
            Some(user.id),
            ctx,
            json!({ "password_changed": true }),
        )
        .await?;
        Ok(())
    }

    /// Creates a fresh email-verification token (replacing any live one) and
    /// enqueues the welcome email.
    pub(crate) async fn send_verification_email(
        &self,
        ctx: &RequestContext,
        user: &User,
    ) -> Result<Verification> {
        let verification = VerificationStore::create(
            &self.pool,
            VerificationContext::EmailVerification,
            &user.email,
            Utc::now() + self.config.email_verification_ttl(),
        )
        .await?;
        self.mail
            .enqueue(
                TEMPLATE_WELCOME,
                &user.email,
                ctx.locale.as_deref().unwrap_or("en"),
                &format!("Welcome to {}", self.config.app_name()),
                json!({
                    "AppName": self.config.app_name(),
                    "AssetsURL": self.config.assets_url(),
                    "Name": user.name,
                    "Duration": "24 hours",
                    "VerificationURL": self.config.verification_url(verification.id),
                }),
            )
            .await?;
        Ok(verification)
    }
}
