//! TOTP enrollment, verification, backup codes, attempt throttling.

use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use totp_rs::{Algorithm, Secret, TOTP};
use tracing::info;
use uuid::Uuid;

use crate::{
    config::{IdentityConfig, TWO_FACTOR_LOCKOUT_HOURS, TWO_FACTOR_LOCKOUT_THRESHOLD},
    context::RequestContext,
    error::{Error, ErrorCode, Result},
    models::TwoFactor,
    store::{AuditAction, AuditStore, TwoFactorStore},
    token,
};

/// Result of a setup call: the credential, the one-time backup codes, and a
/// base64 PNG of the otpauth QR code.
pub struct TwoFactorSetup {
    pub two_factor: TwoFactor,
    pub backup_codes: Vec<String>,
    pub qr_code_base64: String,
}

#[derive(Clone)]
pub struct TwoFactorService {
    pool: PgPool,
    config: IdentityConfig,
}

impl TwoFactorService {
    #[must_use]
    pub fn new(pool: PgPool, config: IdentityConfig) -> Self {
        Self { pool, config }
    }

    /// Begins enrollment: generates a secret and backup codes, or reuses an
    /// unconfirmed setup so repeated calls stay idempotent.
    ///
    /// # Errors
    /// `two_factor_already_enabled` once the credential is confirmed.
    pub async fn setup(&self, ctx: &RequestContext, user_id: Uuid) -> Result<TwoFactorSetup> {
        if let Some(existing) = TwoFactorStore::get_by_user(&self.pool, user_id).await? {
            if existing.is_enabled() {
                return Err(Error::Code(ErrorCode::TwoFactorAlreadyEnabled));
            }
            let qr_code_base64 = self.render_qr(&existing.secret)?;
            let backup_codes = existing.backup_codes.clone();
            return Ok(TwoFactorSetup {
                two_factor: existing,
                backup_codes,
                qr_code_base64,
            });
        }

        let secret = token::generate_totp_secret()?;
        let backup_codes = token::generate_backup_codes()?;
        let two_factor =
            TwoFactorStore::upsert_setup(&self.pool, user_id, &secret, &backup_codes).await?;
        let qr_code_base64 = self.render_qr(&secret)?;

        AuditStore::append(
            &self.pool,
            AuditAction::TwoFactorCreate,
            &two_factor.id.to_string(),
            Some(user_id),
            ctx,
            json!({}),
        )
        .await?;
        info!(user_id = %user_id, "two-factor setup started");
        Ok(TwoFactorSetup {
            two_factor,
            backup_codes,
            qr_code_base64,
        })
    }

    /// Confirms enrollment with a live TOTP code.
    ///
    /// # Errors
    /// `two_factor_not_enabled`, `two_factor_already_enabled`,
    /// `invalid_two_factor_code`.
    pub async fn enable(&self, ctx: &RequestContext, user_id: Uuid, code: &str) -> Result<TwoFactor> {
        let Some(two_factor) = TwoFactorStore::get_by_user(&self.pool, user_id).await? else {
            return Err(Error::Code(ErrorCode::TwoFactorNotEnabled));
        };
        if two_factor.is_enabled() {
            return Err(Error::Code(ErrorCode::TwoFactorAlreadyEnabled));
        }

        if !check_totp(&two_factor.secret, code, self.config.app_name())? {
            AuditStore::append(
                &self.pool,
                AuditAction::TwoFactorVerify,
                &two_factor.id.to_string(),
                Some(user_id),
                ctx,
                json!({ "success": false, "stage": "enable" }),
            )
            .await?;
            return Err(Error::Code(ErrorCode::InvalidTwoFactorCode));
        }

        let enabled = TwoFactorStore::enable(&self.pool, user_id)
            .await?
            .ok_or(Error::Code(ErrorCode::TwoFactorNotEnabled))?;
        AuditStore::append(
            &self.pool,
            AuditAction::TwoFactorEnable,
            &enabled.id.to_string(),
            Some(user_id),
            ctx,
            json!({}),
        )
        .await?;
        info!(user_id = %user_id, "two-factor enabled");
        Ok(enabled)
    }

    /// Removes the credential entirely, returning the account to plain
    /// password login.
    ///
    /// # Errors
    /// `two_factor_not_enabled` when there is nothing to disable.
    pub async fn disable(&self, ctx: &RequestContext, user_id: Uuid) -> Result<()> {
        let Some(two_factor) = TwoFactorStore::get_by_user(&self.pool, user_id).await? else {
            return Err(Error::Code(ErrorCode::TwoFactorNotEnabled));
        };
        TwoFactorStore::delete(&self.pool, user_id).await?;
        AuditStore::append(
            &self.pool,
            AuditAction::TwoFactorDisable,
            &two_factor.id.to_string(),
            Some(user_id),
            ctx,
            json!({
                "had_backup_codes": !two_factor.backup_codes.is_empty(),
                "was_enabled_at": two_factor.enabled_at,
            }),
        )
        .await?;
        info!(user_id = %user_id, "two-factor disabled");
        Ok(())
    }

    /// Checks a login challenge: TOTP first, then backup codes. A backup code
    /// match consumes it; a mismatch feeds the lockout counter.
    ///
    /// # Errors
    /// `two_factor_not_enabled`, `two_factor_locked`,
    /// `invalid_two_factor_code`, `backup_code_validation`.
    pub async fn verify(&self, ctx: &RequestContext, user_id: Uuid, code: &str) -> Result<()> {
        let now = Utc::now();
        let Some(two_factor) = TwoFactorStore::get_by_user(&self.pool, user_id).await? else {
            return Err(Error::Code(ErrorCode::TwoFactorNotEnabled));
        };
        if two_factor.is_locked(now) {
            AuditStore::append(
                &self.pool,
                AuditAction::TwoFactorVerify,
                &two_factor.id.to_string(),
                Some(user_id),
                ctx,
                json!({ "success": false, "locked": true }),
            )
            .await?;
            return Err(Error::Code(ErrorCode::TwoFactorLocked));
        }

        if token::is_totp_code_shape(code) {
            if check_totp(&two_factor.secret, code, self.config.app_name())? {
                TwoFactorStore::clear_failure_state(&self.pool, two_factor.id).await?;
                AuditStore::append(
                    &self.pool,
                    AuditAction::TwoFactorVerify,
                    &two_factor.id.to_string(),
                    Some(user_id),
                    ctx,
                    json!({ "success": true, "method": "totp" }),
                )
                .await?;
                return Ok(());
            }
        } else if !token::is_backup_code_shape(code) {
            return Err(Error::Code(ErrorCode::BackupCodeValidation));
        }

        if let Some(remaining) =
            TwoFactorStore::consume_backup_code(&self.pool, two_factor.id, code).await?
        {
            TwoFactorStore::clear_failure_state(&self.pool, two_factor.id).await?;
            AuditStore::append(
                &self.pool,
                AuditAction::TwoFactorVerify,
                &two_factor.id.to_string(),
                Some(user_id),
                ctx,
                json!({ "success": true, "method": "backup_code", "remaining": remaining.len() }),
            )
            .await?;
            return Ok(());
        }

        let (failed_attempts, locked_until) = next_failure_state(&two_factor, now);
        TwoFactorStore::update_failure_state(
            &self.pool,
            two_factor.id,
            failed_attempts,
            locked_until,
        )
        .await?;
        AuditStore::append(
            &self.pool,
            AuditAction::TwoFactorVerify,
            &two_factor.id.to_string(),
            Some(user_id),
            ctx,
            json!({ "success": false, "failed_attempts": failed_attempts }),
        )
        .await?;
        Err(Error::Code(ErrorCode::InvalidTwoFactorCode))
    }

    fn render_qr(&self, secret: &str) -> Result<String> {
        let totp = build_totp(secret, self.config.app_name())?;
        totp.get_qr_base64()
            .map_err(|err| Error::Unknown(anyhow::anyhow!("failed to render QR code: {err}")))
    }
}

/// Failure bookkeeping: the counter resets once the last failure falls out of
/// the one-hour window; reaching the threshold locks until an hour after the
/// latest failure.
fn next_failure_state(
    two_factor: &TwoFactor,
    now: chrono::DateTime<Utc>,
) -> (i32, Option<chrono::DateTime<Utc>>) {
    let window = chrono::Duration::hours(TWO_FACTOR_LOCKOUT_HOURS);
    let in_window = two_factor
        .last_failed_attempt_at
        .is_some_and(|at| at + window > now);
    let failed_attempts = if in_window {
        two_factor.failed_attempts + 1
    } else {
        1
    };
    let locked_until = if failed_attempts >= TWO_FACTOR_LOCKOUT_THRESHOLD {
        Some(now + window)
    } else {
        None
    };
    (failed_attempts, locked_until)
}

pub(crate) fn build_totp(secret: &str, app_name: &str) -> Result<TOTP> {
    let bytes = Secret::Encoded(secret.to_string())
        .to_bytes()
        .map_err(|err| Error::Unknown(anyhow::anyhow!("invalid TOTP secret: {err:?}")))?;
    TOTP::new(
        Algorithm::SHA1,
        6,
        1,
        30,
        bytes,
        Some(app_name.to_string()),
        app_name.to_string(),
    )
    .map_err(|err| Error::Unknown(anyhow::anyhow!("failed to build TOTP: {err}")))
}

/// Validates a candidate TOTP code against the stored secret. Codes that are
/// not exactly six digits fail without touching the crypto path.
fn check_totp(secret: &str, code: &str, app_name: &str) -> Result<bool> {
    if !token::is_totp_code_shape(code) {
        return Ok(false);
    }
    let totp = build_totp(secret, app_name)?;
    totp.check_current(code)
        .map_err(|err| Error::Unknown(anyhow::anyhow!("system clock error: {err}")))
}

#[cfg(test)]
mod tests {
    use super::{build_totp, check_totp, next_failure_state};
    use crate::{models::TwoFactor, token};
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn credential(failed_attempts: i32, last_failed_minutes_ago: Option<i64>) -> TwoFactor {
        let now = Utc::now();
        TwoFactor {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            secret: token::generate_totp_secret().unwrap(),
            backup_codes: token::generate_backup_codes().unwrap(),
            failed_attempts,
            last_failed_attempt_at: last_failed_minutes_ago
                .map(|minutes| now - Duration::minutes(minutes)),
            locked_until: None,
            enabled_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn current_totp_code_validates() {
        let secret = token::generate_totp_secret().unwrap();
        let totp = build_totp(&secret, "Tessera").unwrap();
        let code = totp.generate_current().unwrap();
        assert!(check_totp(&secret, &code, "Tessera").unwrap());
    }

    #[test]
    fn malformed_codes_fail_before_crypto() {
        let secret = token::generate_totp_secret().unwrap();
        assert!(!check_totp(&secret, "12345", "Tessera").unwrap());
        assert!(!check_totp(&secret, "1234567", "Tessera").unwrap());
        assert!(!check_totp(&secret, "12a456", "Tessera").unwrap());
    }

    #[test]
    fn failure_counter_resets_outside_the_window() {
        let now = Utc::now();
        let (attempts, locked) = next_failure_state(&credential(7, Some(90)), now);
        assert_eq!(attempts, 1);
        assert!(locked.is_none());
    }

    #[test]
    fn tenth_failure_in_window_locks_for_an_hour() {
        let now = Utc::now();
        let (attempts, locked) = next_failure_state(&credential(9, Some(10)), now);
        assert_eq!(attempts, 10);
        let locked_until = locked.expect("locked");
        assert_eq!(locked_until, now + Duration::hours(1));
    }

    #[test]
    fn failures_under_threshold_do_not_lock() {
        let now = Utc::now();
        let (attempts, locked) = next_failure_state(&credential(3, Some(5)), now);
        assert_eq!(attempts, 4);
        assert!(locked.is_none());
    }
}
