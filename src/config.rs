//! Identity core configuration.
//!
//! Durations are fixed policy unless overridden through the builder; URLs
//! and branding come from the environment at startup.

use chrono::Duration;

const ENV_APP_NAME: &str = "TESSERA_APP_NAME";
const ENV_DASHBOARD_URL: &str = "TESSERA_DASHBOARD_URL";
const ENV_ASSETS_URL: &str = "TESSERA_ASSETS_URL";

const DEFAULT_APP_NAME: &str = "Tessera";
const DEFAULT_DASHBOARD_URL: &str = "http://localhost:3000";
const DEFAULT_ASSETS_URL: &str = "http://localhost:3000/assets";

/// Session lifetime.
pub const SESSION_TTL_HOURS: i64 = 24;
/// Refresh token lifetime.
pub const REFRESH_TTL_DAYS: i64 = 30;
/// Lifetime of a session waiting on a two-factor challenge.
pub const TWO_FACTOR_PENDING_TTL_MINUTES: i64 = 5;
/// Email-verification token lifetime.
pub const EMAIL_VERIFICATION_TTL_HOURS: i64 = 24;
/// Password-reset token lifetime.
pub const PASSWORD_RESET_TTL_HOURS: i64 = 1;
/// Consecutive failed logins before the account locks.
pub const LOGIN_LOCKOUT_THRESHOLD: i32 = 5;
/// How long a locked account stays locked.
pub const LOGIN_LOCKOUT_MINUTES: i64 = 30;
/// Failed two-factor attempts within the window before locking.
pub const TWO_FACTOR_LOCKOUT_THRESHOLD: i32 = 10;
/// Two-factor failure window and lock duration.
pub const TWO_FACTOR_LOCKOUT_HOURS: i64 = 1;
/// Cadence of the expired-session cleanup job.
pub const SESSION_CLEANUP_INTERVAL_HOURS: u64 = 12;

#[derive(Clone, Debug)]
pub struct IdentityConfig {
    app_name: String,
    dashboard_url: String,
    assets_url: String,
}

impl IdentityConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            dashboard_url: DEFAULT_DASHBOARD_URL.to_string(),
            assets_url: DEFAULT_ASSETS_URL.to_string(),
        }
    }

    /// Load configuration from environment variables, falling back to dev
    /// defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::new();
        if let Ok(value) = std::env::var(ENV_APP_NAME) {
            config = config.with_app_name(value);
        }
        if let Ok(value) = std::env::var(ENV_DASHBOARD_URL) {
            config = config.with_dashboard_url(value);
        }
        if let Ok(value) = std::env::var(ENV_ASSETS_URL) {
            config = config.with_assets_url(value);
        }
        config
    }

    #[must_use]
    pub fn with_app_name(mut self, app_name: String) -> Self {
        self.app_name = app_name;
        self
    }

    #[must_use]
    pub fn with_dashboard_url(mut self, dashboard_url: String) -> Self {
        self.dashboard_url = dashboard_url.trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_assets_url(mut self, assets_url: String) -> Self {
        self.assets_url = assets_url.trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    #[must_use]
    pub fn dashboard_url(&self) -> &str {
        &self.dashboard_url
    }

    #[must_use]
    pub fn assets_url(&self) -> &str {
        &self.assets_url
    }

    /// Cookies are only marked `Secure` when the dashboard is served over
    /// HTTPS, so local development keeps working.
    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.dashboard_url.starts_with("https://")
    }

    /// Link included in the welcome / verification email.
    #[must_use]
    pub fn verification_url(&self, token: uuid::Uuid) -> String {
        format!("{}/verify-email?token={token}", self.dashboard_url)
    }

    /// Link included in the password-reset email.
    #[must_use]
    pub fn reset_url(&self, token: uuid::Uuid) -> String {
        format!("{}/reset-password?token={token}", self.dashboard_url)
    }

    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        Duration::hours(SESSION_TTL_HOURS)
    }

    #[must_use]
    pub fn refresh_ttl(&self) -> Duration {
        Duration::days(REFRESH_TTL_DAYS)
    }

    #[must_use]
    pub fn two_factor_pending_ttl(&self) -> Duration {
        Duration::minutes(TWO_FACTOR_PENDING_TTL_MINUTES)
    }

    #[must_use]
    pub fn email_verification_ttl(&self) -> Duration {
        Duration::hours(EMAIL_VERIFICATION_TTL_HOURS)
    }

    #[must_use]
    pub fn password_reset_ttl(&self) -> Duration {
        Duration::hours(PASSWORD_RESET_TTL_HOURS)
    }

    #[must_use]
    pub fn login_lockout_window(&self) -> Duration {
        Duration::minutes(LOGIN_LOCKOUT_MINUTES)
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{IdentityConfig, ENV_APP_NAME, ENV_DASHBOARD_URL};
    use uuid::Uuid;

    #[test]
    fn from_env_reads_overrides() {
        temp_env::with_vars(
            [
                (ENV_APP_NAME, Some("Acme")),
                (ENV_DASHBOARD_URL, Some("https://app.acme.dev/")),
            ],
            || {
                let config = IdentityConfig::from_env();
                assert_eq!(config.app_name(), "Acme");
                assert_eq!(config.dashboard_url(), "https://app.acme.dev");
                assert!(config.secure_cookies());
            },
        );
    }

    #[test]
    fn defaults_are_insecure_localhost() {
        temp_env::with_vars(
            [
                (ENV_APP_NAME, None::<&str>),
                (ENV_DASHBOARD_URL, None::<&str>),
            ],
            || {
                let config = IdentityConfig::from_env();
                assert_eq!(config.app_name(), "Tessera");
                assert!(!config.secure_cookies());
            },
        );
    }

    #[test]
    fn verification_and_reset_urls_embed_the_token() {
        let config =
            IdentityConfig::new().with_dashboard_url("https://app.example.com".to_string());
        let token = Uuid::nil();
        assert_eq!(
            config.verification_url(token),
            format!("https://app.example.com/verify-email?token={token}")
        );
        assert_eq!(
            config.reset_url(token),
            format!("https://app.example.com/reset-password?token={token}")
        );
    }

    #[test]
    fn policy_durations_match_the_product_rules() {
        let config = IdentityConfig::new();
        assert_eq!(config.session_ttl().num_hours(), 24);
        assert_eq!(config.refresh_ttl().num_days(), 30);
        assert_eq!(config.two_factor_pending_ttl().num_minutes(), 5);
        assert_eq!(config.password_reset_ttl().num_hours(), 1);
        assert_eq!(config.login_lockout_window().num_minutes(), 30);
    }
}
