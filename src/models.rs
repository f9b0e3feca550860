//! Domain aggregates and their database row mappings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use utoipa::ToSchema;
use uuid::Uuid;

fn invalid_value(column: &str, value: &str) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("invalid {column} value: {value}"),
    )))
}

/// Membership role on an entity.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Admin,
    Member,
    Viewer,
    None,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Member => "member",
            Self::Viewer => "viewer",
            Self::None => "none",
        }
    }

    pub(crate) fn from_db(value: &str) -> Result<Self, sqlx::Error> {
        match value {
            "owner" => Ok(Self::Owner),
            "admin" => Ok(Self::Admin),
            "member" => Ok(Self::Member),
            "viewer" => Ok(Self::Viewer),
            "none" => Ok(Self::None),
            other => Err(invalid_value("memberships.role", other)),
        }
    }
}

/// Tenant node kind in the entity hierarchy.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Platform,
    Organization,
    Account,
}

impl EntityType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Platform => "platform",
            Self::Organization => "organization",
            Self::Account => "account",
        }
    }

    pub(crate) fn from_db(value: &str) -> Result<Self, sqlx::Error> {
        match value {
            "platform" => Ok(Self::Platform),
            "organization" => Ok(Self::Organization),
            "account" => Ok(Self::Account),
            other => Err(invalid_value("entities.type", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    Pending,
    Active,
    Inactive,
    Suspended,
}

impl EntityStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Suspended => "suspended",
        }
    }

    pub(crate) fn from_db(value: &str) -> Result<Self, sqlx::Error> {
        match value {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "suspended" => Ok(Self::Suspended),
            other => Err(invalid_value("entities.status", other)),
        }
    }
}

/// What a verification token is allowed to be redeemed for.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationContext {
    EmailVerification,
    PasswordReset,
}

impl VerificationContext {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmailVerification => "email_verification",
            Self::PasswordReset => "password_reset",
        }
    }

    pub(crate) fn from_db(value: &str) -> Result<Self, sqlx::Error> {
        match value {
            "email_verification" => Ok(Self::EmailVerification),
            "password_reset" => Ok(Self::PasswordReset),
            other => Err(invalid_value("verifications.context", other)),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub image: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub email_verified_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub failed_login_attempts: i32,
    #[serde(skip_serializing)]
    pub locked_at: Option<DateTime<Utc>>,
    pub password_changed_at: Option<DateTime<Utc>>,
    pub last_active_at: Option<DateTime<Utc>>,
    pub last_logged_in_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Whether the failed-login lockout window is still open.
    #[must_use]
    pub fn is_locked(&self, now: DateTime<Utc>, threshold: i32, window: chrono::Duration) -> bool {
        if self.failed_login_attempts < threshold {
            return false;
        }
        self.locked_at.is_some_and(|at| at + window > now)
    }
}

impl<'r> FromRow<'r, PgRow> for User {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            name: row.try_get("name")?,
            image: row.try_get("image")?,
            password_hash: row.try_get("password_hash")?,
            email_verified_at: row.try_get("email_verified_at")?,
            failed_login_attempts: row.try_get("failed_login_attempts")?,
            locked_at: row.try_get("locked_at")?,
            password_changed_at: row.try_get("password_changed_at")?,
            last_active_at: row.try_get("last_active_at")?,
            last_logged_in_at: row.try_get("last_logged_in_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Single-use token bound to a context and an email address.
/// The row id is the opaque token mailed to the user.
#[derive(Clone, Debug)]
pub struct Verification {
    pub id: Uuid,
    pub context: VerificationContext,
    pub value: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Verification {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

impl<'r> FromRow<'r, PgRow> for Verification {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let context: String = row.try_get("context")?;
        Ok(Self {
            id: row.try_get("id")?,
            context: VerificationContext::from_db(&context)?,
            value: row.try_get("value")?,
            expires_at: row.try_get("expires_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Session {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub token: String,
    #[serde(skip_serializing)]
    pub refresh_token: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    pub is_two_factor_pending: bool,
    pub ip_address: Option<String>,
    pub country: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Memberships attached by the session service; not a sessions column.
    pub memberships: Vec<Membership>,
}

impl<'r> FromRow<'r, PgRow> for Session {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            token: row.try_get("token")?,
            refresh_token: row.try_get("refresh_token")?,
            user_id: row.try_get("user_id")?,
            expires_at: row.try_get("expires_at")?,
            refresh_expires_at: row.try_get("refresh_expires_at")?,
            is_two_factor_pending: row.try_get("is_two_factor_pending")?,
            ip_address: row.try_get("ip_address")?,
            country: row.try_get("country")?,
            user_agent: row.try_get("user_agent")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            memberships: Vec::new(),
        })
    }
}

#[derive(Clone, Debug)]
pub struct TwoFactor {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Base32-encoded 20-byte TOTP seed.
    pub secret: String,
    /// Remaining one-time backup codes; consumed codes are removed.
    pub backup_codes: Vec<String>,
    pub failed_attempts: i32,
    pub last_failed_attempt_at: Option<DateTime<Utc>>,
    pub locked_until: Option<DateTime<Utc>>,
    pub enabled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TwoFactor {
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled_at.is_some()
    }

    #[must_use]
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }
}

impl<'r> FromRow<'r, PgRow> for TwoFactor {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        // backup_codes is a JSONB array; unmarshal it explicitly.
        let raw_codes: serde_json::Value = row.try_get("backup_codes")?;
        let backup_codes: Vec<String> = serde_json::from_value(raw_codes)
            .map_err(|err| sqlx::Error::Decode(Box::new(err)))?;
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            secret: row.try_get("secret")?,
            backup_codes,
            failed_attempts: row.try_get("failed_attempts")?,
            last_failed_attempt_at: row.try_get("last_failed_attempt_at")?,
            locked_until: row.try_get("locked_until")?,
            enabled_at: row.try_get("enabled_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct Entity {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    #[serde(rename = "type")]
    pub kind: EntityType,
    pub status: EntityStatus,
    pub parent_id: Option<Uuid>,
    pub domain: Option<String>,
    pub logo: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for Entity {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let kind: String = row.try_get("type")?;
        let status: String = row.try_get("status")?;
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            slug: row.try_get("slug")?,
            kind: EntityType::from_db(&kind)?,
            status: EntityStatus::from_db(&status)?,
            parent_id: row.try_get("parent_id")?,
            domain: row.try_get("domain")?,
            logo: row.try_get("logo")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// A user's role on an entity, either held directly or inherited down the
/// entity tree. For inherited rows `entity_id` is the reachable descendant
/// while `id` stays the id of the direct membership it derives from.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct Membership {
    pub id: Uuid,
    pub user_id: Uuid,
    pub entity_id: Uuid,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for Membership {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let role: String = row.try_get("role")?;
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            entity_id: row.try_get("entity_id")?,
            role: Role::from_db(&role)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
