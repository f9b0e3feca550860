//! Request/response bodies and boundary validation.

use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    error::{Error, ErrorCode, Result},
    models::{EntityStatus, EntityType, Membership, Role, Session, User},
};

const PASSWORD_MIN_LENGTH: usize = 8;
const PASSWORD_MAX_LENGTH: usize = 128;

/// Normalize then shape-check an email address.
pub(crate) fn validate_email(email: &str) -> Result<String> {
    let normalized = email.trim().to_lowercase();
    if normalized.is_empty() {
        return Err(Error::Code(ErrorCode::Required));
    }
    let valid = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")
        .is_ok_and(|regex| regex.is_match(&normalized));
    if !valid {
        return Err(Error::Code(ErrorCode::InvalidEmail));
    }
    Ok(normalized)
}

pub(crate) fn validate_password(password: &str) -> Result<()> {
    if password.is_empty() {
        return Err(Error::Code(ErrorCode::Required));
    }
    if password.len() < PASSWORD_MIN_LENGTH {
        return Err(Error::Code(ErrorCode::TooShort));
    }
    if password.len() > PASSWORD_MAX_LENGTH {
        return Err(Error::Code(ErrorCode::TooLong));
    }
    Ok(())
}

pub(crate) fn validate_required(value: &str) -> Result<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::Code(ErrorCode::Required));
    }
    Ok(trimmed)
}

pub(crate) fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value.trim()).map_err(|_| Error::Code(ErrorCode::InvalidUuid))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
    /// Accepted for frontend compatibility; bot checks run at the edge.
    #[serde(default)]
    #[allow(dead_code)]
    pub cf_turnstile_token: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignInResponse {
    pub two_factor_pending: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    #[schema(value_type = Object)]
    pub user: User,
    #[schema(value_type = Vec<Object>)]
    pub memberships: Vec<Membership>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorCodeRequest {
    pub code: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorSetupResponse {
    pub secret: String,
    pub backup_codes: Vec<String>,
    pub qr_code_base64: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: Uuid,
    pub ip_address: Option<String>,
    pub country: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub current: bool,
}

impl SessionSummary {
    pub(crate) fn from_session(session: &Session, current_id: Uuid) -> Self {
        Self {
            id: session.id,
            ip_address: session.ip_address.clone(),
            country: session.country.clone(),
            user_agent: session.user_agent.clone(),
            created_at: session.created_at,
            expires_at: session.expires_at,
            current: session.id == current_id,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateEntityRequest {
    pub name: String,
    pub slug: String,
    #[serde(rename = "type")]
    pub kind: EntityType,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEntityRequest {
    pub status: EntityStatus,
}

/// Disambiguates slug lookups when the same slug exists under several
/// entity types.
#[derive(Debug, Deserialize, IntoParams)]
pub struct GetEntityQuery {
    #[serde(rename = "type")]
    pub kind: Option<EntityType>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberRequest {
    pub user_id: Uuid,
    pub role: Role,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRoleRequest {
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::{parse_uuid, validate_email, validate_password};
    use crate::error::{Error, ErrorCode};

    #[test]
    fn emails_are_normalized_and_shape_checked() {
        assert_eq!(
            validate_email("  Test@Example.COM ").unwrap(),
            "test@example.com"
        );
        assert!(matches!(
            validate_email(""),
            Err(Error::Code(ErrorCode::Required))
        ));
        assert!(matches!(
            validate_email("not-an-email"),
            Err(Error::Code(ErrorCode::InvalidEmail))
        ));
        assert!(matches!(
            validate_email("a b@example.com"),
            Err(Error::Code(ErrorCode::InvalidEmail))
        ));
    }

    #[test]
    fn password_length_bounds() {
        assert!(validate_password("StrongPass123!").is_ok());
        assert!(matches!(
            validate_password(""),
            Err(Error::Code(ErrorCode::Required))
        ));
        assert!(matches!(
            validate_password("short"),
            Err(Error::Code(ErrorCode::TooShort))
        ));
        assert!(matches!(
            validate_password(&"x".repeat(200)),
            Err(Error::Code(ErrorCode::TooLong))
        ));
    }

    #[test]
    fn uuid_parsing_maps_to_invalid_uuid() {
        assert!(parse_uuid("b7c1a2ce-1111-4f4e-9f1a-30ad41f4a9ee").is_ok());
        assert!(matches!(
            parse_uuid("nope"),
            Err(Error::Code(ErrorCode::InvalidUuid))
        ));
    }
}
