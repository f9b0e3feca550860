//! Machine error codes and the service-boundary error type.
//!
//! Every business rejection carries a stable machine code; infrastructure
//! failures are wrapped under `unknown` with the original error kept for
//! logs. Database details are never surfaced to clients.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Stable machine codes emitted by the identity core.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorCode {
    // Access
    Unauthenticated,
    InsufficientPermissions,
    EntityNotFound,
    UserNotFound,
    // Credentials
    InvalidCredentials,
    AccountLocked,
    EmailNotVerified,
    EmailExists,
    InvalidOrExpiredToken,
    InvalidRefreshToken,
    // Two-factor
    TwoFactorNotEnabled,
    TwoFactorAlreadyEnabled,
    TwoFactorPending,
    InvalidTwoFactorCode,
    TwoFactorLocked,
    BackupCodeValidation,
    // Request validation
    Required,
    InvalidValue,
    TooShort,
    TooLong,
    InvalidEmail,
    InvalidUuid,
    // Fallback
    Unknown,
}

impl ErrorCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::InsufficientPermissions => "insufficient_permissions",
            Self::EntityNotFound => "entity_not_found",
            Self::UserNotFound => "user_not_found",
            Self::InvalidCredentials => "invalid_credentials",
            Self::AccountLocked => "account_locked",
            Self::EmailNotVerified => "email_not_verified",
            Self::EmailExists => "email_exists",
            Self::InvalidOrExpiredToken => "invalid_or_expired_token",
            Self::InvalidRefreshToken => "invalid_refresh_token",
            Self::TwoFactorNotEnabled => "two_factor_not_enabled",
            Self::TwoFactorAlreadyEnabled => "two_factor_already_enabled",
            Self::TwoFactorPending => "two_factor_pending",
            Self::InvalidTwoFactorCode => "invalid_two_factor_code",
            Self::TwoFactorLocked => "two_factor_locked",
            Self::BackupCodeValidation => "backup_code_validation",
            Self::Required => "required",
            Self::InvalidValue => "invalid_value",
            Self::TooShort => "too_short",
            Self::TooLong => "too_long",
            Self::InvalidEmail => "invalid_email",
            Self::InvalidUuid => "invalid_uuid",
            Self::Unknown => "unknown",
        }
    }

    /// Default HTTP status for the code.
    #[must_use]
    pub fn status(self) -> StatusCode {
        match self {
            Self::Unauthenticated
            | Self::InvalidCredentials
            | Self::EmailNotVerified
            | Self::InvalidRefreshToken
            | Self::TwoFactorPending
            | Self::InvalidTwoFactorCode => StatusCode::UNAUTHORIZED,
            Self::InsufficientPermissions | Self::AccountLocked => StatusCode::FORBIDDEN,
            Self::EntityNotFound | Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::EmailExists
            | Self::InvalidOrExpiredToken
            | Self::TwoFactorNotEnabled
            | Self::TwoFactorAlreadyEnabled
            | Self::BackupCodeValidation
            | Self::Required
            | Self::InvalidValue
            | Self::TooShort
            | Self::TooLong
            | Self::InvalidEmail
            | Self::InvalidUuid => StatusCode::UNPROCESSABLE_ENTITY,
            Self::TwoFactorLocked => StatusCode::TOO_MANY_REQUESTS,
            Self::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Default English user-facing message.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::Unauthenticated => "Authentication required.",
            Self::InsufficientPermissions => "You do not have permission to do that.",
            Self::EntityNotFound => "Entity not found.",
            Self::UserNotFound => "User not found.",
            Self::InvalidCredentials => "Invalid email or password.",
            Self::AccountLocked => "Account temporarily locked. Try again later.",
            Self::EmailNotVerified => "Email address is not verified.",
            Self::EmailExists => "An account with this email already exists.",
            Self::InvalidOrExpiredToken => "This link is invalid or has expired.",
            Self::InvalidRefreshToken => "Session could not be refreshed.",
            Self::TwoFactorNotEnabled => "Two-factor authentication is not set up.",
            Self::TwoFactorAlreadyEnabled => "Two-factor authentication is already enabled.",
            Self::TwoFactorPending => "Two-factor verification required.",
            Self::InvalidTwoFactorCode => "Invalid two-factor code.",
            Self::TwoFactorLocked => "Too many failed codes. Try again later.",
            Self::BackupCodeValidation => "Backup code could not be validated.",
            Self::Required => "A required field is missing.",
            Self::InvalidValue => "A field has an invalid value.",
            Self::TooShort => "A field value is too short.",
            Self::TooLong => "A field value is too long.",
            Self::InvalidEmail => "Invalid email address.",
            Self::InvalidUuid => "Invalid identifier.",
            Self::Unknown => "Something went wrong. Please try again.",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type returned by every service operation.
#[derive(Debug, Error)]
pub enum Error {
    /// Business-rule rejection with a stable machine code.
    #[error("{0}")]
    Code(ErrorCode),
    /// Infrastructure failure; surfaced as `unknown`, details stay in logs.
    #[error(transparent)]
    Unknown(#[from] anyhow::Error),
}

impl Error {
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Code(code) => *code,
            Self::Unknown(_) => ErrorCode::Unknown,
        }
    }
}

impl From<ErrorCode> for Error {
    fn from(code: ErrorCode) -> Self {
        Self::Code(code)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: &'static str,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        if let Self::Unknown(err) = &self {
            error!("Internal error: {err:#}");
        }
        let code = self.code();
        (
            code.status(),
            Json(ErrorBody {
                code: code.as_str(),
                message: code.message(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorCode};
    use axum::http::StatusCode;

    #[test]
    fn codes_are_snake_case() {
        for code in [
            ErrorCode::Unauthenticated,
            ErrorCode::InsufficientPermissions,
            ErrorCode::TwoFactorAlreadyEnabled,
            ErrorCode::InvalidOrExpiredToken,
        ] {
            let text = code.as_str();
            assert!(text
                .chars()
                .all(|ch| ch.is_ascii_lowercase() || ch == '_'));
        }
    }

    #[test]
    fn status_mapping_matches_surface() {
        assert_eq!(
            ErrorCode::Unauthenticated.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ErrorCode::AccountLocked.status(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::UserNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrorCode::EmailExists.status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ErrorCode::TwoFactorLocked.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ErrorCode::Unknown.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn unknown_wraps_infrastructure_errors() {
        let err = Error::from(anyhow::anyhow!("pool timed out"));
        assert_eq!(err.code(), ErrorCode::Unknown);
        assert_eq!(err.code().as_str(), "unknown");
    }

    #[test]
    fn code_errors_display_the_machine_code() {
        let err = Error::from(ErrorCode::InvalidCredentials);
        assert_eq!(err.to_string(), "invalid_credentials");
    }
}
