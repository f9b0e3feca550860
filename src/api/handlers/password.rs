//! Password reset and change endpoints.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use secrecy::SecretString;

use super::{
    require_session,
    types::{parse_uuid, validate_email, validate_password, ForgotPasswordRequest,
            ResetPasswordRequest, UpdatePasswordRequest},
    SharedState,
};
use crate::{
    context::RequestContext,
    error::{Error, ErrorCode, Result},
};

#[utoipa::path(
    post,
    path = "/identity/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 204, description = "Reset email queued if the account exists")
    ),
    tag = "identity"
)]
pub async fn forgot_password(
    Extension(state): Extension<SharedState>,
    headers: HeaderMap,
    Json(body): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse> {
    let ctx = RequestContext::from_headers(&headers);
    let email = validate_email(&body.email)?;
    state
        .services
        .user
        .initiate_password_reset(&ctx, &email)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/identity/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 204, description = "Password replaced; lockout cleared"),
        (status = 422, description = "Invalid or expired token")
    ),
    tag = "identity"
)]
pub async fn reset_password(
    Extension(state): Extension<SharedState>,
    headers: HeaderMap,
    Json(body): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse> {
    let ctx = RequestContext::from_headers(&headers);
    let token = parse_uuid(&body.token)?;
    validate_password(&body.password)?;
    state
        .services
        .user
        .reset_password(&ctx, token, &SecretString::from(body.password))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/identity/password",
    request_body = UpdatePasswordRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 401, description = "No active session or wrong current password")
    ),
    tag = "identity"
)]
pub async fn update_password(
    Extension(state): Extension<SharedState>,
    headers: HeaderMap,
    Json(body): Json<UpdatePasswordRequest>,
) -> Result<impl IntoResponse> {
    let ctx = RequestContext::from_headers(&headers);
    let session = require_session(&state, &headers, &ctx).await?;
    if body.current_password.is_empty() {
        return Err(Error::Code(ErrorCode::Required));
    }
    validate_password(&body.new_password)?;
    state
        .services
        .user
        .update_password(
            &ctx,
            session.user_id,
            &SecretString::from(body.current_password),
            &SecretString::from(body.new_password),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
