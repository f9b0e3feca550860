//! Signup and profile endpoints.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use secrecy::SecretString;

use super::{
    require_session,
    types::{validate_email, validate_password, validate_required, MeResponse, SignUpRequest,
            UpdateProfileRequest},
    SharedState,
};
use crate::{context::RequestContext, error::Result};

#[utoipa::path(
    post,
    path = "/identity/sign-up",
    request_body = SignUpRequest,
    responses(
        (status = 201, description = "User created; verification email queued"),
        (status = 422, description = "Validation failed or email already registered")
    ),
    tag = "identity"
)]
pub async fn sign_up(
    Extension(state): Extension<SharedState>,
    headers: HeaderMap,
    Json(body): Json<SignUpRequest>,
) -> Result<impl IntoResponse> {
    let ctx = RequestContext::from_headers(&headers);
    let email = validate_email(&body.email)?;
    let name = validate_required(&body.name)?;
    validate_password(&body.password)?;

    let user = state
        .services
        .user
        .create(&ctx, &email, name, &SecretString::from(body.password))
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[utoipa::path(
    get,
    path = "/identity/me",
    responses(
        (status = 200, description = "Caller profile and memberships", body = MeResponse),
        (status = 401, description = "No active session")
    ),
    tag = "identity"
)]
pub async fn me(
    Extension(state): Extension<SharedState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let ctx = RequestContext::from_headers(&headers);
    let session = require_session(&state, &headers, &ctx).await?;
    let user = state.services.user.get_by_id(&ctx, session.user_id).await?;
    let memberships = state
        .services
        .entity
        .memberships_effective(session.user_id)
        .await?;
    Ok(Json(MeResponse { user, memberships }))
}

#[utoipa::path(
    patch,
    path = "/identity/me",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated"),
        (status = 401, description = "No active session")
    ),
    tag = "identity"
)]
pub async fn update_me(
    Extension(state): Extension<SharedState>,
    headers: HeaderMap,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse> {
    let ctx = RequestContext::from_headers(&headers);
    let session = require_session(&state, &headers, &ctx).await?;
    let user = state
        .services
        .user
        .update(
            &ctx,
            session.user_id,
            body.name.as_deref(),
            body.image.as_deref(),
        )
        .await?;
    Ok(Json(user))
}
