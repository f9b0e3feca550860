//! TOTP enrollment and challenge endpoints.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use super::{
    cookies::{clear_session_cookies, set_session_cookies},
    require_session, require_session_allow_pending,
    types::{validate_required, TwoFactorCodeRequest, TwoFactorSetupResponse},
    SharedState,
};
use crate::{
    context::RequestContext,
    error::{Error, Result},
    service::LoginOutcome,
};

#[utoipa::path(
    post,
    path = "/identity/two-factor/setup",
    responses(
        (status = 200, description = "Secret, backup codes, and QR code", body = TwoFactorSetupResponse),
        (status = 401, description = "No active session"),
        (status = 422, description = "Already enabled")
    ),
    tag = "two-factor"
)]
pub async fn setup(
    Extension(state): Extension<SharedState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let ctx = RequestContext::from_headers(&headers);
    let session = require_session(&state, &headers, &ctx).await?;
    let setup = state
        .services
        .two_factor
        .setup(&ctx, session.user_id)
        .await?;
    Ok(Json(TwoFactorSetupResponse {
        secret: setup.two_factor.secret.clone(),
        backup_codes: setup.backup_codes,
        qr_code_base64: setup.qr_code_base64,
    }))
}

#[utoipa::path(
    post,
    path = "/identity/two-factor/enable",
    request_body = TwoFactorCodeRequest,
    responses(
        (status = 204, description = "Two-factor enabled"),
        (status = 401, description = "Code did not match"),
        (status = 422, description = "No setup in progress or already enabled")
    ),
    tag = "two-factor"
)]
pub async fn enable(
    Extension(state): Extension<SharedState>,
    headers: HeaderMap,
    Json(body): Json<TwoFactorCodeRequest>,
) -> Result<impl IntoResponse> {
    let ctx = RequestContext::from_headers(&headers);
    let session = require_session(&state, &headers, &ctx).await?;
    let code = validate_required(&body.code)?;
    state
        .services
        .two_factor
        .enable(&ctx, session.user_id, code)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/identity/two-factor/disable",
    responses(
        (status = 204, description = "Two-factor removed"),
        (status = 401, description = "No active session"),
        (status = 422, description = "Nothing to disable")
    ),
    tag = "two-factor"
)]
pub async fn disable(
    Extension(state): Extension<SharedState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let ctx = RequestContext::from_headers(&headers);
    let session = require_session(&state, &headers, &ctx).await?;
    state
        .services
        .two_factor
        .disable(&ctx, session.user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/identity/two-factor/verify",
    request_body = TwoFactorCodeRequest,
    responses(
        (status = 204, description = "Challenge passed; full session cookies set"),
        (status = 401, description = "Code rejected; cookies cleared"),
        (status = 429, description = "Too many failures; credential locked")
    ),
    tag = "two-factor"
)]
pub async fn verify(
    Extension(state): Extension<SharedState>,
    headers: HeaderMap,
    Json(body): Json<TwoFactorCodeRequest>,
) -> Result<Response> {
    let ctx = RequestContext::from_headers(&headers);
    let outcome = require_session_allow_pending(&state, &headers, &ctx).await?;
    let pending = match outcome {
        LoginOutcome::TwoFactorPending(session) => session,
        // Verifying an already-active session is a no-op success.
        LoginOutcome::Active(_) => return Ok(StatusCode::NO_CONTENT.into_response()),
    };
    let code = validate_required(&body.code)?;

    let verified = state
        .services
        .two_factor
        .verify(&ctx, pending.user_id, code)
        .await;
    if let Err(err) = verified {
        if let Error::Unknown(_) = err {
            return Err(err);
        }
        // A rejected challenge ends the pending session entirely.
        let mut cleared = HeaderMap::new();
        clear_session_cookies(&mut cleared, &state.config)?;
        let mut response = err.into_response();
        response.headers_mut().extend(cleared);
        return Ok(response);
    }

    let session = state
        .services
        .session
        .activate_pending(&ctx, &pending.token)
        .await?;
    let mut response_headers = HeaderMap::new();
    set_session_cookies(&mut response_headers, &state.config, &session)?;
    Ok((StatusCode::NO_CONTENT, response_headers).into_response())
}
