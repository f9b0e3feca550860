//! Sign-in, sign-out, refresh, and session management endpoints.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use secrecy::SecretString;
use uuid::Uuid;

use super::{
    cookies::{clear_session_cookies, extract_refresh_token, extract_session_token,
              set_session_cookies},
    require_session,
    types::{validate_email, SessionSummary, SignInRequest, SignInResponse},
    SharedState,
};
use crate::{
    context::RequestContext,
    error::{Error, ErrorCode, Result},
};

#[utoipa::path(
    post,
    path = "/identity/sign-in",
    request_body = SignInRequest,
    responses(
        (status = 200, description = "Session issued; cookies set", body = SignInResponse),
        (status = 401, description = "Bad credentials or unverified email"),
        (status = 403, description = "Account locked")
    ),
    tag = "identity"
)]
pub async fn sign_in(
    Extension(state): Extension<SharedState>,
    headers: HeaderMap,
    Json(body): Json<SignInRequest>,
) -> Result<impl IntoResponse> {
    let ctx = RequestContext::from_headers(&headers);
    let email = validate_email(&body.email)?;
    if body.password.is_empty() {
        return Err(Error::Code(ErrorCode::Required));
    }

    let outcome = state
        .services
        .session
        .sign_in(&ctx, &email, &SecretString::from(body.password))
        .await?;

    let mut response_headers = HeaderMap::new();
    set_session_cookies(&mut response_headers, &state.config, outcome.session())?;
    Ok((
        StatusCode::OK,
        response_headers,
        Json(SignInResponse {
            two_factor_pending: outcome.is_pending(),
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/identity/sign-out",
    responses(
        (status = 204, description = "Session invalidated; cookies cleared")
    ),
    tag = "identity"
)]
pub async fn sign_out(
    Extension(state): Extension<SharedState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let ctx = RequestContext::from_headers(&headers);
    if let Some(token) = extract_session_token(&headers) {
        // An already-dead token still clears the cookies below.
        match state.services.session.invalidate(&ctx, &token).await {
            Ok(()) | Err(Error::Code(ErrorCode::Unauthenticated)) => {}
            Err(err) => return Err(err),
        }
    }
    let mut response_headers = HeaderMap::new();
    clear_session_cookies(&mut response_headers, &state.config)?;
    Ok((StatusCode::NO_CONTENT, response_headers))
}

#[utoipa::path(
    post,
    path = "/identity/refresh-session",
    responses(
        (status = 204, description = "Tokens rotated; new cookies set"),
        (status = 401, description = "Refresh token missing, expired, or replayed")
    ),
    tag = "identity"
)]
pub async fn refresh(
    Extension(state): Extension<SharedState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let ctx = RequestContext::from_headers(&headers);
    let refresh_token = extract_refresh_token(&headers)
        .ok_or(Error::Code(ErrorCode::InvalidRefreshToken))?;
    let session = state.services.session.refresh(&ctx, &refresh_token).await?;

    let mut response_headers = HeaderMap::new();
    set_session_cookies(&mut response_headers, &state.config, &session)?;
    Ok((StatusCode::NO_CONTENT, response_headers))
}

#[utoipa::path(
    get,
    path = "/identity/sessions",
    responses(
        (status = 200, description = "Caller's live sessions", body = [SessionSummary]),
        (status = 401, description = "No active session")
    ),
    tag = "identity"
)]
pub async fn list_sessions(
    Extension(state): Extension<SharedState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let ctx = RequestContext::from_headers(&headers);
    let caller = require_session(&state, &headers, &ctx).await?;
    let sessions = state.services.session.list_for_user(caller.user_id).await?;
    let summaries: Vec<SessionSummary> = sessions
        .iter()
        .map(|session| SessionSummary::from_session(session, caller.id))
        .collect();
    Ok(Json(summaries))
}

#[utoipa::path(
    delete,
    path = "/identity/sessions/{id}",
    params(("id" = Uuid, Path, description = "Session id to revoke")),
    responses(
        (status = 204, description = "Revoked, or no-op for foreign/unknown ids"),
        (status = 401, description = "No active session")
    ),
    tag = "identity"
)]
pub async fn revoke_session(
    Extension(state): Extension<SharedState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let ctx = RequestContext::from_headers(&headers);
    let caller = require_session(&state, &headers, &ctx).await?;
    state
        .services
        .session
        .invalidate_by_id(&ctx, id, &caller)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/identity/sessions",
    responses(
        (status = 204, description = "All other sessions revoked"),
        (status = 401, description = "No active session")
    ),
    tag = "identity"
)]
pub async fn revoke_other_sessions(
    Extension(state): Extension<SharedState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let ctx = RequestContext::from_headers(&headers);
    let caller = require_session(&state, &headers, &ctx).await?;
    state
        .services
        .session
        .invalidate_all(&ctx, caller.user_id, caller.id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
