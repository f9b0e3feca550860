//! HTTP handlers for the identity surface.

pub mod cookies;
pub mod entity;
pub mod health;
pub mod password;
pub mod session;
pub mod two_factor;
pub mod types;
pub mod user;
pub mod verification;

use axum::http::HeaderMap;
use std::sync::Arc;

use crate::{
    config::IdentityConfig,
    context::RequestContext,
    error::{Error, ErrorCode, Result},
    models::Session,
    service::{LoginOutcome, Services},
};

/// Shared application state injected as an axum `Extension`.
pub struct AppState {
    pub services: Services,
    pub config: IdentityConfig,
}

pub(crate) type SharedState = Arc<AppState>;

/// Resolve the caller's session from cookie or bearer token. Pending
/// sessions carry no authorization, so they read as unauthenticated here;
/// the sign-in response already told the client the challenge is open.
pub(crate) async fn require_session(
    state: &AppState,
    headers: &HeaderMap,
    ctx: &RequestContext,
) -> Result<Session> {
    let token = cookies::extract_session_token(headers)
        .ok_or(Error::Code(ErrorCode::Unauthenticated))?;
    match state.services.session.get_by_token(ctx, &token).await? {
        LoginOutcome::Active(session) => Ok(session),
        LoginOutcome::TwoFactorPending(_) => Err(Error::Code(ErrorCode::Unauthenticated)),
    }
}

/// Variant for the two-factor verify endpoint, which is the one place a
/// pending session is acceptable.
pub(crate) async fn require_session_allow_pending(
    state: &AppState,
    headers: &HeaderMap,
    ctx: &RequestContext,
) -> Result<LoginOutcome> {
    let token = cookies::extract_session_token(headers)
        .ok_or(Error::Code(ErrorCode::Unauthenticated))?;
    state.services.session.get_by_token(ctx, &token).await
}
