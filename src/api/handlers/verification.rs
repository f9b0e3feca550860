//! Email verification endpoint.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};

use super::{
    types::{parse_uuid, VerifyEmailRequest},
    SharedState,
};
use crate::{context::RequestContext, error::Result};

#[utoipa::path(
    post,
    path = "/identity/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 204, description = "Email verified; token consumed"),
        (status = 422, description = "Invalid or expired token")
    ),
    tag = "identity"
)]
pub async fn verify_email(
    Extension(state): Extension<SharedState>,
    headers: HeaderMap,
    Json(body): Json<VerifyEmailRequest>,
) -> Result<impl IntoResponse> {
    let ctx = RequestContext::from_headers(&headers);
    let token = parse_uuid(&body.token)?;
    state.services.user.verify_email(&ctx, token).await?;
    Ok(StatusCode::NO_CONTENT)
}
