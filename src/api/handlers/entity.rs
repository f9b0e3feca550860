//! Entity and membership management endpoints.

use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use super::{
    require_session,
    types::{
        validate_required, AddMemberRequest, ChangeRoleRequest, CreateEntityRequest,
        GetEntityQuery, UpdateEntityRequest,
    },
    SharedState,
};
use crate::{context::RequestContext, error::Result, models::Entity};

#[utoipa::path(
    post,
    path = "/entities",
    request_body = CreateEntityRequest,
    responses(
        (status = 201, description = "Entity created", body = Entity),
        (status = 403, description = "No create rights on the parent"),
        (status = 422, description = "Slug already taken for this type")
    ),
    tag = "entities"
)]
pub async fn create_entity(
    Extension(state): Extension<SharedState>,
    headers: HeaderMap,
    Json(body): Json<CreateEntityRequest>,
) -> Result<impl IntoResponse> {
    let ctx = RequestContext::from_headers(&headers);
    let caller = require_session(&state, &headers, &ctx).await?;
    let name = validate_required(&body.name)?;
    let slug = validate_required(&body.slug)?;
    let entity = state
        .services
        .entity
        .create(&caller, name, slug, body.kind, body.parent_id)
        .await?;
    Ok((StatusCode::CREATED, Json(entity)))
}

#[utoipa::path(
    get,
    path = "/entities/{id_or_slug}",
    params(
        ("id_or_slug" = String, Path, description = "Entity id or slug"),
        GetEntityQuery
    ),
    responses(
        (status = 200, description = "Entity", body = Entity),
        (status = 404, description = "Unknown entity")
    ),
    tag = "entities"
)]
pub async fn get_entity(
    Extension(state): Extension<SharedState>,
    headers: HeaderMap,
    Path(id_or_slug): Path<String>,
    Query(query): Query<GetEntityQuery>,
) -> Result<impl IntoResponse> {
    let ctx = RequestContext::from_headers(&headers);
    require_session(&state, &headers, &ctx).await?;
    let entity = state.services.entity.get(&id_or_slug, query.kind).await?;
    Ok(Json(entity))
}

#[utoipa::path(
    get,
    path = "/entities/{id}/children",
    params(("id" = Uuid, Path, description = "Entity id")),
    responses(
        (status = 200, description = "Direct child entities", body = Vec<Entity>),
        (status = 403, description = "No read rights on the entity"),
        (status = 404, description = "Unknown entity")
    ),
    tag = "entities"
)]
pub async fn get_children(
    Extension(state): Extension<SharedState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let ctx = RequestContext::from_headers(&headers);
    let caller = require_session(&state, &headers, &ctx).await?;
    let children = state.services.entity.children(&caller, id).await?;
    Ok(Json(children))
}

#[utoipa::path(
    patch,
    path = "/entities/{id}",
    params(("id" = Uuid, Path, description = "Entity id")),
    request_body = UpdateEntityRequest,
    responses(
        (status = 200, description = "Entity updated", body = Entity),
        (status = 403, description = "No update rights on the entity"),
        (status = 404, description = "Unknown entity")
    ),
    tag = "entities"
)]
pub async fn update_entity(
    Extension(state): Extension<SharedState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateEntityRequest>,
) -> Result<impl IntoResponse> {
    let ctx = RequestContext::from_headers(&headers);
    let caller = require_session(&state, &headers, &ctx).await?;
    let entity = state
        .services
        .entity
        .set_status(&caller, id, body.status)
        .await?;
    Ok(Json(entity))
}

#[utoipa::path(
    post,
    path = "/entities/{id}/members",
    params(("id" = Uuid, Path, description = "Entity id")),
    request_body = AddMemberRequest,
    responses(
        (status = 201, description = "Membership granted"),
        (status = 403, description = "No membership rights on the entity"),
        (status = 422, description = "User already a member")
    ),
    tag = "entities"
)]
pub async fn add_member(
    Extension(state): Extension<SharedState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<AddMemberRequest>,
) -> Result<impl IntoResponse> {
    let ctx = RequestContext::from_headers(&headers);
    let caller = require_session(&state, &headers, &ctx).await?;
    let membership = state
        .services
        .entity
        .add_member(&caller, id, body.user_id, body.role)
        .await?;
    Ok((StatusCode::CREATED, Json(membership)))
}

#[utoipa::path(
    patch,
    path = "/entities/{id}/members/{user_id}",
    params(
        ("id" = Uuid, Path, description = "Entity id"),
        ("user_id" = Uuid, Path, description = "Member user id")
    ),
    request_body = ChangeRoleRequest,
    responses(
        (status = 200, description = "Role updated"),
        (status = 403, description = "No membership rights on the entity"),
        (status = 404, description = "No direct membership for that user")
    ),
    tag = "entities"
)]
pub async fn change_member_role(
    Extension(state): Extension<SharedState>,
    headers: HeaderMap,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<ChangeRoleRequest>,
) -> Result<impl IntoResponse> {
    let ctx = RequestContext::from_headers(&headers);
    let caller = require_session(&state, &headers, &ctx).await?;
    let membership = state
        .services
        .entity
        .change_member_role(&caller, id, user_id, body.role)
        .await?;
    Ok(Json(membership))
}

#[utoipa::path(
    delete,
    path = "/entities/{id}/members/{user_id}",
    params(
        ("id" = Uuid, Path, description = "Entity id"),
        ("user_id" = Uuid, Path, description = "Member user id")
    ),
    responses(
        (status = 204, description = "Membership removed"),
        (status = 403, description = "No membership rights on the entity"),
        (status = 404, description = "No direct membership for that user")
    ),
    tag = "entities"
)]
pub async fn remove_member(
    Extension(state): Extension<SharedState>,
    headers: HeaderMap,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse> {
    let ctx = RequestContext::from_headers(&headers);
    let caller = require_session(&state, &headers, &ctx).await?;
    state
        .services
        .entity
        .remove_member(&caller, id, user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
