//! HTTP handlers for the user attribute admin screens and the public API
//! projection. Persistence is delegated to `AttributeService`; the acting
//! principal and client address come from proxy headers.

use crate::{
    admin::crud::{CrudPage, USER_ATTRIBUTE_CRUD},
    errors::AppError,
    handlers::extract::{JsonBody, PathParam, QueryParams},
    models::{
        user::User,
        user_attribute::{AdminView, ApiView, UserAttribute},
    },
    services::{
        attribute_service::{
            AttributeCriteria, AttributeField, AttributeSearch, AuditContext, Direction,
        },
        display::format_user_display,
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{FromRequestParts, State},
    http::{HeaderMap, StatusCode, request::Parts},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, convert::Infallible};
use uuid::Uuid;

const ACTOR_HEADER: &str = "x-remote-user";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
const REAL_IP_HEADER: &str = "x-real-ip";

impl<S> FromRequestParts<S> for AuditContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(audit_from_headers(&parts.headers))
    }
}

/// Actor from `x-remote-user`; IP from the first `x-forwarded-for` hop, else
/// `x-real-ip`.
fn audit_from_headers(headers: &HeaderMap) -> AuditContext {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let actor = header(ACTOR_HEADER).map(str::to_string);
    let ip = header(FORWARDED_FOR_HEADER)
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| header(REAL_IP_HEADER))
        .map(str::to_string);

    AuditContext::new(actor, ip)
}

/// Query params accepted by the admin listing.
#[derive(Debug, Deserialize, Default)]
pub struct ListQuery {
    /// Free-text search.
    pub q: Option<String>,
    pub user: Option<i64>,
    pub name: Option<String>,
    pub value: Option<String>,
    pub sort: Option<AttributeField>,
    pub direction: Option<Direction>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Create / edit form body.
#[derive(Debug, Deserialize)]
pub struct AttributePayload {
    pub user_id: i64,
    pub name: String,
    pub value: String,
    pub remark: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AttributeRow {
    #[serde(flatten)]
    pub attribute: AdminView,
    pub user_id: i64,
    pub user: String,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub title: &'static str,
    pub items: Vec<AttributeRow>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

#[derive(Debug, Serialize)]
pub struct AttributeDetail {
    pub title: &'static str,
    #[serde(flatten)]
    pub attribute: UserAttribute,
    pub user: String,
}

#[derive(Debug, Serialize)]
pub struct MutationResponse {
    pub message: String,
    pub attribute: AdminView,
}

/// GET `/admin/user/attribute` — search, filter, sort and page attributes.
pub async fn list_attributes(
    State(state): State<AppState>,
    QueryParams(q): QueryParams<ListQuery>,
) -> Result<Json<ListResponse>, AppError> {
    let order = match q.sort {
        Some(field) => vec![(field, q.direction.unwrap_or_default())],
        None => USER_ATTRIBUTE_CRUD.default_sort.to_vec(),
    };
    let defaults = AttributeSearch::default();
    let search = AttributeSearch {
        term: q.q,
        search_columns: USER_ATTRIBUTE_CRUD.search_columns(),
        user_id: q.user,
        name_contains: q.name,
        value_contains: q.value,
        order,
        page: q.page.unwrap_or(defaults.page),
        per_page: q.per_page.unwrap_or(defaults.per_page),
    };

    let page = state.attributes.search(&search).await?;

    let mut user_ids: Vec<i64> = page.items.iter().map(|a| a.user_id).collect();
    user_ids.sort_unstable();
    user_ids.dedup();
    let owners: HashMap<i64, User> = state
        .users
        .find_many(&user_ids)
        .await?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();

    let items = page
        .items
        .iter()
        .map(|attr| AttributeRow {
            attribute: attr.admin_view(),
            user_id: attr.user_id,
            user: format_user_display(owners.get(&attr.user_id)),
        })
        .collect();

    Ok(Json(ListResponse {
        title: USER_ATTRIBUTE_CRUD.page_title(CrudPage::Index),
        items,
        total: page.total,
        page: page.page,
        per_page: page.per_page,
    }))
}

/// GET `/admin/user/attribute/{id}` — detail page including audit columns.
pub async fn get_attribute(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<AttributeDetail>, AppError> {
    let attribute = find_attribute(&state, id).await?;
    let owner = state.users.find_by_id(attribute.user_id).await?;

    Ok(Json(AttributeDetail {
        title: USER_ATTRIBUTE_CRUD.page_title(CrudPage::Detail),
        user: format_user_display(owner.as_ref()),
        attribute,
    }))
}

/// POST `/admin/user/attribute` — create.
pub async fn create_attribute(
    State(state): State<AppState>,
    audit: AuditContext,
    JsonBody(payload): JsonBody<AttributePayload>,
) -> Result<impl IntoResponse, AppError> {
    let mut attribute = UserAttribute::new(payload.user_id, payload.name, payload.value);
    attribute.remark = payload.remark;

    state.attributes.save(&mut attribute, &audit).await?;
    tracing::info!("created {} for user {}", attribute, attribute.user_id);

    Ok((
        StatusCode::CREATED,
        Json(MutationResponse {
            message: format!("User attribute \"{}\" created", attribute.name),
            attribute: attribute.admin_view(),
        }),
    ))
}

/// PUT `/admin/user/attribute/{id}` — edit.
pub async fn update_attribute(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
    audit: AuditContext,
    JsonBody(payload): JsonBody<AttributePayload>,
) -> Result<Json<MutationResponse>, AppError> {
    let mut attribute = find_attribute(&state, id).await?;
    attribute.user_id = payload.user_id;
    attribute.name = payload.name;
    attribute.value = payload.value;
    attribute.remark = payload.remark;

    state.attributes.save(&mut attribute, &audit).await?;

    Ok(Json(MutationResponse {
        message: format!("User attribute \"{}\" updated", attribute.name),
        attribute: attribute.admin_view(),
    }))
}

/// DELETE `/admin/user/attribute/{id}` — delete.
pub async fn delete_attribute(
    State(state): State<AppState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<MutationResponse>, AppError> {
    let attribute = find_attribute(&state, id).await?;
    state.attributes.remove(&attribute).await?;

    Ok(Json(MutationResponse {
        message: format!("User attribute \"{}\" deleted", attribute.name),
        attribute: attribute.admin_view(),
    }))
}

/// GET `/api/users/{user_id}/attributes` — narrow projection, sorted by name.
pub async fn list_user_attributes(
    State(state): State<AppState>,
    PathParam(user_id): PathParam<i64>,
) -> Result<Json<Vec<ApiView>>, AppError> {
    if state.users.find_by_id(user_id).await?.is_none() {
        return Err(AppError::not_found(format!("user {} not found", user_id)));
    }

    let attributes = state
        .attributes
        .find_by(
            &AttributeCriteria::user(user_id),
            &[(AttributeField::Name, Direction::Asc)],
        )
        .await?;

    Ok(Json(attributes.iter().map(UserAttribute::api_view).collect()))
}

async fn find_attribute(state: &AppState, id: Uuid) -> Result<UserAttribute, AppError> {
    state
        .attributes
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("attribute `{}` not found", id)))
}
