use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use crate::api::{AppState, ApiResult, ListResponse};
use crate::common::Id;
use crate::store::model::{Organization, OrganizationType, Tenant};

#[derive(Debug, Deserialize)]
pub struct CreateTenantBody {
    pub name: String,
}

pub async fn create_tenant(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateTenantBody>,
) -> ApiResult<Json<Tenant>> {
    let ctx = state.context(&headers)?;
    let tenant = state.pipeline().create_tenant(&ctx, body.name)?;
    Ok(Json(tenant))
}

#[derive(Debug, Deserialize)]
pub struct CreateOrganizationBody {
    pub tenant_id: Id,
    pub parent_id: Option<Id>,
    pub name: String,
    pub org_type: OrganizationType,
}

pub async fn create_organization(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateOrganizationBody>,
) -> ApiResult<Json<Organization>> {
    let ctx = state.context(&headers)?;
    let org = state
        .pipeline()
        .create_organization(&ctx, body.tenant_id, body.parent_id, body.name, body.org_type)?;
    Ok(Json(org))
}

#[derive(Debug, Deserialize)]
pub struct ListOrganizationsQuery {
    pub tenant_id: Id,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

pub async fn list_organizations(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListOrganizationsQuery>,
) -> ApiResult<Json<ListResponse<Organization>>> {
    let ctx = state.context(&headers)?;
    let page = query.page.unwrap_or(1);
    let per_page = query.per_page.unwrap_or(state.config.page_size_default);
    let result = state
        .pipeline()
        .list_organizations(&ctx, query.tenant_id, page, per_page)?;
    Ok(Json(result.into()))
}

pub async fn get_organization(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Id>,
) -> ApiResult<Json<Organization>> {
    let ctx = state.context(&headers)?;
    let org = state.pipeline().get_organization(&ctx, id)?;
    Ok(Json(org))
}

#[derive(Debug, Deserialize)]
pub struct DeleteOrganizationQuery {
    #[serde(default)]
    pub cascade: bool,
}

pub async fn delete_organization(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Id>,
    Query(query): Query<DeleteOrganizationQuery>,
) -> ApiResult<axum::http::StatusCode> {
    let ctx = state.context(&headers)?;
    state.pipeline().delete_organization(&ctx, id, query.cascade)?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ReparentOrganizationBody {
    pub expected_revision: u64,
    pub new_parent_id: Id,
}

pub async fn reparent_organization(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Id>,
    Json(body): Json<ReparentOrganizationBody>,
) -> ApiResult<Json<Organization>> {
    let ctx = state.context(&headers)?;
    let org = state
        .pipeline()
        .reparent_organization(&ctx, id, body.expected_revision, body.new_parent_id)?;
    Ok(Json(org))
}
