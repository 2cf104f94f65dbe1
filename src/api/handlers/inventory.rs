use std::collections::{HashMap, HashSet};

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use crate::api::{ApiResult, AppState, ListResponse};
use crate::common::{Id, Value};
use crate::store::model::{Dependency, DependencyType, Entity, EntityType};

#[derive(Debug, Deserialize)]
pub struct CreateEntityBody {
    pub tenant_id: Id,
    pub organization_id: Id,
    pub entity_type: EntityType,
    pub name: String,
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
    #[serde(default)]
    pub tags: HashSet<String>,
}

pub async fn create_entity(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateEntityBody>,
) -> ApiResult<Json<Entity>> {
    let ctx = state.context(&headers)?;
    let entity = state.pipeline().create_entity(
        &ctx,
        body.tenant_id,
        body.organization_id,
        body.entity_type,
        body.name,
        body.attributes,
        body.tags,
    )?;
    Ok(Json(entity))
}

pub async fn get_entity(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Id>,
) -> ApiResult<Json<Entity>> {
    let ctx = state.context(&headers)?;
    let entity = state.pipeline().get_entity(&ctx, id)?;
    Ok(Json(entity))
}

#[derive(Debug, Deserialize)]
pub struct ListEntitiesQuery {
    pub tenant_id: Id,
    pub organization_id: Option<Id>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

pub async fn list_entities(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListEntitiesQuery>,
) -> ApiResult<Json<ListResponse<Entity>>> {
    let ctx = state.context(&headers)?;
    let page = query.page.unwrap_or(1);
    let per_page = query.per_page.unwrap_or(state.config.page_size_default);
    let result =
        state
            .pipeline()
            .list_entities(&ctx, query.tenant_id, query.organization_id, page, per_page)?;
    Ok(Json(result.into()))
}

#[derive(Debug, Deserialize)]
pub struct UpdateEntityBody {
    pub expected_revision: u64,
    pub name: Option<String>,
    pub attributes: Option<HashMap<String, Value>>,
    pub tags: Option<HashSet<String>>,
    pub is_active: Option<bool>,
}

pub async fn update_entity(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Id>,
    Json(body): Json<UpdateEntityBody>,
) -> ApiResult<Json<Entity>> {
    let ctx = state.context(&headers)?;
    let entity = state.pipeline().update_entity(
        &ctx,
        id,
        body.expected_revision,
        body.name,
        body.attributes,
        body.tags,
        body.is_active,
    )?;
    Ok(Json(entity))
}

#[derive(Debug, Deserialize)]
pub struct DeleteEntityQuery {
    #[serde(default)]
    pub cascade: bool,
}

pub async fn delete_entity(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Id>,
    Query(query): Query<DeleteEntityQuery>,
) -> ApiResult<axum::http::StatusCode> {
    let ctx = state.context(&headers)?;
    state.pipeline().delete_entity(&ctx, id, query.cascade)?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct CreateDependencyBody {
    pub source_entity_id: Id,
    pub target_entity_id: Id,
    pub dependency_type: DependencyType,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

pub async fn create_dependency(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateDependencyBody>,
) -> ApiResult<Json<Dependency>> {
    let ctx = state.context(&headers)?;
    let dependency = state.pipeline().create_dependency(
        &ctx,
        body.source_entity_id,
        body.target_entity_id,
        body.dependency_type,
        body.metadata,
    )?;
    Ok(Json(dependency))
}

pub async fn get_dependency(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Id>,
) -> ApiResult<Json<Dependency>> {
    let ctx = state.context(&headers)?;
    let dependency = state.pipeline().get_dependency(&ctx, id)?;
    Ok(Json(dependency))
}

#[derive(Debug, Deserialize)]
pub struct ListDependenciesQuery {
    pub tenant_id: Id,
    pub entity_id: Option<Id>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

pub async fn list_dependencies(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListDependenciesQuery>,
) -> ApiResult<Json<ListResponse<Dependency>>> {
    let ctx = state.context(&headers)?;
    let page = query.page.unwrap_or(1);
    let per_page = query.per_page.unwrap_or(state.config.page_size_default);
    let result =
        state
            .pipeline()
            .list_dependencies(&ctx, query.tenant_id, query.entity_id, page, per_page)?;
    Ok(Json(result.into()))
}

pub async fn delete_dependency(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Id>,
) -> ApiResult<axum::http::StatusCode> {
    let ctx = state.context(&headers)?;
    state.pipeline().delete_dependency(&ctx, id)?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
