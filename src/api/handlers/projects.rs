//! Milestones and projects: thin CRUD secondary resources (`spec.md` §6)
//! backed by the same generic pipeline methods every other resource uses —
//! no bespoke algorithm, per `spec.md` §1's Non-goal against bespoke
//! treatment of secondary tables.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use crate::api::{ApiResult, AppState, ListResponse};
use crate::common::Id;
use crate::store::model::{Milestone, MilestoneStatus, Project};

#[derive(Debug, Deserialize)]
pub struct CreateMilestoneBody {
    pub tenant_id: Id,
    pub organization_id: Id,
    pub name: String,
    pub due_date: Option<chrono::DateTime<chrono::Utc>>,
}

pub async fn create_milestone(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateMilestoneBody>,
) -> ApiResult<Json<Milestone>> {
    let ctx = state.context(&headers)?;
    let milestone = state
        .pipeline()
        .create_milestone(&ctx, body.tenant_id, body.organization_id, body.name, body.due_date)?;
    Ok(Json(milestone))
}

#[derive(Debug, Deserialize)]
pub struct UpdateMilestoneBody {
    pub expected_revision: u64,
    pub name: Option<String>,
    pub status: Option<MilestoneStatus>,
}

pub async fn update_milestone(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Id>,
    Json(body): Json<UpdateMilestoneBody>,
) -> ApiResult<Json<Milestone>> {
    let ctx = state.context(&headers)?;
    let milestone = state
        .pipeline()
        .update_milestone(&ctx, id, body.expected_revision, body.name, body.status)?;
    Ok(Json(milestone))
}

pub async fn delete_milestone(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Id>,
) -> ApiResult<axum::http::StatusCode> {
    let ctx = state.context(&headers)?;
    state.pipeline().delete_milestone(&ctx, id)?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ListMilestonesQuery {
    pub tenant_id: Id,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

pub async fn list_milestones(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListMilestonesQuery>,
) -> ApiResult<Json<ListResponse<Milestone>>> {
    let ctx = state.context(&headers)?;
    let page = query.page.unwrap_or(1);
    let per_page = query.per_page.unwrap_or(state.config.page_size_default);
    let result = state.pipeline().list_milestones(&ctx, query.tenant_id, page, per_page)?;
    Ok(Json(result.into()))
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectBody {
    pub tenant_id: Id,
    pub organization_id: Id,
    pub name: String,
}

pub async fn create_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateProjectBody>,
) -> ApiResult<Json<Project>> {
    let ctx = state.context(&headers)?;
    let project = state
        .pipeline()
        .create_project(&ctx, body.tenant_id, body.organization_id, body.name)?;
    Ok(Json(project))
}

#[derive(Debug, Deserialize)]
pub struct UpdateProjectBody {
    pub expected_revision: u64,
    pub name: Option<String>,
    pub status: Option<MilestoneStatus>,
}

pub async fn update_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Id>,
    Json(body): Json<UpdateProjectBody>,
) -> ApiResult<Json<Project>> {
    let ctx = state.context(&headers)?;
    let project = state
        .pipeline()
        .update_project(&ctx, id, body.expected_revision, body.name, body.status)?;
    Ok(Json(project))
}

pub async fn delete_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Id>,
) -> ApiResult<axum::http::StatusCode> {
    let ctx = state.context(&headers)?;
    state.pipeline().delete_project(&ctx, id)?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ListProjectsQuery {
    pub tenant_id: Id,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

pub async fn list_projects(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListProjectsQuery>,
) -> ApiResult<Json<ListResponse<Project>>> {
    let ctx = state.context(&headers)?;
    let page = query.page.unwrap_or(1);
    let per_page = query.per_page.unwrap_or(state.config.page_size_default);
    let result = state.pipeline().list_projects(&ctx, query.tenant_id, page, per_page)?;
    Ok(Json(result.into()))
}
