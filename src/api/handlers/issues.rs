use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use crate::api::{ApiResult, AppState, ListResponse};
use crate::common::Id;
use crate::store::model::{Issue, IssueComment, IssueStatus, Label};

#[derive(Debug, Deserialize)]
pub struct CreateIssueBody {
    pub tenant_id: Id,
    pub organization_id: Option<Id>,
    pub title: String,
    pub priority: u8,
    pub severity: u8,
    #[serde(default)]
    pub is_incident: bool,
}

pub async fn create_issue(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateIssueBody>,
) -> ApiResult<Json<Issue>> {
    let ctx = state.context(&headers)?;
    let issue = state.pipeline().create_issue(
        &ctx,
        body.tenant_id,
        body.organization_id,
        body.title,
        body.priority,
        body.severity,
        body.is_incident,
    )?;
    Ok(Json(issue))
}

#[derive(Debug, Deserialize)]
pub struct UpdateIssueBody {
    pub expected_revision: u64,
    pub status: Option<IssueStatus>,
    pub assignee_id: Option<Id>,
    pub priority: Option<u8>,
    pub severity: Option<u8>,
}

pub async fn update_issue(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Id>,
    Json(body): Json<UpdateIssueBody>,
) -> ApiResult<Json<Issue>> {
    let ctx = state.context(&headers)?;
    let issue = state.pipeline().update_issue(
        &ctx,
        id,
        body.expected_revision,
        body.status,
        body.assignee_id,
        body.priority,
        body.severity,
    )?;
    Ok(Json(issue))
}

pub async fn delete_issue(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Id>,
) -> ApiResult<axum::http::StatusCode> {
    let ctx = state.context(&headers)?;
    state.pipeline().delete_issue(&ctx, id)?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ListIssuesQuery {
    pub tenant_id: Id,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

pub async fn list_issues(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListIssuesQuery>,
) -> ApiResult<Json<ListResponse<Issue>>> {
    let ctx = state.context(&headers)?;
    let page = query.page.unwrap_or(1);
    let per_page = query.per_page.unwrap_or(state.config.page_size_default);
    let result = state.pipeline().list_issues(&ctx, query.tenant_id, page, per_page)?;
    Ok(Json(result.into()))
}

#[derive(Debug, Deserialize)]
pub struct CreateLabelBody {
    pub tenant_id: Id,
    pub name: String,
    pub color: String,
}

pub async fn create_label(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateLabelBody>,
) -> ApiResult<Json<Label>> {
    let ctx = state.context(&headers)?;
    let label = state.pipeline().create_label(&ctx, body.tenant_id, body.name, body.color)?;
    Ok(Json(label))
}

#[derive(Debug, Deserialize)]
pub struct ListLabelsQuery {
    pub tenant_id: Id,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

pub async fn list_labels(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListLabelsQuery>,
) -> ApiResult<Json<ListResponse<Label>>> {
    let ctx = state.context(&headers)?;
    let page = query.page.unwrap_or(1);
    let per_page = query.per_page.unwrap_or(state.config.page_size_default);
    let result = state.pipeline().list_labels(&ctx, query.tenant_id, page, per_page)?;
    Ok(Json(result.into()))
}

#[derive(Debug, Deserialize)]
pub struct AttachLabelBody {
    pub label_id: Id,
}

pub async fn attach_label(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Id>,
    Json(body): Json<AttachLabelBody>,
) -> ApiResult<Json<Issue>> {
    let ctx = state.context(&headers)?;
    let issue = state.pipeline().attach_label(&ctx, id, body.label_id)?;
    Ok(Json(issue))
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentBody {
    pub body: String,
}

pub async fn create_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Id>,
    Json(body): Json<CreateCommentBody>,
) -> ApiResult<Json<IssueComment>> {
    let ctx = state.context(&headers)?;
    let comment = state.pipeline().add_issue_comment(&ctx, id, body.body)?;
    Ok(Json(comment))
}

pub async fn list_comments(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Id>,
) -> ApiResult<Json<Vec<IssueComment>>> {
    let ctx = state.context(&headers)?;
    let comments = state.pipeline().list_issue_comments(&ctx, id)?;
    Ok(Json(comments))
}
