use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use crate::api::{ApiResult, AppState};
use crate::common::Id;
use crate::store::model::{AccessRequest, ApprovalDecision, ApprovalMode, Group, GroupProvider};

#[derive(Debug, Deserialize)]
pub struct CreateGroupBody {
    pub tenant_id: Id,
    pub name: String,
    pub owner_identity_id: Id,
    pub approval_mode: ApprovalMode,
    #[serde(default)]
    pub approval_threshold: u32,
    pub provider: GroupProvider,
    #[serde(default)]
    pub sync_enabled: bool,
}

pub async fn create_group(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateGroupBody>,
) -> ApiResult<Json<Group>> {
    let ctx = state.context(&headers)?;
    let group = state.pipeline().create_group(
        &ctx,
        body.tenant_id,
        body.name,
        body.owner_identity_id,
        body.approval_mode,
        body.approval_threshold,
        body.provider,
        body.sync_enabled,
    )?;
    Ok(Json(group))
}

#[derive(Debug, Deserialize)]
pub struct SubmitAccessRequestBody {
    pub reason: String,
}

pub async fn submit_access_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(group_id): Path<Id>,
    Json(body): Json<SubmitAccessRequestBody>,
) -> ApiResult<Json<AccessRequest>> {
    let ctx = state.context(&headers)?;
    let request = state.pipeline().submit_access_request(&ctx, group_id, body.reason)?;
    Ok(Json(request))
}

#[derive(Debug, Deserialize)]
pub struct DecideAccessRequestBody {
    pub expected_revision: u64,
    pub decision: ApprovalDecision,
}

pub async fn decide_access_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(request_id): Path<Id>,
    Json(body): Json<DecideAccessRequestBody>,
) -> ApiResult<Json<AccessRequest>> {
    let ctx = state.context(&headers)?;
    let request = state
        .pipeline()
        .decide_access_request(&ctx, request_id, body.expected_revision, body.decision)?;
    Ok(Json(request))
}
