use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::api::{ApiResult, AppState};
use crate::common::Id;
use crate::oncall::{CurrentOnCall, OnCallSegment};
use crate::store::model::{OnCallRotation, OnCallScopeType, OnCallShift};

#[derive(Debug, Deserialize)]
pub struct CreateRotationBody {
    pub tenant_id: Id,
    pub scope_type: OnCallScopeType,
    pub scope_id: Id,
    pub priority: i32,
    pub shifts: Vec<OnCallShift>,
}

pub async fn create_rotation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateRotationBody>,
) -> ApiResult<Json<OnCallRotation>> {
    let ctx = state.context(&headers)?;
    let rotation = state.pipeline().create_oncall_rotation(
        &ctx,
        body.tenant_id,
        body.scope_type,
        body.scope_id,
        body.priority,
        body.shifts,
    )?;
    Ok(Json(rotation))
}

#[derive(Debug, Deserialize)]
pub struct CurrentQuery {
    pub scope_type: OnCallScopeType,
    pub scope_id: Id,
    pub instant: Option<DateTime<Utc>>,
}

pub async fn current(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CurrentQuery>,
) -> ApiResult<Json<Option<CurrentOnCall>>> {
    let ctx = state.context(&headers)?;
    let instant = query.instant.unwrap_or_else(Utc::now);
    let result = state
        .pipeline()
        .current_on_call(&ctx, query.scope_type, query.scope_id, instant)?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct TimelineQuery {
    pub scope_type: OnCallScopeType,
    pub scope_id: Id,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

pub async fn timeline(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TimelineQuery>,
) -> ApiResult<Json<Vec<OnCallSegment>>> {
    let ctx = state.context(&headers)?;
    let result = state
        .pipeline()
        .who_is_on_call_between(&ctx, query.scope_type, query.scope_id, query.from, query.to)?;
    Ok(Json(result))
}
