use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::api::{ApiResult, AppState};
use crate::audit::AuditFilter;
use crate::common::Id;
use crate::store::model::AuditRecord;

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub principal_id: Option<Id>,
    pub resource_type: Option<String>,
    pub resource_id: Option<Id>,
    pub action: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

pub async fn query(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Json<Vec<AuditRecord>>> {
    let ctx = state.context(&headers)?;
    let filter = AuditFilter {
        principal_id: query.principal_id,
        resource_type: query.resource_type,
        resource_id: query.resource_id,
        action: query.action,
        since: query.since,
        until: query.until,
    };
    let records = state.pipeline().query_audit_log(&ctx, &filter)?;
    Ok(Json(records))
}
