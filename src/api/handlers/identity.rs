use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use crate::api::{ApiResult, AppState};
use crate::common::Id;
use crate::store::model::{Identity, IdentityType, ResourceRole, Role, ScopeType};

#[derive(Debug, Deserialize)]
pub struct CreateIdentityBody {
    pub tenant_id: Id,
    pub username: String,
    pub email: String,
    pub identity_type: IdentityType,
    pub auth_provider: String,
}

pub async fn create_identity(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateIdentityBody>,
) -> ApiResult<Json<Identity>> {
    let ctx = state.context(&headers)?;
    let identity = state.pipeline().create_identity(
        &ctx,
        body.tenant_id,
        body.username,
        body.email,
        body.identity_type,
        body.auth_provider,
    )?;
    Ok(Json(identity))
}

#[derive(Debug, Deserialize)]
pub struct GrantResourceRoleBody {
    pub tenant_id: Id,
    pub identity_id: Id,
    pub scope_type: ScopeType,
    pub scope_id: Id,
    pub role: Role,
}

pub async fn grant_resource_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<GrantResourceRoleBody>,
) -> ApiResult<Json<ResourceRole>> {
    let ctx = state.context(&headers)?;
    let grant = state.pipeline().grant_resource_role(
        &ctx,
        body.tenant_id,
        body.identity_id,
        body.scope_type,
        body.scope_id,
        body.role,
    )?;
    Ok(Json(grant))
}
