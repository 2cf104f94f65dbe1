use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use crate::api::{ApiResult, AppState};
use crate::common::Id;
use crate::graph::{AnalyzeResult, Direction, ImpactNode, NetworkTopology};
use crate::store::model::DependencyType;

#[derive(Debug, Deserialize)]
pub struct ImpactQuery {
    pub entity_id: Id,
    #[serde(default = "default_direction")]
    pub direction: Direction,
    pub max_depth: u32,
}

fn default_direction() -> Direction {
    Direction::Downstream
}

pub async fn impact(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ImpactQuery>,
) -> ApiResult<Json<Vec<ImpactNode>>> {
    let ctx = state.context(&headers)?;
    let result = state
        .pipeline()
        .graph_impact(&ctx, query.entity_id, query.direction, query.max_depth)?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    pub source_entity_id: Id,
    pub target_entity_id: Id,
    pub edge_types: Option<Vec<DependencyType>>,
}

pub async fn path(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PathQuery>,
) -> ApiResult<Json<Option<Vec<Id>>>> {
    let ctx = state.context(&headers)?;
    let result = state.pipeline().graph_path(
        &ctx,
        query.source_entity_id,
        query.target_entity_id,
        query.edge_types,
    )?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeQuery {
    pub tenant_id: Id,
    pub organization_id: Option<Id>,
}

pub async fn analyze(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AnalyzeQuery>,
) -> ApiResult<Json<AnalyzeResult>> {
    let ctx = state.context(&headers)?;
    let result = state
        .pipeline()
        .graph_analyze(&ctx, query.tenant_id, query.organization_id)?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct NetworkTopologyQuery {
    pub tenant_id: Id,
    pub organization_id: Id,
    #[serde(default)]
    pub include_children: bool,
}

pub async fn network_topology(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<NetworkTopologyQuery>,
) -> ApiResult<Json<NetworkTopology>> {
    let ctx = state.context(&headers)?;
    let result = state.pipeline().network_topology(
        &ctx,
        query.tenant_id,
        query.organization_id,
        query.include_children,
    )?;
    Ok(Json(result))
}
