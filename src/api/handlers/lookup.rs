use axum::extract::{Path, State};
use axum::Json;

use crate::api::{ApiResult, AppState};
use crate::village_id::VillageIdResolution;

/// `GET /api/v1/lookup/{village_id}`: resolves a Village-ID to its kind,
/// internal id and canonical path without redirecting — the JSON
/// counterpart to `GET /r/{village_id}` (`spec.md` §6).
pub async fn lookup(
    State(state): State<AppState>,
    Path(village_id): Path<String>,
) -> ApiResult<Json<VillageIdResolution>> {
    let resolution = state.pipeline().lookup_village_id(&village_id)?;
    Ok(Json(resolution))
}
