//! Source service routes.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use crate::error::AppError;
use crate::service::{FamilySummary, SourceService, is_valid_target};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PokeRequest {
    /// Empty pokes every source.
    #[serde(default)]
    pub source_id: String,
    #[serde(default)]
    pub force: bool,
    /// Answer only after the passes settled.
    #[serde(default)]
    pub wait: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PokeAccepted {
    pub scheduled: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyList {
    pub source_id: String,
    pub families: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct DelayedRequest {
    pub target: String,
}

#[derive(Debug, Serialize)]
pub struct DelayedAccepted {
    pub target: String,
}

/// Handler for POST /sources/poke.
#[instrument(skip_all, fields(source = %request.source_id, force = request.force))]
pub async fn poke(State(state): State<AppState>, Json(request): Json<PokeRequest>) -> Result<Response, AppError> {
    let pending = state.service().poke(&request.source_id, request.force)?;
    let scheduled: Vec<String> = pending.iter().map(|(id, _)| id.clone()).collect();

    if request.wait {
        let reports = SourceService::settle(pending).await;
        return Ok(Json(reports).into_response());
    }

    tokio::spawn(SourceService::settle(pending));
    Ok((StatusCode::ACCEPTED, Json(PokeAccepted { scheduled })).into_response())
}

/// Handler for GET /sources/{source}/families.
#[instrument(skip(state))]
pub async fn list_families(
    State(state): State<AppState>,
    Path(source): Path<String>,
) -> Result<Json<FamilyList>, AppError> {
    let families = state.service().list(&source).await?;
    Ok(Json(FamilyList {
        source_id: source,
        families,
    }))
}

/// Handler for GET /sources/{source}/families/{family}.
#[instrument(skip(state))]
pub async fn get_family(
    State(state): State<AppState>,
    Path((source, family)): Path<(String, String)>,
) -> Result<Json<FamilySummary>, AppError> {
    let family = state.service().get(&source, &family).await?;
    Ok(Json(FamilySummary::from(&family)))
}

/// Handler for GET /sources/{source}/families/{family}/details.
#[instrument(skip(state))]
pub async fn family_details(
    State(state): State<AppState>,
    Path((source, family)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(state.service().source_details(&source, &family).await?))
}

/// Handler for POST /sources/{source}/families/{family}/delayed.
#[instrument(skip(state, request), fields(target = %request.target))]
pub async fn get_delayed(
    State(state): State<AppState>,
    Path((source, family)): Path<(String, String)>,
    Json(request): Json<DelayedRequest>,
) -> Result<(StatusCode, Json<DelayedAccepted>), AppError> {
    if !is_valid_target(&request.target) {
        return Err(AppError::BadRequest(format!("invalid reply target '{}'", request.target)));
    }
    state.service().get_delayed(&source, &family, &request.target)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(DelayedAccepted {
            target: request.target,
        }),
    ))
}
