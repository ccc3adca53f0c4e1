//! Family review process routes.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use fontwatch_core::SourceError;
use fontwatch_process::{Prompt, Step};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub ticket: String,
    pub callback: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessView {
    pub process_id: String,
    pub state: Value,
    pub prompt: Option<Prompt>,
}

/// Handler for POST /processes.
#[instrument(skip_all)]
pub async fn create_process(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<Step>), AppError> {
    if let Some(source) = payload["sourceId"].as_str()
        && !state.service().source_ids().iter().any(|id| id == source)
    {
        return Err(SourceError::UnknownSource(source.to_string()).into());
    }

    let step = state.reviews().init(payload).await?;
    Ok((StatusCode::CREATED, Json(step)))
}

/// Handler for GET /processes/{id}.
#[instrument(skip(state))]
pub async fn get_process(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<ProcessView>, AppError> {
    let process_state = state.reviews().state(&id).await?;
    let prompt = state.reviews().prompt(&id).await?;
    Ok(Json(ProcessView {
        process_id: id,
        state: process_state,
        prompt,
    }))
}

/// Handler for POST /processes/{id}/execute.
#[instrument(skip(state, request), fields(callback = %request.callback))]
pub async fn execute(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<Step>, AppError> {
    let step = state
        .reviews()
        .execute(&id, &request.ticket, &request.callback, request.payload)
        .await?;
    Ok(Json(step))
}
