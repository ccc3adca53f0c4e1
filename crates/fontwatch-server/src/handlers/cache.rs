//! Bundle cache routes. Job consumers fetch bundles by the key in their
//! job and release them when done.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use fontwatch_core::CacheKey;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::AppError;
use crate::state::AppState;

/// MessagePack bundles.
const BUNDLE_CONTENT_TYPE: &str = "application/msgpack";

#[derive(Debug, Default, Deserialize)]
pub struct PurgeQuery {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    pub key: String,
    pub instances: u64,
}

/// Handler for GET /cache/{key}.
#[instrument(skip(state))]
pub async fn get_bundle(State(state): State<AppState>, Path(key): Path<String>) -> Result<Response, AppError> {
    let key = CacheKey::new(key);
    let bundle = state
        .cache()
        .get(&key)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("can't find key '{key}'")))?;
    Ok(([(header::CONTENT_TYPE, BUNDLE_CONTENT_TYPE)], bundle.as_ref().clone()).into_response())
}

/// Handler for DELETE /cache/{key}.
#[instrument(skip(state))]
pub async fn purge_bundle(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<PurgeQuery>,
) -> Result<Json<PurgeResponse>, AppError> {
    let cache_key = CacheKey::new(key.as_str());
    let instances = state.cache().purge(&cache_key, query.force).await?;
    Ok(Json(PurgeResponse { key, instances }))
}
