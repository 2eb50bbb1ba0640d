use axum::{extract::State, Json};
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::{GenericResponse, OverrideUpsertRequest, OverridesResponse};
use crate::store::ElementOverride;

use super::super::state::AppState;

pub async fn get_overrides(State(state): State<Arc<AppState>>) -> Result<Json<OverridesResponse>> {
    Ok(Json(OverridesResponse {
        overrides: state.store.overrides()?,
    }))
}

/// Merge an edit into the pending override for one descriptor
pub async fn upsert_override(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OverrideUpsertRequest>,
) -> Result<Json<ElementOverride>> {
    let key = request.resolve_key().ok_or_else(|| {
        AppError::ValidationError("either key or selector is required".to_string())
    })?;
    if request.edit.is_empty() {
        return Err(AppError::ValidationError("edit has no fields set".to_string()));
    }
    let merged = state.store.upsert_override(&key, request.edit)?;
    tracing::info!(key, "Override updated");
    Ok(Json(merged))
}

pub async fn clear_overrides(State(state): State<Arc<AppState>>) -> Result<Json<GenericResponse>> {
    state.store.clear_overrides()?;
    Ok(Json(GenericResponse::ok()))
}
