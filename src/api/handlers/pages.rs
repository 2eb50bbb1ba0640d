use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::{ApplyResponse, GenericResponse};
use crate::store::PageRecord;

use super::super::state::AppState;

/// List saved pages, most recently updated first
pub async fn list_pages(State(state): State<Arc<AppState>>) -> Result<Json<Vec<PageRecord>>> {
    let pages = state.store.list_pages().map_err(|e| {
        tracing::error!("Failed to list pages: {}", e);
        AppError::Internal(e)
    })?;
    Ok(Json(pages))
}

pub async fn get_page(
    State(state): State<Arc<AppState>>,
    Path(page_id): Path<String>,
) -> Result<Json<PageRecord>> {
    state
        .store
        .get_page(&page_id)?
        .map(Json)
        .ok_or(AppError::PageNotFound(page_id))
}

pub async fn delete_page(
    State(state): State<Arc<AppState>>,
    Path(page_id): Path<String>,
) -> Result<Json<GenericResponse>> {
    if !state.store.delete_page(&page_id)? {
        return Err(AppError::PageNotFound(page_id));
    }
    tracing::info!(page_id, "Page deleted");
    Ok(Json(GenericResponse::ok()))
}

/// Fold pending overrides into a saved page
pub async fn apply_changes(
    State(state): State<Arc<AppState>>,
    Path(page_id): Path<String>,
) -> Result<Json<ApplyResponse>> {
    let outcome = state
        .store
        .apply_changes(&page_id)?
        .ok_or(AppError::PageNotFound(page_id))?;
    Ok(Json(ApplyResponse {
        applied: outcome.applied,
        page: outcome.page,
    }))
}
