use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::agent::{FrameRequest, SelectionSummary};
use crate::coordinator::{FrameReply, TabId};
use crate::error::{AppError, Result};
use crate::host::{PageSpec, TabOverview};
use crate::models::{
    EntryRequest, ExtractRequest, ExtractResponse, GenericResponse, TabStatsResponse,
    ValidateRequest, ValidateResponse,
};
use crate::replay::ReplayResult;

use super::super::state::{AppState, WsEvent};

fn ensure_tab(state: &AppState, tab_id: TabId) -> Result<()> {
    if state.tabs.tab(tab_id).is_some() {
        Ok(())
    } else {
        Err(AppError::TabNotFound(tab_id))
    }
}

/// Open a page (and its frames) as a new tab
pub async fn open_tab(
    State(state): State<Arc<AppState>>,
    Json(spec): Json<PageSpec>,
) -> Result<Json<TabOverview>> {
    let tab = state.tabs.open(&spec)?;
    Ok(Json(tab))
}

pub async fn list_tabs(State(state): State<Arc<AppState>>) -> Json<Vec<TabOverview>> {
    Json(state.tabs.tabs())
}

pub async fn get_frames(
    State(state): State<Arc<AppState>>,
    Path(tab_id): Path<TabId>,
) -> Result<Json<TabOverview>> {
    state
        .tabs
        .tab(tab_id)
        .map(Json)
        .ok_or(AppError::TabNotFound(tab_id))
}

pub async fn close_tab(
    State(state): State<Arc<AppState>>,
    Path(tab_id): Path<TabId>,
) -> Result<Json<GenericResponse>> {
    if !state.tabs.close(tab_id) {
        return Err(AppError::TabNotFound(tab_id));
    }
    Ok(Json(GenericResponse::ok()))
}

/// Send one raw frame request to every frame of the tab
pub async fn broadcast_request(
    State(state): State<Arc<AppState>>,
    Path(tab_id): Path<TabId>,
    Json(request): Json<FrameRequest>,
) -> Result<Json<Vec<FrameReply>>> {
    ensure_tab(&state, tab_id)?;
    Ok(Json(state.coordinator().broadcast(tab_id, request).await))
}

pub async fn auto_select(
    State(state): State<Arc<AppState>>,
    Path(tab_id): Path<TabId>,
) -> Result<Json<SelectionSummary>> {
    ensure_tab(&state, tab_id)?;
    state
        .coordinator()
        .broadcast(tab_id, FrameRequest::AutoSelect)
        .await;
    Ok(Json(state.coordinator().summary(tab_id).await))
}

pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    Path(tab_id): Path<TabId>,
) -> Result<Json<TabStatsResponse>> {
    ensure_tab(&state, tab_id)?;
    let frames = state.coordinator().stats(tab_id).await;
    let selected_count = frames.iter().map(|f| f.selected_count).sum();
    Ok(Json(TabStatsResponse {
        tab_id,
        frames,
        selected_count,
    }))
}

pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    Path(tab_id): Path<TabId>,
) -> Result<Json<SelectionSummary>> {
    ensure_tab(&state, tab_id)?;
    Ok(Json(state.coordinator().summary(tab_id).await))
}

/// Extract every frame's selection and save it as one page record
pub async fn extract(
    State(state): State<Arc<AppState>>,
    Path(tab_id): Path<TabId>,
    body: Option<Json<ExtractRequest>>,
) -> Result<Json<ExtractResponse>> {
    ensure_tab(&state, tab_id)?;
    let request = body.map(|Json(request)| request).unwrap_or_default();

    let outcome = match state.coordinator().extract_all(tab_id, request.page_name).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(tab_id, "Extraction failed: {}", e);
            state.broadcast(WsEvent::Error {
                tab_id,
                error: e.to_string(),
            });
            return Err(e.into());
        }
    };

    state.broadcast(WsEvent::ExtractionSaved {
        tab_id,
        page_id: outcome.page.page_id.clone(),
        page_name: outcome.page.page_name.clone(),
        count: outcome.count,
    });

    Ok(Json(ExtractResponse {
        page_id: outcome.page.page_id.clone(),
        page_name: outcome.page.page_name.clone(),
        count: outcome.count,
        page: outcome.page,
    }))
}

pub async fn validate(
    State(state): State<Arc<AppState>>,
    Path(tab_id): Path<TabId>,
    Json(request): Json<ValidateRequest>,
) -> Result<Json<ValidateResponse>> {
    ensure_tab(&state, tab_id)?;
    let counts = state
        .coordinator()
        .validate_all(tab_id, request.raw_selectors)
        .await;
    Ok(Json(ValidateResponse { counts }))
}

/// Replay entry instructions across the tab's frames
pub async fn run_entry(
    State(state): State<Arc<AppState>>,
    Path(tab_id): Path<TabId>,
    body: Option<Json<EntryRequest>>,
) -> Result<Json<ReplayResult>> {
    ensure_tab(&state, tab_id)?;
    let request = body.map(|Json(request)| request).unwrap_or_default();

    let result = match request.data_groups {
        Some(groups) => state.coordinator().run_entry_all(tab_id, groups).await,
        None => state
            .coordinator()
            .run_saved_entry(tab_id, request.domain)
            .await
            .inspect_err(|e| {
                state.broadcast(WsEvent::Error {
                    tab_id,
                    error: e.to_string(),
                })
            })?,
    };

    state.broadcast(WsEvent::EntryCompleted { tab_id, result });
    Ok(Json(result))
}
