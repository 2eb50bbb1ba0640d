use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::dom::SelectorList;
use crate::error::{AppError, Result};
use crate::models::{AccessorRequest, AccessorsResponse, GenericResponse};
use crate::replay::SelectorAlias;

use super::super::state::AppState;

pub async fn list_accessors(State(state): State<Arc<AppState>>) -> Json<AccessorsResponse> {
    Json(AccessorsResponse {
        accessors: state.accessors.names(),
    })
}

/// Register `name()` as an alias for a fixed selector
pub async fn put_accessor(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(request): Json<AccessorRequest>,
) -> Result<Json<GenericResponse>> {
    SelectorList::parse(&request.selector)
        .map_err(|e| AppError::ValidationError(e.to_string()))?;
    if !state
        .accessors
        .register(&name, SelectorAlias::new(request.selector))
    {
        return Err(AppError::ValidationError(format!(
            "invalid accessor name: {name}"
        )));
    }
    Ok(Json(GenericResponse::ok()))
}

pub async fn delete_accessor(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<GenericResponse>> {
    if !state.accessors.unregister(&name) {
        return Err(AppError::ValidationError(format!("unknown accessor: {name}")));
    }
    Ok(Json(GenericResponse::ok()))
}
