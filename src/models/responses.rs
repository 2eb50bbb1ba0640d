use serde::Serialize;
use std::collections::BTreeMap;

use crate::agent::FrameStats;
use crate::coordinator::TabId;
use crate::store::{ElementOverride, PageRecord};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabStatsResponse {
    pub tab_id: TabId,
    pub frames: Vec<FrameStats>,
    pub selected_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractResponse {
    pub page_id: String,
    pub page_name: String,
    pub count: usize,
    pub page: PageRecord,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub counts: BTreeMap<String, usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyResponse {
    pub applied: usize,
    pub page: PageRecord,
}

#[derive(Debug, Serialize)]
pub struct OverridesResponse {
    pub overrides: BTreeMap<String, ElementOverride>,
}

#[derive(Debug, Serialize)]
pub struct AccessorsResponse {
    pub accessors: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct GenericResponse {
    pub status: String,
}

impl GenericResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}
