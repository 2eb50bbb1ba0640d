//! Messages exchanged between the coordinator and a frame agent.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::extract::{ElementDescriptor, LabelMode};
use crate::frame::FrameId;
use crate::replay::{DataGroup, ReplayResult};
use crate::store::PageRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrameRequest {
    Ping,
    AutoSelect,
    ManualModeOn,
    ManualModeOff,
    /// Toggles the element matched by `selector` in this frame.
    ToggleElement {
        selector: String,
    },
    Undo,
    Redo,
    ExtractPart,
    /// Accepted only by the top frame.
    #[serde(rename_all = "camelCase")]
    SaveExtraction {
        #[serde(default)]
        page_name: Option<String>,
        #[serde(default)]
        elements: Vec<ElementDescriptor>,
    },
    GetSelectedSummary,
    #[serde(rename_all = "camelCase")]
    ValidateRawSelectorsFrame {
        #[serde(default)]
        raw_selectors: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    RunEntry {
        #[serde(default)]
        data_groups: Vec<DataGroup>,
    },
    GetStats,
    ClearAll,
    SetLabelMode {
        #[serde(default, deserialize_with = "flexible_label_mode")]
        mode: LabelMode,
    },
}

impl FrameRequest {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ping => "PING",
            Self::AutoSelect => "AUTO_SELECT",
            Self::ManualModeOn => "MANUAL_MODE_ON",
            Self::ManualModeOff => "MANUAL_MODE_OFF",
            Self::ToggleElement { .. } => "TOGGLE_ELEMENT",
            Self::Undo => "UNDO",
            Self::Redo => "REDO",
            Self::ExtractPart => "EXTRACT_PART",
            Self::SaveExtraction { .. } => "SAVE_EXTRACTION",
            Self::GetSelectedSummary => "GET_SELECTED_SUMMARY",
            Self::ValidateRawSelectorsFrame { .. } => "VALIDATE_RAW_SELECTORS_FRAME",
            Self::RunEntry { .. } => "RUN_ENTRY",
            Self::GetStats => "GET_STATS",
            Self::ClearAll => "CLEAR_ALL",
            Self::SetLabelMode { .. } => "SET_LABEL_MODE",
        }
    }
}

/// Anything other than `"enhanced"` selects the original chain.
fn flexible_label_mode<'de, D>(deserializer: D) -> Result<LabelMode, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(match raw.as_deref().map(str::trim) {
        Some(mode) if mode.eq_ignore_ascii_case("enhanced") => LabelMode::Enhanced,
        _ => LabelMode::Original,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrameResponse {
    #[serde(rename_all = "camelCase")]
    Pong {
        frame_id: FrameId,
        url: String,
        is_top: bool,
    },
    /// Selection changed (or was left as is); carries the new count.
    #[serde(rename_all = "camelCase")]
    Selection {
        selected_count: usize,
    },
    #[serde(rename_all = "camelCase")]
    Extracted {
        frame_url: String,
        elements: Vec<ElementDescriptor>,
    },
    Saved {
        page: PageRecord,
        count: usize,
    },
    Summary(SelectionSummary),
    Validation {
        counts: BTreeMap<String, usize>,
    },
    Entry(ReplayResult),
    Stats(FrameStats),
    ModeChanged {
        mode: LabelMode,
    },
    Failed {
        error: String,
    },
}

impl FrameResponse {
    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryItem {
    pub label: String,
    #[serde(rename = "type")]
    pub element_type: String,
    pub selector: String,
    pub context_document: String,
    /// Matches of `selector` in the frame at summary time.
    pub matches: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionSummary {
    pub selected_count: usize,
    /// Keyed by lowercased element type.
    pub by_type: BTreeMap<String, usize>,
    pub items: Vec<SummaryItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameStats {
    pub frame_id: FrameId,
    pub url: String,
    pub is_top: bool,
    pub selected_count: usize,
    pub manual_mode: bool,
    pub extraction_count: u32,
    pub page_id: String,
    pub label_mode: LabelMode,
    pub can_undo: bool,
    pub can_redo: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_names() {
        let request: FrameRequest = serde_json::from_value(json!({
            "action": "VALIDATE_RAW_SELECTORS_FRAME",
            "rawSelectors": ["#email", "input["]
        }))
        .unwrap();
        assert_eq!(
            request,
            FrameRequest::ValidateRawSelectorsFrame {
                raw_selectors: vec!["#email".into(), "input[".into()]
            }
        );
        assert_eq!(request.name(), "VALIDATE_RAW_SELECTORS_FRAME");

        let entry: FrameRequest = serde_json::from_value(json!({
            "action": "RUN_ENTRY",
            "dataGroups": [{ "GroupName": "g", "Actions": [{ "TargetElement": "#a", "InputValue": "x" }] }]
        }))
        .unwrap();
        let FrameRequest::RunEntry { data_groups } = entry else {
            panic!("expected RUN_ENTRY");
        };
        assert_eq!(data_groups[0].actions[0].target_element, "#a");

        assert_eq!(
            serde_json::to_value(FrameRequest::ManualModeOn).unwrap(),
            json!({ "action": "MANUAL_MODE_ON" })
        );
    }

    #[test]
    fn test_label_mode_is_lenient() {
        for (raw, expected) in [
            (json!("enhanced"), LabelMode::Enhanced),
            (json!("fancy"), LabelMode::Original),
            (json!(null), LabelMode::Original),
        ] {
            let request: FrameRequest =
                serde_json::from_value(json!({ "action": "SET_LABEL_MODE", "mode": raw })).unwrap();
            assert_eq!(request, FrameRequest::SetLabelMode { mode: expected });
        }
    }

    #[test]
    fn test_failed_response_shape() {
        assert_eq!(
            serde_json::to_value(FrameResponse::failed("not the top frame")).unwrap(),
            json!({ "status": "FAILED", "error": "not the top frame" })
        );
    }
}
