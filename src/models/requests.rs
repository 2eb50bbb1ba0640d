use serde::Deserialize;

use crate::replay::DataGroup;
use crate::store::{override_key, ElementOverride};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractRequest {
    /// Defaults to a name derived from the top frame's title and path.
    pub page_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    pub raw_selectors: Vec<String>,
}

/// Explicit instructions, or the saved plan for `domain` (the tab's own
/// host when absent) when `data_groups` is missing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryRequest {
    pub data_groups: Option<Vec<DataGroup>>,
    pub domain: Option<String>,
}

/// Pending edit for one descriptor, addressed either by its override key or
/// by context document plus selector.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideUpsertRequest {
    pub key: Option<String>,
    pub context_document: Option<String>,
    pub selector: Option<String>,
    pub edit: ElementOverride,
}

impl OverrideUpsertRequest {
    pub fn resolve_key(&self) -> Option<String> {
        if let Some(key) = self.key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            return Some(key.to_string());
        }
        let selector = self.selector.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let context = self
            .context_document
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(crate::frame::TOP_FRAME_MARKER);
        Some(override_key(context, selector))
    }
}

#[derive(Debug, Deserialize)]
pub struct AccessorRequest {
    pub selector: String,
}
