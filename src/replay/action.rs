use serde::{Deserialize, Deserializer, Serialize};
use std::ops::AddAssign;

use crate::frame::TOP_FRAME_MARKER;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    #[default]
    Input,
    Select,
    Checkbox,
    RadioButton,
    Button,
}

impl ActionType {
    /// Maps a descriptor type such as `input[radio]` (or an action kind
    /// name) to the action that fills it. Radio is checked before button.
    pub fn from_element_type(element_type: &str) -> Self {
        let kind = element_type.to_ascii_lowercase();
        if kind.contains("radio") {
            Self::RadioButton
        } else if kind.contains("checkbox") {
            Self::Checkbox
        } else if kind.contains("select") {
            Self::Select
        } else if kind.contains("button") || kind.contains("submit") {
            Self::Button
        } else {
            Self::Input
        }
    }

    /// Exact action kind names only; anything else is `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "Input" => Some(Self::Input),
            "Select" => Some(Self::Select),
            "Checkbox" => Some(Self::Checkbox),
            "RadioButton" => Some(Self::RadioButton),
            "Button" => Some(Self::Button),
            _ => None,
        }
    }
}

fn top_frame_marker() -> String {
    TOP_FRAME_MARKER.to_string()
}

/// One entry instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Action {
    pub target_element: String,
    #[serde(default = "top_frame_marker")]
    pub context_document: String,
    #[serde(default, deserialize_with = "flexible_action_type")]
    pub action_type: ActionType,
    #[serde(default, deserialize_with = "flexible_input_value")]
    pub input_value: Option<String>,
}

impl Action {
    /// Absent, `null` and the literal string `"null"` all mean "skip".
    pub fn has_input(&self) -> bool {
        self.input_value.as_deref().is_some_and(|v| v != "null")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataGroup {
    #[serde(default)]
    pub group_name: String,
    #[serde(default)]
    pub actions: Vec<Action>,
}

/// Unknown kinds fall back to `Input`.
fn flexible_action_type<'de, D>(deserializer: D) -> Result<ActionType, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(ActionType::parse).unwrap_or_default())
}

/// Accepts a string, bool, number or null.
fn flexible_input_value<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FlexibleValue {
        Text(String),
        Flag(bool),
        Number(serde_json::Number),
    }

    let value: Option<FlexibleValue> = Option::deserialize(deserializer)?;
    Ok(value.map(|v| match v {
        FlexibleValue::Text(s) => s,
        FlexibleValue::Flag(b) => b.to_string(),
        FlexibleValue::Number(n) => n.to_string(),
    }))
}

/// Replay tally. Within one frame,
/// `total_actions == applied_actions + missing_elements + blocked_contexts`;
/// `skipped_frame` counts instructions routed elsewhere and sits outside it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayResult {
    pub total_actions: u32,
    pub applied_actions: u32,
    pub missing_elements: u32,
    pub blocked_contexts: u32,
    pub skipped_frame: u32,
}

impl ReplayResult {
    pub fn is_conserved(&self) -> bool {
        self.total_actions == self.applied_actions + self.missing_elements + self.blocked_contexts
    }
}

impl AddAssign for ReplayResult {
    fn add_assign(&mut self, other: Self) {
        self.total_actions += other.total_actions;
        self.applied_actions += other.applied_actions;
        self.missing_elements += other.missing_elements;
        self.blocked_contexts += other.blocked_contexts;
        self.skipped_frame += other.skipped_frame;
    }
}

impl std::iter::Sum for ReplayResult {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |mut acc, r| {
            acc += r;
            acc
        })
    }
}
