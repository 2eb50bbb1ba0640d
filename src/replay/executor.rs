//! Applies entry instructions to one frame's element tree.

use regex::Regex;
use std::sync::OnceLock;

use crate::dom::selector::quote_attr_value;
use crate::dom::{Document, DocumentHandle, DomError, EventKind, FrameContent, NodeId};
use crate::frame::{FrameContext, FrameResolver, FrameWindow, DESCENT_MARKER};

use super::accessor::AccessorRegistry;
use super::action::{Action, ActionType, DataGroup, ReplayResult};

fn radio_group_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\[name\s*=\s*"([^"]+)"\]"#).expect("static pattern"))
}

/// How a single instruction ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Applied,
    Missing,
    /// The target frame exists but its document cannot be read.
    Blocked,
    /// Writing the value failed; tallied with the missing elements.
    Failed(String),
}

enum TargetDocument {
    Ready(DocumentHandle),
    Blocked,
    Unavailable,
}

pub struct ReplayEngine<'a> {
    window: &'a FrameWindow,
    accessors: &'a AccessorRegistry,
}

impl<'a> ReplayEngine<'a> {
    pub fn new(window: &'a FrameWindow, accessors: &'a AccessorRegistry) -> Self {
        Self { window, accessors }
    }

    /// Routed entry: every instruction is first checked against this
    /// frame's identity; those meant for another frame only bump
    /// `skipped_frame`. So does an instruction whose locator names a readable
    /// iframe in this frame's own tree, since that iframe's agent applies it.
    pub fn run_entry(&self, groups: &[DataGroup]) -> ReplayResult {
        let env = self.window.env();
        let mut result = ReplayResult::default();

        for action in groups.iter().flat_map(|g| g.actions.iter()) {
            if !action.has_input() {
                continue;
            }
            let context = FrameContext::parse(&action.context_document);
            if !FrameResolver::should_handle(&context, &env) || self.delegates_to_child(&context) {
                result.skipped_frame += 1;
                continue;
            }
            self.tally(&context, action, &mut result);
        }

        tracing::info!(
            frame_id = self.window.frame_id(),
            url = %self.window.url(),
            total = result.total_actions,
            applied = result.applied_actions,
            missing = result.missing_elements,
            blocked = result.blocked_contexts,
            skipped = result.skipped_frame,
            "Entry replay finished"
        );
        result
    }

    /// Applies instructions against this frame's tree without routing.
    pub fn replay(&self, actions: &[Action]) -> ReplayResult {
        let mut result = ReplayResult::default();
        for action in actions.iter().filter(|a| a.has_input()) {
            let context = FrameContext::parse(&action.context_document);
            self.tally(&context, action, &mut result);
        }
        result
    }

    fn tally(&self, context: &FrameContext, action: &Action, result: &mut ReplayResult) {
        result.total_actions += 1;
        match self.apply(context, action) {
            ActionOutcome::Applied => result.applied_actions += 1,
            ActionOutcome::Blocked => {
                tracing::warn!(target = %action.target_element, "Blocked frame context");
                result.blocked_contexts += 1;
            }
            ActionOutcome::Missing => {
                tracing::warn!(target = %action.target_element, "Element not found");
                result.missing_elements += 1;
            }
            ActionOutcome::Failed(error) => {
                tracing::warn!(target = %action.target_element, %error, "Failed to apply action");
                result.missing_elements += 1;
            }
        }
    }

    pub fn apply(&self, context: &FrameContext, action: &Action) -> ActionOutcome {
        let handle = match self.target_document(context) {
            TargetDocument::Ready(handle) => Some(handle),
            TargetDocument::Blocked => return ActionOutcome::Blocked,
            TargetDocument::Unavailable => None,
        };

        let Some(handle) = handle else {
            // Buttons are attempted even without a target.
            return if action.action_type == ActionType::Button {
                ActionOutcome::Applied
            } else {
                ActionOutcome::Missing
            };
        };

        let mut doc = handle.write();
        let target = target_selector(&action.target_element);
        let element = self.accessors.resolve(&doc, target);
        let value = action.input_value.as_deref().unwrap_or_default();

        let applied = match (element, action.action_type) {
            (None, ActionType::Button) => Ok(()),
            (None, _) => return ActionOutcome::Missing,
            (Some(el), ActionType::Input) => set_input(&mut doc, el, value),
            (Some(el), ActionType::Select) => set_select(&mut doc, el, value),
            (Some(el), ActionType::Checkbox) => set_checkbox(&mut doc, el, value),
            (Some(el), ActionType::RadioButton) => set_radio(&mut doc, el, target, value),
            (Some(el), ActionType::Button) => doc.click(el),
        };

        match applied {
            Ok(()) => ActionOutcome::Applied,
            Err(e) => ActionOutcome::Failed(e.to_string()),
        }
    }

    fn delegates_to_child(&self, context: &FrameContext) -> bool {
        let FrameContext::Iframe(locator) = context else {
            return false;
        };
        let doc = self.window.document().read();
        locator
            .find_in(&doc)
            .is_some_and(|frame| matches!(doc.frame_content(frame), Some(FrameContent::Accessible(_))))
    }

    fn target_document(&self, context: &FrameContext) -> TargetDocument {
        let own = self.window.document();
        let locator = match context {
            FrameContext::Top | FrameContext::Malformed(_) => return TargetDocument::Ready(own.clone()),
            FrameContext::Iframe(locator) => locator,
        };

        let doc = own.read();
        match locator.find_in(&doc) {
            Some(frame) => match doc.frame_content(frame) {
                Some(FrameContent::Accessible(child)) => TargetDocument::Ready(child.clone()),
                Some(FrameContent::CrossOrigin) => TargetDocument::Blocked,
                None => TargetDocument::Unavailable,
            },
            // No such iframe below a routed child: the child is the addressed frame.
            None if !self.window.is_top() => TargetDocument::Ready(own.clone()),
            None => TargetDocument::Unavailable,
        }
    }
}

/// Element part of a possibly frame-scoped target.
fn target_selector(target: &str) -> &str {
    target
        .rsplit(DESCENT_MARKER.trim())
        .next()
        .unwrap_or(target)
        .trim()
}

fn set_input(doc: &mut Document, el: NodeId, value: &str) -> Result<(), DomError> {
    doc.focus(el)?;
    doc.set_value(el, value)?;
    doc.dispatch(el, EventKind::Input)?;
    doc.dispatch(el, EventKind::Change)
}

fn set_select(doc: &mut Document, el: NodeId, value: &str) -> Result<(), DomError> {
    let chosen = doc
        .options(el)
        .into_iter()
        .find(|o| doc.option_value(*o) == value || doc.option_text(*o) == value)
        .map(|o| doc.option_value(o));
    doc.set_value(el, chosen.as_deref().unwrap_or(value))?;
    doc.dispatch(el, EventKind::Change)
}

fn set_checkbox(doc: &mut Document, el: NodeId, value: &str) -> Result<(), DomError> {
    doc.set_checked(el, value.trim().eq_ignore_ascii_case("true"))?;
    doc.dispatch(el, EventKind::Change)
}

/// With `[name="…"]` in the selector, every radio of that group is set by
/// value-or-id equality; otherwise the resolved element is checked.
fn set_radio(doc: &mut Document, el: NodeId, selector: &str, value: &str) -> Result<(), DomError> {
    let Some(name) = radio_group_re()
        .captures(selector)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
    else {
        doc.set_checked(el, true)?;
        return doc.dispatch(el, EventKind::Change);
    };

    let group = doc.query_selector_all(&format!(
        r#"input[type="radio"][name={}]"#,
        quote_attr_value(&name)
    ))?;
    for radio in group {
        let selected = doc.value(radio) == value || doc.attr(radio, "id") == Some(value);
        doc.set_checked(radio, selected)?;
        doc.dispatch(radio, EventKind::Change)?;
    }
    Ok(())
}
