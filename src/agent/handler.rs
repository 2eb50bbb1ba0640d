use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::coordinator::TabId;
use crate::dom::{Document, NodeId};
use crate::extract::{
    dedupe_descriptors, default_page_name, describe, dom_signature, page_id, ElementDescriptor,
    FrameScope, SelectorSynthesizer,
};
use crate::frame::{FrameId, FrameWindow};
use crate::replay::{AccessorRegistry, DataGroup, ReplayEngine};
use crate::store::{ExtractionRecord, SessionStore};

use super::protocol::{FrameRequest, FrameResponse, FrameStats, SelectionSummary, SummaryItem};
use super::session::SelectionSession;

/// Element kinds picked up by auto-select, in selection order.
pub const AUTO_SELECT_SELECTORS: &[&str] = &[
    r#"input:not([type="hidden"])"#,
    "select",
    "button",
    "textarea",
    r#"[role="button"]"#,
    "[onclick]",
    "a[href]",
    r#"[contenteditable="true"]"#,
    r#"[tabindex]:not([tabindex="-1"])"#,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusLevel {
    Info,
    Success,
    Error,
}

/// Operator-facing status line published by a frame agent.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub tab_id: TabId,
    pub frame_id: FrameId,
    pub level: StatusLevel,
    pub message: String,
}

/// Collaborators shared by every agent of a host.
#[derive(Clone)]
pub struct AgentContext {
    pub synthesizer: SelectorSynthesizer,
    pub accessors: AccessorRegistry,
    pub store: Arc<dyn SessionStore>,
    pub status: broadcast::Sender<StatusEvent>,
}

/// Content logic for one frame. Handles one request at a time.
pub struct FrameAgent {
    tab_id: TabId,
    window: FrameWindow,
    session: SelectionSession,
    ctx: AgentContext,
}

impl FrameAgent {
    pub fn new(tab_id: TabId, window: FrameWindow, ctx: AgentContext) -> Self {
        let page_id = page_id(&window.document().read(), Utc::now());
        Self {
            tab_id,
            window,
            session: SelectionSession::new(page_id),
            ctx,
        }
    }

    pub fn window(&self) -> &FrameWindow {
        &self.window
    }

    pub fn session(&self) -> &SelectionSession {
        &self.session
    }

    pub fn handle(&mut self, request: FrameRequest) -> FrameResponse {
        tracing::debug!(
            tab_id = self.tab_id,
            frame_id = self.window.frame_id(),
            action = request.name(),
            "Frame request"
        );

        match request {
            FrameRequest::Ping => FrameResponse::Pong {
                frame_id: self.window.frame_id(),
                url: self.window.url().to_string(),
                is_top: self.window.is_top(),
            },
            FrameRequest::AutoSelect => self.auto_select(),
            FrameRequest::ManualModeOn => {
                self.session.set_manual_mode(true);
                self.notify(
                    StatusLevel::Info,
                    "Manual mode: toggle elements to add or remove them.".to_string(),
                );
                self.selection()
            }
            FrameRequest::ManualModeOff => {
                self.session.set_manual_mode(false);
                self.notify(
                    StatusLevel::Info,
                    format!("Manual mode disabled. Selected {} elements.", self.session.len()),
                );
                self.selection()
            }
            FrameRequest::ToggleElement { selector } => self.toggle(&selector),
            FrameRequest::Undo => {
                self.prune();
                self.session.undo();
                self.selection()
            }
            FrameRequest::Redo => {
                self.prune();
                self.session.redo();
                self.selection()
            }
            FrameRequest::ExtractPart => FrameResponse::Extracted {
                frame_url: self.window.url().to_string(),
                elements: self.extract(),
            },
            FrameRequest::SaveExtraction {
                page_name,
                elements,
            } => self.save(page_name, elements),
            FrameRequest::GetSelectedSummary => FrameResponse::Summary(self.summary()),
            FrameRequest::ValidateRawSelectorsFrame { raw_selectors } => {
                let doc = self.window.document().read();
                let counts = raw_selectors
                    .into_iter()
                    .map(|selector| {
                        let count = doc.count(&selector);
                        (selector, count)
                    })
                    .collect();
                FrameResponse::Validation { counts }
            }
            FrameRequest::RunEntry { data_groups } => self.run_entry(&data_groups),
            FrameRequest::GetStats => FrameResponse::Stats(self.stats()),
            FrameRequest::ClearAll => {
                let fresh = page_id(&self.window.document().read(), Utc::now());
                self.session.reset(fresh);
                self.notify(
                    StatusLevel::Success,
                    "All cleared - ready to start fresh".to_string(),
                );
                self.selection()
            }
            FrameRequest::SetLabelMode { mode } => {
                self.session.set_label_mode(mode);
                FrameResponse::ModeChanged { mode }
            }
        }
    }

    fn auto_select(&mut self) -> FrameResponse {
        let found = {
            let doc = self.window.document().read();
            interactive_elements(&doc)
        };
        let count = found.len();
        self.session.replace_all(found);
        self.notify(
            StatusLevel::Success,
            format!("Auto-selected {count} elements. Use manual mode to adjust."),
        );
        self.selection()
    }

    fn toggle(&mut self, selector: &str) -> FrameResponse {
        self.prune();
        let doc = self.window.document().read();
        let target = match doc.query_selector(selector) {
            Ok(Some(node)) => node,
            Ok(None) => return FrameResponse::failed(format!("No element matches {selector}")),
            Err(e) => return FrameResponse::failed(e.to_string()),
        };

        // A container with exactly one selected descendant toggles that descendant.
        let target = if self.session.contains(target) {
            target
        } else {
            let selected_children: Vec<NodeId> = doc
                .descendants(target)
                .into_iter()
                .filter(|n| *n != target && self.session.contains(*n))
                .collect();
            match selected_children.as_slice() {
                [only] => *only,
                _ => target,
            }
        };

        let description = describe_element(&doc, target);
        drop(doc);

        let (level, message) = if self.session.toggle(target) {
            (StatusLevel::Success, format!("Added: {description}"))
        } else {
            (StatusLevel::Info, format!("Removed: {description}"))
        };
        self.notify(level, message);
        self.selection()
    }

    fn extract(&mut self) -> Vec<ElementDescriptor> {
        self.prune();
        let scope = FrameScope {
            url: self.window.url().to_string(),
            locator: self.window.locator(),
        };
        let doc = self.window.document().read();
        let descriptors = self
            .session
            .selected()
            .iter()
            .map(|node| describe(&doc, *node, &self.ctx.synthesizer, &scope, self.session.label_mode()))
            .collect();
        dedupe_descriptors(descriptors)
    }

    fn save(&mut self, page_name: Option<String>, elements: Vec<ElementDescriptor>) -> FrameResponse {
        if !self.window.is_top() {
            return FrameResponse::failed("SAVE_EXTRACTION is only accepted by the top frame");
        }
        let elements = dedupe_descriptors(elements);
        if elements.is_empty() {
            self.notify(
                StatusLevel::Error,
                "No elements selected. Use auto-select or manual mode first.".to_string(),
            );
            return FrameResponse::failed("No elements selected");
        }

        let record = {
            let doc = self.window.document().read();
            let page_name = page_name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| default_page_name(&doc));
            ExtractionRecord {
                page_id: self.session.page_id().to_string(),
                page_name,
                url: self.window.url().to_string(),
                timestamp: Utc::now(),
                dom_signature: dom_signature(&doc),
                extraction_group: self.session.extraction_count() + 1,
                elements,
            }
        };

        match self.ctx.store.save_extraction(&record) {
            Ok(page) => {
                self.session.next_extraction_group();
                self.session.clear_selection();
                let count = record.elements.len();
                self.notify(
                    StatusLevel::Success,
                    format!("Saved {count} elements to {}", record.page_name),
                );
                FrameResponse::Saved { page, count }
            }
            Err(e) => {
                tracing::error!("Failed to save extraction: {}", e);
                self.notify(StatusLevel::Error, format!("Save failed: {e}"));
                FrameResponse::failed(e.to_string())
            }
        }
    }

    fn summary(&mut self) -> SelectionSummary {
        let elements = self.extract();
        let doc = self.window.document().read();
        let mut by_type = BTreeMap::new();
        let items: Vec<SummaryItem> = elements
            .into_iter()
            .map(|d| {
                *by_type.entry(d.element_type.to_lowercase()).or_insert(0) += 1;
                SummaryItem {
                    matches: doc.count(&d.selector),
                    label: d.label,
                    element_type: d.element_type,
                    selector: d.selector,
                    context_document: d.context_document,
                }
            })
            .collect();
        SelectionSummary {
            selected_count: self.session.len(),
            by_type,
            items,
        }
    }

    fn run_entry(&self, groups: &[DataGroup]) -> FrameResponse {
        let result = ReplayEngine::new(&self.window, &self.ctx.accessors).run_entry(groups);
        if result.total_actions > 0 {
            self.notify(
                StatusLevel::Info,
                format!(
                    "Entry applied {} of {} actions ({} missing, {} blocked)",
                    result.applied_actions,
                    result.total_actions,
                    result.missing_elements,
                    result.blocked_contexts
                ),
            );
        }
        FrameResponse::Entry(result)
    }

    fn stats(&mut self) -> FrameStats {
        self.prune();
        FrameStats {
            frame_id: self.window.frame_id(),
            url: self.window.url().to_string(),
            is_top: self.window.is_top(),
            selected_count: self.session.len(),
            manual_mode: self.session.manual_mode(),
            extraction_count: self.session.extraction_count(),
            page_id: self.session.page_id().to_string(),
            label_mode: self.session.label_mode(),
            can_undo: self.session.can_undo(),
            can_redo: self.session.can_redo(),
        }
    }

    fn selection(&self) -> FrameResponse {
        FrameResponse::Selection {
            selected_count: self.session.len(),
        }
    }

    fn prune(&mut self) {
        let removed = self.session.prune(&self.window.document().read());
        if removed > 0 {
            tracing::debug!(frame_id = self.window.frame_id(), removed, "Pruned detached selections");
        }
    }

    fn notify(&self, level: StatusLevel, message: String) {
        // No subscribers is fine.
        let _ = self.ctx.status.send(StatusEvent {
            tab_id: self.tab_id,
            frame_id: self.window.frame_id(),
            level,
            message,
        });
    }
}

/// Visible interactive elements, each once, in [`AUTO_SELECT_SELECTORS`] order.
pub fn interactive_elements(doc: &Document) -> Vec<NodeId> {
    let mut found: Vec<NodeId> = Vec::new();
    for selector in AUTO_SELECT_SELECTORS {
        let Ok(matches) = doc.query_selector_all(selector) else {
            continue;
        };
        for node in matches {
            if doc.is_visible(node) && !found.contains(&node) {
                found.push(node);
            }
        }
    }
    found
}

/// `tag#id.firstClass "text…"` for status lines.
fn describe_element(doc: &Document, node: NodeId) -> String {
    let tag = doc.tag_name(node).unwrap_or_default();
    let id = doc
        .non_empty_attr(node, "id")
        .map(|id| format!("#{id}"))
        .unwrap_or_default();
    let class = doc
        .classes(node)
        .into_iter()
        .next()
        .map(|c| format!(".{c}"))
        .unwrap_or_default();
    let text: String = doc.text_content(node).trim().chars().take(20).collect();
    format!("{tag}{id}{class} \"{text}\"")
}
