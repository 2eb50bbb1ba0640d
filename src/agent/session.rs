use crate::dom::{Document, NodeId};
use crate::extract::LabelMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectionEdit {
    Add(NodeId),
    Remove(NodeId),
}

/// Selection state owned by one frame agent. Lives exactly as long as the
/// frame; nothing here is shared with other frames.
#[derive(Debug)]
pub struct SelectionSession {
    selected: Vec<NodeId>,
    manual_mode: bool,
    extraction_count: u32,
    page_id: String,
    label_mode: LabelMode,
    undo: Vec<SelectionEdit>,
    redo: Vec<SelectionEdit>,
}

impl SelectionSession {
    pub fn new(page_id: String) -> Self {
        Self {
            selected: Vec::new(),
            manual_mode: false,
            extraction_count: 0,
            page_id,
            label_mode: LabelMode::default(),
            undo: Vec::new(),
            redo: Vec::new(),
        }
    }

    /// Selected nodes in selection order.
    pub fn selected(&self) -> &[NodeId] {
        &self.selected
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.selected.contains(&node)
    }

    /// Replaces the whole selection. History starts over.
    pub fn replace_all(&mut self, nodes: impl IntoIterator<Item = NodeId>) {
        self.selected.clear();
        for node in nodes {
            self.insert(node);
        }
        self.undo.clear();
        self.redo.clear();
    }

    /// Adds or removes `node`. Returns true when it ends up selected.
    pub fn toggle(&mut self, node: NodeId) -> bool {
        let edit = if self.contains(node) {
            SelectionEdit::Remove(node)
        } else {
            SelectionEdit::Add(node)
        };
        self.apply(edit);
        self.undo.push(edit);
        self.redo.clear();
        matches!(edit, SelectionEdit::Add(_))
    }

    pub fn undo(&mut self) -> bool {
        let Some(edit) = self.undo.pop() else {
            return false;
        };
        self.apply(match edit {
            SelectionEdit::Add(node) => SelectionEdit::Remove(node),
            SelectionEdit::Remove(node) => SelectionEdit::Add(node),
        });
        self.redo.push(edit);
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(edit) = self.redo.pop() else {
            return false;
        };
        self.apply(edit);
        self.undo.push(edit);
        true
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Drops selected nodes that are no longer attached to `doc`.
    pub fn prune(&mut self, doc: &Document) -> usize {
        let before = self.selected.len();
        self.selected.retain(|node| doc.is_connected(*node));
        before - self.selected.len()
    }

    /// Clears the selection without touching counters or history.
    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    /// Back to a fresh session under a new page id.
    pub fn reset(&mut self, page_id: String) {
        let label_mode = self.label_mode;
        *self = Self::new(page_id);
        self.label_mode = label_mode;
    }

    pub fn manual_mode(&self) -> bool {
        self.manual_mode
    }

    pub fn set_manual_mode(&mut self, on: bool) {
        self.manual_mode = on;
    }

    pub fn label_mode(&self) -> LabelMode {
        self.label_mode
    }

    pub fn set_label_mode(&mut self, mode: LabelMode) {
        self.label_mode = mode;
    }

    pub fn page_id(&self) -> &str {
        &self.page_id
    }

    pub fn extraction_count(&self) -> u32 {
        self.extraction_count
    }

    /// Group id for the next saved extraction.
    pub fn next_extraction_group(&mut self) -> u32 {
        self.extraction_count += 1;
        self.extraction_count
    }

    fn insert(&mut self, node: NodeId) {
        if !self.contains(node) {
            self.selected.push(node);
        }
    }

    fn apply(&mut self, edit: SelectionEdit) {
        match edit {
            SelectionEdit::Add(node) => self.insert(node),
            SelectionEdit::Remove(node) => self.selected.retain(|n| *n != node),
        }
    }
}
