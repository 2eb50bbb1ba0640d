use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::agent::FrameEndpoint;
use crate::frame::FrameId;

pub type TabId = u32;

/// Live frames per tab, registered as each frame announces readiness.
#[derive(Default)]
pub struct FrameRegistry {
    tabs: DashMap<TabId, BTreeMap<FrameId, Arc<dyn FrameEndpoint>>>,
}

impl FrameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a frame of `tab_id`.
    pub fn register(&self, tab_id: TabId, endpoint: Arc<dyn FrameEndpoint>) {
        let frame_id = endpoint.frame_id();
        self.tabs.entry(tab_id).or_default().insert(frame_id, endpoint);
        tracing::debug!(tab_id, frame_id, "Frame registered");
    }

    pub fn unregister_frame(&self, tab_id: TabId, frame_id: FrameId) -> bool {
        let Some(mut frames) = self.tabs.get_mut(&tab_id) else {
            return false;
        };
        frames.remove(&frame_id).is_some()
    }

    /// Forgets every frame of `tab_id`; returns how many there were.
    pub fn purge_tab(&self, tab_id: TabId) -> usize {
        self.tabs
            .remove(&tab_id)
            .map(|(_, frames)| frames.len())
            .unwrap_or(0)
    }

    /// Frames of `tab_id` in frame id order. Unknown tabs have none.
    pub fn frames(&self, tab_id: TabId) -> Vec<Arc<dyn FrameEndpoint>> {
        self.tabs
            .get(&tab_id)
            .map(|frames| frames.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn frame(&self, tab_id: TabId, frame_id: FrameId) -> Option<Arc<dyn FrameEndpoint>> {
        self.tabs.get(&tab_id)?.get(&frame_id).cloned()
    }

    pub fn frame_ids(&self, tab_id: TabId) -> Vec<FrameId> {
        self.tabs
            .get(&tab_id)
            .map(|frames| frames.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn contains_tab(&self, tab_id: TabId) -> bool {
        self.tabs.contains_key(&tab_id)
    }

    pub fn tabs(&self) -> Vec<TabId> {
        let mut tabs: Vec<TabId> = self.tabs.iter().map(|entry| *entry.key()).collect();
        tabs.sort_unstable();
        tabs
    }
}
