use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::agent::{spawn_frame, AgentContext, FrameAgent};
use crate::coordinator::{FrameCoordinator, TabId};
use crate::dom::DocumentHandle;
use crate::frame::{FrameId, FrameWindow};

use super::page::{build_page, HostError, PageSpec};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameOverview {
    pub frame_id: FrameId,
    pub url: String,
    pub is_top: bool,
    /// How the parent addresses this frame; absent for the top frame.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabOverview {
    pub tab_id: TabId,
    pub url: String,
    pub frames: Vec<FrameOverview>,
}

struct OpenTab {
    url: String,
    windows: Vec<FrameWindow>,
    tasks: Vec<JoinHandle<()>>,
}

/// Opens pages as tabs: one agent task per frame, each announced to the
/// coordinator.
pub struct TabHost {
    coordinator: Arc<FrameCoordinator>,
    ctx: AgentContext,
    next_tab_id: AtomicU32,
    tabs: DashMap<TabId, OpenTab>,
}

impl TabHost {
    pub fn new(coordinator: Arc<FrameCoordinator>, ctx: AgentContext) -> Self {
        Self {
            coordinator,
            ctx,
            next_tab_id: AtomicU32::new(1),
            tabs: DashMap::new(),
        }
    }

    pub fn coordinator(&self) -> &Arc<FrameCoordinator> {
        &self.coordinator
    }

    pub fn context(&self) -> &AgentContext {
        &self.ctx
    }

    /// Must run inside a tokio runtime.
    pub fn open(&self, spec: &PageSpec) -> Result<TabOverview, HostError> {
        let windows = build_page(spec)?;
        let tab_id = self.next_tab_id.fetch_add(1, Ordering::Relaxed);

        let mut tasks = Vec::with_capacity(windows.len());
        for window in &windows {
            let agent = FrameAgent::new(tab_id, window.clone(), self.ctx.clone());
            let (handle, task) = spawn_frame(agent);
            self.coordinator.register_frame(tab_id, Arc::new(handle));
            tasks.push(task);
        }

        let tab = OpenTab {
            url: spec.url.clone(),
            windows,
            tasks,
        };
        let overview = overview(tab_id, &tab);
        self.tabs.insert(tab_id, tab);
        tracing::info!(tab_id, url = %spec.url, frames = overview.frames.len(), "Tab opened");
        Ok(overview)
    }

    /// Purges the tab from the coordinator and stops its agents.
    pub fn close(&self, tab_id: TabId) -> bool {
        self.coordinator.close_tab(tab_id);
        let Some((_, tab)) = self.tabs.remove(&tab_id) else {
            return false;
        };
        for task in tab.tasks {
            task.abort();
        }
        true
    }

    pub fn tab(&self, tab_id: TabId) -> Option<TabOverview> {
        self.tabs.get(&tab_id).map(|tab| overview(tab_id, &tab))
    }

    pub fn tabs(&self) -> Vec<TabOverview> {
        let mut tabs: Vec<TabOverview> = self
            .tabs
            .iter()
            .map(|entry| overview(*entry.key(), entry.value()))
            .collect();
        tabs.sort_by_key(|t| t.tab_id);
        tabs
    }

    /// Live document of one frame, for inspection.
    pub fn document(&self, tab_id: TabId, frame_id: FrameId) -> Option<DocumentHandle> {
        let tab = self.tabs.get(&tab_id)?;
        tab.windows
            .iter()
            .find(|w| w.frame_id() == frame_id)
            .map(|w| w.document().clone())
    }
}

fn overview(tab_id: TabId, tab: &OpenTab) -> TabOverview {
    TabOverview {
        tab_id,
        url: tab.url.clone(),
        frames: tab
            .windows
            .iter()
            .map(|w| FrameOverview {
                frame_id: w.frame_id(),
                url: w.url().to_string(),
                is_top: w.is_top(),
                locator: w.locator().map(|l| l.to_string()),
            })
            .collect(),
    }
}
