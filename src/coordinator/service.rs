use futures_util::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use uuid::Uuid;

use crate::agent::{FrameEndpoint, FrameError, FrameRequest, FrameResponse, FrameStats, SelectionSummary};
use crate::extract::ElementDescriptor;
use crate::frame::{FrameId, TOP_FRAME_ID};
use crate::replay::{build_entry_plan, page_host, DataGroup, ReplayResult};
use crate::store::{PageRecord, SessionStore};

use super::aggregate::{merge_extractions, merge_replay, merge_summaries, merge_validation};
use super::registry::{FrameRegistry, TabId};

pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_millis(3000);
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_millis(10_000);

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("{operation} timed out after {timeout_ms} ms")]
    AggregationTimeout {
        operation: &'static str,
        timeout_ms: u128,
    },

    #[error("Tab {0} has no top frame")]
    NoTopFrame(TabId),

    #[error("Frame {frame_id} rejected {action}: {error}")]
    Rejected {
        frame_id: FrameId,
        action: &'static str,
        error: String,
    },

    #[error("Unexpected reply from frame {frame_id} to {action}")]
    UnexpectedReply {
        frame_id: FrameId,
        action: &'static str,
    },

    #[error("Frame unavailable: {0}")]
    Frame(#[from] FrameError),

    #[error("Storage error: {0}")]
    Store(#[from] anyhow::Error),
}

/// One frame's contribution to a fan-out. `None` when the frame is gone or
/// did not answer in time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameReply {
    pub frame_id: FrameId,
    pub response: Option<FrameResponse>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    pub page: PageRecord,
    pub count: usize,
}

/// Tracks live frames per tab and merges fan-out replies.
pub struct FrameCoordinator {
    registry: FrameRegistry,
    store: Arc<dyn SessionStore>,
    frame_timeout: Duration,
    operation_timeout: Duration,
}

impl FrameCoordinator {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            registry: FrameRegistry::new(),
            store,
            frame_timeout: DEFAULT_FRAME_TIMEOUT,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, frame_timeout: Duration, operation_timeout: Duration) -> Self {
        self.frame_timeout = frame_timeout;
        self.operation_timeout = operation_timeout;
        self
    }

    pub fn registry(&self) -> &FrameRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Readiness announcement from a frame.
    pub fn register_frame(&self, tab_id: TabId, endpoint: Arc<dyn FrameEndpoint>) {
        self.registry.register(tab_id, endpoint);
    }

    pub fn close_tab(&self, tab_id: TabId) -> usize {
        let purged = self.registry.purge_tab(tab_id);
        tracing::info!(tab_id, purged, "Tab closed");
        purged
    }

    /// Sends `request` to every known frame of the tab at once and waits for
    /// all of them. Dead or slow frames contribute `None`.
    pub async fn broadcast(&self, tab_id: TabId, request: FrameRequest) -> Vec<FrameReply> {
        let op = Uuid::new_v4();
        let action = request.name();
        let frames = self.registry.frames(tab_id);
        tracing::debug!(%op, tab_id, action, frames = frames.len(), "Broadcasting to frames");

        let replies = join_all(frames.iter().map(|frame| {
            let request = request.clone();
            async move {
                let frame_id = frame.frame_id();
                let response = match timeout(self.frame_timeout, frame.request(request)).await {
                    Ok(Ok(response)) => Some(response),
                    Ok(Err(e)) => {
                        tracing::warn!(%op, tab_id, frame_id, action, "Frame unavailable: {}", e);
                        None
                    }
                    Err(_) => {
                        tracing::warn!(
                            %op,
                            tab_id,
                            frame_id,
                            action,
                            timeout_ms = self.frame_timeout.as_millis() as u64,
                            "Frame did not answer in time"
                        );
                        None
                    }
                };
                FrameReply { frame_id, response }
            }
        }))
        .await;

        let answered = replies.iter().filter(|r| r.response.is_some()).count();
        tracing::debug!(%op, tab_id, action, answered, "Broadcast settled");
        replies
    }

    pub async fn summary(&self, tab_id: TabId) -> SelectionSummary {
        let replies = self.broadcast(tab_id, FrameRequest::GetSelectedSummary).await;
        merge_summaries(replies.into_iter().filter_map(|r| match r.response {
            Some(FrameResponse::Summary(summary)) => Some(summary),
            _ => None,
        }))
    }

    pub async fn stats(&self, tab_id: TabId) -> Vec<FrameStats> {
        self.broadcast(tab_id, FrameRequest::GetStats)
            .await
            .into_iter()
            .filter_map(|r| match r.response {
                Some(FrameResponse::Stats(stats)) => Some(stats),
                _ => None,
            })
            .collect()
    }

    /// Merged extraction of every frame, with pending overrides applied.
    pub async fn collect_extraction(&self, tab_id: TabId) -> Result<Vec<ElementDescriptor>, CoordinatorError> {
        let replies = self.broadcast(tab_id, FrameRequest::ExtractPart).await;
        let overrides = self.store.overrides()?;
        Ok(merge_extractions(
            replies.into_iter().filter_map(|r| match r.response {
                Some(FrameResponse::Extracted { elements, .. }) => Some(elements),
                _ => None,
            }),
            &overrides,
        ))
    }

    /// Extracts from every frame and saves the merged result through the top
    /// frame. Nothing is saved if the aggregation runs out of time.
    pub async fn extract_all(
        &self,
        tab_id: TabId,
        page_name: Option<String>,
    ) -> Result<SaveOutcome, CoordinatorError> {
        let elements = timeout(self.operation_timeout, self.collect_extraction(tab_id))
            .await
            .map_err(|_| CoordinatorError::AggregationTimeout {
                operation: "Extraction",
                timeout_ms: self.operation_timeout.as_millis(),
            })??;

        let top = self
            .registry
            .frame(tab_id, TOP_FRAME_ID)
            .ok_or(CoordinatorError::NoTopFrame(tab_id))?;
        let request = FrameRequest::SaveExtraction {
            page_name,
            elements,
        };
        let response = timeout(self.frame_timeout, top.request(request))
            .await
            .map_err(|_| CoordinatorError::AggregationTimeout {
                operation: "Saving extraction",
                timeout_ms: self.frame_timeout.as_millis(),
            })??;

        match response {
            FrameResponse::Saved { page, count } => {
                tracing::info!(tab_id, page_id = %page.page_id, count, "Extraction saved");
                Ok(SaveOutcome { page, count })
            }
            FrameResponse::Failed { error } => Err(CoordinatorError::Rejected {
                frame_id: TOP_FRAME_ID,
                action: "SAVE_EXTRACTION",
                error,
            }),
            _ => Err(CoordinatorError::UnexpectedReply {
                frame_id: TOP_FRAME_ID,
                action: "SAVE_EXTRACTION",
            }),
        }
    }

    pub async fn validate_all(&self, tab_id: TabId, selectors: Vec<String>) -> BTreeMap<String, usize> {
        let replies = self
            .broadcast(
                tab_id,
                FrameRequest::ValidateRawSelectorsFrame {
                    raw_selectors: selectors.clone(),
                },
            )
            .await;
        merge_validation(
            &selectors,
            replies.into_iter().filter_map(|r| match r.response {
                Some(FrameResponse::Validation { counts }) => Some(counts),
                _ => None,
            }),
        )
    }

    /// Routes the same entry groups to every frame; each frame keeps the
    /// instructions meant for it.
    pub async fn run_entry_all(&self, tab_id: TabId, data_groups: Vec<DataGroup>) -> ReplayResult {
        let replies = self
            .broadcast(tab_id, FrameRequest::RunEntry { data_groups })
            .await;
        let result = merge_replay(replies.into_iter().filter_map(|r| match r.response {
            Some(FrameResponse::Entry(result)) => Some(result),
            _ => None,
        }));
        tracing::info!(
            tab_id,
            total = result.total_actions,
            applied = result.applied_actions,
            missing = result.missing_elements,
            blocked = result.blocked_contexts,
            skipped = result.skipped_frame,
            "Entry aggregated across frames"
        );
        result
    }

    /// Replays the saved plan for `domain`, or for the host of the tab's top
    /// frame when no domain is given.
    pub async fn run_saved_entry(
        &self,
        tab_id: TabId,
        domain: Option<String>,
    ) -> Result<ReplayResult, CoordinatorError> {
        let domain = match domain {
            Some(domain) => Some(domain),
            None => self.top_frame_host(tab_id).await?,
        };
        let pages = self.store.list_pages()?;
        let overrides = self.store.overrides()?;
        let plan = build_entry_plan(&pages, &overrides, domain.as_deref());
        tracing::info!(tab_id, ?domain, groups = plan.len(), "Running saved entry plan");
        Ok(self.run_entry_all(tab_id, plan).await)
    }

    async fn top_frame_host(&self, tab_id: TabId) -> Result<Option<String>, CoordinatorError> {
        let top = self
            .registry
            .frame(tab_id, TOP_FRAME_ID)
            .ok_or(CoordinatorError::NoTopFrame(tab_id))?;
        match timeout(self.frame_timeout, top.request(FrameRequest::Ping)).await {
            Ok(Ok(FrameResponse::Pong { url, .. })) => Ok(page_host(&url)),
            Ok(Ok(_)) => Err(CoordinatorError::UnexpectedReply {
                frame_id: TOP_FRAME_ID,
                action: "PING",
            }),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(CoordinatorError::AggregationTimeout {
                operation: "Ping",
                timeout_ms: self.frame_timeout.as_millis(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    enum Behaviour {
        Reply(FrameResponse),
        Dead,
        Hang,
    }

    struct StubFrame {
        frame_id: FrameId,
        behaviour: Behaviour,
    }

    #[async_trait]
    impl FrameEndpoint for StubFrame {
        fn frame_id(&self) -> FrameId {
            self.frame_id
        }

        async fn request(&self, _request: FrameRequest) -> Result<FrameResponse, FrameError> {
            match &self.behaviour {
                Behaviour::Reply(response) => Ok(response.clone()),
                Behaviour::Dead => Err(FrameError::Closed(self.frame_id)),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Err(FrameError::NoResponse(self.frame_id))
                }
            }
        }
    }

    fn coordinator() -> FrameCoordinator {
        FrameCoordinator::new(Arc::new(MemoryStore::new()))
            .with_timeouts(Duration::from_millis(50), Duration::from_millis(200))
    }

    fn stub(frame_id: FrameId, behaviour: Behaviour) -> Arc<dyn FrameEndpoint> {
        Arc::new(StubFrame { frame_id, behaviour })
    }

    fn entry(total: u32, applied: u32, skipped: u32) -> Behaviour {
        Behaviour::Reply(FrameResponse::Entry(ReplayResult {
            total_actions: total,
            applied_actions: applied,
            missing_elements: total - applied,
            skipped_frame: skipped,
            ..Default::default()
        }))
    }

    #[tokio::test]
    async fn test_dead_and_slow_frames_contribute_nothing() {
        let coordinator = coordinator();
        coordinator.register_frame(1, stub(0, entry(2, 2, 1)));
        coordinator.register_frame(1, stub(1, Behaviour::Dead));
        coordinator.register_frame(1, stub(2, Behaviour::Hang));
        coordinator.register_frame(1, stub(3, entry(1, 0, 2)));

        let result = coordinator.run_entry_all(1, Vec::new()).await;
        assert_eq!(result.total_actions, 3);
        assert_eq!(result.applied_actions, 2);
        assert_eq!(result.missing_elements, 1);
        assert_eq!(result.skipped_frame, 3);

        let replies = coordinator.broadcast(1, FrameRequest::Ping).await;
        assert_eq!(replies.len(), 4);
        assert!(replies[1].response.is_none());
        assert!(replies[2].response.is_none());
    }

    #[tokio::test]
    async fn test_unknown_tab_fans_out_to_nothing() {
        let coordinator = coordinator();
        assert!(coordinator.broadcast(42, FrameRequest::Ping).await.is_empty());
        assert_eq!(coordinator.run_entry_all(42, Vec::new()).await, ReplayResult::default());
        assert!(matches!(
            coordinator.extract_all(42, None).await,
            Err(CoordinatorError::NoTopFrame(42))
        ));
    }

    #[tokio::test]
    async fn test_close_tab_purges_frames() {
        let coordinator = coordinator();
        coordinator.register_frame(5, stub(0, Behaviour::Dead));
        coordinator.register_frame(5, stub(1, Behaviour::Dead));
        assert_eq!(coordinator.registry().frame_ids(5), vec![0, 1]);
        assert_eq!(coordinator.close_tab(5), 2);
        assert!(!coordinator.registry().contains_tab(5));
    }

    #[tokio::test]
    async fn test_rejected_save_surfaces() {
        let coordinator = coordinator();
        coordinator.register_frame(
            1,
            stub(0, Behaviour::Reply(FrameResponse::failed("No elements selected"))),
        );
        let err = coordinator.extract_all(1, None).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Rejected { frame_id: 0, .. }));
    }

    #[tokio::test]
    async fn test_hung_top_frame_times_out_save() {
        let coordinator = coordinator();
        coordinator.register_frame(1, stub(0, Behaviour::Hang));
        let err = coordinator.extract_all(1, Some("Checkout".into())).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::AggregationTimeout { .. }));
    }
}
