//! Runs each frame agent as its own task. The only way in is a request
//! queue; replies come back over a oneshot per request.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::frame::FrameId;

use super::handler::FrameAgent;
use super::protocol::{FrameRequest, FrameResponse};

const FRAME_QUEUE_DEPTH: usize = 32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame {0} is closed")]
    Closed(FrameId),

    #[error("Frame {0} dropped the request without answering")]
    NoResponse(FrameId),
}

/// Something the coordinator can send frame requests to.
#[async_trait]
pub trait FrameEndpoint: Send + Sync {
    fn frame_id(&self) -> FrameId;

    async fn request(&self, request: FrameRequest) -> Result<FrameResponse, FrameError>;
}

struct Envelope {
    request: FrameRequest,
    reply: oneshot::Sender<FrameResponse>,
}

/// Sending side of a running frame agent.
#[derive(Clone)]
pub struct FrameHandle {
    frame_id: FrameId,
    sender: mpsc::Sender<Envelope>,
}

#[async_trait]
impl FrameEndpoint for FrameHandle {
    fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    async fn request(&self, request: FrameRequest) -> Result<FrameResponse, FrameError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(Envelope { request, reply })
            .await
            .map_err(|_| FrameError::Closed(self.frame_id))?;
        response
            .await
            .map_err(|_| FrameError::NoResponse(self.frame_id))
    }
}

/// Starts `agent` on its own task. The task ends when every handle is gone.
pub fn spawn_frame(mut agent: FrameAgent) -> (FrameHandle, JoinHandle<()>) {
    let frame_id = agent.window().frame_id();
    let (sender, mut receiver) = mpsc::channel::<Envelope>(FRAME_QUEUE_DEPTH);

    let task = tokio::spawn(async move {
        tracing::debug!(frame_id, url = %agent.window().url(), "Frame agent started");
        while let Some(Envelope { request, reply }) = receiver.recv().await {
            let response = agent.handle(request);
            // The caller may have timed out already.
            let _ = reply.send(response);
        }
        tracing::debug!(frame_id, "Frame agent stopped");
    });

    (FrameHandle { frame_id, sender }, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::handler::AgentContext;
    use crate::dom::{parse_html, DocumentHandle};
    use crate::extract::SelectorSynthesizer;
    use crate::frame::FrameWindow;
    use crate::replay::AccessorRegistry;
    use crate::store::MemoryStore;
    use std::sync::Arc;
    use tokio::sync::broadcast;

    fn agent() -> FrameAgent {
        let (status, _) = broadcast::channel(8);
        let doc = parse_html("https://example.com/", r#"<input id="q">"#).unwrap();
        FrameAgent::new(
            7,
            FrameWindow::top(DocumentHandle::new(doc)),
            AgentContext {
                synthesizer: SelectorSynthesizer::default(),
                accessors: AccessorRegistry::new(),
                store: Arc::new(MemoryStore::new()),
                status,
            },
        )
    }

    #[test]
    fn test_requests_are_answered_in_order() {
        tokio_test::block_on(async {
            let (handle, _task) = spawn_frame(agent());
            assert_eq!(handle.frame_id(), 0);

            let first = handle.request(FrameRequest::AutoSelect).await.unwrap();
            let second = handle.request(FrameRequest::GetStats).await.unwrap();
            assert_eq!(first, FrameResponse::Selection { selected_count: 1 });
            let FrameResponse::Stats(stats) = second else {
                panic!("expected stats");
            };
            assert_eq!(stats.selected_count, 1);
        });
    }

    #[tokio::test]
    async fn test_stopped_agent_reports_closed() {
        let (handle, task) = spawn_frame(agent());
        task.abort();
        let _ = task.await;

        assert_eq!(
            handle.request(FrameRequest::Ping).await,
            Err(FrameError::Closed(0))
        );
    }
}
