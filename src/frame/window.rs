use crate::dom::{DocumentHandle, NodeId, WeakDocument};

use super::locator::{iframe_index, FrameLocator};
use super::resolver::FrameEnv;

pub type FrameId = u32;

/// Frame id of the top-level document in every tab.
pub const TOP_FRAME_ID: FrameId = 0;

/// How a child frame is attached to its parent.
#[derive(Debug, Clone)]
pub enum Embedding {
    /// The child can read its own `<iframe>` element in the parent.
    SameOrigin { parent: WeakDocument, element: NodeId },
    CrossOrigin,
}

/// Attributes of the embedding `<iframe>` as seen from inside the child.
#[derive(Debug, Clone)]
pub struct EmbeddingSnapshot {
    pub parent: DocumentHandle,
    pub element: NodeId,
    pub parent_url: String,
    pub id: Option<String>,
    pub name: Option<String>,
    pub title: Option<String>,
    pub classes: Vec<String>,
    pub src: Option<String>,
    pub index: Option<usize>,
}

/// A frame's own view of itself: its document, URL and embedding.
#[derive(Debug, Clone)]
pub struct FrameWindow {
    frame_id: FrameId,
    url: String,
    document: DocumentHandle,
    embedding: Option<Embedding>,
}

impl FrameWindow {
    pub fn top(document: DocumentHandle) -> Self {
        let url = document.read().url().to_string();
        Self {
            frame_id: TOP_FRAME_ID,
            url,
            document,
            embedding: None,
        }
    }

    pub fn child(frame_id: FrameId, document: DocumentHandle, embedding: Embedding) -> Self {
        let url = document.read().url().to_string();
        Self {
            frame_id,
            url,
            document,
            embedding: Some(embedding),
        }
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn document(&self) -> &DocumentHandle {
        &self.document
    }

    pub fn is_top(&self) -> bool {
        self.embedding.is_none()
    }

    /// Reads the embedding element. `None` at top, across origins, or when
    /// the parent document is gone.
    pub fn embedding_snapshot(&self) -> Option<EmbeddingSnapshot> {
        let Some(Embedding::SameOrigin { parent, element }) = &self.embedding else {
            return None;
        };
        let parent = parent.upgrade()?;
        let snapshot = {
            let doc = parent.read();
            let el = doc.element(*element)?;
            let attr = |name: &str| el.attr(name).map(str::to_string);
            EmbeddingSnapshot {
                parent: parent.clone(),
                element: *element,
                parent_url: doc.url().to_string(),
                id: attr("id"),
                name: attr("name"),
                title: attr("title"),
                classes: el.classes().map(str::to_string).collect(),
                src: attr("src"),
                index: iframe_index(&doc, *element),
            }
        };
        Some(snapshot)
    }

    /// Locator for this frame as its parent would address it. `None` at top.
    pub fn locator(&self) -> Option<FrameLocator> {
        if self.is_top() {
            return None;
        }
        Some(FrameLocator::identify(
            self.embedding_snapshot().as_ref(),
            &self.url,
        ))
    }

    pub fn env(&self) -> FrameEnv {
        FrameEnv {
            is_top: self.is_top(),
            url: self.url.clone(),
            embedding: self.embedding_snapshot(),
        }
    }
}
