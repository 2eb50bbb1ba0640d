//! In-process document model used by every frame.
//!
//! A [`Document`] is an arena of nodes with just enough form-control state
//! (`value`, `checked`, focus, recorded events) to extract descriptors from
//! and to replay entry instructions against.

pub mod document;
pub mod html;
pub mod selector;

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use thiserror::Error;

pub use document::{Document, DomEvent, Element, EventKind, FrameContent, NodeId, Rect};
pub use html::parse_html;
pub use selector::SelectorList;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomError {
    #[error("Unsupported selector: {0}")]
    UnsupportedSelector(String),

    #[error("Node {0:?} does not exist")]
    UnknownNode(NodeId),

    #[error("Node {0:?} is not an element")]
    NotAnElement(NodeId),

    #[error("HTML parse error: {0}")]
    HtmlParse(String),
}

/// Shared handle to a frame's document.
///
/// Poisoned locks are recovered rather than propagated.
#[derive(Debug, Clone)]
pub struct DocumentHandle(Arc<RwLock<Document>>);

impl DocumentHandle {
    pub fn new(document: Document) -> Self {
        Self(Arc::new(RwLock::new(document)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Document> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Document> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn downgrade(&self) -> WeakDocument {
        WeakDocument(Arc::downgrade(&self.0))
    }

    pub fn ptr_eq(&self, other: &DocumentHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Non-owning back-reference from a child frame to its parent document.
#[derive(Debug, Clone)]
pub struct WeakDocument(Weak<RwLock<Document>>);

impl WeakDocument {
    pub fn upgrade(&self) -> Option<DocumentHandle> {
        self.0.upgrade().map(DocumentHandle)
    }
}
