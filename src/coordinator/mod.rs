//! Page-level coordination: which frames are alive, fan-out to all of them
//! and deterministic merging of their replies.

pub mod aggregate;
pub mod registry;
pub mod service;

pub use registry::{FrameRegistry, TabId};
pub use service::{
    CoordinatorError, FrameCoordinator, FrameReply, SaveOutcome, DEFAULT_FRAME_TIMEOUT,
    DEFAULT_OPERATION_TIMEOUT,
};
