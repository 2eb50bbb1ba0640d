//! Per-frame content logic: each frame runs one agent that owns its
//! selection and answers coordinator requests.

pub mod handler;
pub mod protocol;
pub mod runtime;
pub mod session;

pub use handler::{
    interactive_elements, AgentContext, FrameAgent, StatusEvent, StatusLevel, AUTO_SELECT_SELECTORS,
};
pub use protocol::{FrameRequest, FrameResponse, FrameStats, SelectionSummary, SummaryItem};
pub use runtime::{spawn_frame, FrameEndpoint, FrameError, FrameHandle};
pub use session::SelectionSession;
