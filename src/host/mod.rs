//! In-process pages: documents, their frames and the agents that run them.

pub mod page;
pub mod tabs;

pub use page::{build_page, FrameSpec, HostError, PageSpec};
pub use tabs::{FrameOverview, TabHost, TabOverview};
