//! Frame addressing: how an instruction names the frame it targets, and how
//! each frame decides whether an instruction is meant for it.

pub mod codec;
pub mod locator;
pub mod resolver;
pub mod window;

pub use codec::{decode, encode, join_scoped, split_scoped, FrameContext, DESCENT_MARKER, TOP_FRAME_MARKER};
pub use locator::{FrameLocator, SrcMatch, SrcPattern};
pub use resolver::{FrameEnv, FrameResolver, RoutingDecision, RoutingReason};
pub use window::{EmbeddingSnapshot, Embedding, FrameId, FrameWindow, TOP_FRAME_ID};
