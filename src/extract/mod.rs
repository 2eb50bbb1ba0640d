//! Turning selected elements into persisted descriptors.

pub mod descriptor;
pub mod labels;
pub mod signature;
pub mod synthesizer;

pub use descriptor::{
    dedupe_descriptors, describe, element_type, Accessibility, ElementDescriptor, FrameInfo,
    FrameScope, Validation,
};
pub use labels::{derive_label, LabelMode};
pub use signature::{default_page_name, dom_signature, page_id};
pub use synthesizer::{SelectorSynthesizer, DEFAULT_CLASS_MATCH_THRESHOLD};
