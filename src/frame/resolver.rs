//! Per-frame routing: should an instruction addressed to a given frame
//! context be handled in this frame?
//!
//! Frame identity cannot always be observed directly, so the rules fall back
//! from the embedding element, to this frame's own URL, to "assume it's
//! us". Every decision carries the rule that produced it.

use serde::Serialize;

use super::codec::FrameContext;
use super::locator::{resolve_src, FrameLocator, UrlPatterns};
use super::window::EmbeddingSnapshot;

/// What a frame knows about itself when routing.
#[derive(Debug, Clone)]
pub struct FrameEnv {
    pub is_top: bool,
    pub url: String,
    /// Present only for same-origin child frames.
    pub embedding: Option<EmbeddingSnapshot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingReason {
    TopFrameTarget,
    ChildTargetAtTop,
    MalformedContext,
    IdMatch,
    NameMatch,
    TitleMatch,
    ClassMatch,
    IndexMatch,
    SrcAttributeMatch,
    CssMatch,
    UrlPatternMatch,
    UrlPatternMismatch,
    NoPatternDefault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoutingDecision {
    pub handle: bool,
    pub reason: RoutingReason,
}

impl RoutingDecision {
    fn new(handle: bool, reason: RoutingReason) -> Self {
        Self { handle, reason }
    }
}

pub struct FrameResolver;

impl FrameResolver {
    pub fn should_handle(context: &FrameContext, env: &FrameEnv) -> bool {
        Self::resolve(context, env).handle
    }

    pub fn resolve(context: &FrameContext, env: &FrameEnv) -> RoutingDecision {
        let decision = match context {
            FrameContext::Top => RoutingDecision::new(env.is_top, RoutingReason::TopFrameTarget),
            FrameContext::Malformed(_) => {
                RoutingDecision::new(!env.is_top, RoutingReason::MalformedContext)
            }
            FrameContext::Iframe(_) if env.is_top => {
                RoutingDecision::new(false, RoutingReason::ChildTargetAtTop)
            }
            FrameContext::Iframe(locator) => env
                .embedding
                .as_ref()
                .and_then(|frame| match_embedding(locator, frame))
                .map(|reason| RoutingDecision::new(true, reason))
                .unwrap_or_else(|| match_own_url(locator, &env.url)),
        };

        tracing::debug!(
            url = %env.url,
            is_top = env.is_top,
            handle = decision.handle,
            reason = ?decision.reason,
            "Frame routing decision"
        );
        decision
    }
}

fn match_embedding(locator: &FrameLocator, frame: &EmbeddingSnapshot) -> Option<RoutingReason> {
    let matched = match locator {
        FrameLocator::Id(id) => frame.id.as_deref() == Some(id.as_str()),
        FrameLocator::Name(name) => frame.name.as_deref() == Some(name.as_str()),
        FrameLocator::Title(title) => frame.title.as_deref() == Some(title.as_str()),
        FrameLocator::Class(class_name) => frame.classes.iter().any(|c| c == class_name),
        FrameLocator::Index(n) => frame.index == Some(*n),
        FrameLocator::Src(patterns) => frame.src.as_deref().is_some_and(|src| {
            patterns.iter().all(|p| p.test(src))
                || resolve_src(src, &frame.parent_url)
                    .is_some_and(|resolved| patterns.iter().all(|p| p.test(&resolved)))
        }),
        FrameLocator::Css(raw) => frame
            .parent
            .read()
            .matches(frame.element, raw)
            .unwrap_or(false),
        FrameLocator::Generic => false,
    };

    matched.then_some(match locator {
        FrameLocator::Id(_) => RoutingReason::IdMatch,
        FrameLocator::Name(_) => RoutingReason::NameMatch,
        FrameLocator::Title(_) => RoutingReason::TitleMatch,
        FrameLocator::Class(_) => RoutingReason::ClassMatch,
        FrameLocator::Index(_) => RoutingReason::IndexMatch,
        FrameLocator::Src(_) => RoutingReason::SrcAttributeMatch,
        FrameLocator::Css(_) | FrameLocator::Generic => RoutingReason::CssMatch,
    })
}

fn match_own_url(locator: &FrameLocator, url: &str) -> RoutingDecision {
    let matched = match locator.url_patterns() {
        UrlPatterns::All(patterns) => patterns.iter().all(|p| p.test(url)),
        UrlPatterns::Any(patterns) => patterns.iter().any(|p| p.test(url)),
        UrlPatterns::None => return RoutingDecision::new(true, RoutingReason::NoPatternDefault),
    };

    if matched {
        RoutingDecision::new(true, RoutingReason::UrlPatternMatch)
    } else {
        RoutingDecision::new(false, RoutingReason::UrlPatternMismatch)
    }
}
