//! Named element accessors.
//!
//! An entry instruction whose target looks like `name()` is resolved by the
//! accessor registered under `name` instead of a selector query. Accessors
//! are compiled Rust callbacks registered up front; nothing is evaluated from
//! instruction text.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::dom::{Document, NodeId};

pub trait ElementAccessor: Send + Sync {
    fn locate(&self, doc: &Document) -> Option<NodeId>;
}

impl<F> ElementAccessor for F
where
    F: Fn(&Document) -> Option<NodeId> + Send + Sync,
{
    fn locate(&self, doc: &Document) -> Option<NodeId> {
        self(doc)
    }
}

/// Accessor that resolves a fixed selector. Lets callers outside the
/// process register names without supplying code.
#[derive(Debug, Clone)]
pub struct SelectorAlias {
    selector: String,
}

impl SelectorAlias {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
        }
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }
}

impl ElementAccessor for SelectorAlias {
    fn locate(&self, doc: &Document) -> Option<NodeId> {
        doc.query_selector(&self.selector).ok().flatten()
    }
}

/// Shared name -> accessor table. Clones share the same table.
#[derive(Clone, Default)]
pub struct AccessorRegistry {
    accessors: Arc<RwLock<HashMap<String, Arc<dyn ElementAccessor>>>>,
}

impl AccessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) an accessor. Names must be identifiers.
    pub fn register(&self, name: &str, accessor: impl ElementAccessor + 'static) -> bool {
        if !is_accessor_name(name) {
            tracing::warn!(name, "Rejected accessor with invalid name");
            return false;
        }
        self.accessors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), Arc::new(accessor));
        tracing::debug!(name, "Registered accessor");
        true
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.accessors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ElementAccessor>> {
        self.accessors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .accessors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Resolves a target: `name()` through the registry (unknown names find
    /// nothing), anything else as a selector.
    pub fn resolve(&self, doc: &Document, target: &str) -> Option<NodeId> {
        match call_name(target) {
            Some(name) => self.get(name)?.locate(doc),
            None => doc.query_selector(target.trim()).ok().flatten(),
        }
    }
}

/// `Some("name")` for call-like targets such as `name()`.
pub fn call_name(target: &str) -> Option<&str> {
    target
        .trim()
        .strip_suffix("()")
        .filter(|name| is_accessor_name(name))
}

fn is_accessor_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_html;

    #[test]
    fn test_call_like_targets() {
        assert_eq!(call_name("getCardField()"), Some("getCardField"));
        assert_eq!(call_name("  $pick() "), Some("$pick"));
        assert_eq!(call_name("#email"), None);
        assert_eq!(call_name("a b()"), None);
        assert_eq!(call_name("()"), None);
    }

    #[test]
    fn test_registry_resolves_closures_and_aliases() {
        let doc = parse_html(
            "https://example.com/",
            r#"<div class="card"><input name="number"></div><input id="email">"#,
        )
        .unwrap();
        let registry = AccessorRegistry::new();
        assert!(registry.register("cardNumber", |doc: &Document| {
            doc.query_selector(".card input").ok().flatten()
        }));
        assert!(registry.register("email", SelectorAlias::new("#email")));
        assert!(!registry.register("not valid", SelectorAlias::new("#email")));

        let shared = registry.clone();
        assert_eq!(shared.names(), vec!["cardNumber".to_string(), "email".to_string()]);

        let number = doc.query_selector(r#"[name="number"]"#).unwrap();
        assert_eq!(shared.resolve(&doc, "cardNumber()"), number);
        assert_eq!(shared.resolve(&doc, "email()"), doc.query_selector("#email").unwrap());
        assert_eq!(shared.resolve(&doc, "missing()"), None);
        assert_eq!(shared.resolve(&doc, "#email"), doc.query_selector("#email").unwrap());

        assert!(registry.unregister("email"));
        assert_eq!(shared.resolve(&doc, "email()"), None);
    }
}
