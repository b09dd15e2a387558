//! Helper Registry & Arguments
//!
//! Helpers are resolved through an explicit registry keyed by name;
//! there is no implicit lookup through any inheritance chain. A helper
//! receives its arguments as a read-only [`Arguments`] view: an ordered
//! snapshot of positional and named argument references that exposes
//! accessors and nothing else, so immutability is a property of the
//! type rather than a runtime trap.
//!
//! Pulling an argument inside a helper body happens within the helper's
//! tracking frame, so argument dependencies propagate automatically.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::reference::{Reference, ValueRef};
use crate::value::Value;

/// A registered helper function.
pub type HelperFn = Arc<dyn Fn(&Arguments) -> Value + Send + Sync>;

/// Named helper implementations, looked up by stable name.
#[derive(Clone, Default)]
pub struct Registry {
    helpers: IndexMap<String, HelperFn>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a helper under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: impl Into<String>, helper: F)
    where
        F: Fn(&Arguments) -> Value + Send + Sync + 'static,
    {
        self.helpers.insert(name.into(), Arc::new(helper));
    }

    /// Look a helper up by name.
    pub fn lookup(&self, name: &str) -> Option<HelperFn> {
        self.helpers.get(name).cloned()
    }

    /// Registered helper names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.helpers.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("helpers", &self.helpers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A read-only view over a helper invocation's captured arguments.
///
/// Accessors pull the underlying references, so reading an argument
/// inside a tracked computation records the dependency.
pub struct Arguments {
    positional: Vec<ValueRef>,
    named: IndexMap<String, ValueRef>,
}

impl Arguments {
    pub(crate) fn new(positional: Vec<ValueRef>, named: IndexMap<String, ValueRef>) -> Self {
        Self { positional, named }
    }

    /// Pull the positional argument at `index`.
    pub fn positional(&self, index: usize) -> Option<Value> {
        self.positional.get(index).map(|r| r.value())
    }

    /// Number of positional arguments.
    pub fn positional_len(&self) -> usize {
        self.positional.len()
    }

    /// Pull the named argument `name`.
    pub fn named(&self, name: &str) -> Option<Value> {
        self.named.get(name).map(|r| r.value())
    }

    /// Whether a named argument is present (without pulling it).
    pub fn has_named(&self, name: &str) -> bool {
        self.named.contains_key(name)
    }

    /// Named argument keys, in declaration order.
    pub fn named_keys(&self) -> impl Iterator<Item = &str> {
        self.named.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::ConstReference;

    fn args() -> Arguments {
        let positional: Vec<ValueRef> = vec![
            Arc::new(ConstReference::new(Value::Int(1))),
            Arc::new(ConstReference::new(Value::str("two"))),
        ];
        let mut named: IndexMap<String, ValueRef> = IndexMap::new();
        named.insert(
            "sep".to_string(),
            Arc::new(ConstReference::new(Value::str(", "))) as ValueRef,
        );
        Arguments::new(positional, named)
    }

    #[test]
    fn accessors_pull_arguments() {
        let args = args();
        assert_eq!(args.positional(0), Some(Value::Int(1)));
        assert_eq!(args.positional(2), None);
        assert_eq!(args.positional_len(), 2);
        assert_eq!(args.named("sep"), Some(Value::str(", ")));
        assert!(args.has_named("sep"));
        assert!(!args.has_named("other"));
        assert_eq!(args.named_keys().collect::<Vec<_>>(), vec!["sep"]);
    }

    #[test]
    fn registry_resolves_by_name() {
        let mut registry = Registry::new();
        registry.register("shout", |args: &Arguments| {
            let text = args.positional(0).unwrap_or_default().to_display_string();
            Value::str(text.to_uppercase())
        });

        let helper = registry.lookup("shout").expect("registered");
        assert_eq!(helper(&args()), Value::str("1"));
        assert!(registry.lookup("whisper").is_none());
    }
}
