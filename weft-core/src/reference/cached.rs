//! Cached Reference
//!
//! The central memoization primitive. A cached reference runs its
//! compute function inside a tracking frame, remembers the result and a
//! clock snapshot, and rebinds its governing updatable tag to the
//! combinator of everything the compute consumed. The next pull
//! revalidates the snapshot and returns the cached value unless a
//! dependency was dirtied in between.
//!
//! Recomputation happens only across a tag-invalidation boundary, never
//! on a timer or an explicit invalidation call. A recompute may itself
//! read other tracked state, recursively extending the dependency set
//! captured by an enclosing frame: the cached reference consumes its own
//! tag, so outer computations see the derived combinator rather than the
//! inner leaves.
//!
//! A compute function that pulls its own reference recurses without
//! bound; self-referential computations are a caller error.

use std::sync::Arc;

use parking_lot::RwLock;

use super::Reference;
use crate::track::{consume, Revision, Tag, UpdatableTag, CONSTANT};
use crate::Runtime;

struct CachedState<T> {
    last_value: Option<T>,
    last_snapshot: Revision,
}

/// A memoized, auto-tracked derived value.
///
/// # Example
///
/// ```rust,ignore
/// let first = TrackedCell::new(&rt, Value::str("Ada"));
/// let last = TrackedCell::new(&rt, Value::str("Lovelace"));
///
/// let full = CachedReference::new(&rt, move || {
///     Value::str(format!("{} {}", first.get(), last.get()))
/// });
///
/// full.value();   // computes, tracks `first` and `last`
/// full.value();   // cached: nothing changed
/// ```
pub struct CachedReference<T> {
    runtime: Runtime,
    compute: Arc<dyn Fn() -> T + Send + Sync>,
    state: Arc<RwLock<CachedState<T>>>,
    tag: UpdatableTag,
}

impl<T> CachedReference<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a cached reference. The compute function does not run
    /// until the first pull.
    pub fn new<F>(runtime: &Runtime, compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            runtime: runtime.clone(),
            compute: Arc::new(compute),
            state: Arc::new(RwLock::new(CachedState {
                last_value: None,
                last_snapshot: CONSTANT,
            })),
            tag: runtime.updatable_tag(),
        }
    }

    /// Pull the value, recomputing only if the cached snapshot fails
    /// validation.
    pub fn get(&self) -> T {
        {
            let state = self.state.read();
            if let Some(value) = &state.last_value {
                if self.tag.tag().validate(state.last_snapshot) {
                    let value = value.clone();
                    drop(state);
                    consume(&self.tag.tag());
                    return value;
                }
            }
        }

        let (value, dependencies) = self.runtime.track(|| (self.compute)());
        self.tag.update(dependencies);
        let snapshot = self.tag.tag().value();

        {
            let mut state = self.state.write();
            state.last_value = Some(value.clone());
            state.last_snapshot = snapshot;
        }

        consume(&self.tag.tag());
        value
    }

    /// Whether a value has been computed yet.
    pub fn has_value(&self) -> bool {
        self.state.read().last_value.is_some()
    }
}

impl<T> Reference for CachedReference<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Value = T;

    fn value(&self) -> T {
        self.get()
    }

    fn tag(&self) -> Tag {
        self.tag.tag()
    }
}

impl<T> Clone for CachedReference<T> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
            compute: Arc::clone(&self.compute),
            state: Arc::clone(&self.state),
            tag: self.tag.clone(),
        }
    }
}

impl<T> std::fmt::Debug for CachedReference<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedReference")
            .field("has_value", &self.has_value())
            .field("tag", &self.tag.tag())
            .finish()
    }
}
