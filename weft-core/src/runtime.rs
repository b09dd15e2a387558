//! Reactive Runtime
//!
//! The runtime is the owned reactive context that everything else hangs
//! off: it holds the revision clock and the invalidation listeners that
//! schedulers use for coalescing.
//!
//! Scoping the clock behind an owned value (instead of a process-wide
//! counter) means multiple independent render roots, and every test, get
//! their own clock and never interfere with one another. The runtime is
//! a cheap handle; clones share the same clock.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::track::{
    combine_tags, track, DirtyableTag, Revision, RevisionClock, Tag, UpdatableTag,
};

/// Shared state behind a [`Runtime`] handle.
pub(crate) struct RuntimeShared {
    pub(crate) clock: RevisionClock,

    /// Listeners invoked on every dirty. Registered weakly so a dropped
    /// scheduler does not keep firing.
    invalidation: RwLock<Vec<Weak<dyn Fn() + Send + Sync>>>,
}

impl RuntimeShared {
    /// Fan an invalidation out to every live listener, pruning dead ones.
    pub(crate) fn notify_invalidation(&self) {
        let (listeners, registered) = {
            let guard = self.invalidation.read();
            let live: Vec<_> = guard.iter().filter_map(Weak::upgrade).collect();
            let registered = guard.len();
            (live, registered)
        };

        if listeners.len() < registered {
            self.invalidation
                .write()
                .retain(|weak| weak.strong_count() > 0);
        }

        for listener in listeners {
            listener();
        }
    }
}

/// The owned reactive context: revision clock plus invalidation fan-out.
///
/// # Example
///
/// ```rust,ignore
/// let rt = Runtime::new();
/// let tag = rt.dirtyable_tag();
///
/// let snapshot = tag.tag().value();
/// tag.dirty();
/// assert!(!tag.tag().validate(snapshot));
/// ```
#[derive(Clone)]
pub struct Runtime {
    shared: Arc<RuntimeShared>,
}

impl Runtime {
    /// Create a fresh runtime with its own clock.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(RuntimeShared {
                clock: RevisionClock::new(),
                invalidation: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Snapshot the current revision clock.
    pub fn revision(&self) -> Revision {
        self.shared.clock.current()
    }

    /// Create a dirtyable leaf tag.
    pub fn dirtyable_tag(&self) -> DirtyableTag {
        DirtyableTag::new(Arc::clone(&self.shared), None)
    }

    /// Create a dirtyable leaf tag with a diagnostic label, shown by the
    /// debug-build stale-read check (`owner.property` reads well).
    pub fn dirtyable_tag_labeled(&self, label: &str) -> DirtyableTag {
        DirtyableTag::new(Arc::clone(&self.shared), Some(Arc::from(label)))
    }

    /// Create an updatable (rebindable) leaf tag.
    pub fn updatable_tag(&self) -> UpdatableTag {
        UpdatableTag::new(Arc::clone(&self.shared))
    }

    /// Combine tags into one that is valid iff every input is.
    pub fn combine(&self, tags: impl IntoIterator<Item = Tag>) -> Tag {
        combine_tags(&self.shared, tags)
    }

    /// Run `f` inside a tracking frame, returning its result and the
    /// combinator of everything consumed.
    pub fn track<R>(&self, f: impl FnOnce() -> R) -> (R, Tag) {
        track(self, f)
    }

    /// Register a listener invoked every time any tag created from this
    /// runtime is dirtied. The listener lives as long as the returned
    /// handle is held.
    #[must_use = "the listener is dropped with the returned handle"]
    pub fn on_invalidate(&self, f: impl Fn() + Send + Sync + 'static) -> InvalidationHandle {
        let listener: Arc<dyn Fn() + Send + Sync> = Arc::new(f);
        self.shared
            .invalidation
            .write()
            .push(Arc::downgrade(&listener));
        InvalidationHandle { _listener: listener }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("revision", &self.revision())
            .finish()
    }
}

/// Keeps an invalidation listener alive; dropping it unregisters.
pub struct InvalidationHandle {
    _listener: Arc<dyn Fn() + Send + Sync>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn runtimes_have_independent_clocks() {
        let rt1 = Runtime::new();
        let rt2 = Runtime::new();

        let tag = rt1.dirtyable_tag();
        tag.dirty();
        tag.dirty();

        assert!(rt1.revision() > rt2.revision());
        assert_eq!(rt2.revision(), crate::track::INITIAL);
    }

    #[test]
    fn invalidation_listeners_fire_on_dirty() {
        let rt = Runtime::new();
        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();

        let _handle = rt.on_invalidate(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        let tag = rt.dirtyable_tag();
        tag.dirty();
        tag.dirty();

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dropped_listeners_stop_firing() {
        let rt = Runtime::new();
        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();

        let handle = rt.on_invalidate(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        let tag = rt.dirtyable_tag();
        tag.dirty();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        drop(handle);
        tag.dirty();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
