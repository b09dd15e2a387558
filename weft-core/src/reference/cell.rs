//! Tracked Cell
//!
//! The explicit mutable leaf of the reference hierarchy. A cell holds a
//! value and a dirtyable tag; reading it inside a tracking frame records
//! the dependency, writing it advances the clock.
//!
//! # Update Short-Circuit
//!
//! `set` compares the incoming value against the current one and does
//! nothing when they are equal. Object-valued cells compare by identity,
//! so re-assigning the same object is not a change. This is what keeps
//! reconciliation quiet: re-seeding an unchanged list item issues zero
//! invalidations.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;

use super::Reference;
use crate::track::{consume, DirtyableTag, Tag};
use crate::Runtime;

/// A mutable tracked value cell.
///
/// Cheaply cloneable; clones share the value and the tag.
///
/// # Example
///
/// ```rust,ignore
/// let rt = Runtime::new();
/// let count = TrackedCell::new(&rt, 0);
///
/// count.set(5);           // dirties the tag
/// count.set(5);           // equal value: no-op
/// ```
pub struct TrackedCell<T> {
    value: Arc<RwLock<T>>,
    tag: DirtyableTag,
}

impl<T> TrackedCell<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a cell with the given initial value.
    pub fn new(runtime: &Runtime, value: T) -> Self {
        Self {
            value: Arc::new(RwLock::new(value)),
            tag: runtime.dirtyable_tag(),
        }
    }

    /// Create a cell carrying a diagnostic label (`owner.property`),
    /// shown by the debug-build stale-read check.
    pub fn new_labeled(runtime: &Runtime, value: T, label: &str) -> Self {
        Self {
            value: Arc::new(RwLock::new(value)),
            tag: runtime.dirtyable_tag_labeled(label),
        }
    }

    /// Read the current value, recording the dependency in any open
    /// tracking frame.
    pub fn get(&self) -> T {
        consume(&self.tag.tag());
        self.value.read().clone()
    }

    /// Read the current value without establishing a dependency.
    pub fn get_untracked(&self) -> T {
        self.value.read().clone()
    }

    /// Replace the value and dirty the tag, unless the new value
    /// compares equal to the current one.
    pub fn set(&self, value: T) {
        {
            let current = self.value.read();
            if *current == value {
                return;
            }
        }
        *self.value.write() = value;
        self.tag.dirty();
    }

    /// Replace the value using a function of the current one.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let next = {
            let current = self.value.read();
            f(&current)
        };
        self.set(next);
    }

    /// The tag governing this cell.
    pub fn tag(&self) -> Tag {
        self.tag.tag()
    }
}

impl<T> Reference for TrackedCell<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    type Value = T;

    fn value(&self) -> T {
        self.get()
    }

    fn tag(&self) -> Tag {
        self.tag.tag()
    }
}

impl<T> Clone for TrackedCell<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            tag: self.tag.clone(),
        }
    }
}

impl<T> Debug for TrackedCell<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedCell")
            .field("value", &self.get_untracked())
            .field("tag", &self.tag())
            .finish()
    }
}
