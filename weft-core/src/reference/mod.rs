//! Reference Hierarchy
//!
//! A reference is a lazy, pull-based value cell paired with the tag that
//! governs when it must be recomputed. The two-method [`Reference`]
//! contract is the seam any custom state source implements to plug into
//! the render tree.
//!
//! # Variants
//!
//! - [`ConstReference`]: a fixed value with the constant tag.
//! - [`TrackedCell`]: the explicit mutable leaf; setting it dirties its
//!   tag unless the new value compares equal.
//! - [`CachedReference`]: the central memoization primitive; recomputes
//!   only across a tag-invalidation boundary.
//! - [`PropertyReference`]: derives its value by reading a property off
//!   a parent reference's value inside a tracking frame.
//! - [`TrackedMap`]: a keyed container with one cell per key, giving
//!   per-key invalidation.

mod cached;
mod cell;
mod map;
mod property;

pub use cached::CachedReference;
pub use cell::TrackedCell;
pub use map::TrackedMap;
pub use property::{track_property, PropertyReference};

use std::sync::Arc;

use crate::track::Tag;
use crate::value::Value;

/// A lazy, pull-based value cell with a governing tag.
///
/// `value()` may be arbitrarily expensive; callers snapshot `tag()` and
/// revalidate instead of re-pulling. Pulling a reference inside a
/// tracking frame consumes its tag, so enclosing computations pick up
/// the dependency automatically.
pub trait Reference: Send + Sync {
    /// The type of value this reference produces.
    type Value;

    /// Pull the current value.
    fn value(&self) -> Self::Value;

    /// The tag governing when the value must be re-pulled.
    fn tag(&self) -> Tag;
}

/// A shared dynamically-typed reference, as used by the render tree.
pub type ValueRef = Arc<dyn Reference<Value = Value>>;

/// A reference to a value that never changes.
#[derive(Clone, Debug)]
pub struct ConstReference<T> {
    value: T,
}

impl<T> ConstReference<T> {
    /// Wrap a fixed value.
    pub fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T> Reference for ConstReference<T>
where
    T: Clone + Send + Sync,
{
    type Value = T;

    fn value(&self) -> T {
        self.value.clone()
    }

    fn tag(&self) -> Tag {
        Tag::constant()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn const_reference_has_constant_tag() {
        let reference = ConstReference::new(Value::str("fixed"));
        assert_eq!(reference.value(), Value::str("fixed"));
        assert!(reference.tag().is_constant());
    }
}
