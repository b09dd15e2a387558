//! Property References
//!
//! A property reference derives its value by reading `parent[key]`. The
//! read runs inside a tracking frame, so a property backed by a getter
//! that itself reads other tracked fields produces a transitively
//! correct dependency set with no manual declaration.
//!
//! `create` picks a root-level implementation when the parent reference
//! is constant (the parent value is captured once and never re-pulled)
//! and a nested implementation otherwise (the parent is re-pulled on
//! each compute, so re-parenting invalidates the property).

use super::{CachedReference, Reference, ValueRef};
use crate::track::Tag;
use crate::value::Value;
use crate::Runtime;

/// Read `parent[key]` inside a tracking frame, returning the value and
/// the tag covering everything read during the access.
pub fn track_property(runtime: &Runtime, parent: &Value, key: &str) -> (Value, Tag) {
    runtime.track(|| parent.get(key))
}

/// A reference to one property of a parent reference's value.
pub struct PropertyReference {
    cached: CachedReference<Value>,
    root: bool,
}

impl PropertyReference {
    /// Build a property reference over `parent[key]`.
    pub fn create(runtime: &Runtime, parent: ValueRef, key: impl Into<String>) -> Self {
        let key = key.into();
        if parent.tag().is_constant() {
            // The parent can never change: capture its value once and
            // skip the combinator over the parent tag.
            let value = parent.value();
            Self {
                cached: CachedReference::new(runtime, move || value.get(&key)),
                root: true,
            }
        } else {
            Self {
                cached: CachedReference::new(runtime, move || parent.value().get(&key)),
                root: false,
            }
        }
    }

    /// Whether this is the root-level (constant-parent) implementation.
    pub fn is_root(&self) -> bool {
        self.root
    }
}

impl Reference for PropertyReference {
    type Value = Value;

    fn value(&self) -> Value {
        self.cached.get()
    }

    fn tag(&self) -> Tag {
        self.cached.tag()
    }
}

impl std::fmt::Debug for PropertyReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyReference")
            .field("root", &self.root)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::{ConstReference, TrackedCell, TrackedMap};
    use std::sync::Arc;

    #[test]
    fn track_property_covers_tracked_reads() {
        let rt = Runtime::new();
        let map = Arc::new(TrackedMap::new(&rt, "user"));
        map.set("name", Value::str("Ada"));
        let parent = Value::object(map.clone());

        let (value, tag) = track_property(&rt, &parent, "name");
        assert_eq!(value, Value::str("Ada"));

        let snapshot = tag.value();
        map.set("name", Value::str("Grace"));
        assert!(!tag.validate(snapshot));
    }

    #[test]
    fn static_reads_produce_a_constant_tag() {
        let rt = Runtime::new();
        let parent = Value::map([("fixed".to_string(), Value::Int(1))]);

        let (value, tag) = track_property(&rt, &parent, "fixed");
        assert_eq!(value, Value::Int(1));
        assert!(tag.is_constant());
    }

    #[test]
    fn constant_parent_uses_the_root_implementation() {
        let rt = Runtime::new();
        let map = Arc::new(TrackedMap::new(&rt, "user"));
        map.set("name", Value::str("Ada"));

        let parent: ValueRef = Arc::new(ConstReference::new(Value::object(map.clone())));
        let name = PropertyReference::create(&rt, parent, "name");
        assert!(name.is_root());

        assert_eq!(name.value(), Value::str("Ada"));

        let snapshot = name.tag().value();
        map.set("name", Value::str("Grace"));
        assert!(!name.tag().validate(snapshot));
        assert_eq!(name.value(), Value::str("Grace"));
    }

    #[test]
    fn reparenting_invalidates_nested_properties() {
        let rt = Runtime::new();

        let ada = Arc::new(TrackedMap::new(&rt, "ada"));
        ada.set("name", Value::str("Ada"));
        let grace = Arc::new(TrackedMap::new(&rt, "grace"));
        grace.set("name", Value::str("Grace"));

        let current = TrackedCell::new(&rt, Value::object(ada));
        let parent: ValueRef = Arc::new(current.clone());
        let name = PropertyReference::create(&rt, parent, "name");
        assert!(!name.is_root());

        assert_eq!(name.value(), Value::str("Ada"));

        let snapshot = name.tag().value();
        current.set(Value::object(grace));
        assert!(!name.tag().validate(snapshot));
        assert_eq!(name.value(), Value::str("Grace"));
    }

    #[test]
    fn chained_properties_track_through_maps() {
        let rt = Runtime::new();
        let profile = Arc::new(TrackedMap::new(&rt, "profile"));
        profile.set("city", Value::str("London"));

        let user = Arc::new(TrackedMap::new(&rt, "user"));
        user.set("profile", Value::object(profile.clone()));

        let parent: ValueRef = Arc::new(ConstReference::new(Value::object(user)));
        let profile_ref = PropertyReference::create(&rt, parent, "profile");
        let city = PropertyReference::create(&rt, Arc::new(profile_ref), "city");

        assert_eq!(city.value(), Value::str("London"));

        let snapshot = city.tag().value();
        profile.set("city", Value::str("Turin"));
        assert!(!city.tag().validate(snapshot));
        assert_eq!(city.value(), Value::str("Turin"));
    }
}
