//! Tracked Map
//!
//! A keyed container with one tracked cell per key. Reading a key
//! subscribes to that key alone, so writing `user.name` invalidates the
//! bindings that read `name` and nothing else.
//!
//! Cells are created lazily on first access: reading a key that was
//! never written yields `Undefined` but still subscribes, so a later
//! write to that key invalidates the reader.

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::TrackedCell;
use crate::value::{TrackedObject, Value};
use crate::Runtime;

/// A map of independently tracked values, usable as a render root or as
/// any object in the value graph.
///
/// # Example
///
/// ```rust,ignore
/// let state = Arc::new(TrackedMap::new(&rt, "state"));
/// state.set("greeting", Value::str("hello"));
///
/// // Bound into a template as `this.greeting`; writing the key later
/// // invalidates exactly the bindings that read it.
/// state.set("greeting", Value::str("goodbye"));
/// ```
pub struct TrackedMap {
    runtime: Runtime,
    label: String,
    entries: RwLock<IndexMap<String, TrackedCell<Value>>>,
}

impl TrackedMap {
    /// Create an empty map. The label names this object in diagnostics
    /// (`label.key` identifies a cell).
    pub fn new(runtime: &Runtime, label: &str) -> Self {
        Self {
            runtime: runtime.clone(),
            label: label.to_string(),
            entries: RwLock::new(IndexMap::new()),
        }
    }

    fn cell(&self, key: &str) -> TrackedCell<Value> {
        {
            let entries = self.entries.read();
            if let Some(cell) = entries.get(key) {
                return cell.clone();
            }
        }

        let mut entries = self.entries.write();
        entries
            .entry(key.to_string())
            .or_insert_with(|| {
                TrackedCell::new_labeled(
                    &self.runtime,
                    Value::Undefined,
                    &format!("{}.{}", self.label, key),
                )
            })
            .clone()
    }

    /// Read a key, subscribing any open tracking frame to it.
    pub fn get(&self, key: &str) -> Value {
        self.cell(key).get()
    }

    /// Write a key. Equal values are a no-op; otherwise the key's cell
    /// is dirtied.
    pub fn set(&self, key: &str, value: Value) {
        self.cell(key).set(value);
    }

    /// The keys currently present, in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}

impl TrackedObject for TrackedMap {
    fn read(&self, key: &str) -> Value {
        self.get(key)
    }

    fn enumerate(&self, f: &mut dyn FnMut(Value)) -> bool {
        let cells: Vec<TrackedCell<Value>> =
            self.entries.read().values().cloned().collect();
        for cell in cells {
            f(cell.get());
        }
        true
    }

    fn object_label(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_invalidate_independently() {
        let rt = Runtime::new();
        let map = TrackedMap::new(&rt, "state");
        map.set("a", Value::Int(1));
        map.set("b", Value::Int(2));

        let (_, a_tag) = rt.track(|| map.get("a"));
        let (_, b_tag) = rt.track(|| map.get("b"));

        let a_snapshot = a_tag.value();
        let b_snapshot = b_tag.value();

        map.set("b", Value::Int(20));

        assert!(a_tag.validate(a_snapshot));
        assert!(!b_tag.validate(b_snapshot));
    }

    #[test]
    fn reading_an_unset_key_still_subscribes() {
        let rt = Runtime::new();
        let map = TrackedMap::new(&rt, "state");

        let (value, tag) = rt.track(|| map.get("later"));
        assert_eq!(value, Value::Undefined);

        let snapshot = tag.value();
        map.set("later", Value::Int(1));
        assert!(!tag.validate(snapshot));
    }

    #[test]
    fn equal_writes_stay_quiet() {
        let rt = Runtime::new();
        let map = TrackedMap::new(&rt, "state");
        map.set("a", Value::str("x"));

        let (_, tag) = rt.track(|| map.get("a"));
        let snapshot = tag.value();

        map.set("a", Value::str("x"));
        assert!(tag.validate(snapshot));
    }

    #[test]
    fn enumerates_values_in_insertion_order() {
        let rt = Runtime::new();
        let map = TrackedMap::new(&rt, "state");
        map.set("first", Value::Int(1));
        map.set("second", Value::Int(2));

        let mut seen = Vec::new();
        assert!(map.enumerate(&mut |v| seen.push(v)));
        assert_eq!(seen, vec![Value::Int(1), Value::Int(2)]);
    }
}
