//! Iteration Artifacts
//!
//! The per-list bookkeeping that survives across render passes: one pair
//! of tracked cells per key. Reconciliation matches incoming items to
//! existing keys, updates matched cells in place (so downstream
//! references and caches keep their identity), creates cells for new
//! keys, and tears down keys that disappeared.
//!
//! The summary returned from [`IterationArtifacts::reconcile`] tells the
//! consumer exactly which keys were created, which moved out of their
//! previous relative order, and which were removed; everything else is
//! retained in place.

use std::collections::VecDeque;

use indexmap::{IndexMap, IndexSet};

use super::{ItemKey, KeyedIterator};
use crate::reference::TrackedCell;
use crate::value::Value;
use crate::Runtime;

/// The pair of cells backing one rendered item.
///
/// `value` carries the item itself, `memo` its positional companion
/// (index or map key). Both are updated in place across passes; the
/// equality short-circuit in [`TrackedCell::set`] keeps unchanged items
/// from issuing any invalidation.
#[derive(Clone)]
pub struct ItemCells {
    pub value: TrackedCell<Value>,
    pub memo: TrackedCell<Value>,
}

impl ItemCells {
    fn new(runtime: &Runtime, value: Value, memo: Value) -> Self {
        Self {
            value: TrackedCell::new(runtime, value),
            memo: TrackedCell::new(runtime, memo),
        }
    }
}

/// Summary of one reconciliation pass.
#[derive(Debug, Default)]
pub struct Reconciliation {
    /// Final key order.
    pub order: Vec<ItemKey>,
    /// Keys that did not exist last pass.
    pub created: IndexSet<ItemKey>,
    /// Retained keys that left their previous relative order.
    pub moved: IndexSet<ItemKey>,
    /// Keys from the previous pass with no match; their cells are gone.
    pub removed: Vec<ItemKey>,
}

impl Reconciliation {
    /// Whether this pass changed membership or order at all.
    pub fn is_quiet(&self) -> bool {
        self.created.is_empty() && self.moved.is_empty() && self.removed.is_empty()
    }
}

/// Keyed cells for one list, matched across passes.
pub struct IterationArtifacts {
    runtime: Runtime,
    items: IndexMap<ItemKey, ItemCells>,
}

impl IterationArtifacts {
    /// Create empty artifacts; the first reconciliation seeds them.
    pub fn new(runtime: &Runtime) -> Self {
        Self {
            runtime: runtime.clone(),
            items: IndexMap::new(),
        }
    }

    /// The cells for a key, if it is currently present.
    pub fn get(&self, key: &ItemKey) -> Option<&ItemCells> {
        self.items.get(key)
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether no keys are live.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Match the incoming items against the current keys.
    ///
    /// Matched keys update their cells in place; unmatched old keys are
    /// dropped; unmatched new keys get fresh cells. Duplicate keys keep
    /// the first occurrence.
    pub fn reconcile(&mut self, mut iter: KeyedIterator) -> Reconciliation {
        let mut incoming: Vec<super::IterationItem> = Vec::new();
        let mut seen: IndexSet<ItemKey> = IndexSet::new();
        if !iter.is_empty() {
            while let Some(item) = iter.next() {
                if seen.insert(item.key.clone()) {
                    incoming.push(item);
                }
            }
        }

        let removed: Vec<ItemKey> = self
            .items
            .keys()
            .filter(|key| !seen.contains(*key))
            .cloned()
            .collect();
        for key in &removed {
            self.items.shift_remove(key);
        }

        // Surviving keys in their previous order; anything matched out
        // of step with this queue has moved.
        let mut pending: VecDeque<ItemKey> = self.items.keys().cloned().collect();

        let mut created = IndexSet::new();
        let mut moved = IndexSet::new();
        let mut next_items: IndexMap<ItemKey, ItemCells> =
            IndexMap::with_capacity(incoming.len());

        for item in incoming {
            match self.items.get(&item.key) {
                Some(cells) => {
                    cells.value.set(item.value);
                    cells.memo.set(item.memo);

                    if pending.front() == Some(&item.key) {
                        pending.pop_front();
                    } else {
                        if let Some(pos) = pending.iter().position(|k| *k == item.key) {
                            pending.remove(pos);
                        }
                        moved.insert(item.key.clone());
                    }
                    next_items.insert(item.key.clone(), cells.clone());
                }
                None => {
                    let cells = ItemCells::new(&self.runtime, item.value, item.memo);
                    created.insert(item.key.clone());
                    next_items.insert(item.key, cells);
                }
            }
        }

        self.items = next_items;

        Reconciliation {
            order: self.items.keys().cloned().collect(),
            created,
            moved,
            removed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterate::KeyPolicy;
    use crate::track::Revision;

    fn ids(values: &[i64]) -> Value {
        Value::list(
            values
                .iter()
                .map(|id| Value::map([("id".to_string(), Value::Int(*id))])),
        )
    }

    fn reconcile_ids(
        artifacts: &mut IterationArtifacts,
        values: &[i64],
    ) -> Reconciliation {
        let policy = KeyPolicy::parse("id").unwrap();
        let iter = KeyedIterator::from_value(&ids(values), &policy).unwrap();
        artifacts.reconcile(iter)
    }

    fn cell_revisions(artifacts: &IterationArtifacts) -> Vec<(Revision, Revision)> {
        artifacts
            .items
            .values()
            .map(|cells| (cells.value.tag().revision(), cells.memo.tag().revision()))
            .collect()
    }

    #[test]
    fn first_pass_creates_everything() {
        let rt = Runtime::new();
        let mut artifacts = IterationArtifacts::new(&rt);

        let result = reconcile_ids(&mut artifacts, &[1, 2, 3]);
        assert_eq!(result.created.len(), 3);
        assert!(result.moved.is_empty());
        assert!(result.removed.is_empty());
        assert_eq!(artifacts.len(), 3);
    }

    #[test]
    fn unchanged_passes_issue_zero_updates() {
        let rt = Runtime::new();
        let mut artifacts = IterationArtifacts::new(&rt);

        reconcile_ids(&mut artifacts, &[1, 2, 3]);
        let before = cell_revisions(&artifacts);

        let result = reconcile_ids(&mut artifacts, &[1, 2, 3]);
        assert!(result.is_quiet());
        assert_eq!(cell_revisions(&artifacts), before);
    }

    #[test]
    fn reorder_moves_without_recreating() {
        let rt = Runtime::new();
        let mut artifacts = IterationArtifacts::new(&rt);

        reconcile_ids(&mut artifacts, &[1, 2, 3]);
        let tags_before: Vec<u64> = artifacts
            .items
            .values()
            .map(|c| c.value.tag().id())
            .collect();

        let result = reconcile_ids(&mut artifacts, &[3, 1, 2]);

        assert!(result.created.is_empty());
        assert!(result.removed.is_empty());
        assert_eq!(result.moved.len(), 1);
        assert!(result.moved.contains(&ItemKey::Int(3)));
        assert_eq!(
            result.order,
            vec![ItemKey::Int(3), ItemKey::Int(1), ItemKey::Int(2)]
        );

        // Cell identity survived the reorder.
        let mut tags_after: Vec<u64> = artifacts
            .items
            .values()
            .map(|c| c.value.tag().id())
            .collect();
        tags_after.sort_unstable();
        let mut tags_before_sorted = tags_before;
        tags_before_sorted.sort_unstable();
        assert_eq!(tags_after, tags_before_sorted);
    }

    #[test]
    fn disappearing_keys_are_torn_down() {
        let rt = Runtime::new();
        let mut artifacts = IterationArtifacts::new(&rt);

        reconcile_ids(&mut artifacts, &[1, 2, 3]);
        let result = reconcile_ids(&mut artifacts, &[2]);

        assert_eq!(result.removed, vec![ItemKey::Int(1), ItemKey::Int(3)]);
        assert_eq!(artifacts.len(), 1);
        assert!(artifacts.get(&ItemKey::Int(2)).is_some());
    }

    #[test]
    fn matched_items_update_in_place() {
        let rt = Runtime::new();
        let mut artifacts = IterationArtifacts::new(&rt);
        let policy = KeyPolicy::parse("id").unwrap();

        let v1 = Value::list([Value::map([
            ("id".to_string(), Value::Int(1)),
            ("name".to_string(), Value::str("before")),
        ])]);
        artifacts.reconcile(KeyedIterator::from_value(&v1, &policy).unwrap());

        let cells = artifacts.get(&ItemKey::Int(1)).unwrap().clone();
        let snapshot = cells.value.tag().value();

        let v2 = Value::list([Value::map([
            ("id".to_string(), Value::Int(1)),
            ("name".to_string(), Value::str("after")),
        ])]);
        let result = artifacts.reconcile(KeyedIterator::from_value(&v2, &policy).unwrap());

        assert!(result.is_quiet());
        assert!(!cells.value.tag().validate(snapshot));
        assert_eq!(
            cells.value.get().get("name"),
            Value::str("after")
        );
    }

    #[test]
    fn emptying_the_source_removes_all_keys() {
        let rt = Runtime::new();
        let mut artifacts = IterationArtifacts::new(&rt);

        reconcile_ids(&mut artifacts, &[1, 2]);
        let result = reconcile_ids(&mut artifacts, &[]);

        assert_eq!(result.removed.len(), 2);
        assert!(artifacts.is_empty());
        assert!(result.order.is_empty());
    }

    #[test]
    fn duplicate_keys_keep_the_first_occurrence() {
        let rt = Runtime::new();
        let mut artifacts = IterationArtifacts::new(&rt);
        let policy = KeyPolicy::parse("id").unwrap();

        let source = Value::list([
            Value::map([
                ("id".to_string(), Value::Int(1)),
                ("name".to_string(), Value::str("first")),
            ]),
            Value::map([
                ("id".to_string(), Value::Int(1)),
                ("name".to_string(), Value::str("second")),
            ]),
        ]);
        artifacts.reconcile(KeyedIterator::from_value(&source, &policy).unwrap());

        assert_eq!(artifacts.len(), 1);
        let cells = artifacts.get(&ItemKey::Int(1)).unwrap();
        assert_eq!(cells.value.get().get("name"), Value::str("first"));
    }
}
