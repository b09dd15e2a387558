//! Keyed Iteration
//!
//! Maps a collection-like value to an ordered sequence of keyed items
//! that can be matched across render passes. Matching is strictly by
//! key, never by position or value equality: a stable key keeps the
//! item's downstream identity (and every cache hanging off it) alive
//! across reorders.
//!
//! # Key Policies
//!
//! - `@index`: position in the sequence.
//! - `@identity`: the item itself (primitives by value, compounds by
//!   identity).
//! - any other string: the named property of each item.
//!
//! A list op compiled without a key is an immediate error. Duplicate
//! keys within one pass have no defined resolution; the iterator keeps
//! the first occurrence.

mod artifacts;

pub use artifacts::{IterationArtifacts, ItemCells, Reconciliation};

use std::sync::Arc;

use crate::error::RenderError;
use crate::value::Value;

/// How items of a keyed iteration are identified across passes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyPolicy {
    /// Key by position in the sequence.
    ByIndex,
    /// Key by the item's own (primitive) identity.
    ByIdentity,
    /// Key by a named property of each item.
    ByProperty(String),
}

impl KeyPolicy {
    /// Parse the key string carried by a compiled list op.
    pub fn parse(key: &str) -> Result<Self, RenderError> {
        match key {
            "" => Err(RenderError::MissingIterationKey),
            "@index" => Ok(KeyPolicy::ByIndex),
            "@identity" => Ok(KeyPolicy::ByIdentity),
            property => Ok(KeyPolicy::ByProperty(property.to_string())),
        }
    }

    fn key_for(&self, index: usize, item: &Value) -> Result<ItemKey, RenderError> {
        match self {
            KeyPolicy::ByIndex => Ok(ItemKey::Index(index)),
            KeyPolicy::ByIdentity => Ok(identity_key(item)),
            KeyPolicy::ByProperty(property) => {
                let key = item.get(property);
                match key {
                    Value::Undefined | Value::Null => Err(RenderError::MissingItemKey {
                        property: property.clone(),
                        index,
                    }),
                    other => Ok(identity_key(&other)),
                }
            }
        }
    }
}

/// A stable identity for one item of a keyed iteration.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ItemKey {
    Index(usize),
    Int(i64),
    Bool(bool),
    Str(Arc<str>),
    Null,
    /// Identity of a compound value (list, map, or object).
    Ptr(usize),
}

fn identity_key(value: &Value) -> ItemKey {
    match value {
        Value::Undefined | Value::Null => ItemKey::Null,
        Value::Bool(b) => ItemKey::Bool(*b),
        Value::Int(i) => ItemKey::Int(*i),
        // Floats make poor identities; fall back to their rendering.
        Value::Float(f) => ItemKey::Str(Arc::from(f.to_string().as_str())),
        Value::Str(s) => ItemKey::Str(Arc::clone(s)),
        Value::List(items) => ItemKey::Ptr(Arc::as_ptr(items) as usize),
        Value::Map(map) => ItemKey::Ptr(Arc::as_ptr(map) as usize),
        Value::Object(object) => ItemKey::Ptr(Arc::as_ptr(object) as *const () as usize),
    }
}

/// One item yielded by a [`KeyedIterator`].
#[derive(Clone, Debug)]
pub struct IterationItem {
    pub key: ItemKey,
    pub value: Value,
    /// The positional companion value: the index for sequences, the map
    /// key for keyed maps.
    pub memo: Value,
}

/// An ordered, keyed view over a collection-like value.
///
/// Construction is eager: source shapes that only offer push-style
/// enumeration are buffered, and key errors surface immediately rather
/// than mid-iteration.
#[derive(Debug)]
pub enum KeyedIterator {
    /// The singleton empty iterator. `next()` must not be called on it;
    /// callers check [`KeyedIterator::is_empty`] first.
    Empty,
    Items(std::vec::IntoIter<IterationItem>),
}

impl KeyedIterator {
    /// Build an iterator over `value` with the given key policy.
    ///
    /// `Null`/`Undefined` and empty collections yield the empty
    /// iterator; values with no enumeration order at all are
    /// [`RenderError::NotIterable`].
    pub fn from_value(value: &Value, policy: &KeyPolicy) -> Result<Self, RenderError> {
        let raw: Vec<(Value, Value)> = match value {
            Value::Undefined | Value::Null => return Ok(KeyedIterator::Empty),
            Value::List(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| (item.clone(), Value::Int(i as i64)))
                .collect(),
            Value::Map(map) => map
                .iter()
                .map(|(k, item)| (item.clone(), Value::str(k)))
                .collect(),
            Value::Object(object) => {
                let mut buffered = Vec::new();
                let supported = object.enumerate(&mut |item| buffered.push(item));
                if !supported {
                    return Err(RenderError::NotIterable {
                        type_name: value.type_name(),
                    });
                }
                buffered
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| (item, Value::Int(i as i64)))
                    .collect()
            }
            other => {
                return Err(RenderError::NotIterable {
                    type_name: other.type_name(),
                })
            }
        };

        if raw.is_empty() {
            return Ok(KeyedIterator::Empty);
        }

        let mut items = Vec::with_capacity(raw.len());
        for (index, (value, memo)) in raw.into_iter().enumerate() {
            items.push(IterationItem {
                key: policy.key_for(index, &value)?,
                value,
                memo,
            });
        }
        Ok(KeyedIterator::Items(items.into_iter()))
    }

    /// Whether this is the empty iterator.
    pub fn is_empty(&self) -> bool {
        matches!(self, KeyedIterator::Empty)
    }

    /// The next item. Must not be called on the empty iterator.
    pub fn next(&mut self) -> Option<IterationItem> {
        match self {
            KeyedIterator::Empty => {
                debug_assert!(false, "next() called on the empty iterator");
                None
            }
            KeyedIterator::Items(items) => items.next(),
        }
    }
}
