//! Revision Tracking
//!
//! This module implements the validity layer everything else is built
//! on: the revision clock, tags, and the auto-tracking frame stack.
//!
//! # Concepts
//!
//! ## Revisions
//!
//! A revision is a point on a monotonically increasing clock owned by a
//! [`Runtime`](crate::Runtime). Dirtying a tag is the only operation
//! that advances the clock.
//!
//! ## Tags
//!
//! A tag marks the validity of some piece of state. Consumers snapshot
//! the clock with [`Tag::value`] and later ask [`Tag::validate`] whether
//! anything covered by the tag changed since. Combinator tags derive
//! validity from a set of children; updatable tags let a stable identity
//! cover a dependency set that is replaced wholesale.
//!
//! ## Auto-tracking
//!
//! [`track`] runs a computation inside a frame that records every tag
//! [`consume`]d along the way and returns their combinator. This is how
//! memoized references discover their dependencies without any manual
//! declarations.

mod frame;
mod revision;
mod tag;

pub use frame::{consume, is_tracking, track, untracked};
pub use revision::{Revision, RevisionClock, CONSTANT, INITIAL};
pub use tag::{DirtyableTag, Tag, UpdatableTag};

pub(crate) use frame::{debug_begin_transaction, debug_end_transaction};
pub(crate) use tag::combine_tags;
