//! Auto-tracking Frames
//!
//! The tracking frame stack records which tags are read during a
//! computation, producing that computation's combinator tag with no
//! manual dependency declarations.
//!
//! # Implementation
//!
//! We use a thread-local stack of accumulators. [`track`] pushes a fresh
//! accumulator, runs the computation, pops, and combines whatever was
//! consumed. [`consume`] appends to the top accumulator and is a no-op
//! when no frame is open: reads outside any tracked computation are
//! untracked and will not participate in future invalidation.
//!
//! Frames nest. A computation that internally tracks again contributes
//! the *combinator* of the inner computation to the enclosing frame, not
//! its individual leaves, which bounds bookkeeping cost to the depth of
//! the computation graph rather than its breadth.
//!
//! Frames are strictly LIFO and belong to whichever computation is
//! executing, so a single thread-local stack stays correct even when
//! several runtimes share a thread.

use std::cell::RefCell;

use smallvec::SmallVec;

use super::tag::Tag;
use crate::Runtime;

type Accumulator = SmallVec<[Tag; 8]>;

thread_local! {
    /// Open frames; `None` entries mark untracked scopes.
    static FRAMES: RefCell<Vec<Option<Accumulator>>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the frame when dropped, keeping the stack balanced
/// even if the tracked computation panics.
struct FrameGuard;

impl Drop for FrameGuard {
    fn drop(&mut self) {
        FRAMES.with(|frames| {
            frames.borrow_mut().pop();
        });
    }
}

/// Record a tag read into the open frame, if any.
///
/// Constant tags carry no information and are skipped.
pub fn consume(tag: &Tag) {
    if tag.is_constant() {
        return;
    }

    FRAMES.with(|frames| {
        if let Some(Some(acc)) = frames.borrow_mut().last_mut() {
            acc.push(tag.clone());
        }
    });

    #[cfg(debug_assertions)]
    debug_record_consumed(tag);
}

/// Run `f` inside a fresh tracking frame, returning its result together
/// with the combinator of every tag consumed during execution.
pub fn track<R>(runtime: &Runtime, f: impl FnOnce() -> R) -> (R, Tag) {
    FRAMES.with(|frames| {
        frames.borrow_mut().push(Some(Accumulator::new()));
    });
    let guard = FrameGuard;

    let result = f();

    let consumed = FRAMES.with(|frames| {
        frames
            .borrow_mut()
            .last_mut()
            .and_then(Option::take)
            .unwrap_or_default()
    });
    drop(guard);

    (result, runtime.combine(consumed))
}

/// Run `f` with tracking suppressed: reads inside `f` are not consumed
/// by any enclosing frame.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    FRAMES.with(|frames| {
        frames.borrow_mut().push(None);
    });
    let guard = FrameGuard;

    let result = f();

    drop(guard);
    result
}

/// Whether a tracking frame is currently open on this thread.
pub fn is_tracking() -> bool {
    FRAMES.with(|frames| matches!(frames.borrow().last(), Some(Some(_))))
}

// ----------------------------------------------------------------------------
// Development-time stale-read diagnostic
// ----------------------------------------------------------------------------
//
// While a render pass is open, we remember which leaf tags were consumed.
// Dirtying one of them before the pass completes means a value already
// woven into the output was mutated mid-pass, which the next pass would
// silently miss. Debug builds panic with the offending label; release
// builds compile all of this out.

#[cfg(debug_assertions)]
mod diagnostic {
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::sync::Arc;

    thread_local! {
        static CONSUMED: RefCell<Option<HashMap<u64, Option<Arc<str>>>>> =
            const { RefCell::new(None) };
    }

    pub(crate) fn begin() {
        CONSUMED.with(|consumed| {
            *consumed.borrow_mut() = Some(HashMap::new());
        });
    }

    pub(crate) fn end() {
        CONSUMED.with(|consumed| {
            *consumed.borrow_mut() = None;
        });
    }

    pub(crate) fn record(id: u64, label: Option<Arc<str>>) {
        CONSUMED.with(|consumed| {
            if let Some(map) = consumed.borrow_mut().as_mut() {
                map.entry(id).or_insert(label);
            }
        });
    }

    pub(crate) fn assert_not_consumed(id: u64, label: Option<Arc<str>>) {
        CONSUMED.with(|consumed| {
            if let Some(map) = consumed.borrow().as_ref() {
                if let Some(recorded) = map.get(&id) {
                    let name = recorded
                        .clone()
                        .or(label)
                        .unwrap_or_else(|| Arc::from("an unlabeled tracked value"));
                    panic!(
                        "attempted to update `{name}` after it was read in the current \
                         render pass; values read during a pass may not be mutated \
                         until the pass completes"
                    );
                }
            }
        });
    }
}

/// Open the consumed-tag record for a render pass (debug builds only).
#[cfg(debug_assertions)]
pub(crate) fn debug_begin_transaction() {
    diagnostic::begin();
}

/// Close and discard the consumed-tag record (debug builds only).
#[cfg(debug_assertions)]
pub(crate) fn debug_end_transaction() {
    diagnostic::end();
}

#[cfg(debug_assertions)]
fn debug_record_consumed(tag: &Tag) {
    if let Some(label) = tag.label() {
        diagnostic::record(tag.id(), Some(label));
    } else if !tag.is_constant() {
        diagnostic::record(tag.id(), None);
    }
}

#[cfg(debug_assertions)]
pub(crate) fn debug_assert_not_consumed(id: u64, label: Option<std::sync::Arc<str>>) {
    diagnostic::assert_not_consumed(id, label);
}

#[cfg(not(debug_assertions))]
pub(crate) fn debug_begin_transaction() {}

#[cfg(not(debug_assertions))]
pub(crate) fn debug_end_transaction() {}
