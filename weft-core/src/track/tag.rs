//! Tag Implementation
//!
//! A Tag is a validity marker over the revision clock. It answers one
//! question: "is a snapshot taken earlier still an accurate picture of
//! the state this tag covers?".
//!
//! # Variants
//!
//! - *Constant*: revision pinned at the lowest value; always valid.
//! - *Dirtyable*: a leaf that owns a revision field. `dirty()` advances
//!   the clock and stamps the tag with the new value.
//! - *Updatable*: a rebindable leaf wrapping a currently-bound inner
//!   tag. `update()` swaps the binding without changing identity.
//! - *Combinator*: derived from an ordered set of child tags; its
//!   revision is the maximum of its children's, computed on demand.
//!
//! # Invariants
//!
//! `value()` returns a snapshot of the current clock. `validate(s)` is
//! true iff the tag's (possibly derived) revision is `<= s`. Once a
//! dependency is dirtied after a snapshot was taken, validation for that
//! snapshot is permanently false: tags never heal. This layer cannot
//! fail; the typed handles below make invalid operations unrepresentable
//! instead of asserting at runtime.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use smallvec::SmallVec;

use super::revision::{Revision, CONSTANT, INITIAL};
use crate::runtime::RuntimeShared;

/// Counter for generating unique tag IDs.
static TAG_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate a new unique tag ID.
fn next_tag_id() -> u64 {
    TAG_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

enum TagKind {
    Constant,
    Dirtyable {
        revision: AtomicU64,
        label: Option<Arc<str>>,
    },
    Updatable {
        revision: AtomicU64,
        inner: RwLock<Option<Tag>>,
    },
    Combinator {
        children: SmallVec<[Tag; 4]>,
    },
}

struct TagInner {
    id: u64,
    context: Option<Arc<RuntimeShared>>,
    kind: TagKind,
}

/// A validity marker over the revision clock.
///
/// Cheaply cloneable; clones share identity. Tags are created from a
/// [`Runtime`](crate::Runtime) (except [`Tag::constant`], which needs no
/// clock) and capture a handle to its clock.
#[derive(Clone)]
pub struct Tag {
    inner: Arc<TagInner>,
}

impl Tag {
    fn new(context: Option<Arc<RuntimeShared>>, kind: TagKind) -> Self {
        Self {
            inner: Arc::new(TagInner {
                id: next_tag_id(),
                context,
                kind,
            }),
        }
    }

    /// The tag of state that can never change. Always valid.
    pub fn constant() -> Self {
        static CONSTANT_TAG: OnceLock<Tag> = OnceLock::new();
        CONSTANT_TAG
            .get_or_init(|| Tag::new(None, TagKind::Constant))
            .clone()
    }

    /// Unique identity of this tag.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Whether this tag is (equivalent to) the constant tag.
    pub fn is_constant(&self) -> bool {
        matches!(self.inner.kind, TagKind::Constant)
    }

    pub(crate) fn label(&self) -> Option<Arc<str>> {
        match &self.inner.kind {
            TagKind::Dirtyable { label, .. } => label.clone(),
            _ => None,
        }
    }

    /// The revision this tag was last invalidated at, derived on demand
    /// for updatable and combinator tags.
    pub fn revision(&self) -> Revision {
        match &self.inner.kind {
            TagKind::Constant => CONSTANT,
            TagKind::Dirtyable { revision, .. } => revision.load(Ordering::Acquire),
            TagKind::Updatable { revision, inner } => {
                let own = revision.load(Ordering::Acquire);
                let bound = inner
                    .read()
                    .as_ref()
                    .map(Tag::revision)
                    .unwrap_or(CONSTANT);
                own.max(bound)
            }
            TagKind::Combinator { children } => children
                .iter()
                .map(Tag::revision)
                .max()
                .unwrap_or(CONSTANT),
        }
    }

    /// Snapshot the current revision clock.
    ///
    /// The returned value is what later calls to [`Tag::validate`] check
    /// against. For the constant tag (which has no clock) this is
    /// [`CONSTANT`].
    pub fn value(&self) -> Revision {
        match &self.inner.context {
            Some(ctx) => ctx.clock.current(),
            None => CONSTANT,
        }
    }

    /// True iff nothing covered by this tag has changed since `snapshot`
    /// was taken.
    pub fn validate(&self, snapshot: Revision) -> bool {
        self.revision() <= snapshot
    }

    fn dirty_inner(&self) {
        let ctx = self
            .inner
            .context
            .as_ref()
            .expect("dirtyable tags always carry a clock");

        #[cfg(debug_assertions)]
        super::frame::debug_assert_not_consumed(self.id(), self.label());

        let next = ctx.clock.advance();
        match &self.inner.kind {
            TagKind::Dirtyable { revision, .. } | TagKind::Updatable { revision, .. } => {
                revision.store(next, Ordering::Release);
            }
            _ => unreachable!("only leaf tags are dirtied"),
        }
        ctx.notify_invalidation();
    }
}

impl std::fmt::Debug for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.inner.kind {
            TagKind::Constant => "constant",
            TagKind::Dirtyable { .. } => "dirtyable",
            TagKind::Updatable { .. } => "updatable",
            TagKind::Combinator { .. } => "combinator",
        };
        let mut out = f.debug_struct("Tag");
        out.field("id", &self.inner.id)
            .field("kind", &kind)
            .field("revision", &self.revision());
        if let Some(label) = self.label() {
            out.field("label", &label);
        }
        out.finish()
    }
}

/// Typed handle to a dirtyable leaf tag.
///
/// Holding the handle is what grants the right to dirty; the general
/// [`Tag`] obtained from [`DirtyableTag::tag`] only validates.
#[derive(Clone, Debug)]
pub struct DirtyableTag {
    tag: Tag,
}

impl DirtyableTag {
    pub(crate) fn new(context: Arc<RuntimeShared>, label: Option<Arc<str>>) -> Self {
        Self {
            tag: Tag::new(
                Some(context),
                TagKind::Dirtyable {
                    revision: AtomicU64::new(INITIAL),
                    label,
                },
            ),
        }
    }

    /// Advance the clock and stamp this tag with the new revision,
    /// invalidating every snapshot taken before the call.
    pub fn dirty(&self) {
        self.tag.dirty_inner();
    }

    /// The validation view of this tag.
    pub fn tag(&self) -> Tag {
        self.tag.clone()
    }
}

impl From<DirtyableTag> for Tag {
    fn from(tag: DirtyableTag) -> Self {
        tag.tag
    }
}

/// Typed handle to an updatable (rebindable) leaf tag.
///
/// Used wherever a stable identity must cover a dependency set that is
/// replaced wholesale, such as the governing tag of a memoized
/// reference: consumers keep holding the same tag while the bound inner
/// tag is swapped on every recompute.
#[derive(Clone, Debug)]
pub struct UpdatableTag {
    tag: Tag,
}

impl UpdatableTag {
    pub(crate) fn new(context: Arc<RuntimeShared>) -> Self {
        Self {
            tag: Tag::new(
                Some(context),
                TagKind::Updatable {
                    revision: AtomicU64::new(INITIAL),
                    inner: RwLock::new(None),
                },
            ),
        }
    }

    /// Advance the clock and stamp this tag with the new revision.
    pub fn dirty(&self) {
        self.tag.dirty_inner();
    }

    /// Swap the bound inner tag without creating a new identity.
    ///
    /// The tag's own revision first absorbs the previous effective
    /// revision, so snapshots invalidated under the old binding stay
    /// invalid: rebinding never heals.
    pub fn update(&self, bound: Tag) {
        let TagKind::Updatable { revision, inner } = &self.tag.inner.kind else {
            unreachable!("updatable handle wraps an updatable tag");
        };

        let mut slot = inner.write();
        let previous = slot.as_ref().map(Tag::revision).unwrap_or(CONSTANT);
        if previous > revision.load(Ordering::Acquire) {
            revision.store(previous, Ordering::Release);
        }
        *slot = Some(bound);
    }

    /// The validation view of this tag.
    pub fn tag(&self) -> Tag {
        self.tag.clone()
    }
}

impl From<UpdatableTag> for Tag {
    fn from(tag: UpdatableTag) -> Self {
        tag.tag
    }
}

/// Combine a set of tags into one that is valid iff every child is.
///
/// Constant children are dropped, duplicates are collapsed, and the
/// degenerate cases avoid allocating: an empty set is the constant tag
/// and a singleton set is the child itself.
pub(crate) fn combine_tags(
    context: &Arc<RuntimeShared>,
    tags: impl IntoIterator<Item = Tag>,
) -> Tag {
    let mut children: SmallVec<[Tag; 4]> = SmallVec::new();
    for tag in tags {
        if tag.is_constant() {
            continue;
        }
        if children.iter().any(|seen| seen.id() == tag.id()) {
            continue;
        }
        children.push(tag);
    }

    match children.len() {
        0 => Tag::constant(),
        1 => children.into_iter().next().expect("length checked"),
        _ => Tag::new(Some(Arc::clone(context)), TagKind::Combinator { children }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Runtime;

    #[test]
    fn validate_is_reflexive() {
        let rt = Runtime::new();
        let tag = rt.dirtyable_tag();

        assert!(tag.tag().validate(tag.tag().value()));

        tag.dirty();
        assert!(tag.tag().validate(tag.tag().value()));
    }

    #[test]
    fn dirty_invalidates_earlier_snapshots() {
        let rt = Runtime::new();
        let tag = rt.dirtyable_tag();

        let snapshot = tag.tag().value();
        assert!(tag.tag().validate(snapshot));

        tag.dirty();
        assert!(!tag.tag().validate(snapshot));

        // Tags never heal: the old snapshot stays invalid.
        let fresh = tag.tag().value();
        assert!(tag.tag().validate(fresh));
        assert!(!tag.tag().validate(snapshot));
    }

    #[test]
    fn unrelated_dirty_does_not_invalidate() {
        let rt = Runtime::new();
        let a = rt.dirtyable_tag();
        let b = rt.dirtyable_tag();

        let snapshot = a.tag().value();
        b.dirty();
        b.dirty();

        assert!(a.tag().validate(snapshot));
    }

    #[test]
    fn combinator_is_valid_iff_all_children_are() {
        let rt = Runtime::new();
        let a = rt.dirtyable_tag();
        let b = rt.dirtyable_tag();
        let combined = rt.combine([a.tag(), b.tag()]);

        let snapshot = combined.value();
        assert!(combined.validate(snapshot));

        b.dirty();
        assert!(!combined.validate(snapshot));
        assert!(a.tag().validate(snapshot));

        let fresh = combined.value();
        assert!(combined.validate(fresh));
        a.dirty();
        assert!(!combined.validate(fresh));
    }

    #[test]
    fn combine_of_nothing_is_constant() {
        let rt = Runtime::new();
        let combined = rt.combine([]);
        assert!(combined.is_constant());
        assert!(combined.validate(CONSTANT));
    }

    #[test]
    fn combine_collapses_singletons_and_duplicates() {
        let rt = Runtime::new();
        let a = rt.dirtyable_tag();

        let single = rt.combine([a.tag()]);
        assert_eq!(single.id(), a.tag().id());

        let deduped = rt.combine([a.tag(), a.tag(), Tag::constant()]);
        assert_eq!(deduped.id(), a.tag().id());
    }

    #[test]
    fn constant_tag_always_validates() {
        let tag = Tag::constant();
        assert!(tag.validate(CONSTANT));
        assert!(tag.validate(1_000_000));
    }

    #[test]
    fn updatable_swaps_binding_without_new_identity() {
        let rt = Runtime::new();
        let updatable = rt.updatable_tag();
        let identity = updatable.tag().id();

        let a = rt.dirtyable_tag();
        updatable.update(a.tag());
        assert_eq!(updatable.tag().id(), identity);

        let snapshot = updatable.tag().value();
        a.dirty();
        assert!(!updatable.tag().validate(snapshot));

        // Rebinding to quiet state does not heal the old snapshot.
        let b = rt.dirtyable_tag();
        updatable.update(b.tag());
        assert_eq!(updatable.tag().id(), identity);
        assert!(!updatable.tag().validate(snapshot));

        // But a snapshot taken under the new binding is valid until the
        // new dependency changes.
        let fresh = updatable.tag().value();
        assert!(updatable.tag().validate(fresh));
        b.dirty();
        assert!(!updatable.tag().validate(fresh));
    }
}
