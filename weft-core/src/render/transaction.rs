//! Render Transaction
//!
//! A render pass is bracketed by `begin`/`commit`: `begin` opens the
//! deferred-callback buffer (and, in debug builds, the stale-read
//! record); `commit` flushes deferred callbacks in registration order
//! strictly after all DOM mutation of the pass, so observers never see
//! a half-updated tree.
//!
//! Draining a program produces a [`RenderResult`]: a persistent tree of
//! bound computations that is mutated in place on every revalidation,
//! never rebuilt. Each bound leaf remembers its reference and the clock
//! snapshot it last applied; block nodes carry a guard tag covering
//! their whole subtree, which is what bounds revalidation work to the
//! changed regions instead of the tree size.
//!
//! An error raised while applying an effect propagates out immediately;
//! effects already applied in the same pass stay applied.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, trace};

use super::dom::{DomBackend, NodeId};
use super::program::Op;
use super::vm::{Evaluator, ItemScope, Scope};
use super::Environment;
use crate::error::RenderError;
use crate::iterate::{IterationArtifacts, ItemKey, KeyPolicy, KeyedIterator};
use crate::reference::{Reference, ValueRef};
use crate::track::{debug_begin_transaction, debug_end_transaction, Revision, Tag, UpdatableTag};

/// A text node bound to a reference.
pub(crate) struct TextBinding {
    pub(crate) node: NodeId,
    pub(crate) reference: ValueRef,
    pub(crate) snapshot: Revision,
    pub(crate) last: String,
}

/// An element attribute bound to a reference.
pub(crate) struct AttrBinding {
    pub(crate) element: NodeId,
    pub(crate) name: String,
    pub(crate) reference: ValueRef,
    pub(crate) snapshot: Revision,
    pub(crate) last: String,
}

/// A top-level entry of a block: either a directly appended node or a
/// keyed list whose items (plus end marker) occupy the position.
pub(crate) enum TopEntry {
    Node(NodeId),
    List(usize),
}

/// A subtree guard: a block of bound computations whose guard tag
/// covers every child. A valid guard skips the entire subtree.
pub(crate) struct BlockNode {
    pub(crate) guard: UpdatableTag,
    pub(crate) snapshot: Revision,
    pub(crate) children: Vec<RenderNode>,
    pub(crate) top_entries: Vec<TopEntry>,
}

impl BlockNode {
    /// Collect the DOM nodes this block occupies in its parent element,
    /// in document order. Used to move and tear down list items.
    pub(crate) fn collect_nodes(&self, out: &mut Vec<NodeId>) {
        for entry in &self.top_entries {
            match entry {
                TopEntry::Node(id) => out.push(*id),
                TopEntry::List(index) => {
                    if let RenderNode::List(list) = &self.children[*index] {
                        for block in list.blocks.values() {
                            block.collect_nodes(out);
                        }
                        out.push(list.marker);
                    }
                }
            }
        }
    }
}

/// A keyed list region: the collection reference, the per-key cells and
/// item blocks, and the end-marker anchor items are inserted before.
pub(crate) struct ListNode {
    pub(crate) reference: ValueRef,
    pub(crate) policy: KeyPolicy,
    pub(crate) body: Arc<Vec<Op>>,
    pub(crate) scope_this: ValueRef,
    pub(crate) artifacts: IterationArtifacts,
    pub(crate) blocks: IndexMap<ItemKey, BlockNode>,
    pub(crate) parent_element: NodeId,
    pub(crate) marker: NodeId,
    pub(crate) guard: UpdatableTag,
    pub(crate) snapshot: Revision,
}

/// One bound computation in the persistent tree.
pub(crate) enum RenderNode {
    Text(TextBinding),
    Attr(AttrBinding),
    List(ListNode),
}

impl RenderNode {
    pub(crate) fn tag(&self) -> Tag {
        match self {
            RenderNode::Text(text) => text.reference.tag(),
            RenderNode::Attr(attr) => attr.reference.tag(),
            RenderNode::List(list) => list.guard.tag(),
        }
    }
}

/// The persistent output of draining a program: a tree of bound
/// computations revalidated in place on every pass.
pub struct RenderResult {
    pub(crate) root: BlockNode,
}

impl RenderResult {
    /// The DOM nodes the root block occupies in the mount element.
    pub fn root_nodes(&self) -> Vec<NodeId> {
        let mut nodes = Vec::new();
        self.root.collect_nodes(&mut nodes);
        nodes
    }
}

/// Lifecycle of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionState {
    /// No program has been drained yet.
    Uninitialized,
    /// The initial drain is in progress.
    Draining,
    /// A revalidation pass is in progress.
    Revalidating,
    /// Between passes.
    Idle,
}

/// Bracketing and deferred-callback bookkeeping for render passes.
pub struct Transaction {
    state: TransactionState,
    deferred: Vec<Box<dyn FnOnce() + Send>>,
}

impl Transaction {
    /// A transaction that has never drained.
    pub fn new() -> Self {
        Self {
            state: TransactionState::Uninitialized,
            deferred: Vec::new(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub(crate) fn begin(&mut self, state: TransactionState) {
        debug_assert!(matches!(
            self.state,
            TransactionState::Uninitialized | TransactionState::Idle
        ));
        self.state = state;
        debug_begin_transaction();
    }

    /// Queue a callback to run at commit, after all DOM mutation of the
    /// current pass. Callbacks run in registration order.
    pub fn defer(&mut self, callback: Box<dyn FnOnce() + Send>) {
        self.deferred.push(callback);
    }

    pub(crate) fn commit(&mut self) {
        debug_end_transaction();
        self.state = TransactionState::Idle;
        let deferred = std::mem::take(&mut self.deferred);
        for callback in deferred {
            callback();
        }
    }

    /// Tear the pass down after an error: deferred callbacks are
    /// dropped, already-applied effects stay applied.
    pub(crate) fn abort(&mut self) {
        debug_end_transaction();
        self.state = TransactionState::Idle;
        self.deferred.clear();
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

/// Walk the persistent tree, re-pulling and re-applying exactly the
/// bound computations whose snapshots fail validation.
pub(crate) fn revalidate(
    env: &Environment,
    result: &mut RenderResult,
    dom: &mut dyn DomBackend,
) -> Result<(), RenderError> {
    debug!("revalidating render result");
    revalidate_block(env, &mut result.root, dom)
}

fn revalidate_block(
    env: &Environment,
    block: &mut BlockNode,
    dom: &mut dyn DomBackend,
) -> Result<(), RenderError> {
    if block.guard.tag().validate(block.snapshot) {
        trace!("block valid, skipping subtree");
        return Ok(());
    }

    for child in &mut block.children {
        match child {
            RenderNode::Text(text) => revalidate_text(text, dom),
            RenderNode::Attr(attr) => revalidate_attr(attr, dom),
            RenderNode::List(list) => revalidate_list(env, list, dom)?,
        }
    }

    let tags: Vec<Tag> = block.children.iter().map(RenderNode::tag).collect();
    block.guard.update(env.runtime().combine(tags));
    block.snapshot = env.runtime().revision();
    Ok(())
}

fn revalidate_text(text: &mut TextBinding, dom: &mut dyn DomBackend) {
    if text.reference.tag().validate(text.snapshot) {
        return;
    }
    let value = text.reference.value().to_display_string();
    if value != text.last {
        trace!(node = text.node.0, "updating text");
        dom.set_text(text.node, &value);
        text.last = value;
    }
    text.snapshot = text.reference.tag().value();
}

fn revalidate_attr(attr: &mut AttrBinding, dom: &mut dyn DomBackend) {
    if attr.reference.tag().validate(attr.snapshot) {
        return;
    }
    let value = attr.reference.value().to_display_string();
    if value != attr.last {
        trace!(element = attr.element.0, name = %attr.name, "updating attribute");
        dom.set_attribute(attr.element, &attr.name, &value);
        attr.last = value;
    }
    attr.snapshot = attr.reference.tag().value();
}

fn revalidate_list(
    env: &Environment,
    list: &mut ListNode,
    dom: &mut dyn DomBackend,
) -> Result<(), RenderError> {
    if !list.reference.tag().validate(list.snapshot) {
        let value = list.reference.value();
        let iter = KeyedIterator::from_value(&value, &list.policy)?;
        let outcome = list.artifacts.reconcile(iter);
        trace!(
            created = outcome.created.len(),
            moved = outcome.moved.len(),
            removed = outcome.removed.len(),
            "reconciled list"
        );

        for key in &outcome.removed {
            if let Some(block) = list.blocks.shift_remove(key) {
                let mut nodes = Vec::new();
                block.collect_nodes(&mut nodes);
                for node in nodes {
                    dom.remove_child(list.parent_element, node);
                }
            }
        }

        // Place items back to front so every insertion anchor is
        // already in its final position.
        let mut created_blocks: IndexMap<ItemKey, BlockNode> = IndexMap::new();
        let mut anchor = list.marker;
        for key in outcome.order.iter().rev() {
            if outcome.created.contains(key) {
                let cells = list
                    .artifacts
                    .get(key)
                    .cloned()
                    .expect("created key has cells");
                let scope = Scope {
                    this_ref: list.scope_this.clone(),
                    item: Some(ItemScope {
                        value: Arc::new(cells.value),
                        memo: Arc::new(cells.memo),
                    }),
                };
                let block = Evaluator::render_block(
                    env,
                    Arc::clone(&list.body),
                    scope,
                    list.parent_element,
                    Some(anchor),
                    dom,
                )?;
                let mut nodes = Vec::new();
                block.collect_nodes(&mut nodes);
                if let Some(first) = nodes.first() {
                    anchor = *first;
                }
                created_blocks.insert(key.clone(), block);
            } else {
                let block = list.blocks.get(key).expect("retained key has a block");
                let mut nodes = Vec::new();
                block.collect_nodes(&mut nodes);
                if outcome.moved.contains(key) {
                    for node in &nodes {
                        dom.insert_before(list.parent_element, *node, Some(anchor));
                    }
                }
                if let Some(first) = nodes.first() {
                    anchor = *first;
                }
            }
        }

        let mut next: IndexMap<ItemKey, BlockNode> = IndexMap::with_capacity(outcome.order.len());
        for key in &outcome.order {
            let block = created_blocks
                .shift_remove(key)
                .or_else(|| list.blocks.shift_remove(key))
                .expect("every ordered key has a block");
            next.insert(key.clone(), block);
        }
        list.blocks = next;
        list.snapshot = list.reference.tag().value();
    }

    for block in list.blocks.values_mut() {
        revalidate_block(env, block, dom)?;
    }

    let mut tags = vec![list.reference.tag()];
    tags.extend(list.blocks.values().map(|block| block.guard.tag()));
    list.guard.update(env.runtime().combine(tags));
    Ok(())
}
