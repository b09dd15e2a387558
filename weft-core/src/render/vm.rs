//! Program Evaluator
//!
//! A resumable evaluator over compiled programs: an explicit frame
//! stack, one op per [`Evaluator::step`]. Schedulers drive it either to
//! completion in one call or in bounded slices, checking their budget
//! between steps; the evaluator itself never blocks or yields.
//!
//! Block frames execute op sequences against a scope; list frames
//! sit between a block and its item blocks, feeding one pending key at
//! a time. Finished frames fold their bound computations into the
//! parent, and the root frame folds into the final [`BlockNode`].

use std::collections::VecDeque;
use std::sync::Arc;

use indexmap::IndexMap;

use super::dom::{DomBackend, NodeId};
use super::program::{Expr, Op, PathHead};
use super::registry::Arguments;
use super::transaction::{
    AttrBinding, BlockNode, ListNode, RenderNode, TextBinding, TopEntry,
};
use super::Environment;
use crate::error::RenderError;
use crate::iterate::{IterationArtifacts, ItemKey, KeyPolicy, KeyedIterator};
use crate::reference::{CachedReference, ConstReference, PropertyReference, Reference, ValueRef};
use crate::track::Revision;

/// The values a path head resolves against.
#[derive(Clone)]
pub(crate) struct Scope {
    pub(crate) this_ref: ValueRef,
    pub(crate) item: Option<ItemScope>,
}

/// The current item's cells, exposed to `item` / `item_memo` paths.
#[derive(Clone)]
pub(crate) struct ItemScope {
    pub(crate) value: ValueRef,
    pub(crate) memo: ValueRef,
}

/// Build the reference an expression evaluates through. References are
/// built once at bind time; later passes revalidate and re-pull them.
pub(crate) fn build_reference(
    env: &Environment,
    scope: &Scope,
    expr: &Expr,
) -> Result<ValueRef, RenderError> {
    match expr {
        Expr::Literal(value) => Ok(Arc::new(ConstReference::new(value.clone()))),
        Expr::Path { head, parts } => {
            let mut current: ValueRef = match head {
                PathHead::This => scope.this_ref.clone(),
                PathHead::Item => {
                    scope
                        .item
                        .as_ref()
                        .ok_or(RenderError::ItemPathOutsideList)?
                        .value
                        .clone()
                }
                PathHead::ItemMemo => {
                    scope
                        .item
                        .as_ref()
                        .ok_or(RenderError::ItemPathOutsideList)?
                        .memo
                        .clone()
                }
            };
            for part in parts {
                current = Arc::new(PropertyReference::create(
                    env.runtime(),
                    current,
                    part.clone(),
                ));
            }
            Ok(current)
        }
        Expr::Helper {
            name,
            positional,
            named,
        } => {
            let helper = env
                .helpers()
                .lookup(name)
                .ok_or_else(|| RenderError::UnknownHelper(name.clone()))?;

            let positional_refs = positional
                .iter()
                .map(|arg| build_reference(env, scope, arg))
                .collect::<Result<Vec<_>, _>>()?;
            let mut named_refs = IndexMap::new();
            for (key, arg) in named {
                named_refs.insert(key.clone(), build_reference(env, scope, arg)?);
            }
            let args = Arguments::new(positional_refs, named_refs);

            Ok(Arc::new(CachedReference::new(env.runtime(), move || {
                helper(&args)
            })))
        }
    }
}

struct BlockFrame {
    ops: Arc<Vec<Op>>,
    ip: usize,
    scope: Scope,
    /// Element stack depth at frame entry; nodes appended at this depth
    /// are the block's own top-level nodes.
    base_depth: usize,
    /// Insert-before anchor for top-level appends (list items land
    /// before their list's end marker).
    anchor: Option<NodeId>,
    children: Vec<RenderNode>,
    top_entries: Vec<TopEntry>,
}

struct ListFrame {
    reference: ValueRef,
    policy: KeyPolicy,
    body: Arc<Vec<Op>>,
    scope_this: ValueRef,
    artifacts: IterationArtifacts,
    parent_element: NodeId,
    marker: NodeId,
    pending: VecDeque<ItemKey>,
    current: Option<ItemKey>,
    blocks: IndexMap<ItemKey, BlockNode>,
    snapshot: Revision,
}

enum Frame {
    Block(BlockFrame),
    List(ListFrame),
}

/// Outcome of one evaluator step.
pub(crate) enum StepOutcome {
    /// More work remains.
    Working,
    /// The program is fully drained.
    Done,
}

/// A resumable drain of one compiled program.
pub(crate) struct Evaluator {
    env: Environment,
    frames: Vec<Frame>,
    /// Open elements; the bottom entry is the mount element.
    elements: Vec<NodeId>,
    finished: Option<BlockNode>,
}

impl Evaluator {
    pub(crate) fn new(
        env: Environment,
        ops: Arc<Vec<Op>>,
        scope: Scope,
        mount: NodeId,
        anchor: Option<NodeId>,
    ) -> Self {
        Self {
            env,
            frames: vec![Frame::Block(BlockFrame {
                ops,
                ip: 0,
                scope,
                base_depth: 1,
                anchor,
                children: Vec::new(),
                top_entries: Vec::new(),
            })],
            elements: vec![mount],
            finished: None,
        }
    }

    /// Drain `ops` to completion as one block. Used for list items
    /// created during a revalidation pass.
    pub(crate) fn render_block(
        env: &Environment,
        ops: Arc<Vec<Op>>,
        scope: Scope,
        mount: NodeId,
        anchor: Option<NodeId>,
        dom: &mut dyn DomBackend,
    ) -> Result<BlockNode, RenderError> {
        let mut vm = Evaluator::new(env.clone(), ops, scope, mount, anchor);
        vm.run_to_completion(dom)?;
        Ok(vm.into_result())
    }

    /// Execute one unit of work.
    pub(crate) fn step(&mut self, dom: &mut dyn DomBackend) -> Result<StepOutcome, RenderError> {
        match self.frames.last_mut() {
            None => return Ok(StepOutcome::Done),
            Some(Frame::Block(block)) => {
                if block.ip < block.ops.len() {
                    let op = block.ops[block.ip].clone();
                    block.ip += 1;
                    self.execute_op(op, dom)?;
                } else {
                    self.finish_block();
                }
            }
            Some(Frame::List(_)) => {
                self.step_list();
            }
        }

        Ok(if self.frames.is_empty() {
            StepOutcome::Done
        } else {
            StepOutcome::Working
        })
    }

    /// Run until the program is fully drained.
    pub(crate) fn run_to_completion(
        &mut self,
        dom: &mut dyn DomBackend,
    ) -> Result<(), RenderError> {
        while matches!(self.step(dom)?, StepOutcome::Working) {}
        Ok(())
    }

    /// The drained root block. Only valid after a `Done` step.
    pub(crate) fn into_result(self) -> BlockNode {
        self.finished.expect("evaluator fully drained")
    }

    fn current_block(&mut self) -> &mut BlockFrame {
        match self.frames.last_mut() {
            Some(Frame::Block(block)) => block,
            _ => unreachable!("ops execute inside a block frame"),
        }
    }

    /// Append a fresh node into the current element, honoring the
    /// block's anchor for top-level appends.
    fn append_node(&mut self, id: NodeId, dom: &mut dyn DomBackend) {
        let parent = *self.elements.last().expect("element stack never empty");
        let depth = self.elements.len();

        let (at_base, anchor) = {
            let block = self.current_block();
            (depth == block.base_depth, block.anchor)
        };
        dom.insert_before(parent, id, if at_base { anchor } else { None });
        if at_base {
            self.current_block().top_entries.push(TopEntry::Node(id));
        }
    }

    fn execute_op(&mut self, op: Op, dom: &mut dyn DomBackend) -> Result<(), RenderError> {
        match op {
            Op::OpenElement { tag } => {
                let id = dom.create_element(&tag);
                self.append_node(id, dom);
                self.elements.push(id);
            }
            Op::CloseElement => {
                debug_assert!(
                    self.elements.len() > self.current_block().base_depth,
                    "close without matching open"
                );
                self.elements.pop();
            }
            Op::StaticText { text } => {
                let id = dom.create_text(&text);
                self.append_node(id, dom);
            }
            Op::DynamicText { expr } => {
                let scope = self.current_block().scope.clone();
                let reference = build_reference(&self.env, &scope, &expr)?;
                let value = reference.value().to_display_string();
                let id = dom.create_text(&value);
                self.append_node(id, dom);
                let snapshot = reference.tag().value();
                self.current_block().children.push(RenderNode::Text(TextBinding {
                    node: id,
                    reference,
                    snapshot,
                    last: value,
                }));
            }
            Op::StaticAttr { name, value } => {
                let element = *self.elements.last().expect("element stack never empty");
                dom.set_attribute(element, &name, &value);
            }
            Op::DynamicAttr { name, expr } => {
                let scope = self.current_block().scope.clone();
                let reference = build_reference(&self.env, &scope, &expr)?;
                let value = reference.value().to_display_string();
                let element = *self.elements.last().expect("element stack never empty");
                dom.set_attribute(element, &name, &value);
                let snapshot = reference.tag().value();
                self.current_block().children.push(RenderNode::Attr(AttrBinding {
                    element,
                    name,
                    reference,
                    snapshot,
                    last: value,
                }));
            }
            Op::List { expr, key, body } => {
                let policy = KeyPolicy::parse(&key)?;
                let scope = self.current_block().scope.clone();
                let reference = build_reference(&self.env, &scope, &expr)?;
                let value = reference.value();
                let iter = KeyedIterator::from_value(&value, &policy)?;

                let mut artifacts = IterationArtifacts::new(self.env.runtime());
                let outcome = artifacts.reconcile(iter);
                let snapshot = reference.tag().value();

                let marker = dom.create_text("");
                let parent = *self.elements.last().expect("element stack never empty");
                let depth = self.elements.len();
                let (at_base, anchor) = {
                    let block = self.current_block();
                    (depth == block.base_depth, block.anchor)
                };
                dom.insert_before(parent, marker, if at_base { anchor } else { None });
                if at_base {
                    let block = self.current_block();
                    let index = block.children.len();
                    block.top_entries.push(TopEntry::List(index));
                }

                self.frames.push(Frame::List(ListFrame {
                    reference,
                    policy,
                    body,
                    scope_this: scope.this_ref.clone(),
                    artifacts,
                    parent_element: parent,
                    marker,
                    pending: outcome.order.into_iter().collect(),
                    current: None,
                    blocks: IndexMap::new(),
                    snapshot,
                }));
            }
        }
        Ok(())
    }

    fn step_list(&mut self) {
        let depth = self.elements.len();
        let next = {
            let Some(Frame::List(list)) = self.frames.last_mut() else {
                unreachable!("step_list runs on a list frame");
            };
            match list.pending.pop_front() {
                Some(key) => {
                    list.current = Some(key.clone());
                    let cells = list
                        .artifacts
                        .get(&key)
                        .cloned()
                        .expect("pending key has cells");
                    Some((
                        Arc::clone(&list.body),
                        Scope {
                            this_ref: list.scope_this.clone(),
                            item: Some(ItemScope {
                                value: Arc::new(cells.value),
                                memo: Arc::new(cells.memo),
                            }),
                        },
                        list.marker,
                    ))
                }
                None => None,
            }
        };

        match next {
            Some((body, scope, marker)) => {
                self.frames.push(Frame::Block(BlockFrame {
                    ops: body,
                    ip: 0,
                    scope,
                    base_depth: depth,
                    anchor: Some(marker),
                    children: Vec::new(),
                    top_entries: Vec::new(),
                }));
            }
            None => self.finish_list(),
        }
    }

    fn finish_block(&mut self) {
        let Some(Frame::Block(block)) = self.frames.pop() else {
            unreachable!("finish_block pops a block frame");
        };
        debug_assert_eq!(
            self.elements.len(),
            block.base_depth,
            "unbalanced element ops"
        );

        let rt = self.env.runtime();
        let guard = rt.updatable_tag();
        guard.update(rt.combine(block.children.iter().map(RenderNode::tag)));
        let node = BlockNode {
            guard,
            snapshot: rt.revision(),
            children: block.children,
            top_entries: block.top_entries,
        };

        match self.frames.last_mut() {
            None => self.finished = Some(node),
            Some(Frame::List(list)) => {
                let key = list.current.take().expect("item block finishes under its list");
                list.blocks.insert(key, node);
            }
            Some(Frame::Block(_)) => unreachable!("block frames nest only under list frames"),
        }
    }

    fn finish_list(&mut self) {
        let Some(Frame::List(list)) = self.frames.pop() else {
            unreachable!("finish_list pops a list frame");
        };

        let rt = self.env.runtime();
        let guard = rt.updatable_tag();
        let mut tags = vec![list.reference.tag()];
        tags.extend(list.blocks.values().map(|block| block.guard.tag()));
        guard.update(rt.combine(tags));

        let node = RenderNode::List(ListNode {
            reference: list.reference,
            policy: list.policy,
            body: list.body,
            scope_this: list.scope_this,
            artifacts: list.artifacts,
            blocks: list.blocks,
            parent_element: list.parent_element,
            marker: list.marker,
            guard,
            snapshot: list.snapshot,
        });

        match self.frames.last_mut() {
            Some(Frame::Block(block)) => block.children.push(node),
            _ => unreachable!("list frames sit under a block frame"),
        }
    }
}
