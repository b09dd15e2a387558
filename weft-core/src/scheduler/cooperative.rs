//! Cooperative Driver
//!
//! Drains the program in bounded slices scheduled during host idle
//! periods. After every unit of work the driver checks the remaining
//! idle budget and yields, resuming in the next idle window; the host
//! forces a window after the maximum wait timeout so a busy host cannot
//! starve the drain forever. The caller observes success or failure
//! exactly once, when the program is fully drained.
//!
//! Revalidation passes are never sliced: once `rerender` begins it runs
//! to completion, in this driver as in the synchronous one.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use super::{IdleHost, Renderer, RendererCore};
use crate::error::RenderError;
use crate::reference::ValueRef;
use crate::render::vm::{Evaluator, Scope, StepOutcome};
use crate::render::{DomBackend, Environment, Program, RenderResult};

/// A scheduler that drains programs in idle-time slices.
pub struct CooperativeRenderer<H: IdleHost> {
    core: RendererCore,
    host: H,
    max_wait: Duration,
    slices: u64,
}

impl<H: IdleHost> CooperativeRenderer<H> {
    /// Create a driver over `env`, scheduling slices through `host`.
    pub fn new(env: Environment, host: H) -> Self {
        Self {
            core: RendererCore::new(env),
            host,
            max_wait: Duration::from_millis(500),
            slices: 0,
        }
    }

    /// Cap how long the driver waits for an idle window before forcing
    /// a slice.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Register a listener notified after each completed pass.
    pub fn on_render_complete(&mut self, f: impl Fn() + Send + Sync + 'static) {
        self.core.on_render_complete(f);
    }

    /// Completed revalidation passes.
    pub fn passes(&self) -> u64 {
        self.core.passes
    }

    /// Idle slices consumed by drains so far.
    pub fn slices(&self) -> u64 {
        self.slices
    }

    /// The persistent result of the initial drain, if any.
    pub fn result(&self) -> Option<&RenderResult> {
        self.core.result.as_ref()
    }
}

impl<H: IdleHost> Renderer for CooperativeRenderer<H> {
    fn render(
        &mut self,
        program: &Program,
        root: ValueRef,
        dom: &mut dyn DomBackend,
    ) -> Result<(), RenderError> {
        debug!(ops = program.len(), "cooperative drain");
        self.core.begin_drain();

        let scope = Scope {
            this_ref: root,
            item: None,
        };
        let mut vm = Evaluator::new(
            self.core.env.clone(),
            Arc::clone(&program.ops),
            scope,
            dom.root(),
            None,
        );

        'drain: loop {
            let deadline = self.host.next_idle(self.max_wait);
            self.slices += 1;
            trace!(slice = self.slices, forced = deadline.did_timeout(), "idle slice");

            // At least one unit of work per slice, even on a forced
            // (timed-out) window.
            loop {
                match vm.step(dom) {
                    Ok(StepOutcome::Done) => break 'drain,
                    Ok(StepOutcome::Working) => {}
                    Err(error) => {
                        self.core.abort();
                        return Err(error);
                    }
                }
                if deadline.time_remaining().is_zero() {
                    continue 'drain;
                }
            }
        }

        self.core.finish_drain(vm.into_result());
        Ok(())
    }

    fn rerender(&mut self, dom: &mut dyn DomBackend) -> Result<(), RenderError> {
        self.core.rerender(dom)
    }

    fn flush(&mut self, dom: &mut dyn DomBackend) -> Result<bool, RenderError> {
        self.core.flush(dom)
    }

    fn is_scheduled(&self) -> bool {
        self.core.flag.is_scheduled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::{ConstReference, TrackedMap};
    use crate::render::{Expr, MemoryDom, Op, Registry};
    use crate::scheduler::IdleDeadline;
    use crate::value::Value;
    use crate::Runtime;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Grants a fixed number of work units per slice.
    struct StepDeadline {
        remaining: Cell<u32>,
    }

    impl IdleDeadline for StepDeadline {
        fn time_remaining(&self) -> Duration {
            let left = self.remaining.get();
            if left == 0 {
                Duration::ZERO
            } else {
                self.remaining.set(left - 1);
                Duration::from_millis(1)
            }
        }

        fn did_timeout(&self) -> bool {
            false
        }
    }

    struct BudgetHost {
        per_slice: u32,
        slices_granted: Rc<Cell<u32>>,
    }

    impl IdleHost for BudgetHost {
        fn next_idle(&mut self, _max_wait: Duration) -> Box<dyn IdleDeadline> {
            self.slices_granted.set(self.slices_granted.get() + 1);
            Box::new(StepDeadline {
                remaining: Cell::new(self.per_slice),
            })
        }
    }

    fn list_program() -> Program {
        Program::new(vec![
            Op::OpenElement {
                tag: "ul".to_string(),
            },
            Op::List {
                expr: Expr::this(["items"]),
                key: "@identity".to_string(),
                body: Arc::new(vec![
                    Op::OpenElement {
                        tag: "li".to_string(),
                    },
                    Op::DynamicText {
                        expr: Expr::item(Vec::<String>::new()),
                    },
                    Op::CloseElement,
                ]),
            },
            Op::CloseElement,
        ])
    }

    #[test]
    fn drains_across_multiple_slices() {
        let rt = Runtime::new();
        let env = Environment::new(rt.clone(), Registry::new());
        let state = Arc::new(TrackedMap::new(&rt, "state"));
        state.set(
            "items",
            Value::list([Value::str("a"), Value::str("b"), Value::str("c")]),
        );

        let granted = Rc::new(Cell::new(0));
        let host = BudgetHost {
            per_slice: 2,
            slices_granted: granted.clone(),
        };
        let mut renderer = CooperativeRenderer::new(env, host);

        let mut dom = MemoryDom::new();
        let root: ValueRef = Arc::new(ConstReference::new(Value::object(state)));
        renderer.render(&list_program(), root, &mut dom).unwrap();

        assert_eq!(dom.text_content(dom.root()), "abc");
        assert!(granted.get() > 1, "drain should span multiple slices");
        assert_eq!(renderer.slices(), granted.get() as u64);
    }

    #[test]
    fn always_idle_host_drains_without_starving() {
        let rt = Runtime::new();
        let env = Environment::new(rt.clone(), Registry::new());
        let state = Arc::new(TrackedMap::new(&rt, "state"));
        state.set("items", Value::list([Value::str("x"), Value::str("y")]));

        let mut renderer =
            CooperativeRenderer::new(env, crate::scheduler::AlwaysIdleHost::default())
                .with_max_wait(Duration::from_millis(50));

        let mut dom = MemoryDom::new();
        let root: ValueRef = Arc::new(ConstReference::new(Value::object(state)));
        renderer.render(&list_program(), root, &mut dom).unwrap();
        assert_eq!(dom.text_content(dom.root()), "xy");
    }

    #[test]
    fn rerender_runs_in_one_pass() {
        let rt = Runtime::new();
        let env = Environment::new(rt.clone(), Registry::new());
        let state = Arc::new(TrackedMap::new(&rt, "state"));
        state.set("items", Value::list([Value::str("a")]));

        let host = BudgetHost {
            per_slice: 1,
            slices_granted: Rc::new(Cell::new(0)),
        };
        let mut renderer = CooperativeRenderer::new(env, host);

        let mut dom = MemoryDom::new();
        let root: ValueRef = Arc::new(ConstReference::new(Value::object(state.clone())));
        renderer.render(&list_program(), root, &mut dom).unwrap();

        state.set("items", Value::list([Value::str("a"), Value::str("z")]));
        assert!(renderer.flush(&mut dom).unwrap());
        assert_eq!(dom.text_content(dom.root()), "az");
        assert_eq!(renderer.passes(), 1);
    }
}
