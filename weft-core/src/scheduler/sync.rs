//! Synchronous Driver
//!
//! Drains the program to completion in one call, blocking the caller;
//! revalidation passes likewise run to completion synchronously. The
//! simplest driver, and the right one for tests, servers rendering a
//! response, and hosts without an idle loop.

use std::sync::Arc;

use tracing::debug;

use super::{Renderer, RendererCore};
use crate::error::RenderError;
use crate::reference::ValueRef;
use crate::render::vm::{Evaluator, Scope};
use crate::render::{DomBackend, Environment, Program, RenderResult};

/// A scheduler that drains and revalidates on the caller's thread.
pub struct SyncRenderer {
    core: RendererCore,
}

impl SyncRenderer {
    /// Create a driver over `env`.
    pub fn new(env: Environment) -> Self {
        Self {
            core: RendererCore::new(env),
        }
    }

    /// Register a listener notified after each completed pass, once all
    /// DOM mutation for the pass is done. Listeners run in registration
    /// order.
    pub fn on_render_complete(&mut self, f: impl Fn() + Send + Sync + 'static) {
        self.core.on_render_complete(f);
    }

    /// Completed revalidation passes.
    pub fn passes(&self) -> u64 {
        self.core.passes
    }

    /// The persistent result of the initial drain, if any.
    pub fn result(&self) -> Option<&RenderResult> {
        self.core.result.as_ref()
    }
}

impl Renderer for SyncRenderer {
    fn render(
        &mut self,
        program: &Program,
        root: ValueRef,
        dom: &mut dyn DomBackend,
    ) -> Result<(), RenderError> {
        debug!(ops = program.len(), "synchronous drain");
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

        match vm.run_to_completion(dom) {
            Ok(()) => {
                self.core.finish_drain(vm.into_result());
                Ok(())
            }
            Err(error) => {
                self.core.abort();
                Err(error)
            }
        }
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
    use crate::value::Value;
    use crate::Runtime;

    fn greeting_program() -> Program {
        Program::new(vec![Op::DynamicText {
            expr: Expr::this(["greeting"]),
        }])
    }

    fn setup() -> (Runtime, Environment, Arc<TrackedMap>, MemoryDom) {
        let rt = Runtime::new();
        let env = Environment::new(rt.clone(), Registry::new());
        let state = Arc::new(TrackedMap::new(&rt, "state"));
        (rt, env, state, MemoryDom::new())
    }

    #[test]
    fn renders_and_rerenders_a_binding() {
        let (_rt, env, state, mut dom) = setup();
        state.set("greeting", Value::str("hello"));

        let mut renderer = SyncRenderer::new(env);
        let root: ValueRef = Arc::new(ConstReference::new(Value::object(state.clone())));
        renderer
            .render(&greeting_program(), root, &mut dom)
            .unwrap();
        assert_eq!(dom.text_content(dom.root()), "hello");

        state.set("greeting", Value::str("goodbye"));
        assert!(renderer.is_scheduled());
        assert!(renderer.flush(&mut dom).unwrap());
        assert_eq!(dom.text_content(dom.root()), "goodbye");
    }

    #[test]
    fn mutations_coalesce_into_one_pass() {
        let (_rt, env, state, mut dom) = setup();
        state.set("greeting", Value::str("a"));

        let mut renderer = SyncRenderer::new(env);
        let root: ValueRef = Arc::new(ConstReference::new(Value::object(state.clone())));
        renderer
            .render(&greeting_program(), root, &mut dom)
            .unwrap();

        state.set("greeting", Value::str("b"));
        state.set("greeting", Value::str("c"));

        assert!(renderer.flush(&mut dom).unwrap());
        assert_eq!(renderer.passes(), 1);
        assert_eq!(dom.text_content(dom.root()), "c");

        // Nothing pending: the second flush is a no-op.
        assert!(!renderer.flush(&mut dom).unwrap());
        assert_eq!(renderer.passes(), 1);
    }

    #[test]
    fn completion_listeners_run_after_dom_mutation() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let (_rt, env, state, mut dom) = setup();
        state.set("greeting", Value::str("a"));

        let mut renderer = SyncRenderer::new(env);
        let observed = Arc::new(AtomicBool::new(false));
        let observed_clone = observed.clone();
        renderer.on_render_complete(move || {
            observed_clone.store(true, Ordering::SeqCst);
        });

        let root: ValueRef = Arc::new(ConstReference::new(Value::object(state.clone())));
        renderer
            .render(&greeting_program(), root, &mut dom)
            .unwrap();
        assert!(observed.load(Ordering::SeqCst));
    }

    #[test]
    fn listener_mutations_schedule_a_fresh_pass() {
        let (_rt, env, state, mut dom) = setup();
        state.set("greeting", Value::str("a"));
        state.set("echo", Value::str(""));

        let mut renderer = SyncRenderer::new(env);
        let state_clone = state.clone();
        renderer.on_render_complete(move || {
            // Mirror the greeting after every pass; schedules another
            // pass only while the values differ.
            let current = state_clone.get("greeting");
            state_clone.set("echo", current);
        });

        let root: ValueRef = Arc::new(ConstReference::new(Value::object(state.clone())));
        renderer
            .render(&greeting_program(), root, &mut dom)
            .unwrap();

        // The listener's mutation was not dropped: it is pending now.
        assert!(renderer.is_scheduled());
        assert!(renderer.flush(&mut dom).unwrap());
        assert_eq!(state.get("echo"), Value::str("a"));
        assert!(!renderer.is_scheduled());
    }
}
