//! Render Layer
//!
//! This module implements the render transaction and its collaborator
//! boundaries: the compiled program shape, the helper registry with its
//! read-only arguments view, the DOM backend trait (plus the in-memory
//! reference backend), and the resumable program evaluator.
//!
//! # Data Flow
//!
//! A scheduler drains a [`Program`] through the evaluator, producing a
//! [`RenderResult`]: a persistent tree of bound computations. Every
//! later pass walks that tree and re-applies exactly the computations
//! whose tags fail validation. See [`transaction`] for the walk and
//! [`vm`] for the drain.

pub mod dom;
pub mod program;
pub mod registry;
pub mod transaction;

pub(crate) mod vm;

pub use dom::{DomBackend, MemoryDom, NodeId};
pub use program::{Expr, Op, PathHead, Program};
pub use registry::{Arguments, HelperFn, Registry};
pub use transaction::{RenderResult, Transaction, TransactionState};

use std::sync::Arc;

use crate::Runtime;

/// Everything a render pass needs besides the DOM: the reactive runtime
/// and the helper registry. Cheap to clone.
#[derive(Clone)]
pub struct Environment {
    runtime: Runtime,
    registry: Arc<Registry>,
}

impl Environment {
    /// Bundle a runtime with a helper registry.
    pub fn new(runtime: Runtime, registry: Registry) -> Self {
        Self {
            runtime,
            registry: Arc::new(registry),
        }
    }

    /// The reactive runtime.
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// The helper registry.
    pub fn helpers(&self) -> &Registry {
        &self.registry
    }
}
