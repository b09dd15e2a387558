//! Weft Core
//!
//! This crate provides the reactive render core of the Weft UI
//! framework. It implements:
//!
//! - Revision tracking (tags, auto-tracking frames)
//! - The pull-based reference hierarchy (cells, memoized references,
//!   property references)
//! - Keyed-list reconciliation
//! - The incremental render transaction
//! - Synchronous and cooperative scheduling
//!
//! # Architecture
//!
//! The crate is organized into several modules, leaves first:
//!
//! - `track`: revision clock, tags, and auto-tracking frames
//! - `reference`: lazy value cells governed by tags
//! - `value`: the dynamic value model at the render boundary
//! - `iterate`: keyed iteration and by-key reconciliation
//! - `render`: the transaction, the program/DOM boundaries, the
//!   evaluator
//! - `scheduler`: the synchronous and cooperative drivers
//!
//! Data flows one way: a state mutation dirties a tag; a scheduler
//! coalesces invalidations and later runs a revalidation pass; the pass
//! walks the persistent render result and re-applies exactly the bound
//! computations whose tags fail validation.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use weft_core::reference::{ConstReference, TrackedMap};
//! use weft_core::render::{Environment, Expr, MemoryDom, Op, Program, Registry};
//! use weft_core::scheduler::{Renderer, SyncRenderer};
//! use weft_core::{Runtime, Value};
//!
//! let rt = Runtime::new();
//! let state = Arc::new(TrackedMap::new(&rt, "state"));
//! state.set("greeting", Value::str("hello"));
//!
//! let program = Program::new(vec![Op::DynamicText {
//!     expr: Expr::this(["greeting"]),
//! }]);
//!
//! let mut dom = MemoryDom::new();
//! let mut renderer = SyncRenderer::new(Environment::new(rt, Registry::new()));
//! renderer.render(
//!     &program,
//!     Arc::new(ConstReference::new(Value::object(state.clone()))),
//!     &mut dom,
//! )?;
//!
//! state.set("greeting", Value::str("goodbye"));
//! renderer.flush(&mut dom)?;   // re-applies only the invalid binding
//! ```

pub mod error;
pub mod iterate;
pub mod reference;
pub mod render;
pub mod scheduler;
pub mod track;
pub mod value;

mod runtime;

pub use error::RenderError;
pub use runtime::{InvalidationHandle, Runtime};
pub use value::{TrackedObject, Value};
