//! Schedulers
//!
//! Two interchangeable drivers sit between application state and the
//! render transaction: [`SyncRenderer`] drains and revalidates on the
//! caller's thread in one go; [`CooperativeRenderer`] drains in bounded
//! slices scheduled through an idle-time host.
//!
//! # Coalescing
//!
//! Both drivers install an invalidation listener on the runtime. Any
//! number of mutations within one turn raise a single `scheduled` flag;
//! the next `flush` runs exactly one revalidation pass. The flag is
//! cleared before completion listeners are notified, so a mutation made
//! by a lifecycle callback schedules a new, separate pass instead of
//! being silently dropped.
//!
//! Once a revalidation pass begins it runs to completion or returns an
//! error; there is no suspension point and no cancellation inside a
//! pass, in either driver.

mod cooperative;
mod sync;

pub use cooperative::CooperativeRenderer;
pub use sync::SyncRenderer;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::RenderError;
use crate::reference::ValueRef;
use crate::render::transaction::{revalidate, BlockNode, Transaction, TransactionState};
use crate::render::{DomBackend, Environment, Program, RenderResult};
use crate::runtime::InvalidationHandle;

/// The remaining budget of one idle slice.
pub trait IdleDeadline {
    /// Time left in this idle window.
    fn time_remaining(&self) -> Duration;

    /// Whether the host gave up waiting for idle time and forced the
    /// slice to run after the maximum wait timeout.
    fn did_timeout(&self) -> bool;
}

/// The host's idle-callback scheduling surface.
///
/// `next_idle` returns once the host has idle time to spare, or after
/// `max_wait` at the latest (in which case the returned deadline
/// reports `did_timeout`).
pub trait IdleHost {
    fn next_idle(&mut self, max_wait: Duration) -> Box<dyn IdleDeadline>;
}

/// A wall-clock idle deadline.
pub struct TimedDeadline {
    ends_at: Instant,
    timed_out: bool,
}

impl TimedDeadline {
    /// A deadline expiring `budget` from now.
    pub fn new(budget: Duration, timed_out: bool) -> Self {
        Self {
            ends_at: Instant::now() + budget,
            timed_out,
        }
    }
}

impl IdleDeadline for TimedDeadline {
    fn time_remaining(&self) -> Duration {
        self.ends_at.saturating_duration_since(Instant::now())
    }

    fn did_timeout(&self) -> bool {
        self.timed_out
    }
}

/// A host that is always idle: every request immediately yields a slice
/// of the configured length. Useful for headless drivers and tests.
pub struct AlwaysIdleHost {
    slice: Duration,
}

impl AlwaysIdleHost {
    /// A host granting slices of `slice` length.
    pub fn new(slice: Duration) -> Self {
        Self { slice }
    }
}

impl Default for AlwaysIdleHost {
    fn default() -> Self {
        Self::new(Duration::from_millis(8))
    }
}

impl IdleHost for AlwaysIdleHost {
    fn next_idle(&mut self, _max_wait: Duration) -> Box<dyn IdleDeadline> {
        Box::new(TimedDeadline::new(self.slice, false))
    }
}

/// The coalescing flag: raised by any invalidation, lowered once per
/// pass.
pub(crate) struct ScheduleFlag {
    flag: Arc<AtomicBool>,
    _handle: InvalidationHandle,
}

impl ScheduleFlag {
    pub(crate) fn install(runtime: &crate::Runtime) -> Self {
        let flag = Arc::new(AtomicBool::new(false));
        let weak: Weak<AtomicBool> = Arc::downgrade(&flag);
        let handle = runtime.on_invalidate(move || {
            if let Some(flag) = weak.upgrade() {
                flag.store(true, Ordering::SeqCst);
            }
        });
        Self {
            flag,
            _handle: handle,
        }
    }

    pub(crate) fn is_scheduled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub(crate) fn take(&self) -> bool {
        self.flag.swap(false, Ordering::SeqCst)
    }
}

/// The driver machinery both schedulers share: the transaction, the
/// persistent result, the coalescing flag, and completion listeners.
pub(crate) struct RendererCore {
    pub(crate) env: Environment,
    pub(crate) transaction: Transaction,
    pub(crate) result: Option<RenderResult>,
    pub(crate) flag: ScheduleFlag,
    pub(crate) passes: u64,
    completion: Vec<Arc<dyn Fn() + Send + Sync>>,
}

impl RendererCore {
    pub(crate) fn new(env: Environment) -> Self {
        let flag = ScheduleFlag::install(env.runtime());
        Self {
            env,
            transaction: Transaction::new(),
            result: None,
            flag,
            passes: 0,
            completion: Vec::new(),
        }
    }

    pub(crate) fn on_render_complete(&mut self, f: impl Fn() + Send + Sync + 'static) {
        self.completion.push(Arc::new(f));
    }

    pub(crate) fn begin_drain(&mut self) {
        self.transaction.begin(TransactionState::Draining);
    }

    pub(crate) fn finish_drain(&mut self, root: BlockNode) {
        self.result = Some(RenderResult { root });
        self.flag.take();
        self.queue_completion();
        self.transaction.commit();
    }

    pub(crate) fn abort(&mut self) {
        self.transaction.abort();
    }

    /// One full revalidation pass. No-op before the first drain.
    pub(crate) fn rerender(&mut self, dom: &mut dyn DomBackend) -> Result<(), RenderError> {
        let Some(result) = self.result.as_mut() else {
            return Ok(());
        };

        self.passes += 1;
        debug!(pass = self.passes, "rerender pass");
        self.transaction.begin(TransactionState::Revalidating);

        match revalidate(&self.env, result, dom) {
            Ok(()) => {
                // Lower the flag before completion listeners run, so
                // mutations they make schedule a fresh pass.
                self.flag.take();
                self.queue_completion();
                self.transaction.commit();
                Ok(())
            }
            Err(error) => {
                self.transaction.abort();
                Err(error)
            }
        }
    }

    /// Run the pending pass, if one is scheduled.
    pub(crate) fn flush(&mut self, dom: &mut dyn DomBackend) -> Result<bool, RenderError> {
        if self.flag.is_scheduled() {
            self.rerender(dom)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn queue_completion(&mut self) {
        for callback in &self.completion {
            let callback = Arc::clone(callback);
            self.transaction.defer(Box::new(move || callback()));
        }
    }
}

/// The driver contract an application shell renders through.
pub trait Renderer {
    /// Drain `program` against `root`, mounting output at the backend's
    /// root node.
    fn render(
        &mut self,
        program: &Program,
        root: ValueRef,
        dom: &mut dyn DomBackend,
    ) -> Result<(), RenderError>;

    /// Run one revalidation pass unconditionally.
    fn rerender(&mut self, dom: &mut dyn DomBackend) -> Result<(), RenderError>;

    /// Run the pending revalidation pass, if any. Returns whether a
    /// pass ran.
    fn flush(&mut self, dom: &mut dyn DomBackend) -> Result<bool, RenderError>;

    /// Whether invalidations are waiting on a flush.
    fn is_scheduled(&self) -> bool;
}
