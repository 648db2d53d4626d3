#![forbid(unsafe_code)]

//! Scheduler: the single-threaded bridge between rebuilds and an event loop.
//!
//! # Design
//!
//! Rebuild passes stay synchronous; only async bodies produce work for the
//! scheduler ([`PendingRun`]s). A [`Scheduler`] wraps a
//! [`futures::executor::LocalPool`] plus a startup queue. [`dispatch`]
//! routes a pending run by loop state: spawned onto the pool while the loop
//! is running, deferred to the startup queue before [`start`] has been
//! called. Startup work is promoted to the pool exactly once.
//!
//! The spawner is cloned out of the pool up front, so a driven task can
//! spawn follow-up work through the same `Scheduler` handle without
//! re-borrowing the pool it is being polled from.
//!
//! [`dispatch`]: Scheduler::dispatch
//! [`start`]: Scheduler::start

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use futures::executor::{LocalPool, LocalSpawner};
use futures::future::{FutureExt, LocalBoxFuture};
use futures::task::LocalSpawnExt;

use crate::target::PendingRun;

/// Cloneable handle to one single-threaded scheduling loop.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<SchedulerInner>,
}

struct SchedulerInner {
    pool: RefCell<LocalPool>,
    spawner: LocalSpawner,
    running: Cell<bool>,
    startup: RefCell<Vec<LocalBoxFuture<'static, ()>>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("running", &self.inner.running.get())
            .field("startup_pending", &self.inner.startup.borrow().len())
            .finish()
    }
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Self {
            inner: Rc::new(SchedulerInner {
                pool: RefCell::new(pool),
                spawner,
                running: Cell::new(false),
                startup: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Whether [`start`](Self::start) has been called.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }

    /// Number of startup tasks still waiting for [`start`](Self::start).
    #[must_use]
    pub fn startup_pending(&self) -> usize {
        self.inner.startup.borrow().len()
    }

    /// Queues `future` on the pool immediately.
    pub fn spawn(&self, future: impl Future<Output = ()> + 'static) {
        self.inner
            .spawner
            .spawn_local(future)
            .expect("local task queue closed");
    }

    /// Defers `future` until the loop starts.
    pub fn on_startup(&self, future: impl Future<Output = ()> + 'static) {
        self.inner.startup.borrow_mut().push(future.boxed_local());
    }

    /// Marks the loop as running and promotes deferred startup work to the
    /// pool. Idempotent; later calls do nothing.
    pub fn start(&self) {
        if self.inner.running.replace(true) {
            return;
        }
        let hooks = self.inner.startup.take();
        tracing::debug!(message = "scheduler.start", startup_hooks = hooks.len());
        for hook in hooks {
            self.spawn(hook);
        }
    }

    /// Polls queued tasks until all of them stall on pending awaits.
    pub fn run_until_stalled(&self) {
        self.inner.pool.borrow_mut().run_until_stalled();
    }

    /// Runs queued tasks to completion.
    pub fn run(&self) {
        self.inner.pool.borrow_mut().run();
    }

    /// Routes an async rebuild by loop state: spawned right away while the
    /// loop runs, otherwise deferred to startup. A failed run is logged at
    /// warn level rather than propagated.
    pub fn dispatch(&self, run: PendingRun) {
        let function = run.function().to_string();
        let task = async move {
            if let Err(error) = run.await {
                tracing::warn!(
                    message = "scheduler.run_failed",
                    function = %function,
                    error = %error,
                );
            }
        };
        if self.is_running() {
            tracing::trace!(message = "scheduler.dispatch", state = "spawned");
            self.spawn(task);
        } else {
            tracing::trace!(message = "scheduler.dispatch", state = "deferred");
            self.on_startup(task);
        }
    }
}

// ─────────────────────────────────── Tests ──────────────────────────────────
