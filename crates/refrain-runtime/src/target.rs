#![forbid(unsafe_code)]

//! Rebuild targets: one per invocation, the active-target stack, and runs.
//!
//! # Design
//!
//! Every invocation of a refreshable function creates a [`TargetInner`]
//! remembering the container it rendered into, the arguments it was called
//! with, the instance it is scoped to, and its positional state slots. A
//! refresh replays the body against that record. While a body runs, its
//! target sits on a thread-local active stack so
//! [`use_state`](crate::state::use_state) can find it without any parameter
//! threading; the stack is token-addressed (see
//! [`ScopeStack`](refrain_core::scope::ScopeStack)) because interleaved
//! async runs finish in arbitrary order.
//!
//! Running an async body never executes it inline. [`run`] returns
//! [`RunOutcome::Pending`]; the caller either awaits it or hands it to the
//! [`Scheduler`](crate::scheduler::Scheduler). The pending run installs the
//! active-target entry and container scope around every poll rather than
//! holding them across awaits, so suspended runs of other targets on the
//! same thread never capture each other's mounts. A refresh does not cancel
//! a suspended run of the same target; the stale run resumes against the
//! rebuilt target and its late mounts go away on the next refresh.
//!
//! # Invariants
//!
//! 1. The slot cursor resets to zero when a run starts (at the first poll
//!    for async bodies) and nowhere else.
//! 2. Slot storage only ever grows; a setter's index stays valid for the
//!    target's whole life.
//! 3. `current_active()` reflects the body being polled right now on this
//!    thread, never a suspended one.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::marker::PhantomData;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use ahash::AHashMap;
use futures::future::LocalBoxFuture;
use web_time::Instant;

use refrain_core::element::ElementHandle;
use refrain_core::scope::ScopeStack;

use crate::args::{ArgValue, CallArgs, Invocation, bind_arguments};
use crate::error::{BodyError, Error};
use crate::instance::InstanceId;
use crate::refreshable::{Body, Refreshable};
use crate::scheduler::Scheduler;

static NEXT_TARGET_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one rebuild target for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(u64);

impl TargetId {
    fn next() -> Self {
        Self(NEXT_TARGET_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "target#{}", self.0)
    }
}

/// Everything remembered about one invocation of a refreshable function.
pub(crate) struct TargetInner {
    id: TargetId,
    container: ElementHandle,
    instance: Option<InstanceId>,
    positional: RefCell<Vec<ArgValue>>,
    keyword: RefCell<AHashMap<String, ArgValue>>,
    slots: RefCell<Vec<Rc<dyn Any>>>,
    cursor: Cell<usize>,
    last_run: Cell<Instant>,
}

impl TargetInner {
    pub(crate) fn new(
        container: ElementHandle,
        instance: Option<InstanceId>,
        args: CallArgs,
    ) -> Self {
        Self {
            id: TargetId::next(),
            container,
            instance,
            positional: RefCell::new(args.positional),
            keyword: RefCell::new(args.keyword),
            slots: RefCell::new(Vec::new()),
            cursor: Cell::new(0),
            last_run: Cell::new(Instant::now()),
        }
    }

    pub(crate) fn id(&self) -> TargetId {
        self.id
    }

    pub(crate) fn container(&self) -> &ElementHandle {
        &self.container
    }

    pub(crate) fn instance(&self) -> Option<InstanceId> {
        self.instance
    }

    /// Folds refresh-time arguments into the remembered ones. New positional
    /// arguments replace the old vector wholesale but an empty one keeps it;
    /// keywords merge entry by entry.
    pub(crate) fn merge_args(&self, args: &CallArgs) {
        if !args.positional.is_empty() {
            *self.positional.borrow_mut() = args.positional.clone();
        }
        if !args.keyword.is_empty() {
            self.keyword
                .borrow_mut()
                .extend(args.keyword.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }

    pub(crate) fn bind(
        &self,
        function: &str,
        params: &[String],
    ) -> Result<AHashMap<String, ArgValue>, Error> {
        let positional = self.positional.borrow();
        let keyword = self.keyword.borrow();
        bind_arguments(function, params, &positional, &keyword)
    }

    pub(crate) fn touch(&self) {
        self.last_run.set(Instant::now());
    }

    pub(crate) fn idle_for(&self) -> Duration {
        self.last_run.get().elapsed()
    }

    /// Marks the start of one run: slot claims start over from position 0.
    fn begin_run(&self) {
        self.cursor.set(0);
        self.touch();
    }

    /// Claims the next slot position for the current run, filling it with
    /// `init` on first claim. Returns the position and the stored value.
    pub(crate) fn next_slot(&self, init: impl FnOnce() -> Rc<dyn Any>) -> (usize, Rc<dyn Any>) {
        let index = self.cursor.get();
        let mut slots = self.slots.borrow_mut();
        if index >= slots.len() {
            slots.push(init());
        }
        let value = Rc::clone(&slots[index]);
        drop(slots);
        self.cursor.set(index + 1);
        (index, value)
    }

    /// Overwrites an existing slot. The index must have been claimed by an
    /// earlier `next_slot`; slot storage never shrinks, so it stays in range.
    pub(crate) fn write_slot(&self, index: usize, value: Rc<dyn Any>) {
        self.slots.borrow_mut()[index] = value;
    }

    #[cfg(test)]
    pub(crate) fn slot_count(&self) -> usize {
        self.slots.borrow().len()
    }
}

impl fmt::Debug for TargetInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetInner")
            .field("id", &self.id)
            .field("instance", &self.instance)
            .field("container", &self.container)
            .field("slots", &self.slots.borrow().len())
            .finish()
    }
}

// ─────────────────────────── Active-target stack ───────────────────────────

/// The target (and its owning refreshable) whose body is currently running.
#[derive(Clone)]
pub(crate) struct ActiveTarget {
    pub(crate) target: Rc<TargetInner>,
    pub(crate) owner: Refreshable,
}

thread_local! {
    static ACTIVE_TARGETS: RefCell<ScopeStack<ActiveTarget>> =
        const { RefCell::new(ScopeStack::new()) };
}

/// Marks a target active while its body is executing (one sync run, or one
/// poll of an async run).
///
/// Not `Send`: the entry lives in a thread-local stack and must be removed
/// on the thread that pushed it.
pub(crate) struct ActiveGuard {
    token: u64,
    _not_send: PhantomData<Rc<()>>,
}

impl ActiveGuard {
    /// Begins a fresh run: resets the slot cursor, then activates.
    pub(crate) fn install(owner: &Refreshable, target: &Rc<TargetInner>) -> Self {
        target.begin_run();
        Self::resume(owner, target)
    }

    /// Activates without restarting the run. Used when an async run is
    /// polled again after an await.
    pub(crate) fn resume(owner: &Refreshable, target: &Rc<TargetInner>) -> Self {
        let token = ACTIVE_TARGETS.with(|stack| {
            stack.borrow_mut().push(ActiveTarget {
                target: Rc::clone(target),
                owner: owner.clone(),
            })
        });
        Self { token, _not_send: PhantomData }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        ACTIVE_TARGETS.with(|stack| {
            stack.borrow_mut().remove(self.token);
        });
    }
}

pub(crate) fn current_active() -> Option<ActiveTarget> {
    ACTIVE_TARGETS.with(|stack| stack.borrow().current().cloned())
}

/// Whether a refreshable body is currently running on this thread.
#[must_use]
pub fn inside_refreshable() -> bool {
    ACTIVE_TARGETS.with(|stack| !stack.borrow().is_empty())
}

// ────────────────────────────────── Running ────────────────────────────────

/// Replays `target`'s body once: binds arguments, activates the target, and
/// executes.
///
/// Synchronous bodies complete inline. Asynchronous bodies are returned as
/// a [`RunOutcome::Pending`] without being polled.
pub(crate) fn run(target: &Rc<TargetInner>, owner: &Refreshable) -> Result<RunOutcome, Error> {
    let bound = target.bind(owner.name(), owner.params())?;
    let invocation = Invocation::new(owner.name_rc(), target.instance(), bound);
    match owner.body() {
        Body::Sync(body) => {
            let body = Rc::clone(body);
            let _active = ActiveGuard::install(owner, target);
            let _scope = target.container().enter();
            tracing::trace!(
                message = "target.run",
                function = owner.name(),
                target = %target.id(),
            );
            body(invocation).map_err(|source| Error::body(owner.name(), source))?;
            Ok(RunOutcome::Completed)
        }
        Body::Async(body) => {
            let body = Rc::clone(body);
            tracing::trace!(
                message = "target.run_async",
                function = owner.name(),
                target = %target.id(),
            );
            // Constructing the future is lazy; the body proper executes
            // under the guards PendingRun installs per poll.
            Ok(RunOutcome::Pending(PendingRun {
                function: owner.name_rc(),
                owner: owner.clone(),
                target: Rc::clone(target),
                fut: body(invocation),
                started: false,
            }))
        }
    }
}

/// An async body's run, not yet driven.
///
/// Awaiting it executes the body on the current task; handing it to
/// [`Scheduler::dispatch`] spawns it (or defers it to startup when the loop
/// is not running yet). Each poll re-activates the run's target and
/// re-enters its container, so interleaved runs on one thread always mount
/// into their own containers.
#[must_use = "a pending run does nothing until scheduled or awaited"]
pub struct PendingRun {
    function: Rc<str>,
    owner: Refreshable,
    target: Rc<TargetInner>,
    fut: LocalBoxFuture<'static, Result<(), BodyError>>,
    started: bool,
}

impl PendingRun {
    /// Name of the refreshable function this run belongs to.
    #[must_use]
    pub fn function(&self) -> &str {
        &self.function
    }
}

impl fmt::Debug for PendingRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRun")
            .field("function", &self.function)
            .field("target", &self.target.id())
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}

impl Future for PendingRun {
    type Output = Result<(), Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if !this.started {
            this.started = true;
            this.target.begin_run();
        }
        let _active = ActiveGuard::resume(&this.owner, &this.target);
        let _scope = this.target.container().enter();
        this.fut
            .as_mut()
            .poll(cx)
            .map(|result| result.map_err(|source| Error::body(&this.function, source)))
    }
}

/// How one run of a body concluded.
#[derive(Debug)]
#[must_use = "an async body's run stays pending until scheduled or awaited"]
pub enum RunOutcome {
    /// The body was synchronous and has already completed.
    Completed,
    /// The body is asynchronous and still has to be driven.
    Pending(PendingRun),
}

impl RunOutcome {
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    pub fn into_pending(self) -> Option<PendingRun> {
        match self {
            Self::Completed => None,
            Self::Pending(run) => Some(run),
        }
    }

    /// Hands a pending run to `scheduler`; completed runs are a no-op.
    pub fn schedule(self, scheduler: &Scheduler) {
        if let Self::Pending(run) = self {
            scheduler.dispatch(run);
        }
    }
}

// ─────────────────────────────────── Tests ──────────────────────────────────
