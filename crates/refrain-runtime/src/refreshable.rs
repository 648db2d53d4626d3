#![forbid(unsafe_code)]

//! Refreshable functions: UI regions that rebuild in place on demand.
//!
//! # Design
//!
//! A [`Refreshable`] wraps a body closure together with everything needed to
//! replay it: the declared parameter names, the scheduler for async runs,
//! and the list of live rebuild targets. Invoking it mounts a fresh
//! container element at the current build scope, records a target, and runs
//! the body into that container. Refreshing clears each matching container
//! and runs the body again in place, so the rebuilt region keeps its
//! position among its siblings.
//!
//! Targets are scoped by instance identity. A plain [`invoke`] creates an
//! unbound target; [`bind`] yields a [`Bound`] handle whose invokes and
//! refreshes only ever touch targets carrying that [`InstanceId`]. An
//! unbound [`refresh`] deliberately skips bound targets, mirroring the
//! split between a free function and the same function attached to widget
//! instances.
//!
//! Every pass starts by pruning: targets whose container or session died
//! are dropped, as are targets idle past the configured [`max_idle`]
//! window. Holding a `Refreshable` therefore never keeps a closed session's
//! tree alive.
//!
//! # Failure Modes
//!
//! - Argument-binding failures surface as typed [`Error`]s before the body
//!   runs. A failed [`invoke`] leaves no target behind; a failed refresh
//!   stops the pass at the first bad target.
//! - A body failure is wrapped in [`Error::Body`] and leaves the target in
//!   place with whatever it managed to mount; the next refresh rebuilds it.
//!
//! [`invoke`]: Refreshable::invoke
//! [`refresh`]: Refreshable::refresh
//! [`bind`]: Refreshable::bind
//! [`max_idle`]: RefreshableBuilder::max_idle

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::future::{FutureExt, LocalBoxFuture};

use refrain_core::element::Element;

use crate::args::{CallArgs, Invocation};
use crate::error::{BodyError, Error};
use crate::instance::InstanceId;
use crate::scheduler::Scheduler;
use crate::target::{self, RunOutcome, TargetInner};

/// Tag of the container element mounted around each target's output.
pub const CONTAINER_TAG: &str = "refreshable";

static REFRESH_PASSES_TOTAL: AtomicU64 = AtomicU64::new(0);
static TARGETS_PRUNED_TOTAL: AtomicU64 = AtomicU64::new(0);

/// Number of refresh passes executed since process start.
#[must_use]
pub fn refresh_passes_total() -> u64 {
    REFRESH_PASSES_TOTAL.load(Ordering::Relaxed)
}

/// Number of rebuild targets dropped by pruning since process start.
#[must_use]
pub fn targets_pruned_total() -> u64 {
    TARGETS_PRUNED_TOTAL.load(Ordering::Relaxed)
}

pub(crate) enum Body {
    Sync(Rc<dyn Fn(Invocation) -> Result<(), BodyError>>),
    Async(Rc<dyn Fn(Invocation) -> LocalBoxFuture<'static, Result<(), BodyError>>>),
}

struct Inner {
    name: Rc<str>,
    params: Vec<String>,
    body: Body,
    scheduler: Scheduler,
    max_idle: Option<Duration>,
    targets: RefCell<Vec<Rc<TargetInner>>>,
}

/// A function whose rendered output can be rebuilt in place.
///
/// Cloning shares the target list; clones are interchangeable handles to
/// the same refreshable function.
#[derive(Clone)]
pub struct Refreshable {
    inner: Rc<Inner>,
}

impl fmt::Debug for Refreshable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Refreshable")
            .field("function", &self.inner.name)
            .field("targets", &self.inner.targets.borrow().len())
            .finish()
    }
}

impl Refreshable {
    /// Starts describing a refreshable function named `name`.
    #[must_use]
    pub fn builder(name: impl Into<String>, scheduler: &Scheduler) -> RefreshableBuilder {
        RefreshableBuilder {
            name: name.into(),
            scheduler: scheduler.clone(),
            params: Vec::new(),
            max_idle: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub(crate) fn name_rc(&self) -> Rc<str> {
        Rc::clone(&self.inner.name)
    }

    pub(crate) fn params(&self) -> &[String] {
        &self.inner.params
    }

    pub(crate) fn body(&self) -> &Body {
        &self.inner.body
    }

    /// Runs the body once into a fresh container mounted at the current
    /// build scope, recording an unbound target for later refreshes.
    ///
    /// Synchronous bodies have completed when this returns; asynchronous
    /// ones come back as [`RunOutcome::Pending`] for the caller to schedule
    /// or await.
    ///
    /// # Panics
    ///
    /// Panics when no container is entered on this thread, as
    /// [`Element::mount`] does.
    pub fn invoke(&self, args: CallArgs) -> Result<RunOutcome, Error> {
        self.invoke_for(None, args)
    }

    /// Rebuilds every live unbound target, in creation order.
    ///
    /// `args` fold into each target's remembered arguments first: fresh
    /// positional arguments replace the old ones wholesale (an empty list
    /// keeps them), keywords merge entry by entry. Async rebuilds are handed
    /// to the scheduler automatically. The pass stops at the first failing
    /// target.
    pub fn refresh(&self, args: CallArgs) -> Result<(), Error> {
        self.refresh_for(None, args)
    }

    /// Scopes this refreshable to one widget instance.
    #[must_use]
    pub fn bind(&self, instance: InstanceId) -> Bound {
        Bound { refreshable: self.clone(), instance }
    }

    /// Drops targets whose container or session died, plus any idle past
    /// the configured `max_idle`. Runs implicitly before every invoke,
    /// refresh, and count.
    pub fn prune(&self) {
        let max_idle = self.inner.max_idle;
        let mut dead = 0u64;
        let mut idle = 0u64;
        self.inner.targets.borrow_mut().retain(|target| {
            if !target.container().is_live() {
                dead += 1;
                return false;
            }
            if let Some(limit) = max_idle
                && target.idle_for() > limit
            {
                target.container().remove();
                idle += 1;
                return false;
            }
            true
        });
        if dead + idle > 0 {
            TARGETS_PRUNED_TOTAL.fetch_add(dead + idle, Ordering::Relaxed);
            tracing::trace!(
                message = "refreshable.prune",
                function = %self.inner.name,
                dead,
                idle,
            );
        }
    }

    /// Disposes every unbound target, removing its container from the tree.
    pub fn dispose(&self) {
        let removed = self.dispose_where(|target| target.instance().is_none());
        tracing::debug!(message = "refreshable.dispose", function = %self.inner.name, removed);
    }

    /// Disposes every target, bound or not.
    pub fn dispose_all(&self) {
        let removed = self.dispose_where(|_| true);
        tracing::debug!(
            message = "refreshable.dispose_all",
            function = %self.inner.name,
            removed,
        );
    }

    /// Number of live targets, over all instances. Prunes first.
    #[must_use]
    pub fn target_count(&self) -> usize {
        self.prune();
        self.inner.targets.borrow().len()
    }

    fn invoke_for(
        &self,
        instance: Option<InstanceId>,
        args: CallArgs,
    ) -> Result<RunOutcome, Error> {
        self.prune();
        let container = Element::new(CONTAINER_TAG).mount();
        let target = Rc::new(TargetInner::new(container, instance, args));
        // Validate before registering so a bad call leaves nothing behind.
        if let Err(error) = target.bind(self.name(), self.params()) {
            target.container().remove();
            return Err(error);
        }
        self.inner.targets.borrow_mut().push(Rc::clone(&target));
        tracing::debug!(
            message = "refreshable.invoke",
            function = %self.inner.name,
            target = %target.id(),
            instance = ?instance,
        );
        target::run(&target, self)
    }

    fn refresh_for(&self, instance: Option<InstanceId>, args: CallArgs) -> Result<(), Error> {
        self.prune();
        // Snapshot so a body registering or disposing targets mid-pass (a
        // nested invoke, a setter) cannot invalidate the iteration.
        let matching: Vec<Rc<TargetInner>> = self
            .inner
            .targets
            .borrow()
            .iter()
            .filter(|target| target.instance() == instance)
            .map(Rc::clone)
            .collect();
        REFRESH_PASSES_TOTAL.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            message = "refreshable.refresh",
            function = %self.inner.name,
            instance = ?instance,
            targets = matching.len(),
        );
        for target in matching {
            target.merge_args(&args);
            target.container().clear();
            target::run(&target, self)?.schedule(&self.inner.scheduler);
        }
        Ok(())
    }

    fn dispose_where(&self, matches: impl Fn(&TargetInner) -> bool) -> usize {
        let mut removed = 0;
        self.inner.targets.borrow_mut().retain(|target| {
            if matches(target) {
                target.container().remove();
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }
}

/// A refreshable function scoped to one widget instance.
///
/// Created by [`Refreshable::bind`]. Invokes record targets carrying the
/// instance id; refreshes and disposal only touch those targets.
#[derive(Debug, Clone)]
pub struct Bound {
    refreshable: Refreshable,
    instance: InstanceId,
}

impl Bound {
    #[must_use]
    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// As [`Refreshable::invoke`], with the target keyed to this instance.
    pub fn invoke(&self, args: CallArgs) -> Result<RunOutcome, Error> {
        self.refreshable.invoke_for(Some(self.instance), args)
    }

    /// Rebuilds only this instance's live targets.
    pub fn refresh(&self, args: CallArgs) -> Result<(), Error> {
        self.refreshable.refresh_for(Some(self.instance), args)
    }

    /// Disposes only this instance's targets.
    pub fn dispose(&self) {
        let instance = self.instance;
        let removed = self
            .refreshable
            .dispose_where(|target| target.instance() == Some(instance));
        tracing::debug!(
            message = "refreshable.dispose_bound",
            function = %self.refreshable.inner.name,
            instance = %instance,
            removed,
        );
    }

    /// Number of live targets keyed to this instance. Prunes first.
    #[must_use]
    pub fn target_count(&self) -> usize {
        self.refreshable.prune();
        let instance = self.instance;
        self.refreshable
            .inner
            .targets
            .borrow()
            .iter()
            .filter(|target| target.instance() == Some(instance))
            .count()
    }
}

/// Builder for [`Refreshable`]; finish with [`sync`](Self::sync) or
/// [`async_fn`](Self::async_fn).
pub struct RefreshableBuilder {
    name: String,
    scheduler: Scheduler,
    params: Vec<String>,
    max_idle: Option<Duration>,
}

impl fmt::Debug for RefreshableBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshableBuilder")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("max_idle", &self.max_idle)
            .finish_non_exhaustive()
    }
}

impl RefreshableBuilder {
    /// Declares the parameter names, in positional order. Calls bind
    /// against this list; keywords outside it are rejected.
    #[must_use]
    pub fn params<I>(mut self, names: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.params = names.into_iter().map(Into::into).collect();
        self
    }

    /// Targets idle longer than `limit` are disposed during prune.
    #[must_use]
    pub fn max_idle(mut self, limit: Duration) -> Self {
        self.max_idle = Some(limit);
        self
    }

    /// Finishes with a synchronous body.
    pub fn sync<F>(self, body: F) -> Refreshable
    where
        F: Fn(Invocation) -> Result<(), BodyError> + 'static,
    {
        self.finish(Body::Sync(Rc::new(body)))
    }

    /// Finishes with an asynchronous body.
    pub fn async_fn<F, Fut>(self, body: F) -> Refreshable
    where
        F: Fn(Invocation) -> Fut + 'static,
        Fut: Future<Output = Result<(), BodyError>> + 'static,
    {
        self.finish(Body::Async(Rc::new(move |invocation| {
            body(invocation).boxed_local()
        })))
    }

    fn finish(self, body: Body) -> Refreshable {
        Refreshable {
            inner: Rc::new(Inner {
                name: Rc::from(self.name),
                params: self.params,
                body,
                scheduler: self.scheduler,
                max_idle: self.max_idle,
                targets: RefCell::new(Vec::new()),
            }),
        }
    }
}

// ─────────────────────────────────── Tests ──────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use refrain_core::session::Session;

    use crate::state::{SetState, use_state};

    fn setup() -> (Session, Scheduler) {
        (Session::open(), Scheduler::new())
    }

    #[test]
    fn each_invoke_mounts_its_own_container() {
        let (session, scheduler) = setup();
        let view = Refreshable::builder("view", &scheduler).sync(|_call| {
            Element::new("label").text("hello").mount();
            Ok(())
        });
        assert_eq!(view.name(), "view");

        let _scope = session.enter();
        view.invoke(CallArgs::new()).unwrap().schedule(&scheduler);
        view.invoke(CallArgs::new()).unwrap().schedule(&scheduler);

        assert_eq!(view.target_count(), 2);
        let containers = session.root().children();
        assert_eq!(containers.len(), 2);
        for container in &containers {
            assert_eq!(container.tag().as_deref(), Some(CONTAINER_TAG));
            assert_eq!(container.child_texts(), ["hello"]);
        }
        session.close();
    }

    #[test]
    fn refresh_rebuilds_in_place_among_siblings() {
        let (session, scheduler) = setup();
        let shown = Rc::new(RefCell::new("first".to_string()));
        let shown_in_body = Rc::clone(&shown);
        let view = Refreshable::builder("view", &scheduler).sync(move |_call| {
            Element::new("label")
                .text(shown_in_body.borrow().clone())
                .mount();
            Ok(())
        });

        let _scope = session.enter();
        view.invoke(CallArgs::new()).unwrap().schedule(&scheduler);
        Element::new("label").text("marker").mount();

        *shown.borrow_mut() = "second".to_string();
        view.refresh(CallArgs::new()).unwrap();

        // The container keeps its position before the marker.
        let expected = "root\n  refreshable\n    label \"second\"\n  label \"marker\"\n";
        assert_eq!(session.dump_tree(), expected);
        session.close();
    }

    #[test]
    fn state_slots_survive_refreshes_of_the_same_target() {
        let (session, scheduler) = setup();
        let seen: Rc<RefCell<Vec<i32>>> = Rc::new(RefCell::new(Vec::new()));
        let setter: Rc<RefCell<Option<SetState<i32>>>> = Rc::new(RefCell::new(None));

        let seen_in_body = Rc::clone(&seen);
        let setter_in_body = Rc::clone(&setter);
        let counter = Refreshable::builder("counter", &scheduler).sync(move |_call| {
            let (count, set_count) = use_state(0_i32);
            seen_in_body.borrow_mut().push(count);
            *setter_in_body.borrow_mut() = Some(set_count);
            Element::new("label").text(format!("count: {count}")).mount();
            Ok(())
        });

        let _scope = session.enter();
        counter.invoke(CallArgs::new()).unwrap().schedule(&scheduler);
        assert_eq!(*seen.borrow(), [0]);

        let set_count = setter.borrow().clone().expect("body ran");
        set_count.set(7).unwrap();
        assert_eq!(*seen.borrow(), [0, 7]);

        // A plain refresh reruns the body against the stored slot.
        counter.refresh(CallArgs::new()).unwrap();
        assert_eq!(*seen.borrow(), [0, 7, 7]);

        let container = &session.root().children()[0];
        assert_eq!(container.child_texts(), ["count: 7"]);
        session.close();
    }

    #[test]
    fn a_set_call_runs_exactly_one_pass_before_returning() {
        let (session, scheduler) = setup();
        let runs = Rc::new(Cell::new(0_u32));
        let setter: Rc<RefCell<Option<SetState<i32>>>> = Rc::new(RefCell::new(None));

        let runs_in_body = Rc::clone(&runs);
        let setter_in_body = Rc::clone(&setter);
        let counter = Refreshable::builder("counter", &scheduler).sync(move |_call| {
            runs_in_body.set(runs_in_body.get() + 1);
            let (_, set_count) = use_state(0_i32);
            *setter_in_body.borrow_mut() = Some(set_count);
            Ok(())
        });

        let _scope = session.enter();
        counter.invoke(CallArgs::new()).unwrap().schedule(&scheduler);
        assert_eq!(runs.get(), 1);

        let set_count = setter.borrow().clone().expect("body ran");
        set_count.set(5).unwrap();
        assert_eq!(runs.get(), 2);
        session.close();
    }

    #[test]
    fn a_setter_outliving_its_target_is_tolerated() {
        let (session, scheduler) = setup();
        let runs = Rc::new(Cell::new(0_u32));
        let setter: Rc<RefCell<Option<SetState<i32>>>> = Rc::new(RefCell::new(None));

        let runs_in_body = Rc::clone(&runs);
        let setter_in_body = Rc::clone(&setter);
        let counter = Refreshable::builder("counter", &scheduler).sync(move |_call| {
            runs_in_body.set(runs_in_body.get() + 1);
            let (_, set_count) = use_state(0_i32);
            *setter_in_body.borrow_mut() = Some(set_count);
            Ok(())
        });

        {
            let _scope = session.enter();
            counter.invoke(CallArgs::new()).unwrap().schedule(&scheduler);
        }
        session.close();

        let set_count = setter.borrow().clone().expect("body ran");
        set_count.set(9).unwrap();
        // The target was pruned with its session; no body rerun happened.
        assert_eq!(runs.get(), 1);
        assert_eq!(counter.target_count(), 0);
    }

    #[test]
    fn refresh_arguments_replace_positional_and_merge_keywords() {
        let (session, scheduler) = setup();
        let view = Refreshable::builder("view", &scheduler)
            .params(["a", "b"])
            .sync(|call| {
                let a = call.arg_opt::<i64>("a");
                let b = call.arg_opt::<i64>("b");
                Element::new("label").text(format!("{a:?}/{b:?}")).mount();
                Ok(())
            });

        let _scope = session.enter();
        view.invoke(CallArgs::new().pos(1_i64).kw("b", 2_i64))
            .unwrap()
            .schedule(&scheduler);
        let container = session.root().children().remove(0);
        assert_eq!(container.child_texts(), ["Some(1)/Some(2)"]);

        // Keywords merge; the remembered positional argument stays.
        view.refresh(CallArgs::new().kw("b", 3_i64)).unwrap();
        assert_eq!(container.child_texts(), ["Some(1)/Some(3)"]);

        // Fresh positional arguments replace the old ones wholesale.
        view.refresh(CallArgs::new().pos(9_i64)).unwrap();
        assert_eq!(container.child_texts(), ["Some(9)/Some(3)"]);
        session.close();
    }

    #[test]
    fn an_invalid_invoke_leaves_no_target_behind() {
        let (session, scheduler) = setup();
        let view = Refreshable::builder("view", &scheduler)
            .params(["a"])
            .sync(|_call| Ok(()));

        let _scope = session.enter();
        let err = view
            .invoke(CallArgs::new().pos(1_i64).kw("a", 2_i64))
            .unwrap_err();
        assert!(matches!(err, Error::InconsistentArgument { .. }));
        assert!(err.to_string().contains("consistently"));

        assert_eq!(view.target_count(), 0);
        assert_eq!(session.root().child_count(), 0);
        session.close();
    }

    #[test]
    fn refresh_with_an_unknown_keyword_fails_the_pass() {
        let (session, scheduler) = setup();
        let view = Refreshable::builder("view", &scheduler)
            .params(["a"])
            .sync(|_call| Ok(()));

        let _scope = session.enter();
        view.invoke(CallArgs::new()).unwrap().schedule(&scheduler);
        let err = view.refresh(CallArgs::new().kw("bogus", 1_i64)).unwrap_err();
        let Error::UnknownKeyword { function, parameter } = err else {
            panic!("expected UnknownKeyword, got {err:?}");
        };
        assert_eq!(function, "view");
        assert_eq!(parameter, "bogus");
        session.close();
    }

    #[test]
    fn a_body_failure_is_wrapped_and_keeps_the_target() {
        let (session, scheduler) = setup();
        let view =
            Refreshable::builder("broken", &scheduler).sync(|_call| Err("boom".into()));

        let _scope = session.enter();
        let err = view.invoke(CallArgs::new()).unwrap_err();
        assert!(matches!(err, Error::Body { .. }));
        assert_eq!(err.to_string(), "`broken` body failed: boom");

        // The partially built target stays; a later refresh retries it.
        assert_eq!(view.target_count(), 1);
        let err = view.refresh(CallArgs::new()).unwrap_err();
        assert!(matches!(err, Error::Body { .. }));
        session.close();
    }

    #[test]
    fn bound_and_unbound_refreshes_stay_in_their_lanes() {
        let (session, scheduler) = setup();
        let log: Rc<RefCell<Vec<Option<InstanceId>>>> = Rc::new(RefCell::new(Vec::new()));
        let log_in_body = Rc::clone(&log);
        let view = Refreshable::builder("view", &scheduler).sync(move |call| {
            log_in_body.borrow_mut().push(call.instance());
            Ok(())
        });

        let a = InstanceId::next();
        let b = InstanceId::next();
        let bound_a = view.bind(a);
        let bound_b = view.bind(b);

        let _scope = session.enter();
        view.invoke(CallArgs::new()).unwrap().schedule(&scheduler);
        bound_a.invoke(CallArgs::new()).unwrap().schedule(&scheduler);
        bound_b.invoke(CallArgs::new()).unwrap().schedule(&scheduler);
        assert_eq!(view.target_count(), 3);
        assert_eq!(bound_a.target_count(), 1);

        log.borrow_mut().clear();
        bound_b.refresh(CallArgs::new()).unwrap();
        assert_eq!(*log.borrow(), [Some(b)]);

        log.borrow_mut().clear();
        view.refresh(CallArgs::new()).unwrap();
        assert_eq!(*log.borrow(), [None]);
        session.close();
    }

    #[test]
    fn dispose_variants_remove_their_targets_and_containers() {
        let (session, scheduler) = setup();
        let view = Refreshable::builder("view", &scheduler).sync(|_call| Ok(()));
        let bound = view.bind(InstanceId::next());

        let _scope = session.enter();
        view.invoke(CallArgs::new()).unwrap().schedule(&scheduler);
        bound.invoke(CallArgs::new()).unwrap().schedule(&scheduler);
        assert_eq!(session.root().child_count(), 2);

        view.dispose();
        assert_eq!(view.target_count(), 1);
        assert_eq!(session.root().child_count(), 1);

        bound.dispose();
        assert_eq!(view.target_count(), 0);
        assert_eq!(session.root().child_count(), 0);

        view.invoke(CallArgs::new()).unwrap().schedule(&scheduler);
        bound.invoke(CallArgs::new()).unwrap().schedule(&scheduler);
        view.dispose_all();
        assert_eq!(view.target_count(), 0);
        assert_eq!(session.root().child_count(), 0);
        session.close();
    }

    #[test]
    fn refresh_prunes_targets_of_closed_sessions() {
        let scheduler = Scheduler::new();
        let runs = Rc::new(Cell::new(0_u32));
        let runs_in_body = Rc::clone(&runs);
        let view = Refreshable::builder("view", &scheduler).sync(move |_call| {
            runs_in_body.set(runs_in_body.get() + 1);
            Ok(())
        });

        let doomed = Session::open();
        let surviving = Session::open();
        {
            let _scope = doomed.enter();
            view.invoke(CallArgs::new()).unwrap().schedule(&scheduler);
        }
        {
            let _scope = surviving.enter();
            view.invoke(CallArgs::new()).unwrap().schedule(&scheduler);
        }
        assert_eq!(view.target_count(), 2);

        doomed.close();
        let pruned_before = targets_pruned_total();
        let passes_before = refresh_passes_total();
        runs.set(0);
        view.refresh(CallArgs::new()).unwrap();

        assert_eq!(runs.get(), 1);
        assert_eq!(view.target_count(), 1);
        assert!(targets_pruned_total() >= pruned_before + 1);
        assert!(refresh_passes_total() >= passes_before + 1);
        surviving.close();
    }

    #[test]
    fn idle_targets_are_disposed_by_prune() {
        let (session, scheduler) = setup();
        let view = Refreshable::builder("view", &scheduler)
            .max_idle(Duration::from_millis(1))
            .sync(|_call| {
                Element::new("label").text("stale").mount();
                Ok(())
            });

        let _scope = session.enter();
        view.invoke(CallArgs::new()).unwrap().schedule(&scheduler);
        assert_eq!(session.root().child_count(), 1);

        std::thread::sleep(Duration::from_millis(10));
        view.prune();
        assert_eq!(view.target_count(), 0);
        assert_eq!(session.root().child_count(), 0);
        session.close();
    }

    #[test]
    #[should_panic(expected = "holds a different type")]
    fn changing_a_slot_type_across_runs_panics() {
        let (session, scheduler) = setup();
        let first_run = Rc::new(Cell::new(true));
        let first_run_in_body = Rc::clone(&first_run);
        let view = Refreshable::builder("view", &scheduler).sync(move |_call| {
            if first_run_in_body.replace(false) {
                let _ = use_state(0_i32);
            } else {
                let _ = use_state(String::new());
            }
            Ok(())
        });

        let _scope = session.enter();
        view.invoke(CallArgs::new()).unwrap().schedule(&scheduler);
        view.refresh(CallArgs::new()).unwrap();
    }

    #[test]
    fn bodies_observe_the_active_target_probe() {
        let (session, scheduler) = setup();
        let observed = Rc::new(Cell::new(false));
        let observed_in_body = Rc::clone(&observed);
        let view = Refreshable::builder("view", &scheduler).sync(move |_call| {
            observed_in_body.set(target::inside_refreshable());
            Ok(())
        });

        assert!(!target::inside_refreshable());
        let _scope = session.enter();
        view.invoke(CallArgs::new()).unwrap().schedule(&scheduler);
        assert!(observed.get());
        assert!(!target::inside_refreshable());
        session.close();
    }

    #[test]
    fn async_bodies_defer_until_the_scheduler_drives_them() {
        let (session, scheduler) = setup();
        let view = Refreshable::builder("feed", &scheduler).async_fn(|_call| async {
            Element::new("label").text("loaded").mount();
            Ok(())
        });

        let _scope = session.enter();
        let outcome = view.invoke(CallArgs::new()).unwrap();
        assert!(outcome.is_pending());
        let container = session.root().children().remove(0);
        assert_eq!(container.child_count(), 0);

        // Dispatch before start lands in the startup queue.
        outcome.schedule(&scheduler);
        scheduler.run_until_stalled();
        assert_eq!(container.child_count(), 0);
        assert_eq!(scheduler.startup_pending(), 1);

        scheduler.start();
        scheduler.run_until_stalled();
        assert_eq!(container.child_texts(), ["loaded"]);
        session.close();
    }
}
