#![forbid(unsafe_code)]

//! Positional state slots: values that survive rebuilds of their target.
//!
//! # Design
//!
//! [`use_state`] gives a body a value that persists across refreshes of the
//! same target. Slots are identified by call order, not by name: the first
//! `use_state` in a run claims slot 0, the second slot 1, and so on, with
//! the cursor resetting at the start of every run. A body must therefore
//! call `use_state` the same number of times, in the same order, with the
//! same types on every run; conditional or reordered calls are a
//! programming error and panic with the slot position.
//!
//! The returned [`SetState`] holds its target weakly. Calling it writes the
//! slot and triggers one refresh pass of the owning function, scoped to the
//! instance the target was created under. A setter that outlives its target
//! (the container was pruned) degrades to a refresh of whatever targets
//! survive, which is a no-op when none do.

use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use crate::args::CallArgs;
use crate::error::Error;
use crate::instance::InstanceId;
use crate::refreshable::Refreshable;
use crate::target::{self, TargetInner};

/// Claims the next state slot of the running target.
///
/// Returns the stored value (or `initial` on the slot's first claim) and a
/// setter for it.
///
/// # Panics
///
/// Panics when called outside a running refreshable body, or when the slot
/// at this position was created with a different type on an earlier run.
pub fn use_state<T: Clone + 'static>(initial: T) -> (T, SetState<T>) {
    let Some(active) = target::current_active() else {
        panic!("use_state() may only be called while a refreshable function is running");
    };
    let (index, slot) = active.target.next_slot(|| Rc::new(initial));
    let value = slot
        .downcast_ref::<T>()
        .unwrap_or_else(|| {
            panic!(
                "state slot {index} of `{}` holds a different type than requested; \
                 use_state calls must keep the same order and types on every run",
                active.owner.name()
            )
        })
        .clone();
    let setter = SetState {
        target: Rc::downgrade(&active.target),
        owner: active.owner.clone(),
        instance: active.target.instance(),
        index,
        _marker: PhantomData,
    };
    (value, setter)
}

/// Writes one state slot and refreshes the owning function.
///
/// Cheap to clone and safe to stash in event handlers; the typed parameter
/// keeps later writes from changing the slot's type out from under the body.
pub struct SetState<T> {
    target: Weak<TargetInner>,
    owner: Refreshable,
    instance: Option<InstanceId>,
    index: usize,
    _marker: PhantomData<fn(T)>,
}

impl<T> Clone for SetState<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            owner: self.owner.clone(),
            instance: self.instance,
            index: self.index,
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for SetState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetState")
            .field("function", &self.owner.name())
            .field("slot", &self.index)
            .finish_non_exhaustive()
    }
}

impl<T: 'static> SetState<T> {
    /// Stores `value` in the slot, then runs one refresh pass of the owning
    /// function, scoped to this setter's instance.
    ///
    /// When the target has been pruned the write is skipped; the refresh
    /// still covers surviving targets of the same function, and an error
    /// from any of their rebuilds is returned.
    pub fn set(&self, value: T) -> Result<(), Error> {
        if let Some(target) = self.target.upgrade() {
            target.write_slot(self.index, Rc::new(value));
        }
        match self.instance {
            Some(instance) => self.owner.bind(instance).refresh(CallArgs::new()),
            None => self.owner.refresh(CallArgs::new()),
        }
    }
}
