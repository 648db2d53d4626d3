#![forbid(unsafe_code)]

//! Build scopes: the ambient stack naming where new elements attach.
//!
//! # Design
//!
//! Element construction is ambient. [`Element::mount()`](crate::element::Element::mount)
//! attaches the new element to whichever container was entered most recently,
//! so builder code never threads a parent handle through every call. The
//! bookkeeping is a thread-local [`ScopeStack`] of [`BuildScope`] entries;
//! entering a container pushes one and returns a [`ScopeGuard`] that removes
//! it again on drop.
//!
//! Removal is by token, not by popping. A guard can be held across an await
//! point inside an async rebuild, and two rebuilds interleaved on the same
//! thread may drop their guards in non-LIFO order. Each entry therefore
//! carries a unique token and the guard removes exactly its own entry,
//! leaving any entries pushed after it untouched.
//!
//! # Invariants
//!
//! 1. `current()` reflects the most recently pushed entry still on the stack.
//! 2. Dropping a guard removes exactly the entry it pushed, wherever it sits.
//! 3. Once every guard is dropped the stack is empty again.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use crate::element::ElementId;
use crate::session::{SessionId, SessionInner};

// ─────────────────────────────── Scope stack ───────────────────────────────

/// A stack whose entries are removed by token rather than by position.
///
/// `push` hands out a monotonically increasing token; [`remove`](Self::remove)
/// deletes the entry carrying that token no matter where it sits. "Current"
/// is always the newest surviving entry, which keeps nesting semantics intact
/// even when guards are dropped out of order.
#[derive(Debug)]
pub struct ScopeStack<T> {
    entries: Vec<(u64, T)>,
    next_token: u64,
}

impl<T> ScopeStack<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self { entries: Vec::new(), next_token: 1 }
    }

    /// Pushes `value` and returns the token that removes it.
    pub fn push(&mut self, value: T) -> u64 {
        let token = self.next_token;
        self.next_token += 1;
        self.entries.push((token, value));
        token
    }

    /// Removes the entry carrying `token`, wherever it sits in the stack.
    pub fn remove(&mut self, token: u64) -> Option<T> {
        let index = self.entries.iter().position(|(t, _)| *t == token)?;
        Some(self.entries.remove(index).1)
    }

    /// The newest surviving entry.
    #[must_use]
    pub fn current(&self) -> Option<&T> {
        self.entries.last().map(|(_, value)| value)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for ScopeStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────── Build scopes ──────────────────────────────

/// One entry of the build-scope stack: a container inside a session.
///
/// Holds the owning session weakly so a scope guard kept alive across an
/// await does not keep a closed session's element tree alive with it.
#[derive(Debug, Clone)]
pub struct BuildScope {
    pub(crate) session: Weak<RefCell<SessionInner>>,
    pub(crate) session_id: SessionId,
    pub(crate) element: ElementId,
}

impl BuildScope {
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn element(&self) -> ElementId {
        self.element
    }
}

thread_local! {
    static BUILD_SCOPES: RefCell<ScopeStack<BuildScope>> =
        const { RefCell::new(ScopeStack::new()) };
}

/// Removes its build-scope entry when dropped.
///
/// Not `Send`: the entry lives in a thread-local stack and must be removed
/// on the thread that pushed it.
#[must_use = "the container stays entered only while the guard is alive"]
#[derive(Debug)]
pub struct ScopeGuard {
    token: u64,
    _not_send: PhantomData<Rc<()>>,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        BUILD_SCOPES.with(|stack| {
            stack.borrow_mut().remove(self.token);
        });
    }
}

pub(crate) fn push(scope: BuildScope) -> ScopeGuard {
    let token = BUILD_SCOPES.with(|stack| stack.borrow_mut().push(scope));
    ScopeGuard { token, _not_send: PhantomData }
}

pub(crate) fn current_scope() -> Option<BuildScope> {
    BUILD_SCOPES.with(|stack| stack.borrow().current().cloned())
}

/// The session and container new elements would currently attach to.
#[must_use]
pub fn current() -> Option<(SessionId, ElementId)> {
    current_scope().map(|scope| (scope.session_id, scope.element))
}

/// Number of containers currently entered on this thread.
#[must_use]
pub fn depth() -> usize {
    BUILD_SCOPES.with(|stack| stack.borrow().len())
}

// ─────────────────────────────────── Tests ──────────────────────────────────
