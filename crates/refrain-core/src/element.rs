#![forbid(unsafe_code)]

//! Elements: builder-constructed nodes that attach to the ambient scope.
//!
//! # Design
//!
//! [`Element`] is a plain builder. Calling [`mount`](Element::mount) looks up
//! the innermost entered container on this thread and attaches the new node
//! under it, returning an [`ElementHandle`]. The handle is a weak reference
//! into the owning session's tree: it can enter, mutate, clear, and remove
//! the node, and every operation degrades to a no-op once the session is
//! closed. Rebuild code therefore never has to guard each call with an
//! explicit liveness check.
//!
//! # Failure Modes
//!
//! - Mounting with no container entered is a programming error and panics.
//! - Mounting into a session that died mid-rebuild yields a detached handle;
//!   the rebuild finishes quietly and the output is discarded.

use std::cell::RefCell;
use std::fmt;
use std::rc::Weak;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::logging::trace;
use crate::scope::{self, BuildScope, ScopeGuard};
use crate::session::{self, SessionId, SessionInner};

static NEXT_ELEMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one element for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(u64);

impl ElementId {
    pub(crate) fn next() -> Self {
        Self(NEXT_ELEMENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "element#{}", self.0)
    }
}

/// Stored form of an element inside a session's tree.
#[derive(Debug)]
pub(crate) struct ElementNode {
    pub(crate) tag: String,
    pub(crate) text: String,
    pub(crate) parent: Option<ElementId>,
    pub(crate) children: Vec<ElementId>,
}

impl ElementNode {
    pub(crate) fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            text: String::new(),
            parent: None,
            children: Vec::new(),
        }
    }
}

/// Builder for a new element.
#[derive(Debug, Clone)]
pub struct Element {
    tag: String,
    text: String,
}

impl Element {
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into(), text: String::new() }
    }

    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Attaches this element under the innermost entered container.
    ///
    /// # Panics
    ///
    /// Panics when no container is entered on this thread. Enter one with
    /// [`Session::enter`](crate::session::Session::enter) or
    /// [`ElementHandle::enter`] first.
    pub fn mount(self) -> ElementHandle {
        let Some(build_scope) = scope::current_scope() else {
            panic!(
                "Element::mount() requires an entered container; \
                 call Session::enter() or ElementHandle::enter() first"
            );
        };
        let id = ElementId::next();
        let handle = ElementHandle {
            session: build_scope.session.clone(),
            session_id: build_scope.session_id,
            id,
        };
        let Some(session) = build_scope.session.upgrade() else {
            // Session torn down while a rebuild was still in flight. The
            // element stays detached and the handle is dead from birth.
            trace!(message = "element.mount_detached", element = %id);
            return handle;
        };
        let mut node = ElementNode::new(self.tag);
        node.text = self.text;
        node.parent = Some(build_scope.element);
        if !session.borrow_mut().attach(build_scope.element, id, node) {
            trace!(
                message = "element.mount_orphaned_parent",
                element = %id,
                parent = %build_scope.element,
            );
        }
        handle
    }
}

/// Weak handle to a mounted element.
///
/// Cloning is cheap and does not extend the tree's lifetime.
#[derive(Clone)]
pub struct ElementHandle {
    session: Weak<RefCell<SessionInner>>,
    session_id: SessionId,
    id: ElementId,
}

impl fmt::Debug for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementHandle")
            .field("session", &self.session_id)
            .field("id", &self.id)
            .finish()
    }
}

impl ElementHandle {
    pub(crate) fn new(
        session: Weak<RefCell<SessionInner>>,
        session_id: SessionId,
        id: ElementId,
    ) -> Self {
        Self { session, session_id, id }
    }

    #[must_use]
    pub fn id(&self) -> ElementId {
        self.id
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Whether the owning session is still open and this element is still in
    /// its tree. Both levels are checked; a session that was closed reports
    /// dead even while stale tree storage is waiting to be dropped.
    #[must_use]
    pub fn is_live(&self) -> bool {
        if !session::is_live(self.session_id) {
            return false;
        }
        self.session
            .upgrade()
            .is_some_and(|session| session.borrow().nodes.contains_key(&self.id))
    }

    /// Enters this element so subsequent mounts attach under it.
    pub fn enter(&self) -> ScopeGuard {
        scope::push(BuildScope {
            session: self.session.clone(),
            session_id: self.session_id,
            element: self.id,
        })
    }

    /// Drops all children (and their subtrees), keeping the element itself.
    pub fn clear(&self) {
        let Some(session) = self.session.upgrade() else {
            return;
        };
        session.borrow_mut().clear_children(self.id);
    }

    /// Removes the element and its whole subtree from the session.
    pub fn remove(&self) {
        let Some(session) = self.session.upgrade() else {
            return;
        };
        session.borrow_mut().remove_subtree(self.id);
    }

    #[must_use]
    pub fn child_count(&self) -> usize {
        let Some(session) = self.session.upgrade() else {
            return 0;
        };
        let inner = session.borrow();
        inner.nodes.get(&self.id).map_or(0, |node| node.children.len())
    }

    /// Handles to the direct children, in mount order.
    #[must_use]
    pub fn children(&self) -> Vec<ElementHandle> {
        let Some(session) = self.session.upgrade() else {
            return Vec::new();
        };
        let inner = session.borrow();
        let Some(node) = inner.nodes.get(&self.id) else {
            return Vec::new();
        };
        node.children
            .iter()
            .map(|child| ElementHandle {
                session: self.session.clone(),
                session_id: self.session_id,
                id: *child,
            })
            .collect()
    }

    /// Texts of the direct children, in mount order.
    #[must_use]
    pub fn child_texts(&self) -> Vec<String> {
        let Some(session) = self.session.upgrade() else {
            return Vec::new();
        };
        let inner = session.borrow();
        let Some(node) = inner.nodes.get(&self.id) else {
            return Vec::new();
        };
        node.children
            .iter()
            .filter_map(|child| inner.nodes.get(child).map(|n| n.text.clone()))
            .collect()
    }

    #[must_use]
    pub fn text(&self) -> Option<String> {
        let session = self.session.upgrade()?;
        let inner = session.borrow();
        inner.nodes.get(&self.id).map(|node| node.text.clone())
    }

    #[must_use]
    pub fn tag(&self) -> Option<String> {
        let session = self.session.upgrade()?;
        let inner = session.borrow();
        inner.nodes.get(&self.id).map(|node| node.tag.clone())
    }

    /// Replaces the element's text in place, without rebuilding children.
    pub fn set_text(&self, text: impl Into<String>) {
        let Some(session) = self.session.upgrade() else {
            return;
        };
        let mut inner = session.borrow_mut();
        if let Some(node) = inner.nodes.get_mut(&self.id) {
            node.text = text.into();
        }
    }
}

// ─────────────────────────────────── Tests ──────────────────────────────────
