#![forbid(unsafe_code)]

//! Sessions: per-client element trees with liveness tracking.
//!
//! # Design
//!
//! A [`Session`] models one connected client. It owns an arena of element
//! nodes keyed by [`ElementId`] and is itself tracked in a thread-local
//! registry of open sessions. Liveness is two-level on purpose: [`is_live`]
//! answers "is the session still open", while
//! [`ElementHandle::is_live`](crate::element::ElementHandle::is_live) also
//! checks that the element still sits in the tree. Rebuild machinery uses
//! the combination to discover that a container it once rendered into has
//! been orphaned.
//!
//! Handles reference the tree weakly, so closing or dropping a `Session`
//! invalidates every outstanding handle at once instead of leaking the tree
//! through forgotten clones.
//!
//! # Invariants
//!
//! 1. A session is live iff it is registered and its tree is still owned.
//! 2. `close()` empties the tree and deregisters; it is idempotent.
//! 3. A closed session id never reports live again.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;

use crate::element::{ElementHandle, ElementId, ElementNode};
use crate::logging::debug;
use crate::scope::{self, BuildScope, ScopeGuard};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one session for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

#[derive(Debug)]
pub(crate) struct SessionInner {
    pub(crate) id: SessionId,
    pub(crate) root: ElementId,
    pub(crate) nodes: AHashMap<ElementId, ElementNode>,
}

impl SessionInner {
    /// Inserts `node` under `parent`. Returns false when the parent is gone,
    /// in which case the node is dropped and nothing changes.
    pub(crate) fn attach(&mut self, parent: ElementId, id: ElementId, node: ElementNode) -> bool {
        let Some(parent_node) = self.nodes.get_mut(&parent) else {
            return false;
        };
        parent_node.children.push(id);
        self.nodes.insert(id, node);
        true
    }

    pub(crate) fn clear_children(&mut self, id: ElementId) {
        let children = match self.nodes.get_mut(&id) {
            Some(node) => std::mem::take(&mut node.children),
            None => return,
        };
        for child in children {
            self.drop_subtree(child);
        }
    }

    pub(crate) fn remove_subtree(&mut self, id: ElementId) {
        if let Some(parent) = self.nodes.get(&id).and_then(|node| node.parent)
            && let Some(parent_node) = self.nodes.get_mut(&parent)
        {
            parent_node.children.retain(|child| *child != id);
        }
        self.drop_subtree(id);
    }

    fn drop_subtree(&mut self, id: ElementId) {
        let Some(node) = self.nodes.remove(&id) else {
            return;
        };
        for child in node.children {
            self.drop_subtree(child);
        }
    }

    fn dump_into(&self, id: ElementId, depth: usize, out: &mut String) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        for _ in 0..depth {
            out.push_str("  ");
        }
        out.push_str(&node.tag);
        if !node.text.is_empty() {
            out.push_str(" \"");
            out.push_str(&node.text);
            out.push('"');
        }
        out.push('\n');
        for child in &node.children {
            self.dump_into(*child, depth + 1, out);
        }
    }
}

thread_local! {
    static REGISTRY: RefCell<AHashMap<SessionId, Weak<RefCell<SessionInner>>>> =
        RefCell::new(AHashMap::new());
}

/// One client's element tree.
///
/// Not `Clone`: the session is the sole owner of its tree. Dropping it (or
/// calling [`close`](Self::close)) takes every [`ElementHandle`] into the
/// dead state together.
///
/// ```
/// use refrain_core::element::Element;
/// use refrain_core::session::Session;
///
/// let session = Session::open();
/// {
///     let _scope = session.enter();
///     Element::new("label").text("hi").mount();
/// }
/// assert_eq!(session.element_count(), 2); // root + label
/// session.close();
/// assert!(!session.is_open());
/// ```
#[derive(Debug)]
pub struct Session {
    inner: Rc<RefCell<SessionInner>>,
}

impl Session {
    /// Opens a fresh session with an empty tree and registers it as live.
    #[must_use]
    pub fn open() -> Self {
        let id = SessionId::next();
        let root = ElementId::next();
        let mut nodes = AHashMap::new();
        nodes.insert(root, ElementNode::new("root"));
        let inner = Rc::new(RefCell::new(SessionInner { id, root, nodes }));
        REGISTRY.with(|registry| {
            let mut registry = registry.borrow_mut();
            // Amortized cleanup of sessions that were dropped without close().
            registry.retain(|_, weak| weak.upgrade().is_some());
            registry.insert(id, Rc::downgrade(&inner));
        });
        debug!(message = "session.open", session = %id);
        Self { inner }
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.inner.borrow().id
    }

    /// Handle to the root container.
    #[must_use]
    pub fn root(&self) -> ElementHandle {
        let inner = self.inner.borrow();
        ElementHandle::new(Rc::downgrade(&self.inner), inner.id, inner.root)
    }

    /// Enters the root container so mounted elements attach to it.
    pub fn enter(&self) -> ScopeGuard {
        let inner = self.inner.borrow();
        scope::push(BuildScope {
            session: Rc::downgrade(&self.inner),
            session_id: inner.id,
            element: inner.root,
        })
    }

    /// Closes the session: deregisters it and drops the whole tree.
    pub fn close(&self) {
        let id = self.id();
        REGISTRY.with(|registry| {
            registry.borrow_mut().remove(&id);
        });
        let mut inner = self.inner.borrow_mut();
        debug!(message = "session.close", session = %id, elements = inner.nodes.len());
        inner.nodes.clear();
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        is_live(self.id())
    }

    #[must_use]
    pub fn contains(&self, id: ElementId) -> bool {
        self.inner.borrow().nodes.contains_key(&id)
    }

    /// Total number of elements in the tree, root included.
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.inner.borrow().nodes.len()
    }

    /// Indented rendering of the tree, one element per line. Intended for
    /// debugging and golden assertions in tests.
    #[must_use]
    pub fn dump_tree(&self) -> String {
        let inner = self.inner.borrow();
        let mut out = String::new();
        inner.dump_into(inner.root, 0, &mut out);
        out
    }
}

/// Whether `id` refers to a session that is still open on this thread.
#[must_use]
pub fn is_live(id: SessionId) -> bool {
    REGISTRY.with(|registry| {
        registry
            .borrow()
            .get(&id)
            .is_some_and(|weak| weak.upgrade().is_some())
    })
}

/// Number of sessions currently open on this thread.
#[must_use]
pub fn open_sessions() -> usize {
    REGISTRY.with(|registry| {
        registry
            .borrow()
            .values()
            .filter(|weak| weak.upgrade().is_some())
            .count()
    })
}

// ─────────────────────────────────── Tests ──────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;

    #[test]
    fn open_registers_and_close_deregisters() {
        assert_eq!(open_sessions(), 0);
        let session = Session::open();
        assert!(session.is_open());
        assert_eq!(open_sessions(), 1);

        session.close();
        assert!(!session.is_open());
        assert!(!is_live(session.id()));
        assert_eq!(open_sessions(), 0);

        // Idempotent.
        session.close();
        assert!(!session.is_open());
    }

    #[test]
    fn close_invalidates_every_handle_at_once() {
        let session = Session::open();
        let _scope = session.enter();
        let row = Element::new("row").mount();
        let label = Element::new("label").text("hello").mount();
        assert!(row.is_live());
        assert!(label.is_live());

        session.close();
        assert!(!row.is_live());
        assert!(!label.is_live());
        assert_eq!(session.element_count(), 0);
    }

    #[test]
    fn dropping_a_session_without_close_kills_handles() {
        let session = Session::open();
        let id = session.id();
        let root = session.root();
        drop(session);
        assert!(!root.is_live());
        assert!(!is_live(id));
    }

    #[test]
    fn contains_follows_subtree_removal() {
        let session = Session::open();
        let _scope = session.enter();
        let row = Element::new("row").mount();
        let child = {
            let _row = row.enter();
            Element::new("label").text("inner").mount()
        };
        assert!(session.contains(child.id()));

        row.remove();
        assert!(!session.contains(row.id()));
        assert!(!session.contains(child.id()));
        assert_eq!(session.element_count(), 1);
        session.close();
    }

    #[test]
    fn dump_tree_renders_nesting_and_text() {
        let session = Session::open();
        let _scope = session.enter();
        let card = Element::new("card").mount();
        {
            let _card = card.enter();
            Element::new("label").text("inner").mount();
        }
        Element::new("button").text("go").mount();

        let expected = "root\n  card\n    label \"inner\"\n  button \"go\"\n";
        assert_eq!(session.dump_tree(), expected);
        session.close();
    }

    #[test]
    fn closed_session_id_never_reports_live_again() {
        let session = Session::open();
        let id = session.id();
        session.close();
        assert!(!is_live(id));

        // Opening more sessions must not resurrect the old id.
        let other = Session::open();
        assert!(!is_live(id));
        other.close();
    }
}
