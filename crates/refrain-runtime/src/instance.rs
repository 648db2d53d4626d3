#![forbid(unsafe_code)]

//! Instance identity tokens for per-widget refresh scoping.
//!
//! A refreshable method shared by many widget instances keeps one rebuild
//! target per instance. [`InstanceId`] is the identity those targets are
//! keyed by: an opaque token minted once per owner and compared by value.
//! Owners hold the token for their lifetime and pass it to
//! [`Refreshable::bind`](crate::refreshable::Refreshable::bind); equality of
//! two ids means "the same owner", never "owners with equal state".

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of one widget instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Mints a fresh id, distinct from every id minted before it.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instance#{}", self.0)
    }
}
