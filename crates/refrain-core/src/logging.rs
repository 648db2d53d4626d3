#![forbid(unsafe_code)]

//! Logging shim over optional `tracing`.
//!
//! With the `tracing` feature enabled this module re-exports the `tracing`
//! macros. Without it, same-named no-op macros are exported so call sites
//! compile unchanged. Callers import from here (`use crate::logging::debug;`)
//! and never reference `tracing` directly.

#[cfg(feature = "tracing")]
pub use tracing::{debug, trace};

#[cfg(not(feature = "tracing"))]
macro_rules! debug {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
pub use {debug, trace};
