#![forbid(unsafe_code)]

//! Core: session-scoped element trees, ambient build scopes, and liveness.

pub mod element;
pub mod logging;
pub mod scope;
pub mod session;
