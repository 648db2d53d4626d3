#![forbid(unsafe_code)]

//! Refrain public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users.

pub mod prelude {
    pub use refrain_core as core;
    pub use refrain_runtime as runtime;

    pub use refrain_core::element::{Element, ElementHandle};
    pub use refrain_core::session::Session;
    pub use refrain_runtime::{
        CallArgs, InstanceId, Refreshable, Scheduler, SetState, use_state,
    };
}
