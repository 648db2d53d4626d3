#![forbid(unsafe_code)]

//! Runtime: refreshable functions, positional state slots, and scheduling.
//!
//! The building block is a [`Refreshable`]: a body closure that renders
//! elements into a container and can be replayed in place. Each invocation
//! records a rebuild target; [`Refreshable::refresh`] clears the matching
//! containers and runs the body again, while [`use_state`] gives the body
//! values that survive those reruns. Async bodies hand their continuation
//! to a [`Scheduler`] instead of blocking the refresh pass.
//!
//! ```
//! use refrain_core::element::Element;
//! use refrain_core::session::Session;
//! use refrain_runtime::{CallArgs, Refreshable, Scheduler, use_state};
//!
//! let scheduler = Scheduler::new();
//! let session = Session::open();
//!
//! let counter = Refreshable::builder("counter", &scheduler).sync(|_call| {
//!     let (count, set_count) = use_state(0_i32);
//!     Element::new("label").text(format!("count: {count}")).mount();
//!     let _ = set_count; // wired to a click handler in a real app
//!     Ok(())
//! });
//!
//! {
//!     let _scope = session.enter();
//!     counter.invoke(CallArgs::new())?.schedule(&scheduler);
//! }
//! assert_eq!(session.dump_tree(), "root\n  refreshable\n    label \"count: 0\"\n");
//! session.close();
//! # Ok::<(), refrain_runtime::Error>(())
//! ```

pub mod args;
pub mod error;
pub mod instance;
pub mod refreshable;
pub mod scheduler;
pub mod state;
pub mod target;

pub use args::{ArgValue, CallArgs, Invocation};
pub use error::{BodyError, Error, Result};
pub use instance::InstanceId;
pub use refreshable::{Bound, Refreshable, RefreshableBuilder};
pub use scheduler::Scheduler;
pub use state::{SetState, use_state};
pub use target::{PendingRun, RunOutcome};
