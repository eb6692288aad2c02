//! # Runtime
//!
//! Process start-up and the pod watch loop for the controller binary.

pub mod initialization;
pub mod watch_loop;

pub use initialization::{initialize, InitializationResult};
pub use watch_loop::run_watch_loop;
