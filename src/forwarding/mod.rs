//! Forwarding configuration module.
//!
//! Converts the computed plan into an ordered list of idempotent actions
//! (address assignment, forwarding toggles, route installs) for an external
//! executor.

pub mod actions;
pub mod emitter;

pub use actions::{ActionList, ConfigAction};
pub use emitter::emit_actions;
