//! Agent module
//!
//! Resource supervision, the shared state store and the plumbing handed to
//! every long-running component.

pub mod context;
pub mod metrics;
pub mod state;
pub mod supervisor;
pub mod throttle;
