//! IDS Agent Library
//!
//! Core of the IDS device agent: resource supervision and throttling, the
//! shared state store, the status API, the container runtime probe and the
//! configuration store also used by the operator CLI.

pub mod agent;
pub mod api;
pub mod config;
pub mod logging;
pub mod runtime;

// Re-exports for convenience
pub use agent::context::ComponentContext;
pub use agent::state::{StateStore, StateUpdate, StatusSnapshot};
pub use agent::supervisor::ResourceSupervisor;
pub use agent::throttle::{classify, ResourceSample, ThrottleLevel, ThrottleThresholds};
pub use config::{ConfigAccess, ConfigError, ConfigStore, Settings};
pub use runtime::adapter::RuntimeAdapter;
pub use runtime::docker::adapter::DockerAdapter;
