//! Deployment orchestrator
//!
//! Pushes the agent image and its configuration to a device over SSH as an
//! ordered, fail-fast pipeline: preflight, build, package, transfer, sync,
//! activate.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod plan;
pub mod runner;

pub use config::{DeployConfig, Overrides};
pub use error::DeployError;
pub use pipeline::{DeployReport, Orchestrator, StepEvent};
pub use plan::{plan, DeployPlan};
pub use runner::ProcessRunner;

