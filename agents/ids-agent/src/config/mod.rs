//! Configuration module
//!
//! Loading, secret merging and validation of the agent configuration.

pub mod settings;
pub mod store;

pub use settings::Settings;
pub use store::{ConfigAccess, ConfigError, ConfigStore};
