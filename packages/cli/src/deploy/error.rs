//! Deployment errors

use std::path::PathBuf;
use thiserror::Error;

use ids_agent::config::ConfigError;

use super::plan::StepKind;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{step} failed: `{command}` exited with status {status}: {stderr}")]
    Connectivity {
        step: StepKind,
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("{step} failed: `{command}`: {reason}")]
    Transfer {
        step: StepKind,
        command: String,
        reason: String,
    },

    #[error("{step} failed: `{command}` exited with status {status}: {stderr}")]
    LocalCommand {
        step: StepKind,
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("{step} failed: {path}: {source}")]
    Io {
        step: StepKind,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{step} failed: could not start `{command}`: {source}")]
    Spawn {
        step: StepKind,
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<ConfigError> for DeployError {
    fn from(err: ConfigError) -> Self {
        DeployError::Configuration(err.to_string())
    }
}

impl DeployError {
    /// Step the error was raised in, if it came from the pipeline
    pub fn step(&self) -> Option<StepKind> {
        match self {
            DeployError::Connectivity { step, .. }
            | DeployError::Transfer { step, .. }
            | DeployError::LocalCommand { step, .. }
            | DeployError::Io { step, .. }
            | DeployError::Spawn { step, .. } => Some(*step),
            DeployError::Configuration(_) => None,
        }
    }
}
