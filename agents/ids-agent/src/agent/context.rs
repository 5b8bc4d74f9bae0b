//! Component Context
//!
//! Capabilities handed to every long-running component: a tracing span
//! named after the component, the shared state store and the shutdown token.

use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::agent::state::{StateStore, StateUpdate};

#[derive(Clone)]
pub struct ComponentContext {
    name: &'static str,
    state: StateStore,
    shutdown: CancellationToken,
}

impl ComponentContext {
    pub fn new(name: &'static str, state: StateStore, shutdown: CancellationToken) -> Self {
        Self {
            name,
            state,
            shutdown,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Span all of the component's log lines are emitted under
    pub fn span(&self) -> Span {
        tracing::info_span!("component", name = self.name)
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Log an error and publish it as `last_error`
    pub fn record_error(&self, message: impl std::fmt::Display) {
        let message = format!("{}: {}", self.name, message);
        tracing::error!(component = self.name, error = %message, "Component error");
        self.state.publish([StateUpdate::LastError(message)]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_error_publishes_last_error() {
        let state = StateStore::new("pi-test");
        let ctx = ComponentContext::new("probe", state.clone(), CancellationToken::new());
        ctx.record_error("daemon unreachable");
        assert_eq!(state.snapshot().last_error, "probe: daemon unreachable");
    }

    #[test]
    fn test_shutdown_flag_follows_token() {
        let token = CancellationToken::new();
        let ctx = ComponentContext::new("probe", StateStore::new("pi-test"), token.clone());
        assert!(!ctx.is_shutdown_requested());
        token.cancel();
        assert!(ctx.is_shutdown_requested());
    }
}
