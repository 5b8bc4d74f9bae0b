//! Runtime Probe
//!
//! Periodically checks the container runtime and publishes the
//! `docker_healthy` readiness flag.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn, Instrument};

use crate::agent::context::ComponentContext;
use crate::agent::state::{Collaborator, StateUpdate};
use crate::runtime::adapter::RuntimeAdapter;

pub struct RuntimeProbe<R: RuntimeAdapter + ?Sized> {
    ctx: ComponentContext,
    runtime: Arc<R>,
    interval: Duration,
    project: Option<String>,
}

impl<R: RuntimeAdapter + ?Sized> RuntimeProbe<R> {
    pub fn new(ctx: ComponentContext, runtime: Arc<R>, interval: Duration) -> Self {
        Self {
            ctx,
            runtime,
            interval,
            project: None,
        }
    }

    /// Restrict stack reporting to one compose project
    pub fn with_project(mut self, project: Option<String>) -> Self {
        self.project = project;
        self
    }

    /// Run until the shutdown token is cancelled
    pub async fn run(self) {
        let span = self.ctx.span();
        async move {
            info!(
                runtime = self.runtime.name(),
                project = self.project.as_deref().unwrap_or("*"),
                interval_secs = self.interval.as_secs(),
                "Runtime probe started"
            );

            let shutdown = self.ctx.shutdown().clone();
            while !shutdown.is_cancelled() {
                self.check_once().await;

                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.interval) => {}
                }
            }

            info!("Runtime probe stopped");
        }
        .instrument(span)
        .await
    }

    /// Probe the runtime once and publish the result.
    ///
    /// The flag follows daemon reachability only; a restart loop inside the
    /// stack is reported through `last_error`.
    pub async fn check_once(&self) -> bool {
        let healthy = match self.runtime.ping().await {
            Ok(()) => true,
            Err(e) => {
                self.ctx
                    .record_error(format!("{} runtime unreachable: {:#}", self.runtime.name(), e));
                false
            }
        };

        if healthy {
            match self.runtime.stack(self.project.as_deref()).await {
                Ok(stack) => {
                    let restarting = stack.restarting();
                    if !restarting.is_empty() {
                        self.ctx.record_error(format!(
                            "containers restarting: {}",
                            restarting.join(", ")
                        ));
                    }
                    debug!(
                        containers = stack.members.len(),
                        running = stack.running(),
                        "Runtime healthy"
                    );
                }
                Err(e) => warn!(error = %e, "Failed to list stack containers"),
            }
        }

        self.ctx
            .state()
            .publish([StateUpdate::Ready(Collaborator::ContainerStack, healthy)]);
        healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::state::StateStore;
    use crate::runtime::adapter::{MemberState, StackMember, StackSummary};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    struct FakeRuntime {
        reachable: bool,
        members: Vec<(&'static str, MemberState)>,
        asked_project: Mutex<Option<String>>,
    }

    #[async_trait]
    impl RuntimeAdapter for FakeRuntime {
        fn name(&self) -> &str {
            "fake"
        }

        async fn ping(&self) -> Result<()> {
            if self.reachable {
                Ok(())
            } else {
                anyhow::bail!("socket closed")
            }
        }

        async fn version(&self) -> Result<String> {
            Ok("fake 1.0".to_string())
        }

        async fn stack(&self, project: Option<&str>) -> Result<StackSummary> {
            *self.asked_project.lock().unwrap() = project.map(str::to_string);
            Ok(StackSummary {
                members: self
                    .members
                    .iter()
                    .map(|(name, state)| StackMember {
                        name: name.to_string(),
                        image: "img".to_string(),
                        state: *state,
                    })
                    .collect(),
            })
        }
    }

    fn probe(
        reachable: bool,
        members: Vec<(&'static str, MemberState)>,
    ) -> (RuntimeProbe<FakeRuntime>, Arc<FakeRuntime>, StateStore) {
        let state = StateStore::new("pi-test");
        let ctx = ComponentContext::new("runtime_probe", state.clone(), CancellationToken::new());
        let runtime = Arc::new(FakeRuntime {
            reachable,
            members,
            asked_project: Mutex::new(None),
        });
        (
            RuntimeProbe::new(ctx, runtime.clone(), Duration::from_secs(10)),
            runtime,
            state,
        )
    }

    #[tokio::test]
    async fn test_reachable_runtime_sets_flag() {
        let (probe, _, state) = probe(true, vec![("vector", MemberState::Running)]);
        assert!(probe.check_once().await);
        assert_eq!(state.snapshot().readiness.docker_healthy, Some(true));
        assert!(state.snapshot().last_error.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_runtime_records_error() {
        let (probe, _, state) = probe(false, vec![]);
        assert!(!probe.check_once().await);
        let snapshot = state.snapshot();
        assert_eq!(snapshot.readiness.docker_healthy, Some(false));
        assert!(snapshot.last_error.contains("unreachable"));
        assert!(snapshot.last_error.contains("socket closed"));
    }

    #[tokio::test]
    async fn test_restart_loop_reported_but_daemon_healthy() {
        let (probe, _, state) = probe(
            true,
            vec![("vector", MemberState::Running), ("ids", MemberState::Restarting)],
        );
        assert!(probe.check_once().await);
        let snapshot = state.snapshot();
        assert_eq!(snapshot.readiness.docker_healthy, Some(true));
        assert!(snapshot.last_error.contains("containers restarting: ids"));
    }

    #[tokio::test]
    async fn test_project_filter_passed_to_runtime() {
        let (probe, runtime, _) = probe(true, vec![]);
        let probe = probe.with_project(Some("ids".to_string()));
        probe.check_once().await;
        assert_eq!(runtime.asked_project.lock().unwrap().as_deref(), Some("ids"));
    }
}
