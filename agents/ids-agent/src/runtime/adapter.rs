//! Runtime Adapter Trait
//!
//! Read-only view of the container runtime hosting the compose stack.

use anyhow::Result;
use async_trait::async_trait;

/// Compose label carrying the project a container belongs to
pub const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";

/// Coarse lifecycle state of a stack container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberState {
    Running,
    Restarting,
    Stopped,
}

impl MemberState {
    /// Map a runtime state string (`running`, `exited`, ...) onto a member state
    pub fn from_runtime(state: Option<&str>) -> Self {
        match state {
            Some("running") => MemberState::Running,
            Some("restarting") => MemberState::Restarting,
            _ => MemberState::Stopped,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StackMember {
    pub name: String,
    pub image: String,
    pub state: MemberState,
}

/// Containers of the compose stack as seen by the runtime
#[derive(Debug, Clone, Default)]
pub struct StackSummary {
    pub members: Vec<StackMember>,
}

impl StackSummary {
    pub fn running(&self) -> usize {
        self.members
            .iter()
            .filter(|m| m.state == MemberState::Running)
            .count()
    }

    /// Names of containers stuck in a restart loop
    pub fn restarting(&self) -> Vec<&str> {
        self.members
            .iter()
            .filter(|m| m.state == MemberState::Restarting)
            .map(|m| m.name.as_str())
            .collect()
    }
}

/// Common interface for container runtimes
#[async_trait]
pub trait RuntimeAdapter: Send + Sync {
    /// Runtime name used in logs
    fn name(&self) -> &str;

    /// Fails when the daemon does not answer
    async fn ping(&self) -> Result<()>;

    async fn version(&self) -> Result<String>;

    /// Containers of the given compose project, or every container when unset
    async fn stack(&self, project: Option<&str>) -> Result<StackSummary>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(name: &str, state: MemberState) -> StackMember {
        StackMember {
            name: name.to_string(),
            image: format!("{}:latest", name),
            state,
        }
    }

    #[test]
    fn test_member_state_mapping() {
        assert_eq!(MemberState::from_runtime(Some("running")), MemberState::Running);
        assert_eq!(
            MemberState::from_runtime(Some("restarting")),
            MemberState::Restarting
        );
        assert_eq!(MemberState::from_runtime(Some("exited")), MemberState::Stopped);
        assert_eq!(MemberState::from_runtime(None), MemberState::Stopped);
    }

    #[test]
    fn test_summary_counts() {
        let summary = StackSummary {
            members: vec![
                member("vector", MemberState::Running),
                member("redis", MemberState::Running),
                member("ids", MemberState::Restarting),
                member("init", MemberState::Stopped),
            ],
        };
        assert_eq!(summary.running(), 2);
        assert_eq!(summary.restarting(), vec!["ids"]);
    }
}
