//! Docker Adapter
//!
//! RuntimeAdapter backed by the local Docker daemon through bollard.

use anyhow::{Context, Result};
use async_trait::async_trait;
use bollard::container::ListContainersOptions;
use bollard::models::ContainerSummary;
use bollard::Docker;
use std::collections::HashMap;

use crate::runtime::adapter::{
    MemberState, RuntimeAdapter, StackMember, StackSummary, COMPOSE_PROJECT_LABEL,
};

/// Request timeout for the daemon socket, in seconds
const SOCKET_TIMEOUT_SECS: u64 = 10;

pub struct DockerAdapter {
    client: Docker,
}

impl DockerAdapter {
    /// Connect to `socket`, or to the platform default socket when unset
    pub fn connect(socket: Option<&str>) -> Result<Self> {
        let client = match socket {
            Some(path) => {
                Docker::connect_with_socket(path, SOCKET_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
                    .with_context(|| format!("Failed to connect to Docker socket {}", path))?
            }
            None => Docker::connect_with_socket_defaults()
                .context("Failed to connect to Docker socket")?,
        };

        Ok(Self { client })
    }

    fn member(container: ContainerSummary) -> StackMember {
        StackMember {
            name: container
                .names
                .and_then(|n| n.first().cloned())
                .unwrap_or_default()
                .trim_start_matches('/')
                .to_string(),
            image: container.image.unwrap_or_default(),
            state: MemberState::from_runtime(container.state.as_deref()),
        }
    }
}

#[async_trait]
impl RuntimeAdapter for DockerAdapter {
    fn name(&self) -> &str {
        "docker"
    }

    async fn ping(&self) -> Result<()> {
        self.client.ping().await.context("Docker daemon did not answer")?;
        Ok(())
    }

    async fn version(&self) -> Result<String> {
        let version = self.client.version().await?;
        Ok(format!(
            "Docker {} (API {})",
            version.version.unwrap_or_default(),
            version.api_version.unwrap_or_default()
        ))
    }

    async fn stack(&self, project: Option<&str>) -> Result<StackSummary> {
        let mut filters = HashMap::new();
        if let Some(project) = project {
            filters.insert(
                "label".to_string(),
                vec![format!("{}={}", COMPOSE_PROJECT_LABEL, project)],
            );
        }
        let options = ListContainersOptions::<String> {
            all: true,
            filters,
            ..Default::default()
        };

        let containers = self.client.list_containers(Some(options)).await?;
        Ok(StackSummary {
            members: containers.into_iter().map(Self::member).collect(),
        })
    }
}
