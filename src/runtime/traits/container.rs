// ABOUTME: Container lifecycle operations a release performs against the runtime.
// ABOUTME: Instances are found by name prefix and service label, then driven by id.

use super::shared_types::{ContainerConfig, ContainerInfo, ContainerState, HealthState};
use crate::types::ContainerId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

#[async_trait]
pub trait ContainerOps: Send + Sync {
    /// Create without starting. Fails with `AlreadyExists` on a name clash.
    async fn create_container(
        &self,
        config: &ContainerConfig,
    ) -> Result<ContainerId, ContainerError>;

    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError>;

    /// Stop a running container, killing it once `timeout` elapses.
    async fn stop_container(
        &self,
        id: &ContainerId,
        timeout: Duration,
    ) -> Result<(), ContainerError>;

    /// `force` also kills a running container first.
    async fn remove_container(&self, id: &ContainerId, force: bool) -> Result<(), ContainerError>;

    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInfo, ContainerError>;

    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError>;

    /// Give the container a new name; its id stays the same.
    async fn rename_container(
        &self,
        id: &ContainerId,
        new_name: &str,
    ) -> Result<(), ContainerError>;

    /// Health as the runtime reports it. An exited container reads as unhealthy.
    async fn inspect_health(&self, id: &ContainerId) -> Result<HealthState, ContainerError> {
        Ok(self.inspect_container(id).await?.health_state())
    }
}

/// Which containers `list_containers` returns. Empty filters match everything running.
#[derive(Debug, Clone, Default)]
pub struct ContainerFilters {
    /// Every pair must be present with the same value.
    pub labels: HashMap<String, String>,
    pub name_prefix: Option<String>,
    /// Stopped containers too.
    pub all: bool,
}

impl ContainerFilters {
    pub fn matches_name(&self, name: &str) -> bool {
        self.name_prefix
            .as_deref()
            .is_none_or(|prefix| name.starts_with(prefix))
    }

    pub fn matches_labels(&self, labels: &HashMap<String, String>) -> bool {
        self.labels
            .iter()
            .all(|(k, v)| labels.get(k).is_some_and(|actual| actual == v))
    }
}

/// One row of a container listing.
#[derive(Debug, Clone)]
pub struct ContainerSummary {
    pub id: ContainerId,
    /// Without the leading `/` the Docker API adds.
    pub name: String,
    pub image: String,
    pub state: ContainerState,
    /// Human status such as `Up 3 minutes (healthy)`.
    pub status: String,
    pub labels: HashMap<String, String>,
    /// Seconds since the epoch.
    pub created: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("no such container: {0}")]
    NotFound(String),

    #[error("name already in use: {0}")]
    AlreadyExists(String),

    #[error("{0} is not running")]
    NotRunning(String),

    #[error("{0} is already running")]
    AlreadyRunning(String),

    #[error("image {0} is not present locally")]
    ImageNotFound(String),

    #[error("runtime rejected the container configuration: {0}")]
    InvalidConfig(String),

    #[error("container API error: {0}")]
    Runtime(String),
}

impl ContainerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ContainerError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_match_prefix_and_labels() {
        let filters = ContainerFilters {
            labels: HashMap::from([("hotswap.service".to_string(), "web".to_string())]),
            name_prefix: Some("web-".to_string()),
            all: true,
        };
        let labels = HashMap::from([
            ("hotswap.service".to_string(), "web".to_string()),
            ("other".to_string(), "x".to_string()),
        ]);

        assert!(filters.matches_name("web-20260101000000000"));
        assert!(!filters.matches_name("webapp-20260101000000000"));
        assert!(filters.matches_labels(&labels));
        assert!(!filters.matches_labels(&HashMap::new()));
    }
}
