// ABOUTME: Values passed to and returned from the runtime traits.
// ABOUTME: What an instance is created with, what inspect reports back, and registry credentials.

use crate::types::{ContainerId, ImageRef};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

/// Everything needed to create one instance. Built by the release request,
/// or from an inspected container when an old instance must be re-created.
#[derive(Clone)]
pub struct ContainerConfig {
    pub name: String,
    pub image: ImageRef,
    /// Resolved values. Debug output shows the keys only.
    pub env: BTreeMap<String, String>,
    pub labels: HashMap<String, String>,
    pub ports: Vec<PortMapping>,
    /// Overrides the image CMD.
    pub command: Option<Vec<String>>,
    pub user: Option<String>,
    pub restart_policy: RestartPolicyConfig,
    pub resources: Option<ResourceLimits>,
    pub security: SecurityOptions,
    pub healthcheck: Option<HealthcheckSpec>,
    /// Grace period the runtime waits after the stop signal.
    pub stop_timeout: Option<Duration>,
    pub stop_signal: Option<String>,
}

impl fmt::Debug for ContainerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerConfig")
            .field("name", &self.name)
            .field("image", &self.image)
            .field("env", &self.env.keys().collect::<Vec<_>>())
            .field("labels", &self.labels)
            .field("ports", &self.ports)
            .field("command", &self.command)
            .field("user", &self.user)
            .field("restart_policy", &self.restart_policy)
            .field("resources", &self.resources)
            .field("security", &self.security)
            .field("healthcheck", &self.healthcheck)
            .field("stop_timeout", &self.stop_timeout)
            .field("stop_signal", &self.stop_signal)
            .finish()
    }
}

/// A TCP port published on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortMapping {
    pub host_port: u16,
    pub container_port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_ip: Option<String>,
}

/// What the runtime does when the process exits. Staging instances always use `No`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RestartPolicyConfig {
    No,
    Always,
    #[default]
    UnlessStopped,
    OnFailure { max_retries: Option<u32> },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceLimits {
    /// Bytes.
    pub memory: Option<u64>,
    /// 1.0 is one full CPU.
    pub cpus: Option<f64>,
    pub cpu_shares: Option<u32>,
}

/// Container hardening.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityOptions {
    pub read_only_root: bool,
    pub no_new_privileges: bool,
    pub cap_drop: Vec<String>,
    pub cap_add: Vec<String>,
    /// Paths mounted as tmpfs scratch space.
    pub tmpfs: Vec<String>,
    pub user: Option<String>,
}

/// Check the runtime runs inside the container. Its verdict is the health
/// signal the release polls; staging and production use different timings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthcheckSpec {
    /// `CMD-SHELL` form, see [`HealthcheckSpec::shell`].
    pub test: Vec<String>,
    pub interval: Duration,
    pub timeout: Duration,
    /// Consecutive failures before the runtime reports unhealthy.
    pub retries: u32,
    /// Failures during this window do not count.
    pub start_period: Duration,
}

impl HealthcheckSpec {
    pub fn shell(cmd: &str) -> Vec<String> {
        vec!["CMD-SHELL".to_string(), cmd.to_string()]
    }
}

/// A container as inspect reports it. Kept as the rollback source for the
/// instance a promotion replaces.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub id: ContainerId,
    pub name: String,
    /// Reference the container was created from, as the runtime recorded it.
    pub image: String,
    pub state: ContainerState,
    /// `None` without a configured healthcheck.
    pub health: Option<HealthState>,
    pub created: String,
    pub labels: HashMap<String, String>,
    pub env: BTreeMap<String, String>,
    pub ports: Vec<PortMapping>,
    pub command: Option<Vec<String>>,
}

impl ContainerInfo {
    /// Health as the deployment sees it: a container that is not running cannot be healthy.
    pub fn health_state(&self) -> HealthState {
        match self.state {
            ContainerState::Running => self.health.unwrap_or(HealthState::Unknown),
            ContainerState::Created | ContainerState::Restarting => HealthState::Starting,
            ContainerState::Paused => HealthState::Unknown,
            ContainerState::Removing | ContainerState::Exited | ContainerState::Dead => {
                HealthState::Unhealthy
            }
        }
    }

    pub fn host_port(&self) -> Option<u16> {
        self.ports.first().map(|p| p.host_port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
}

impl ContainerState {
    const ALL: [ContainerState; 7] = [
        ContainerState::Created,
        ContainerState::Running,
        ContainerState::Paused,
        ContainerState::Restarting,
        ContainerState::Removing,
        ContainerState::Exited,
        ContainerState::Dead,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ContainerState::Created => "created",
            ContainerState::Running => "running",
            ContainerState::Paused => "paused",
            ContainerState::Restarting => "restarting",
            ContainerState::Removing => "removing",
            ContainerState::Exited => "exited",
            ContainerState::Dead => "dead",
        }
    }

    /// Parse the runtime's state name in any case. Podman's `stopping`,
    /// `stopped` and anything unknown read as exited.
    pub fn from_runtime(state: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(state))
            .unwrap_or(ContainerState::Exited)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ContainerState::Running | ContainerState::Restarting)
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health of a container. Owned by the runtime; the deployment only observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Unknown,
    Starting,
    Healthy,
    Unhealthy,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthState::Unknown => "unknown",
            HealthState::Starting => "starting",
            HealthState::Healthy => "healthy",
            HealthState::Unhealthy => "unhealthy",
        };
        f.write_str(s)
    }
}

/// Credentials for one pull, resolved from the secrets store. Debug redacts the password.
#[derive(Clone)]
pub struct RegistryAuth {
    pub username: String,
    /// Password or access token.
    pub password: String,
    /// e.g. `ghcr.io`; `None` lets the runtime infer it from the image.
    pub server: Option<String>,
}

impl fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("server", &self.server)
            .finish()
    }
}

/// Engine identity as reported by its version endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EngineVersion {
    pub version: String,
    pub api_version: String,
    pub os: String,
    pub arch: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(state: ContainerState, health: Option<HealthState>) -> ContainerInfo {
        ContainerInfo {
            id: ContainerId::new("abc"),
            name: "web-20260101000000000".to_string(),
            image: "nginx:latest".to_string(),
            state,
            health,
            created: String::new(),
            labels: HashMap::new(),
            env: BTreeMap::new(),
            ports: Vec::new(),
            command: None,
        }
    }

    #[test]
    fn stopped_container_is_unhealthy() {
        let exited = info(ContainerState::Exited, Some(HealthState::Healthy));
        assert_eq!(exited.health_state(), HealthState::Unhealthy);
    }

    #[test]
    fn running_without_healthcheck_is_unknown() {
        assert_eq!(
            info(ContainerState::Running, None).health_state(),
            HealthState::Unknown
        );
        assert_eq!(
            info(ContainerState::Running, Some(HealthState::Healthy)).health_state(),
            HealthState::Healthy
        );
    }

    #[test]
    fn runtime_state_names() {
        assert_eq!(ContainerState::from_runtime("RUNNING"), ContainerState::Running);
        assert_eq!(ContainerState::from_runtime("stopping"), ContainerState::Exited);
    }

    #[test]
    fn auth_debug_hides_password() {
        let auth = RegistryAuth {
            username: "ci".to_string(),
            password: "hunter2".to_string(),
            server: None,
        };
        assert!(!format!("{:?}", auth).contains("hunter2"));
    }

    #[test]
    fn config_debug_shows_env_keys_only() {
        let config = ContainerConfig {
            name: "web-20260101000000000".to_string(),
            image: ImageRef::parse("nginx:1.27").unwrap(),
            env: BTreeMap::from([("DATABASE_URL".to_string(), "postgres://u:pw@db".to_string())]),
            labels: HashMap::new(),
            ports: Vec::new(),
            command: None,
            user: None,
            restart_policy: RestartPolicyConfig::No,
            resources: None,
            security: SecurityOptions::default(),
            healthcheck: None,
            stop_timeout: None,
            stop_signal: None,
        };
        let debug = format!("{:?}", config);
        assert!(debug.contains("DATABASE_URL"));
        assert!(!debug.contains("postgres://"));
    }
}
