// ABOUTME: In-memory container runtime implementing every capability trait.
// ABOUTME: Scripted health per role, injected failures, port conflicts and an operation log.

use async_trait::async_trait;
use hotswap::runtime::{
    ContainerConfig, ContainerError, ContainerFilters, ContainerInfo, ContainerOps,
    ContainerState, ContainerSummary, EngineVersion, HealthState, ImageError, ImageOps, LogError,
    LogLine, LogLineStream, LogOps, LogStream, RegistryAuth, RuntimeInfo, RuntimeInfoError,
};
use hotswap::types::{ContainerId, ImageRef, InstanceName, Role, ServiceName};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub id: String,
    pub name: String,
    pub config: ContainerConfig,
    pub state: ContainerState,
    pub created: i64,
    health: VecDeque<HealthState>,
}

impl FakeContainer {
    pub fn host_ports(&self) -> Vec<u16> {
        self.config.ports.iter().map(|p| p.host_port).collect()
    }

    pub fn role(&self, service: &ServiceName) -> Option<Role> {
        InstanceName::parse(service, &self.name).ok().map(|n| n.role())
    }

    /// Next health signal; the last scripted value sticks.
    fn next_health(&mut self) -> HealthState {
        if self.health.len() > 1 {
            self.health.pop_front().unwrap_or(HealthState::Healthy)
        } else {
            self.health.front().copied().unwrap_or(HealthState::Healthy)
        }
    }
}

#[derive(Default)]
struct Inner {
    containers: BTreeMap<String, FakeContainer>,
    next_id: u64,
    clock: i64,
    health_scripts: HashMap<Role, Vec<HealthState>>,
    failing_pulls: u32,
    pull_attempts: u32,
    auth_seen: Vec<Option<String>>,
    fail_start: HashSet<String>,
    fail_create: HashSet<String>,
    fail_remove: HashSet<String>,
    unreachable: bool,
    pruned_per_call: u64,
    prune_calls: u32,
    log_lines: Vec<String>,
    ops: Vec<String>,
}

/// A runtime double good enough to drive whole releases.
#[derive(Default)]
pub struct FakeRuntime {
    inner: Mutex<Inner>,
}

#[allow(dead_code)]
impl FakeRuntime {
    pub fn new() -> Self {
        let runtime = Self::default();
        runtime.inner.lock().log_lines = vec![
            "booting".to_string(),
            "listening on 0.0.0.0:80".to_string(),
        ];
        runtime
    }

    /// Health sequence every container created with `role` reports, in poll order.
    pub fn script_health(&self, role: Role, sequence: Vec<HealthState>) {
        self.inner.lock().health_scripts.insert(role, sequence);
    }

    pub fn fail_next_pulls(&self, count: u32) {
        self.inner.lock().failing_pulls = count;
    }

    pub fn fail_start_of(&self, name: &str) {
        self.inner.lock().fail_start.insert(name.to_string());
    }

    pub fn fail_create_of(&self, name: &str) {
        self.inner.lock().fail_create.insert(name.to_string());
    }

    pub fn fail_remove_of(&self, name: &str) {
        self.inner.lock().fail_remove.insert(name.to_string());
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.lock().unreachable = unreachable;
    }

    pub fn prune_returns(&self, count: u64) {
        self.inner.lock().pruned_per_call = count;
    }

    pub fn set_logs(&self, lines: &[&str]) {
        self.inner.lock().log_lines = lines.iter().map(|l| l.to_string()).collect();
    }

    pub fn pull_attempts(&self) -> u32 {
        self.inner.lock().pull_attempts
    }

    pub fn prune_calls(&self) -> u32 {
        self.inner.lock().prune_calls
    }

    /// Usernames of the credentials passed to each pull.
    pub fn auth_seen(&self) -> Vec<Option<String>> {
        self.inner.lock().auth_seen.clone()
    }

    pub fn containers(&self) -> Vec<FakeContainer> {
        self.inner.lock().containers.values().cloned().collect()
    }

    pub fn container_named(&self, name: &str) -> Option<FakeContainer> {
        self.inner
            .lock()
            .containers
            .values()
            .find(|c| c.name == name)
            .cloned()
    }

    pub fn running(&self) -> Vec<FakeContainer> {
        self.containers()
            .into_iter()
            .filter(|c| c.state == ContainerState::Running)
            .collect()
    }

    pub fn with_role(&self, service: &ServiceName, role: Role) -> Vec<FakeContainer> {
        self.containers()
            .into_iter()
            .filter(|c| c.role(service) == Some(role))
            .collect()
    }

    /// Operations in the order they happened, e.g. `start web-2026...`.
    pub fn ops(&self) -> Vec<String> {
        self.inner.lock().ops.clone()
    }

    pub fn position_of(&self, op: &str) -> Option<usize> {
        self.ops().iter().position(|o| o == op)
    }
}

fn not_found(id: &ContainerId) -> ContainerError {
    ContainerError::NotFound(id.as_str().to_string())
}

#[async_trait]
impl ContainerOps for FakeRuntime {
    async fn create_container(
        &self,
        config: &ContainerConfig,
    ) -> Result<ContainerId, ContainerError> {
        let mut inner = self.inner.lock();
        inner.ops.push(format!("create {}", config.name));
        if inner.fail_create.contains(&config.name) {
            return Err(ContainerError::Runtime(format!(
                "injected create failure for {}",
                config.name
            )));
        }
        if inner.containers.values().any(|c| c.name == config.name) {
            return Err(ContainerError::AlreadyExists(config.name.clone()));
        }

        inner.next_id += 1;
        inner.clock += 1;
        let id = format!("{:064x}", inner.next_id);
        let role = InstanceName::parse(&service_of(config), &config.name)
            .map(|n| n.role())
            .ok();
        let health = role
            .and_then(|r| inner.health_scripts.get(&r).cloned())
            .unwrap_or_else(|| vec![HealthState::Healthy]);

        let container = FakeContainer {
            id: id.clone(),
            name: config.name.clone(),
            config: config.clone(),
            state: ContainerState::Created,
            created: inner.clock,
            health: health.into(),
        };
        inner.containers.insert(id.clone(), container);
        Ok(ContainerId::new(id))
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError> {
        let mut inner = self.inner.lock();
        let container = inner
            .containers
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| not_found(id))?;
        inner.ops.push(format!("start {}", container.name));

        if container.state == ContainerState::Running {
            return Err(ContainerError::AlreadyRunning(container.name));
        }
        if inner.fail_start.contains(&container.name) {
            return Err(ContainerError::Runtime(format!(
                "injected start failure for {}",
                container.name
            )));
        }
        let wanted = container.host_ports();
        if let Some(holder) = inner.containers.values().find(|c| {
            c.id != container.id
                && c.state == ContainerState::Running
                && c.host_ports().iter().any(|p| wanted.contains(p))
        }) {
            return Err(ContainerError::Runtime(format!(
                "port is already allocated by {}",
                holder.name
            )));
        }

        if let Some(c) = inner.containers.get_mut(id.as_str()) {
            c.state = ContainerState::Running;
        }
        Ok(())
    }

    async fn stop_container(
        &self,
        id: &ContainerId,
        timeout: Duration,
    ) -> Result<(), ContainerError> {
        let mut inner = self.inner.lock();
        let container = inner
            .containers
            .get_mut(id.as_str())
            .ok_or_else(|| not_found(id))?;
        let name = container.name.clone();
        if container.state != ContainerState::Running {
            return Err(ContainerError::NotRunning(name));
        }
        container.state = ContainerState::Exited;
        inner
            .ops
            .push(format!("stop {} {}s", name, timeout.as_secs()));
        Ok(())
    }

    async fn remove_container(&self, id: &ContainerId, force: bool) -> Result<(), ContainerError> {
        let mut inner = self.inner.lock();
        let container = inner
            .containers
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| not_found(id))?;
        if inner.fail_remove.contains(&container.name) {
            return Err(ContainerError::Runtime(format!(
                "injected remove failure for {}",
                container.name
            )));
        }
        if container.state == ContainerState::Running && !force {
            return Err(ContainerError::Runtime(format!(
                "cannot remove running container {}",
                container.name
            )));
        }
        inner.containers.remove(id.as_str());
        inner.ops.push(format!("remove {}", container.name));
        Ok(())
    }

    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInfo, ContainerError> {
        let mut inner = self.inner.lock();
        let container = inner
            .containers
            .get_mut(id.as_str())
            .ok_or_else(|| not_found(id))?;
        let health = if container.state == ContainerState::Running {
            Some(container.next_health())
        } else {
            None
        };
        Ok(ContainerInfo {
            id: id.clone(),
            name: container.name.clone(),
            image: container.config.image.to_string(),
            state: container.state,
            health,
            created: container.created.to_string(),
            labels: container.config.labels.clone(),
            env: container.config.env.clone(),
            ports: container.config.ports.clone(),
            command: container.config.command.clone(),
        })
    }

    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError> {
        let inner = self.inner.lock();
        if inner.unreachable {
            return Err(ContainerError::Runtime("connection refused".to_string()));
        }
        Ok(inner
            .containers
            .values()
            .filter(|c| filters.all || c.state == ContainerState::Running)
            .filter(|c| filters.matches_name(&c.name))
            .filter(|c| filters.matches_labels(&c.config.labels))
            .map(|c| ContainerSummary {
                id: ContainerId::new(c.id.clone()),
                name: c.name.clone(),
                image: c.config.image.to_string(),
                state: c.state,
                status: c.state.to_string(),
                labels: c.config.labels.clone(),
                created: c.created,
            })
            .collect())
    }

    async fn rename_container(
        &self,
        id: &ContainerId,
        new_name: &str,
    ) -> Result<(), ContainerError> {
        let mut inner = self.inner.lock();
        if inner
            .containers
            .values()
            .any(|c| c.name == new_name && c.id != id.as_str())
        {
            return Err(ContainerError::AlreadyExists(new_name.to_string()));
        }
        let container = inner
            .containers
            .get_mut(id.as_str())
            .ok_or_else(|| not_found(id))?;
        let old = std::mem::replace(&mut container.name, new_name.to_string());
        container.config.name = new_name.to_string();
        inner.ops.push(format!("rename {} {}", old, new_name));
        Ok(())
    }
}

/// The service label the release stamped on every container it creates.
fn service_of(config: &ContainerConfig) -> ServiceName {
    config
        .labels
        .get("hotswap.service")
        .and_then(|s| ServiceName::new(s).ok())
        .unwrap_or_else(|| ServiceName::new("unlabelled").unwrap())
}

#[async_trait]
impl ImageOps for FakeRuntime {
    async fn pull_image(
        &self,
        reference: &ImageRef,
        auth: Option<&RegistryAuth>,
    ) -> Result<(), ImageError> {
        let mut inner = self.inner.lock();
        inner.pull_attempts += 1;
        inner.auth_seen.push(auth.map(|a| a.username.clone()));
        inner.ops.push(format!("pull {}", reference));
        if inner.failing_pulls > 0 {
            inner.failing_pulls -= 1;
            return Err(ImageError::Pull("registry timeout".to_string()));
        }
        Ok(())
    }

    async fn image_digest(&self, reference: &ImageRef) -> Result<String, ImageError> {
        Ok(format!("{}@sha256:{:064x}", reference.repository(), 42))
    }

    async fn prune_images(&self, _older_than: Duration) -> Result<u64, ImageError> {
        let mut inner = self.inner.lock();
        inner.prune_calls += 1;
        Ok(inner.pruned_per_call)
    }
}

#[async_trait]
impl LogOps for FakeRuntime {
    async fn container_logs(
        &self,
        id: &ContainerId,
        tail: usize,
    ) -> Result<LogLineStream, LogError> {
        let inner = self.inner.lock();
        if !inner.containers.contains_key(id.as_str()) {
            return Err(LogError::ContainerNotFound(id.as_str().to_string()));
        }
        let skip = inner.log_lines.len().saturating_sub(tail);
        let lines: Vec<Result<LogLine, LogError>> = inner
            .log_lines
            .iter()
            .skip(skip)
            .map(|content| {
                Ok(LogLine {
                    stream: LogStream::Stdout,
                    text: content.clone(),
                })
            })
            .collect();
        Ok(Box::pin(futures::stream::iter(lines)))
    }
}

#[async_trait]
impl RuntimeInfo for FakeRuntime {
    async fn ping(&self) -> Result<(), RuntimeInfoError> {
        if self.inner.lock().unreachable {
            return Err(RuntimeInfoError::Unreachable(
                "connection refused".to_string(),
            ));
        }
        Ok(())
    }

    async fn version(&self) -> Result<EngineVersion, RuntimeInfoError> {
        Ok(EngineVersion {
            version: "0.0.0-fake".to_string(),
            api_version: "1.45".to_string(),
            os: "linux".to_string(),
            arch: "x86_64".to_string(),
        })
    }
}
