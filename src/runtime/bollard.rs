// ABOUTME: Bollard-based container runtime implementation.
// ABOUTME: Talks to Docker or Podman over the local Docker-compatible API socket.

use crate::runtime::traits::{
    ContainerConfig, ContainerError, ContainerFilters, ContainerInfo, ContainerOps, ContainerState,
    ContainerSummary, EngineVersion, HealthState, ImageError, ImageOps, LogError, LogLine,
    LogLineStream, LogOps, LogStream, PortMapping, RegistryAuth, RestartPolicyConfig, RuntimeInfo,
    RuntimeInfoError,
};
use crate::runtime::types::{RuntimeEndpoint, RuntimeType};
use crate::types::{ContainerId, ImageRef};
use async_trait::async_trait;
use bollard::Docker;
use bollard::container::LogOutput;
use bollard::models::{
    ContainerCreateBody, HealthConfig, HostConfig, PortBinding, RestartPolicy,
    RestartPolicyNameEnum,
};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, InspectContainerOptions, ListContainersOptions,
    LogsOptions, PruneImagesOptions, RemoveContainerOptions, RenameContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use futures::StreamExt;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::debug;

// =============================================================================
// Error mapping
// =============================================================================

/// Status code and message of an API error response.
fn api_status(e: &bollard::errors::Error) -> Option<(u16, &str)> {
    match e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } => Some((*status_code, message.as_str())),
        _ => None,
    }
}

/// The container call that failed; it decides what 304 and 409 mean.
#[derive(Debug, Clone, Copy)]
enum ContainerCall {
    Create,
    Start,
    Stop,
    Rename,
    Lookup,
}

fn container_error(e: bollard::errors::Error, call: ContainerCall) -> ContainerError {
    let Some((status, message)) = api_status(&e) else {
        return ContainerError::Runtime(e.to_string());
    };
    let message = message.to_string();
    match (call, status) {
        (ContainerCall::Create, 404) => ContainerError::ImageNotFound(message),
        (ContainerCall::Create, 400) => ContainerError::InvalidConfig(message),
        (ContainerCall::Create | ContainerCall::Rename, 409) => {
            ContainerError::AlreadyExists(message)
        }
        (ContainerCall::Start, 304) => ContainerError::AlreadyRunning(message),
        (ContainerCall::Stop, 304) => ContainerError::NotRunning(message),
        (_, 404) => ContainerError::NotFound(message),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn pull_error(e: bollard::errors::Error, image: &str) -> ImageError {
    match api_status(&e) {
        Some((401 | 403, _)) => ImageError::Unauthorized(image.to_string()),
        Some((404, _)) => ImageError::NotFound(image.to_string()),
        _ => ImageError::Pull(format!("{}: {}", image, e)),
    }
}

// =============================================================================
// Request Builders
// =============================================================================

fn restart_policy(policy: RestartPolicyConfig) -> RestartPolicy {
    RestartPolicy {
        name: Some(match policy {
            RestartPolicyConfig::No => RestartPolicyNameEnum::NO,
            RestartPolicyConfig::Always => RestartPolicyNameEnum::ALWAYS,
            RestartPolicyConfig::UnlessStopped => RestartPolicyNameEnum::UNLESS_STOPPED,
            RestartPolicyConfig::OnFailure { .. } => RestartPolicyNameEnum::ON_FAILURE,
        }),
        maximum_retry_count: match policy {
            RestartPolicyConfig::OnFailure { max_retries } => max_retries.map(i64::from),
            _ => None,
        },
    }
}

/// Scratch mounts stay writable on a read-only root but can never hold executables.
const TMPFS_OPTIONS: &str = "rw,noexec,nosuid";

fn port_key(container_port: u16) -> String {
    format!("{}/tcp", container_port)
}

/// Empty collections are left unset so the engine keeps its own default.
fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    (!items.is_empty()).then_some(items)
}

fn host_config(config: &ContainerConfig) -> HostConfig {
    let limits = config.resources.clone().unwrap_or_default();
    let security = &config.security;

    let port_bindings: HashMap<String, Option<Vec<PortBinding>>> = config
        .ports
        .iter()
        .map(|port| {
            let binding = PortBinding {
                host_ip: port.host_ip.clone(),
                host_port: Some(port.host_port.to_string()),
            };
            (port_key(port.container_port), Some(vec![binding]))
        })
        .collect();

    let tmpfs: HashMap<String, String> = security
        .tmpfs
        .iter()
        .map(|path| (path.clone(), TMPFS_OPTIONS.to_string()))
        .collect();

    HostConfig {
        restart_policy: Some(restart_policy(config.restart_policy)),
        memory: limits.memory.map(|bytes| bytes as i64),
        nano_cpus: limits.cpus.map(|cpus| (cpus * 1_000_000_000.0) as i64),
        cpu_shares: limits.cpu_shares.map(i64::from),
        readonly_rootfs: Some(security.read_only_root),
        security_opt: security
            .no_new_privileges
            .then(|| vec!["no-new-privileges:true".to_string()]),
        cap_drop: non_empty(security.cap_drop.clone()),
        cap_add: non_empty(security.cap_add.clone()),
        tmpfs: (!tmpfs.is_empty()).then_some(tmpfs),
        port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
        ..Default::default()
    }
}

fn create_body(config: &ContainerConfig) -> ContainerCreateBody {
    let env = config
        .env
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect();
    let exposed_ports = config
        .ports
        .iter()
        .map(|p| port_key(p.container_port))
        .collect();

    let healthcheck = config.healthcheck.as_ref().map(|hc| HealthConfig {
        test: Some(hc.test.clone()),
        interval: Some(hc.interval.as_nanos() as i64),
        timeout: Some(hc.timeout.as_nanos() as i64),
        retries: Some(i64::from(hc.retries)),
        start_period: Some(hc.start_period.as_nanos() as i64),
        start_interval: None,
    });

    ContainerCreateBody {
        image: Some(config.image.to_string()),
        env: non_empty(env),
        labels: (!config.labels.is_empty()).then(|| config.labels.clone()),
        cmd: config.command.clone(),
        user: config.user.clone().or_else(|| config.security.user.clone()),
        host_config: Some(host_config(config)),
        healthcheck,
        exposed_ports: non_empty(exposed_ports),
        stop_timeout: config.stop_timeout.map(|d| d.as_secs() as i64),
        stop_signal: config.stop_signal.clone(),
        ..Default::default()
    }
}

fn parse_env(env: Vec<String>) -> BTreeMap<String, String> {
    env.into_iter()
        .filter_map(|entry| {
            entry
                .split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
        })
        .collect()
}

fn parse_port_bindings(
    bindings: Option<HashMap<String, Option<Vec<PortBinding>>>>,
) -> Vec<PortMapping> {
    let mut ports: Vec<PortMapping> = bindings
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(key, binding)| {
            let container_port = key.split('/').next()?.parse().ok()?;
            let first = binding?.into_iter().next()?;
            let host_port = first.host_port?.parse().ok()?;
            Some(PortMapping {
                host_port,
                container_port,
                host_ip: first.host_ip.filter(|ip| !ip.is_empty()),
            })
        })
        .collect();
    ports.sort_by_key(|p| p.container_port);
    ports
}

const LIST_ATTEMPTS: u32 = 3;

fn state_from_api(status: bollard::models::ContainerStateStatusEnum) -> ContainerState {
    use bollard::models::ContainerStateStatusEnum as S;
    match status {
        S::CREATED => ContainerState::Created,
        S::RUNNING => ContainerState::Running,
        S::PAUSED => ContainerState::Paused,
        S::RESTARTING => ContainerState::Restarting,
        S::REMOVING => ContainerState::Removing,
        S::DEAD => ContainerState::Dead,
        _ => ContainerState::Exited,
    }
}

fn health_from_api(status: bollard::models::HealthStatusEnum) -> HealthState {
    use bollard::models::HealthStatusEnum as H;
    match status {
        H::STARTING => HealthState::Starting,
        H::HEALTHY => HealthState::Healthy,
        H::UNHEALTHY => HealthState::Unhealthy,
        _ => HealthState::Unknown,
    }
}

fn summary_from_api(c: bollard::models::ContainerSummary) -> ContainerSummary {
    let name = c
        .names
        .unwrap_or_default()
        .first()
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_default();

    ContainerSummary {
        id: ContainerId::new(c.id.unwrap_or_default()),
        name,
        image: c.image.unwrap_or_default(),
        state: c
            .state
            .map_or(ContainerState::Exited, |s| {
                ContainerState::from_runtime(&format!("{:?}", s))
            }),
        status: c.status.unwrap_or_default(),
        labels: c.labels.unwrap_or_default(),
        created: c.created.unwrap_or_default(),
    }
}

// =============================================================================
// BollardRuntime
// =============================================================================

/// Container runtime implementation using bollard.
///
/// Docker and Podman both serve the Docker-compatible API, so one client covers both.
pub struct BollardRuntime {
    client: Docker,
    runtime_type: RuntimeType,
}

impl BollardRuntime {
    /// Create a new BollardRuntime from a Docker client.
    pub fn new(client: Docker, runtime_type: RuntimeType) -> Self {
        Self {
            client,
            runtime_type,
        }
    }

    /// Open the socket found by `detect_runtime()`. Nothing is sent until the first call.
    pub fn connect(endpoint: &RuntimeEndpoint) -> Result<Self, RuntimeInfoError> {
        let client = Docker::connect_with_unix(&endpoint.socket, 120, bollard::API_DEFAULT_VERSION)
            .map_err(|e| RuntimeInfoError::Unreachable(e.to_string()))?;
        Ok(Self::new(client, endpoint.kind))
    }

    pub fn runtime_type(&self) -> RuntimeType {
        self.runtime_type
    }
}

#[async_trait]
impl RuntimeInfo for BollardRuntime {
    async fn ping(&self) -> Result<(), RuntimeInfoError> {
        self.client
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| RuntimeInfoError::Unreachable(e.to_string()))
    }

    async fn version(&self) -> Result<EngineVersion, RuntimeInfoError> {
        let version = self
            .client
            .version()
            .await
            .map_err(|e| RuntimeInfoError::Api(e.to_string()))?;

        Ok(EngineVersion {
            version: version.version.unwrap_or_default(),
            api_version: version.api_version.unwrap_or_default(),
            os: version.os.unwrap_or_default(),
            arch: version.arch.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl ImageOps for BollardRuntime {
    async fn pull_image(
        &self,
        reference: &ImageRef,
        auth: Option<&RegistryAuth>,
    ) -> Result<(), ImageError> {
        let image_name = reference.to_string();
        debug!(image = %image_name, authenticated = auth.is_some(), "pulling image");

        let opts = CreateImageOptions {
            from_image: Some(image_name.clone()),
            ..Default::default()
        };

        let credentials = auth.map(|a| bollard::auth::DockerCredentials {
            username: Some(a.username.clone()),
            password: Some(a.password.clone()),
            serveraddress: a.server.clone(),
            ..Default::default()
        });

        // Progress arrives as a stream; registry errors can show up mid-stream.
        let mut stream = self.client.create_image(Some(opts), None, credentials);
        while let Some(result) = stream.next().await {
            let progress = result.map_err(|e| pull_error(e, &image_name))?;
            if let Some(detail) = progress.error_detail.and_then(|d| d.message) {
                return Err(ImageError::Pull(format!("{}: {}", image_name, detail)));
            }
        }

        Ok(())
    }

    async fn image_digest(&self, reference: &ImageRef) -> Result<String, ImageError> {
        let image_name = reference.to_string();

        let image = self
            .client
            .inspect_image(&image_name)
            .await
            .map_err(|e| match api_status(&e) {
                Some((404, _)) => ImageError::NotFound(image_name.clone()),
                _ => ImageError::Api(format!("failed to inspect {}: {}", image_name, e)),
            })?;

        let repository = reference.repository();
        let digests = image.repo_digests.unwrap_or_default();
        digests
            .iter()
            .find(|d| d.starts_with(&format!("{}@", repository)))
            .or_else(|| digests.first())
            .cloned()
            .or(image.id)
            .ok_or_else(|| ImageError::Api(format!("{} has no id", image_name)))
    }

    async fn prune_images(&self, older_than: Duration) -> Result<u64, ImageError> {
        let filters = HashMap::from([
            ("dangling".to_string(), vec!["true".to_string()]),
            (
                "until".to_string(),
                vec![format!("{}s", older_than.as_secs())],
            ),
        ]);

        let response = self
            .client
            .prune_images(Some(PruneImagesOptions {
                filters: Some(filters),
                ..Default::default()
            }))
            .await
            .map_err(|e| ImageError::Api(format!("image prune failed: {}", e)))?;

        let removed = response
            .images_deleted
            .map(|items| items.iter().filter(|i| i.deleted.is_some()).count())
            .unwrap_or(0);
        Ok(removed as u64)
    }
}

#[async_trait]
impl ContainerOps for BollardRuntime {
    async fn create_container(
        &self,
        config: &ContainerConfig,
    ) -> Result<ContainerId, ContainerError> {
        debug!(name = %config.name, image = %config.image, "creating container");

        let opts = CreateContainerOptions {
            name: Some(config.name.clone()),
            ..Default::default()
        };

        let response = self
            .client
            .create_container(Some(opts), create_body(config))
            .await
            .map_err(|e| container_error(e, ContainerCall::Create))?;

        Ok(ContainerId::new(response.id))
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError> {
        debug!(container = %id.short(), "starting container");
        self.client
            .start_container(id.as_str(), None::<StartContainerOptions>)
            .await
            .map_err(|e| container_error(e, ContainerCall::Start))
    }

    async fn stop_container(
        &self,
        id: &ContainerId,
        timeout: Duration,
    ) -> Result<(), ContainerError> {
        debug!(container = %id.short(), ?timeout, "stopping container");
        let opts = StopContainerOptions {
            t: Some(timeout.as_secs() as i32),
            signal: None,
        };

        self.client
            .stop_container(id.as_str(), Some(opts))
            .await
            .map_err(|e| container_error(e, ContainerCall::Stop))
    }

    async fn remove_container(&self, id: &ContainerId, force: bool) -> Result<(), ContainerError> {
        debug!(container = %id.short(), force, "removing container");
        let opts = RemoveContainerOptions {
            force,
            ..Default::default()
        };

        self.client
            .remove_container(id.as_str(), Some(opts))
            .await
            .map_err(|e| container_error(e, ContainerCall::Lookup))?;

        Ok(())
    }

    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInfo, ContainerError> {
        let details = self
            .client
            .inspect_container(id.as_str(), None::<InspectContainerOptions>)
            .await
            .map_err(|e| container_error(e, ContainerCall::Lookup))?;

        let status = details.state.as_ref();
        let state = status
            .and_then(|s| s.status)
            .map_or(ContainerState::Exited, state_from_api);
        let health = status
            .and_then(|s| s.health.as_ref())
            .and_then(|h| h.status)
            .map(health_from_api);

        let config = details.config.unwrap_or_default();
        let ports = parse_port_bindings(details.host_config.and_then(|h| h.port_bindings));

        Ok(ContainerInfo {
            id: id.clone(),
            name: details
                .name
                .unwrap_or_default()
                .trim_start_matches('/')
                .to_string(),
            image: config.image.unwrap_or_default(),
            state,
            health,
            created: details.created.map(|dt| dt.to_string()).unwrap_or_default(),
            labels: config.labels.unwrap_or_default(),
            env: parse_env(config.env.unwrap_or_default()),
            ports,
            command: config.cmd,
        })
    }

    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError> {
        let mut filter_map: HashMap<String, Vec<String>> = HashMap::new();

        // The API name filter is a substring match; the prefix is enforced below.
        if let Some(ref prefix) = filters.name_prefix {
            filter_map.insert("name".to_string(), vec![prefix.clone()]);
        }

        for (key, value) in &filters.labels {
            filter_map
                .entry("label".to_string())
                .or_default()
                .push(format!("{}={}", key, value));
        }

        let opts = ListContainersOptions {
            all: filters.all,
            filters: Some(filter_map),
            ..Default::default()
        };

        // Podman can report `stopping`/`stopped`, which bollard's state enum rejects.
        // The state is transient, so the listing is retried briefly.
        let mut attempt = 0;
        let containers = loop {
            attempt += 1;
            match self.client.list_containers(Some(opts.clone())).await {
                Ok(containers) => break containers,
                Err(e) => {
                    let message = e.to_string();
                    let transient = message.contains("unknown variant `stopping`")
                        || message.contains("unknown variant `stopped`");
                    if !transient || attempt == LIST_ATTEMPTS {
                        return Err(ContainerError::Runtime(message));
                    }
                    debug!(attempt, "container listing hit a transient state, retrying");
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
            }
        };

        Ok(containers
            .into_iter()
            .map(summary_from_api)
            .filter(|c| filters.matches_name(&c.name))
            .collect())
    }

    async fn rename_container(
        &self,
        id: &ContainerId,
        new_name: &str,
    ) -> Result<(), ContainerError> {
        debug!(container = %id.short(), new_name, "renaming container");
        self.client
            .rename_container(
                id.as_str(),
                RenameContainerOptions {
                    name: new_name.to_string(),
                },
            )
            .await
            .map_err(|e| container_error(e, ContainerCall::Rename))
    }
}

#[async_trait]
impl LogOps for BollardRuntime {
    async fn container_logs(
        &self,
        id: &ContainerId,
        tail: usize,
    ) -> Result<LogLineStream, LogError> {
        let options = LogsOptions {
            stdout: true,
            stderr: true,
            follow: false,
            tail: tail.to_string(),
            ..Default::default()
        };

        let lines = self
            .client
            .logs(id.as_str(), Some(options))
            .map(|chunk| -> Result<LogLine, LogError> {
                let (stream, message) = match chunk.map_err(map_log_error)? {
                    LogOutput::StdErr { message } => (LogStream::Stderr, message),
                    LogOutput::StdOut { message }
                    | LogOutput::StdIn { message }
                    | LogOutput::Console { message } => (LogStream::Stdout, message),
                };
                Ok(LogLine {
                    stream,
                    text: String::from_utf8_lossy(&message).into_owned(),
                })
            });

        Ok(Box::pin(lines))
    }
}

fn map_log_error(e: bollard::errors::Error) -> LogError {
    match api_status(&e) {
        Some((404, message)) => LogError::ContainerNotFound(message.to_string()),
        _ => LogError::Stream(e.to_string()),
    }
}
