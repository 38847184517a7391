// ABOUTME: The immutable release request built once from validated configuration.
// ABOUTME: Renders the container configuration for each role; environment values never leave it unredacted.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use crate::config::{Config, HealthcheckConfig, CheckTiming, RestartPolicy};
use crate::error::{Error, Result};
use crate::runtime::{
    ContainerConfig, HealthcheckSpec, PortMapping, ResourceLimits, RestartPolicyConfig,
    SecurityOptions,
};
use crate::types::{ImageRef, InstanceName, Role, ServiceName};

use super::instance::{LABEL_IMAGE, LABEL_MANAGED, LABEL_SERVICE, LABEL_VERSION};

/// What to release and how to run it. Fields are fixed once accepted.
#[derive(Clone)]
pub struct ReleaseRequest {
    service: ServiceName,
    image: ImageRef,
    env: BTreeMap<String, String>,
    labels: HashMap<String, String>,
    command: Option<Vec<String>>,
    container_port: u16,
    staging_port: u16,
    production_port: u16,
    host_ip: Option<String>,
    resources: ResourceLimits,
    security: SecurityOptions,
    restart: RestartPolicy,
    healthcheck: HealthcheckConfig,
    stop_timeout: Duration,
    stop_signal: Option<String>,
    log_tail: usize,
}

impl ReleaseRequest {
    /// Resolve environment references and resource strings from `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let env = crate::config::resolve_env_map(&config.env)?;
        let resources = config.resources.to_limits().map_err(Error::InvalidConfig)?;

        Ok(Self {
            service: config.service.clone(),
            image: config.image.clone(),
            env,
            labels: config.labels.clone(),
            command: config.command.clone(),
            container_port: config.ports.container,
            staging_port: config.ports.staging,
            production_port: config.ports.production,
            host_ip: config.ports.host_ip.clone(),
            resources,
            security: config.security.to_options(),
            restart: config.restart,
            healthcheck: config.healthcheck.clone(),
            stop_timeout: config.stop.timeout,
            stop_signal: config.stop.signal.clone(),
            log_tail: config.log_tail,
        })
    }

    pub fn service(&self) -> &ServiceName {
        &self.service
    }

    pub fn image(&self) -> &ImageRef {
        &self.image
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn resources(&self) -> &ResourceLimits {
        &self.resources
    }

    pub fn container_port(&self) -> u16 {
        self.container_port
    }

    pub fn staging_port(&self) -> u16 {
        self.staging_port
    }

    pub fn production_port(&self) -> u16 {
        self.production_port
    }

    pub fn stop_timeout(&self) -> Duration {
        self.stop_timeout
    }

    pub fn log_tail(&self) -> usize {
        self.log_tail
    }

    /// Host port the given role binds.
    pub fn port_for(&self, role: Role) -> u16 {
        match role {
            Role::Production => self.production_port,
            Role::Staging | Role::Retiring => self.staging_port,
        }
    }

    /// Container configuration for `name`, shaped by its role.
    ///
    /// Staging gets the fast check and never restarts; production gets the
    /// patient check and the configured restart policy.
    pub fn container_config(&self, name: &InstanceName) -> ContainerConfig {
        let role = name.role();
        let (timing, restart_policy) = match role {
            Role::Production => (self.healthcheck.production, self.restart.to_runtime()),
            Role::Staging | Role::Retiring => (self.healthcheck.staging, RestartPolicyConfig::No),
        };

        let mut labels = self.labels.clone();
        labels.insert(LABEL_SERVICE.to_string(), self.service.to_string());
        labels.insert(LABEL_MANAGED.to_string(), "true".to_string());
        labels.insert(LABEL_VERSION.to_string(), name.version().to_string());
        labels.insert(LABEL_IMAGE.to_string(), self.image.to_string());

        ContainerConfig {
            name: name.to_string(),
            image: self.image.clone(),
            env: self.env.clone(),
            labels,
            ports: vec![PortMapping {
                host_port: self.port_for(role),
                container_port: self.container_port,
                host_ip: self.host_ip.clone(),
            }],
            command: self.command.clone(),
            user: self.security.user.clone(),
            restart_policy,
            resources: Some(self.resources.clone()),
            security: self.security.clone(),
            healthcheck: Some(self.healthcheck_spec(timing)),
            stop_timeout: Some(self.stop_timeout),
            stop_signal: self.stop_signal.clone(),
        }
    }

    fn healthcheck_spec(&self, timing: CheckTiming) -> HealthcheckSpec {
        HealthcheckSpec {
            test: HealthcheckSpec::shell(&self.healthcheck.cmd),
            interval: timing.interval,
            timeout: timing.timeout,
            retries: timing.retries,
            start_period: timing.start_period,
        }
    }
}

impl fmt::Debug for ReleaseRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseRequest")
            .field("service", &self.service)
            .field("image", &self.image)
            .field("env", &self.env.keys().collect::<Vec<_>>())
            .field("staging_port", &self.staging_port)
            .field("production_port", &self.production_port)
            .field("container_port", &self.container_port)
            .field("resources", &self.resources)
            .finish_non_exhaustive()
    }
}
