// ABOUTME: Configuration types and parsing for hotswap.yml.
// ABOUTME: Handles discovery, YAML parsing, flag/env overrides and validation.

mod env_value;
mod healthcheck;
mod init;
mod integrations;
mod policy;
mod resources;
mod restart_policy;
mod security;
mod stop;

pub use env_value::{EnvValue, resolve_env_map};
pub use healthcheck::{HealthcheckConfig, CheckTiming};
pub use init::init_config;
pub use integrations::{NotifyConfig, RegistryConfig, SecretsConfig};
pub use policy::{MonitorConfig, PullConfig, RetentionConfig};
pub use resources::{ResourcesConfig, parse_memory};
pub use restart_policy::RestartPolicy;
pub use security::SecurityConfig;
pub use stop::StopConfig;

use crate::error::{Error, Result};
use crate::runtime::RuntimeConfig;
use crate::types::{ImageRef, ServiceName};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "hotswap.yml";
pub const CONFIG_FILENAME_ALT: &str = "hotswap.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".hotswap/config.yml";

/// Default state directory under `$HOME` (XDG state dir layout).
const STATE_DIR: &str = ".local/state/hotswap";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Container base name; every instance is named `<service>-<version>[-role]`.
    pub service: ServiceName,

    pub image: ImageRef,

    pub ports: PortsConfig,

    #[serde(default)]
    pub env: HashMap<String, EnvValue>,

    #[serde(default)]
    pub labels: HashMap<String, String>,

    #[serde(default)]
    pub command: Option<Vec<String>>,

    pub healthcheck: HealthcheckConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub pull: PullConfig,

    #[serde(default)]
    pub resources: ResourcesConfig,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub restart: RestartPolicy,

    #[serde(default)]
    pub stop: StopConfig,

    #[serde(default)]
    pub retention: RetentionConfig,

    #[serde(default)]
    pub registry: Option<RegistryConfig>,

    #[serde(default)]
    pub secrets: SecretsConfig,

    #[serde(default)]
    pub notify: Option<NotifyConfig>,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Log lines captured from a failed instance for the failure report.
    #[serde(default = "default_log_tail")]
    pub log_tail: usize,

    /// Lock files and the deployment journal live here.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
}

/// Host ports for the two roles, both mapped to the same container port.
#[derive(Debug, Clone, Deserialize)]
pub struct PortsConfig {
    /// Port the application listens on inside the container.
    pub container: u16,

    pub staging: u16,

    pub production: u16,

    /// Host interface to bind; all interfaces when unset.
    #[serde(default)]
    pub host_ip: Option<String>,
}

fn default_log_tail() -> usize {
    50
}

/// Values from flags or `HOTSWAP_*` variables that replace file settings.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub service: Option<ServiceName>,
    pub image: Option<ImageRef>,
    pub staging_port: Option<u16>,
    pub production_port: Option<u16>,
    pub container_port: Option<u16>,
    pub memory: Option<String>,
    pub cpus: Option<String>,
    pub health_interval: Option<Duration>,
    pub health_timeout: Option<Duration>,
    pub health_retries: Option<u32>,
    pub stop_timeout: Option<Duration>,
    pub retain: Option<usize>,
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        [CONFIG_FILENAME, CONFIG_FILENAME_ALT, CONFIG_FILENAME_DIR]
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.exists())
            .map(|path| Self::load(&path))
            .unwrap_or_else(|| Err(Error::ConfigNotFound(dir.to_path_buf())))
    }

    /// Apply overrides and re-validate.
    pub fn with_overrides(mut self, overrides: &Overrides) -> Result<Self> {
        if let Some(service) = &overrides.service {
            self.service = service.clone();
        }
        if let Some(image) = &overrides.image {
            self.image = image.clone();
        }
        if let Some(port) = overrides.staging_port {
            self.ports.staging = port;
        }
        if let Some(port) = overrides.production_port {
            self.ports.production = port;
        }
        if let Some(port) = overrides.container_port {
            self.ports.container = port;
        }
        if let Some(memory) = &overrides.memory {
            self.resources.memory = Some(memory.clone());
        }
        if let Some(cpus) = &overrides.cpus {
            self.resources.cpus = Some(cpus.clone());
        }
        if let Some(interval) = overrides.health_interval {
            self.healthcheck.staging.interval = interval;
        }
        if let Some(timeout) = overrides.health_timeout {
            self.healthcheck.staging.timeout = timeout;
        }
        if let Some(retries) = overrides.health_retries {
            self.healthcheck.staging.retries = retries;
        }
        if let Some(timeout) = overrides.stop_timeout {
            self.stop.timeout = timeout;
        }
        if let Some(keep) = overrides.retain {
            self.retention.keep = keep;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidConfig(msg));

        if self.ports.staging == self.ports.production {
            return invalid(format!(
                "staging and production ports must differ (both {})",
                self.ports.production
            ));
        }
        if self.ports.staging == 0 || self.ports.production == 0 || self.ports.container == 0 {
            return invalid("ports must be non-zero".to_string());
        }
        if self.healthcheck.cmd.trim().is_empty() {
            return invalid("healthcheck.cmd cannot be empty".to_string());
        }
        if self.pull.attempts == 0 {
            return invalid("pull.attempts must be at least 1".to_string());
        }
        if self.monitor.max_attempts == 0 || self.monitor.verify_attempts == 0 {
            return invalid("monitor attempts must be at least 1".to_string());
        }
        self.check_monitor_budget().map_err(Error::InvalidConfig)?;
        if let Some(registry) = &self.registry
            && (registry.username_secret.is_empty() || registry.password_secret.is_empty())
        {
            return invalid("registry secrets must be named".to_string());
        }
        if let Some(notify) = &self.notify
            && !notify.webhook.starts_with("http://")
        {
            return invalid(format!(
                "notify.webhook must be an http:// URL: {}",
                notify.webhook
            ));
        }
        self.stop.validate().map_err(Error::InvalidConfig)?;
        self.resources.to_limits().map_err(Error::InvalidConfig)?;
        Ok(())
    }

    /// The monitor must outlast the first healthcheck result the runtime can report,
    /// otherwise every release times out.
    fn check_monitor_budget(&self) -> std::result::Result<(), String> {
        let checks = [
            ("max_attempts", self.monitor.max_attempts, "staging", &self.healthcheck.staging),
            (
                "verify_attempts",
                self.monitor.verify_attempts,
                "production",
                &self.healthcheck.production,
            ),
        ];
        for (field, attempts, stage, timing) in checks {
            let budget = self.monitor.budget(attempts);
            let first_report = timing.start_period + timing.interval;
            if budget <= first_report {
                return Err(format!(
                    "monitor.{field} ({attempts} polls every {:?} = {:?}) ends before the {stage} \
                     healthcheck can report (start_period + interval = {:?})",
                    self.monitor.poll_interval, budget, first_report
                ));
            }
        }
        Ok(())
    }

    /// Directory for lock files and the journal.
    pub fn state_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.state_dir {
            return Ok(dir.clone());
        }
        std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(STATE_DIR))
            .ok_or(Error::NoStateDir)
    }

    pub fn stop_timeout(&self) -> Duration {
        self.stop.timeout
    }

    pub fn template() -> Self {
        Config {
            service: ServiceName::new("my-app").expect("template service name is valid"),
            image: ImageRef::parse("ghcr.io/my-org/my-app:latest")
                .expect("template image reference is valid"),
            ports: PortsConfig {
                container: 8080,
                staging: 18080,
                production: 8080,
                host_ip: None,
            },
            env: HashMap::new(),
            labels: HashMap::new(),
            command: None,
            healthcheck: HealthcheckConfig::new("wget -q --spider http://localhost:8080/health"),
            monitor: MonitorConfig::default(),
            pull: PullConfig::default(),
            resources: ResourcesConfig::default(),
            security: SecurityConfig::default(),
            restart: RestartPolicy::default(),
            stop: StopConfig::default(),
            retention: RetentionConfig::default(),
            registry: None,
            secrets: SecretsConfig::default(),
            notify: None,
            runtime: RuntimeConfig::default(),
            log_tail: default_log_tail(),
            state_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_is_valid() {
        Config::template().validate().unwrap();
    }

    #[test]
    fn overrides_replace_file_values() {
        let overrides = Overrides {
            image: Some(ImageRef::parse("ghcr.io/my-org/my-app:v2").unwrap()),
            staging_port: Some(19000),
            health_retries: Some(9),
            retain: Some(0),
            ..Default::default()
        };
        let config = Config::template().with_overrides(&overrides).unwrap();
        assert_eq!(config.image.tag(), Some("v2"));
        assert_eq!(config.ports.staging, 19000);
        assert_eq!(config.healthcheck.staging.retries, 9);
        assert_eq!(config.retention.keep, 0);
    }

    #[test]
    fn overrides_are_validated() {
        let overrides = Overrides {
            staging_port: Some(8080),
            ..Default::default()
        };
        let err = Config::template().with_overrides(&overrides).unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn monitor_must_outlast_production_healthcheck() {
        let mut config = Config::template();
        config.healthcheck.production.interval = Duration::from_secs(90);
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("monitor.verify_attempts"), "{err}");
        assert!(err.contains("production"), "{err}");

        config.monitor.verify_attempts = 60;
        config.validate().unwrap();
    }

    #[test]
    fn monitor_must_outlast_staging_healthcheck() {
        let mut config = Config::template();
        config.monitor.max_attempts = 2;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("monitor.max_attempts"), "{err}");
    }

    #[test]
    fn configured_state_dir_wins() {
        let mut config = Config::template();
        config.state_dir = Some(PathBuf::from("/var/lib/hotswap"));
        assert_eq!(config.state_dir().unwrap(), PathBuf::from("/var/lib/hotswap"));
    }
}
