// ABOUTME: Test support utilities.
// ABOUTME: Fake runtime, config builder, in-memory secrets and a recording notifier.

#![allow(dead_code)]

pub mod fake_runtime;

use async_trait::async_trait;
use hotswap::config::Config;
use hotswap::notify::{DeployEvent, EventKind, Notifier, NotifyError};
use hotswap::secrets::{Secret, SecretError, SecretStore};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Once};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("hotswap=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// A config with millisecond timings so releases finish quickly against the fake runtime.
pub fn test_config(service: &str, state_dir: &Path) -> Config {
    test_config_with(service, state_dir, "")
}

/// Like [`test_config`], with extra top-level YAML appended.
pub fn test_config_with(service: &str, state_dir: &Path, extra: &str) -> Config {
    let yaml = format!(
        r#"
service: {service}
image: registry.local/{service}:2.0
ports:
  container: 80
  staging: 9001
  production: 9000
healthcheck:
  cmd: "curl -fsS http://localhost/health"
  staging:
    interval: 1ms
    start_period: 0s
  production:
    interval: 1ms
    start_period: 0s
monitor:
  poll_interval: 5ms
  max_attempts: 10
  verify_attempts: 5
pull:
  attempts: 3
  delay: 5ms
stop:
  timeout: 7s
retention:
  keep: 1
  image_max_age: 1h
state_dir: {state_dir}
{extra}
"#,
        state_dir = state_dir.display(),
    );
    Config::from_yaml(&yaml).unwrap()
}

/// Secrets held in memory.
#[derive(Default)]
pub struct MemorySecrets(pub HashMap<String, String>);

impl MemorySecrets {
    pub fn with(pairs: &[(&str, &str)]) -> Self {
        Self(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

impl SecretStore for MemorySecrets {
    fn get_credential(&self, name: &str) -> Result<Secret, SecretError> {
        self.0
            .get(name)
            .map(Secret::new)
            .ok_or_else(|| SecretError::NotFound(name.to_string()))
    }
}

/// Notifier that remembers every event kind it was sent.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    pub events: Arc<Mutex<Vec<EventKind>>>,
}

impl RecordingNotifier {
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn notify(&self, event: &DeployEvent) -> Result<(), NotifyError> {
        self.events.lock().push(event.kind);
        Ok(())
    }
}
