// ABOUTME: Configuration for external collaborators: registry, secrets store, notifications.
// ABOUTME: Only secret names live here; credential values come from the secrets store.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Registry login for pulls. The fields name secrets, they never hold credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Registry host such as `ghcr.io`; defaults to the image's registry.
    #[serde(default)]
    pub server: Option<String>,

    pub username_secret: String,

    pub password_secret: String,
}

/// Where secret values are looked up.
#[derive(Debug, Clone, Deserialize)]
pub struct SecretsConfig {
    /// Directory of one-file-per-secret (e.g. `/run/secrets`). Checked before the environment.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Environment fallback: secret `registry-token` is read from `<prefix>REGISTRY_TOKEN`.
    #[serde(default = "default_env_prefix")]
    pub env_prefix: String,
}

fn default_env_prefix() -> String {
    "HOTSWAP_SECRET_".to_string()
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            dir: None,
            env_prefix: default_env_prefix(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    /// `http://` endpoint receiving one JSON POST per release event.
    pub webhook: String,

    #[serde(default = "default_notify_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_notify_timeout() -> Duration {
    Duration::from_secs(5)
}
