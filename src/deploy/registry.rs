// ABOUTME: Registry credential resolution and image pulls with bounded retries.
// ABOUTME: Credentials come only from the secrets store; pulls retry with a fixed delay.

use std::time::Duration;

use crate::config::RegistryConfig;
use crate::runtime::{ImageOps, RegistryAuth};
use crate::secrets::SecretStore;
use crate::types::ImageRef;

use super::cancel::Cancellation;
use super::error::DeployError;
use super::state::Stage;

/// Resolves registry login for an image from named secrets.
pub struct RegistryAuthenticator<'a> {
    config: Option<&'a RegistryConfig>,
    secrets: &'a dyn SecretStore,
}

impl<'a> RegistryAuthenticator<'a> {
    pub fn new(config: Option<&'a RegistryConfig>, secrets: &'a dyn SecretStore) -> Self {
        Self { config, secrets }
    }

    /// `None` for anonymous pulls (no registry configured).
    pub fn credentials(&self, image: &ImageRef) -> Result<Option<RegistryAuth>, DeployError> {
        let Some(config) = self.config else {
            return Ok(None);
        };

        let username = self.secret(&config.username_secret)?;
        let password = self.secret(&config.password_secret)?;
        let server = config
            .server
            .clone()
            .or_else(|| image.registry().map(str::to_string));

        tracing::debug!(server = ?server, "registry credentials resolved");
        Ok(Some(RegistryAuth {
            username,
            password,
            server,
        }))
    }

    fn secret(&self, name: &str) -> Result<String, DeployError> {
        self.secrets
            .get_credential(name)
            .map(|secret| secret.expose().to_string())
            .map_err(|source| DeployError::MissingCredential {
                name: name.to_string(),
                source,
            })
    }
}

/// Retry schedule for pulls.
#[derive(Debug, Clone, Copy)]
pub struct PullPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

/// Pull `image`, retrying transient failures. Returns the local image digest.
///
/// Authentication failures are not retried.
pub async fn pull_with_retry<R: ImageOps + ?Sized>(
    runtime: &R,
    image: &ImageRef,
    auth: Option<&RegistryAuth>,
    policy: PullPolicy,
    cancel: &Cancellation,
) -> Result<String, DeployError> {
    let attempts = policy.attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        if cancel.is_cancelled() {
            return Err(DeployError::Cancelled {
                stage: Stage::Pulling,
            });
        }

        tracing::debug!(%image, attempt, attempts, "pulling image");
        match runtime.pull_image(image, auth).await {
            Ok(()) => {
                let digest = runtime.image_digest(image).await?;
                tracing::info!(%image, %digest, attempt, "image pulled");
                return Ok(digest);
            }
            Err(e) if !e.is_transient() => {
                return Err(DeployError::PullFailed {
                    image: image.to_string(),
                    attempts: attempt,
                    message: e.to_string(),
                });
            }
            Err(e) => {
                tracing::warn!(%image, attempt, attempts, error = %e, "pull failed");
                last_error = e.to_string();
            }
        }

        if attempt < attempts {
            tokio::select! {
                _ = tokio::time::sleep(policy.delay) => {}
                _ = cancel.cancelled() => {
                    return Err(DeployError::Cancelled { stage: Stage::Pulling });
                }
            }
        }
    }

    Err(DeployError::PullFailed {
        image: image.to_string(),
        attempts,
        message: last_error,
    })
}
