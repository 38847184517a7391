// ABOUTME: Image operations a release needs from the runtime.
// ABOUTME: Pull with optional registry credentials, resolve the pulled digest, prune old images.

use super::shared_types::RegistryAuth;
use crate::types::ImageRef;
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait ImageOps: Send + Sync {
    /// Pull `reference`. Credentials are passed per call and never stored.
    async fn pull_image(
        &self,
        reference: &ImageRef,
        auth: Option<&RegistryAuth>,
    ) -> Result<(), ImageError>;

    /// Content digest of a local image (`repo@sha256:...`), or its id when it has no repo digest.
    async fn image_digest(&self, reference: &ImageRef) -> Result<String, ImageError>;

    /// Remove dangling images created more than `older_than` ago. Returns the number removed.
    async fn prune_images(&self, older_than: Duration) -> Result<u64, ImageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("no such image: {0}")]
    NotFound(String),

    /// The registry refused the credentials. Retrying cannot help.
    #[error("registry rejected credentials for {0}")]
    Unauthorized(String),

    #[error("pull failed: {0}")]
    Pull(String),

    #[error("image API error: {0}")]
    Api(String),
}

impl ImageError {
    /// Whether another pull attempt could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ImageError::Pull(_) | ImageError::Api(_))
    }
}
