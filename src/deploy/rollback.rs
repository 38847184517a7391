// ABOUTME: Rollback of a release that failed before promotion.
// ABOUTME: Removes the staging instance; the serving production instance is never touched here.

use std::time::Duration;

use crate::runtime::{ContainerError, ContainerOps};

use super::Deployment;
use super::error::DeployError;
use super::instance::ContainerInstance;
use super::state::{Staged, Verified};

/// Staging never serves traffic, so it gets a short grace period.
const STAGING_STOP_GRACE: Duration = Duration::from_secs(10);

impl Deployment<Staged> {
    /// Stop and remove the staging instance.
    pub async fn rollback<R: ContainerOps + ?Sized>(self, runtime: &R) -> Result<(), DeployError> {
        discard_staging(runtime, &self.state.staging).await
    }
}

impl Deployment<Verified> {
    /// Stop and remove the verified but unpromoted staging instance.
    pub async fn rollback<R: ContainerOps + ?Sized>(self, runtime: &R) -> Result<(), DeployError> {
        discard_staging(runtime, &self.state.staging).await
    }
}

async fn discard_staging<R: ContainerOps + ?Sized>(
    runtime: &R,
    staging: &ContainerInstance,
) -> Result<(), DeployError> {
    tracing::info!(container = %staging.name, "removing staging instance");

    match runtime.stop_container(&staging.id, STAGING_STOP_GRACE).await {
        Ok(()) | Err(ContainerError::NotRunning(_)) => {}
        Err(e) if e.is_not_found() => return Ok(()),
        Err(e) => tracing::debug!(container = %staging.name, error = %e, "stop failed, forcing removal"),
    }

    match runtime.remove_container(&staging.id, true).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(DeployError::Runtime(format!(
            "failed to remove staging instance {}: {}",
            staging.name, e
        ))),
    }
}
