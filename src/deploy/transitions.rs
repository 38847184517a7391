// ABOUTME: State transition methods for release orchestration.
// ABOUTME: Each method consumes self and returns the next state, or hands itself back with the error.

use crate::diagnostics::{Diagnostics, Warning};
use crate::runtime::{ContainerError, ContainerOps, HealthState, ImageOps, LogOps, RuntimeInfo};
use crate::types::{InstanceName, ReleaseVersion, Role};

use super::Deployment;
use super::cancel::Cancellation;
use super::error::{ContainerErrorExt, DeployError};
use super::health::{HealthMonitor, HealthVerdict};
use super::instance::{ContainerInstance, current_production, list_instances};
use super::reclaim::ResourceReclaimer;
use super::registry::{PullPolicy, RegistryAuthenticator, pull_with_retry};
use super::state::{
    Authenticated, Done, Idle, Promoted, Pulled, Retired, Stage, Staged, Verified,
};
use super::switch::TrafficSwitch;

/// Result type for transitions whose failure leaves the release in its previous state.
pub type TransitionResult<T, S> = Result<Deployment<T>, (Deployment<S>, DeployError)>;

// =============================================================================
// Idle -> Authenticated
// =============================================================================

impl Deployment<Idle> {
    /// Confirm the runtime answers, find the serving instance, resolve registry credentials.
    ///
    /// Touches nothing. If a container already carries this release version
    /// (clock skew), the version is moved past it.
    #[must_use = "deployment state must be used"]
    pub async fn authenticate<R: ContainerOps + RuntimeInfo + ?Sized>(
        self,
        runtime: &R,
        authenticator: &RegistryAuthenticator<'_>,
    ) -> TransitionResult<Authenticated, Idle> {
        if let Err(e) = runtime.ping().await {
            return Err((self, e.into()));
        }

        let instances = match list_instances(runtime, self.service()).await {
            Ok(instances) => instances,
            Err(e) => {
                let err = DeployError::Preflight(format!("failed to list instances: {}", e));
                return Err((self, err));
            }
        };

        let previous = current_production(&instances)
            .map(|listed| listed.to_instance(self.request.production_port()));
        let latest = instances.iter().map(|i| i.name.version()).max();
        let version = match latest {
            Some(latest) if latest >= self.version => {
                let bumped = ReleaseVersion::next(Some(&latest));
                tracing::debug!(from = %self.version, to = %bumped, "release version moved past existing instance");
                bumped
            }
            _ => self.version,
        };

        let auth = match authenticator.credentials(self.image()) {
            Ok(auth) => auth,
            Err(e) => return Err((self, e)),
        };

        if let Some(previous) = &previous {
            tracing::info!(container = %previous.name, "found serving instance");
        }

        Ok(Deployment {
            request: self.request,
            version,
            previous,
            state: Authenticated { auth },
        })
    }
}

// =============================================================================
// Authenticated -> Pulled
// =============================================================================

impl Deployment<Authenticated> {
    /// Pull the image and record its digest.
    #[must_use = "deployment state must be used"]
    pub async fn pull<R: ImageOps + ?Sized>(
        self,
        runtime: &R,
        policy: PullPolicy,
        cancel: &Cancellation,
    ) -> TransitionResult<Pulled, Authenticated> {
        let result = pull_with_retry(
            runtime,
            self.request.image(),
            self.state.auth.as_ref(),
            policy,
            cancel,
        )
        .await;

        match result {
            Ok(digest) => Ok(self.transition(Pulled { digest })),
            Err(e) => Err((self, e)),
        }
    }
}

// =============================================================================
// Pulled -> Staged
// =============================================================================

impl Deployment<Pulled> {
    /// Create and start the candidate on the staging port.
    ///
    /// Stale staging instances from interrupted runs are removed first. A
    /// container that was created but would not start is removed again.
    #[must_use = "deployment state must be used"]
    pub async fn stage<R: ContainerOps + ?Sized>(
        self,
        runtime: &R,
        cancel: &Cancellation,
    ) -> TransitionResult<Staged, Pulled> {
        if cancel.is_cancelled() {
            return Err((
                self,
                DeployError::Cancelled {
                    stage: Stage::Staging,
                },
            ));
        }

        if let Err(e) = self.sweep_stale_staging(runtime).await {
            return Err((self, e));
        }

        let name = InstanceName::new(self.service().clone(), self.version, Role::Staging);
        let config = self.request.container_config(&name);

        let id = match runtime
            .create_container(&config)
            .await
            .staging_context(&name.to_string())
        {
            Ok(id) => id,
            Err(e) => return Err((self, e)),
        };

        if let Err(e) = runtime.start_container(&id).await {
            if let Err(remove_err) = runtime.remove_container(&id, true).await {
                tracing::warn!(container = %name, error = %remove_err, "failed to remove unstarted container");
            }
            let err = DeployError::StagingFailed {
                instance: name.to_string(),
                message: format!("start failed: {}", e),
            };
            return Err((self, err));
        }

        tracing::info!(container = %name, port = self.request.staging_port(), "staging instance started");
        let staging = ContainerInstance::new(id, name, self.request.staging_port());
        let digest = self.state.digest.clone();
        Ok(self.transition(Staged { digest, staging }))
    }

    async fn sweep_stale_staging<R: ContainerOps + ?Sized>(
        &self,
        runtime: &R,
    ) -> Result<(), DeployError> {
        let instances = list_instances(runtime, self.service()).await?;
        for stale in instances.iter().filter(|i| i.name.role() == Role::Staging) {
            tracing::info!(container = %stale.name, "removing stale staging instance");
            match runtime.remove_container(&stale.summary.id, true).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    return Err(DeployError::StagingFailed {
                        instance: stale.name.to_string(),
                        message: format!("stale staging instance could not be removed: {}", e),
                    });
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// Staged -> Verified
// =============================================================================

impl Deployment<Staged> {
    /// Wait for the staging instance to report healthy.
    ///
    /// On an unhealthy or timed out verdict the last log lines are captured
    /// into the error. The staging instance is left for `rollback()`.
    #[must_use = "deployment state must be used"]
    pub async fn health_check<R: ContainerOps + LogOps + ?Sized>(
        self,
        runtime: &R,
        monitor: &HealthMonitor,
        cancel: &Cancellation,
    ) -> TransitionResult<Verified, Staged> {
        let id = self.state.staging.id.clone();
        let report = monitor.await_healthy(runtime, &id, cancel).await;

        match report.verdict {
            HealthVerdict::Healthy => {
                tracing::info!(container = %self.state.staging.name, attempts = report.attempts, "staging instance healthy");
                let staging = ContainerInstance {
                    health: HealthState::Healthy,
                    ..self.state.staging.clone()
                };
                let digest = self.state.digest.clone();
                Ok(self.transition(Verified {
                    digest,
                    staging,
                    health_attempts: report.attempts,
                }))
            }
            HealthVerdict::Cancelled => Err((
                self,
                DeployError::Cancelled {
                    stage: Stage::HealthChecking,
                },
            )),
            verdict => {
                let logs = match runtime.tail_logs(&id, self.request.log_tail()).await {
                    Ok(logs) => Some(logs),
                    Err(e) => {
                        tracing::warn!(container = %self.state.staging.name, error = %e, "failed to capture logs");
                        None
                    }
                };
                let err = DeployError::HealthCheckFailed {
                    instance: self.state.staging.name.to_string(),
                    verdict,
                    attempts: report.attempts,
                    logs,
                };
                Err((self, err))
            }
        }
    }
}

// =============================================================================
// Verified -> Promoted
// =============================================================================

impl Deployment<Verified> {
    /// Swap the verified release onto the production port.
    ///
    /// On failure the switch has already removed the new containers and
    /// restored the previous instance where it could; nothing is left to roll back.
    #[must_use = "deployment state must be used"]
    pub async fn promote<R: ContainerOps + ?Sized>(
        self,
        runtime: &R,
        verify: HealthMonitor,
        diagnostics: &mut Diagnostics,
    ) -> Result<Deployment<Promoted>, DeployError> {
        let promotion = {
            let switch = TrafficSwitch::new(runtime, &self.request, verify);
            switch
                .promote(&self.state.staging, self.previous.as_ref())
                .await?
        };

        for warning in promotion.warnings {
            diagnostics.warn(Warning::cleanup(warning));
        }

        tracing::info!(container = %promotion.production.name, port = promotion.production.port, "promoted");
        let digest = self.state.digest.clone();
        Ok(self.transition(Promoted {
            digest,
            production: promotion.production,
            retiring: promotion.retiring,
        }))
    }
}

// =============================================================================
// Promoted -> Retired
// =============================================================================

impl Deployment<Promoted> {
    /// Stop the former production instance with its grace period and remove it.
    ///
    /// Failures are warnings: the reclaimer picks the container up later.
    #[must_use = "deployment state must be used"]
    pub async fn retire_old<R: ContainerOps + ?Sized>(
        self,
        runtime: &R,
        diagnostics: &mut Diagnostics,
    ) -> Deployment<Retired> {
        if let Some(retiring) = &self.state.retiring {
            let id = &retiring.instance.id;
            let name = &retiring.instance.name;
            match runtime
                .stop_container(id, self.request.stop_timeout())
                .await
            {
                Ok(()) | Err(ContainerError::NotRunning(_)) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => tracing::debug!(container = %name, error = %e, "stop before removal failed"),
            }
            match runtime.remove_container(id, true).await {
                Ok(()) => tracing::info!(container = %name, "retired previous instance"),
                Err(e) if e.is_not_found() => {}
                Err(e) => diagnostics.warn(Warning::cleanup(format!(
                    "failed to remove {}: {}",
                    name, e
                ))),
            }
        }

        let digest = self.state.digest.clone();
        let production = self.state.production.clone();
        self.transition(Retired { digest, production })
    }
}

// =============================================================================
// Retired -> Done
// =============================================================================

impl Deployment<Retired> {
    /// Run the reclaimer. Failures are warnings.
    #[must_use = "deployment state must be used"]
    pub async fn clean<R: ContainerOps + ImageOps + ?Sized>(
        self,
        runtime: &R,
        reclaimer: &ResourceReclaimer,
        diagnostics: &mut Diagnostics,
    ) -> Deployment<Done> {
        let protect = [self.state.production.id.clone()];
        let reclaimed = match reclaimer.reclaim(runtime, self.service(), &protect).await {
            Ok(report) => {
                for failure in &report.failures {
                    diagnostics.warn(Warning::cleanup(failure.clone()));
                }
                report.pruned_count()
            }
            Err(e) => {
                diagnostics.warn(Warning::cleanup(format!("reclaim failed: {}", e)));
                0
            }
        };

        let digest = self.state.digest.clone();
        let production = self.state.production.clone();
        self.transition(Done {
            digest,
            production,
            reclaimed,
        })
    }
}
