// ABOUTME: Traffic switch moving a verified release onto the production port.
// ABOUTME: The previous instance is kept stopped until the new one is healthy, and restored on failure.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::runtime::{
    ContainerConfig, ContainerError, ContainerInfo, ContainerOps, HealthState, PortMapping,
};
use crate::types::{ContainerId, ImageRef, InstanceName, Role};

use super::cancel::Cancellation;
use super::error::DeployError;
use super::health::HealthMonitor;
use super::instance::{ContainerInstance, LABEL_IMAGE, RetiringInstance};
use super::request::ReleaseRequest;

/// Result of a successful promotion.
#[derive(Debug)]
pub struct Promotion {
    pub production: ContainerInstance,
    pub retiring: Option<RetiringInstance>,
    /// Non-fatal problems, such as a staging container that would not go away.
    pub warnings: Vec<String>,
}

/// How far a promotion got before failing.
#[derive(Debug, Default)]
struct Progress {
    old_renamed: bool,
    staging_removed: bool,
    new_container: Option<ContainerId>,
}

/// A failed step and why.
struct StepFailure(String);

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn tolerate_not_running(result: Result<(), ContainerError>) -> Result<(), ContainerError> {
    match result {
        Err(ContainerError::NotRunning(_)) => Ok(()),
        other => other,
    }
}

fn step<T>(what: &str, result: Result<T, ContainerError>) -> Result<T, StepFailure> {
    result.map_err(|e| StepFailure(format!("{}: {}", what, e)))
}

/// The only writer of the production port binding.
pub struct TrafficSwitch<'a, R: ?Sized> {
    runtime: &'a R,
    request: &'a ReleaseRequest,
    verify: HealthMonitor,
}

impl<'a, R: ContainerOps + ?Sized> TrafficSwitch<'a, R> {
    pub fn new(runtime: &'a R, request: &'a ReleaseRequest, verify: HealthMonitor) -> Self {
        Self {
            runtime,
            request,
            verify,
        }
    }

    /// Promote the verified `staging` instance, replacing `old` if one is serving.
    ///
    /// Not cancellable: once started, the switch either completes or restores.
    pub async fn promote(
        &self,
        staging: &ContainerInstance,
        old: Option<&ContainerInstance>,
    ) -> Result<Promotion, DeployError> {
        let production_name = staging.name.with_role(Role::Production);
        let mut progress = Progress::default();
        let mut warnings = Vec::new();

        let snapshot = match old {
            Some(old) => match self.runtime.inspect_container(&old.id).await {
                Ok(info) => Some(info),
                Err(e) => {
                    // Nothing touched yet: the old instance keeps serving.
                    self.discard(&staging.id).await;
                    return Err(DeployError::PromotionRolledBack {
                        instance: production_name.to_string(),
                        message: format!("inspect {}: {}", old.name, e),
                    });
                }
            },
            None => None,
        };

        let result = self
            .swap(staging, old, &production_name, &mut progress, &mut warnings)
            .await;

        match (result, old, snapshot) {
            (Ok(production), Some(old), Some(snapshot)) => {
                let retiring = old.retire().map_err(|e| DeployError::Runtime(e.to_string()))?;
                Ok(Promotion {
                    production,
                    retiring: Some(RetiringInstance {
                        instance: retiring,
                        production_name: old.name.clone(),
                        snapshot,
                    }),
                    warnings,
                })
            }
            (Ok(production), _, _) => Ok(Promotion {
                production,
                retiring: None,
                warnings,
            }),
            (Err(failure), Some(old), Some(snapshot)) => {
                tracing::warn!(instance = %production_name, error = %failure, "promotion failed, restoring previous instance");
                self.undo_new(staging, &progress).await;
                Err(self
                    .restore(old, &snapshot, &progress, failure, &production_name)
                    .await)
            }
            (Err(failure), _, _) => {
                tracing::warn!(instance = %production_name, error = %failure, "promotion failed");
                self.undo_new(staging, &progress).await;
                Err(DeployError::PromotionFailed {
                    instance: production_name.to_string(),
                    message: failure.0,
                })
            }
        }
    }

    async fn swap(
        &self,
        staging: &ContainerInstance,
        old: Option<&ContainerInstance>,
        production_name: &InstanceName,
        progress: &mut Progress,
        warnings: &mut Vec<String>,
    ) -> Result<ContainerInstance, StepFailure> {
        let grace = self.request.stop_timeout();

        if let Some(old) = old {
            tracing::info!(container = %old.name, grace = ?grace, "stopping previous instance");
            step(
                &format!("stop {}", old.name),
                tolerate_not_running(self.runtime.stop_container(&old.id, grace).await),
            )?;

            let retiring = old.name.with_role(Role::Retiring);
            step(
                &format!("rename {} to {}", old.name, retiring),
                self.runtime.rename_container(&old.id, &retiring.to_string()).await,
            )?;
            progress.old_renamed = true;
        }

        let _ = tolerate_not_running(self.runtime.stop_container(&staging.id, grace).await);
        match self.runtime.remove_container(&staging.id, true).await {
            Ok(()) => progress.staging_removed = true,
            Err(e) if e.is_not_found() => progress.staging_removed = true,
            Err(e) => {
                tracing::warn!(container = %staging.name, error = %e, "failed to remove staging instance");
                warnings.push(format!("remove {}: {}", staging.name, e));
            }
        }

        let config = self.request.container_config(production_name);
        let id = step(
            &format!("create {}", production_name),
            self.runtime.create_container(&config).await,
        )?;
        progress.new_container = Some(id.clone());

        step(
            &format!("start {}", production_name),
            self.runtime.start_container(&id).await,
        )?;

        let production = staging
            .advance(Role::Production, id, self.request.production_port())
            .map_err(|e| StepFailure(e.to_string()))?;

        tracing::info!(container = %production.name, port = production.port, "verifying on production port");
        let report = self
            .verify
            .await_healthy(self.runtime, &production.id, &Cancellation::never())
            .await;
        if !report.verdict.is_healthy() {
            return Err(StepFailure(format!(
                "{} {} on production port after {} poll(s)",
                production.name, report.verdict, report.attempts
            )));
        }

        Ok(ContainerInstance {
            health: HealthState::Healthy,
            ..production
        })
    }

    /// Remove whatever the failed promotion created.
    async fn undo_new(&self, staging: &ContainerInstance, progress: &Progress) {
        if let Some(id) = &progress.new_container {
            self.discard(id).await;
        }
        if !progress.staging_removed {
            self.discard(&staging.id).await;
        }
    }

    async fn discard(&self, id: &ContainerId) {
        match self.runtime.remove_container(id, true).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => tracing::warn!(container = %id.short(), error = %e, "failed to remove container"),
        }
    }

    /// Bring the previous instance back under its original name.
    async fn restore(
        &self,
        old: &ContainerInstance,
        snapshot: &ContainerInfo,
        progress: &Progress,
        failure: StepFailure,
        production_name: &InstanceName,
    ) -> DeployError {
        match self.restart_old(old, progress).await {
            Ok(()) => {
                tracing::info!(container = %old.name, "previous instance restored");
                DeployError::PromotionRolledBack {
                    instance: production_name.to_string(),
                    message: failure.0,
                }
            }
            Err(restore_failure) => {
                let message = format!("{}; restore failed: {}", failure, restore_failure);
                self.emergency_recreate(old, snapshot, message).await
            }
        }
    }

    async fn restart_old(
        &self,
        old: &ContainerInstance,
        progress: &Progress,
    ) -> Result<(), StepFailure> {
        if progress.old_renamed {
            step(
                &format!("rename back to {}", old.name),
                self.runtime.rename_container(&old.id, &old.name.to_string()).await,
            )?;
        }
        match self.runtime.start_container(&old.id).await {
            Ok(()) | Err(ContainerError::AlreadyRunning(_)) => {}
            Err(e) => return Err(StepFailure(format!("start {}: {}", old.name, e))),
        }

        let report = self
            .verify
            .await_healthy(self.runtime, &old.id, &Cancellation::never())
            .await;
        if report.verdict.is_healthy() {
            Ok(())
        } else {
            Err(StepFailure(format!(
                "{} {} after restart",
                old.name, report.verdict
            )))
        }
    }

    /// Last resort: recreate the previous instance from its recorded configuration.
    async fn emergency_recreate(
        &self,
        old: &ContainerInstance,
        snapshot: &ContainerInfo,
        message: String,
    ) -> DeployError {
        let last_known_config =
            serde_json::to_string(&RedactedSnapshot::from(snapshot)).unwrap_or_default();
        tracing::error!(
            container = %old.name,
            snapshot = %last_known_config,
            "previous instance lost, attempting emergency re-creation"
        );

        self.discard(&old.id).await;
        let recreated = match self.snapshot_config(old, snapshot) {
            Some(config) => match self.runtime.create_container(&config).await {
                Ok(id) => match self.runtime.start_container(&id).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::error!(container = %old.name, error = %e, "emergency start failed");
                        false
                    }
                },
                Err(e) => {
                    tracing::error!(container = %old.name, error = %e, "emergency create failed");
                    false
                }
            },
            None => {
                tracing::error!(container = %old.name, image = %snapshot.image, "snapshot image is not a usable reference");
                false
            }
        };

        DeployError::ManualIntervention {
            old_instance: old.name.to_string(),
            message,
            recreated,
            last_known_config,
        }
    }

    /// The configuration the old instance ran with, under its original name.
    fn snapshot_config(
        &self,
        old: &ContainerInstance,
        snapshot: &ContainerInfo,
    ) -> Option<ContainerConfig> {
        let image = snapshot
            .labels
            .get(LABEL_IMAGE)
            .and_then(|label| ImageRef::parse(label).ok())
            .or_else(|| ImageRef::parse(&snapshot.image).ok())?;

        let mut config = self.request.container_config(&old.name);
        config.image = image;
        config.env = snapshot.env.clone();
        config.labels = snapshot.labels.clone();
        config.command = snapshot.command.clone();
        config.ports = if snapshot.ports.is_empty() {
            vec![PortMapping {
                host_port: old.port,
                container_port: self.request.container_port(),
                host_ip: None,
            }]
        } else {
            snapshot.ports.clone()
        };
        Some(config)
    }
}

/// Container snapshot safe to log: environment values are replaced.
#[derive(Debug, Serialize)]
pub struct RedactedSnapshot<'a> {
    pub name: &'a str,
    pub image: &'a str,
    pub env: BTreeMap<&'a str, &'static str>,
    pub ports: &'a [PortMapping],
    pub command: Option<&'a [String]>,
}

impl<'a> From<&'a ContainerInfo> for RedactedSnapshot<'a> {
    fn from(info: &'a ContainerInfo) -> Self {
        Self {
            name: info.name.trim_start_matches('/'),
            image: &info.image,
            env: info.env.keys().map(|k| (k.as_str(), "<redacted>")).collect(),
            ports: &info.ports,
            command: info.command.as_deref(),
        }
    }
}
