// ABOUTME: Error types for release operations.
// ABOUTME: Each variant names the stage family it came from and maps to an outcome and exit code.

use chrono::{DateTime, Utc};

use crate::error::{EXIT_FAILURE, EXIT_MANUAL_INTERVENTION};
use crate::runtime::{ContainerError, ImageError, RuntimeInfoError};
use crate::secrets::SecretError;

use super::health::HealthVerdict;
use super::record::Outcome;
use super::state::Stage;

/// Errors that end a release.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Request rejected before any resource was touched.
    #[error("preflight failed: {0}")]
    Preflight(String),

    #[error("deploy lock held by {holder} (pid {pid}) since {started_at}")]
    LockHeld {
        holder: String,
        pid: u32,
        started_at: DateTime<Utc>,
    },

    #[error("deploy lock: {0}")]
    Lock(String),

    #[error("registry credential '{name}' unavailable: {source}")]
    MissingCredential {
        name: String,
        #[source]
        source: SecretError,
    },

    #[error("pre-deploy hook failed: {0}")]
    Hook(String),

    #[error("failed to pull {image} after {attempts} attempt(s): {message}")]
    PullFailed {
        image: String,
        attempts: u32,
        message: String,
    },

    #[error("failed to stage {instance}: {message}")]
    StagingFailed { instance: String, message: String },

    #[error("{instance} did not become healthy ({verdict} after {attempts} poll(s))")]
    HealthCheckFailed {
        instance: String,
        verdict: HealthVerdict,
        attempts: u32,
        logs: Option<String>,
    },

    #[error("cancelled during {stage}")]
    Cancelled { stage: Stage },

    /// First release: nothing was serving, nothing to restore.
    #[error("failed to promote {instance}: {message}")]
    PromotionFailed { instance: String, message: String },

    /// Promotion failed and the previous instance is serving again.
    #[error("promotion of {instance} failed, previous instance restored: {message}")]
    PromotionRolledBack { instance: String, message: String },

    /// The previous instance could not be restored.
    #[error(
        "manual intervention required: {old_instance} could not be restored ({message}); emergency re-creation {}",
        recreation_result(.recreated)
    )]
    ManualIntervention {
        old_instance: String,
        message: String,
        recreated: bool,
        /// Redacted JSON of the previous instance's configuration.
        last_known_config: String,
    },

    #[error("runtime error: {0}")]
    Runtime(String),
}

fn recreation_result(recreated: &bool) -> &'static str {
    if *recreated { "succeeded" } else { "failed" }
}

/// Error category for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployErrorKind {
    Preflight,
    LockHeld,
    Credentials,
    Hook,
    Pull,
    Staging,
    HealthCheck,
    Cancelled,
    Promotion,
    PromotionRolledBack,
    ManualIntervention,
    Runtime,
}

impl DeployError {
    pub fn kind(&self) -> DeployErrorKind {
        match self {
            DeployError::Preflight(_) | DeployError::Lock(_) => DeployErrorKind::Preflight,
            DeployError::LockHeld { .. } => DeployErrorKind::LockHeld,
            DeployError::MissingCredential { .. } => DeployErrorKind::Credentials,
            DeployError::Hook(_) => DeployErrorKind::Hook,
            DeployError::PullFailed { .. } => DeployErrorKind::Pull,
            DeployError::StagingFailed { .. } => DeployErrorKind::Staging,
            DeployError::HealthCheckFailed { .. } => DeployErrorKind::HealthCheck,
            DeployError::Cancelled { .. } => DeployErrorKind::Cancelled,
            DeployError::PromotionFailed { .. } => DeployErrorKind::Promotion,
            DeployError::PromotionRolledBack { .. } => DeployErrorKind::PromotionRolledBack,
            DeployError::ManualIntervention { .. } => DeployErrorKind::ManualIntervention,
            DeployError::Runtime(_) => DeployErrorKind::Runtime,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            DeployError::ManualIntervention { .. } => EXIT_MANUAL_INTERVENTION,
            _ => EXIT_FAILURE,
        }
    }

    /// Outcome recorded in the journal for a release that ended with this error.
    pub fn outcome(&self) -> Outcome {
        match self {
            DeployError::PromotionRolledBack { .. } => Outcome::RolledBack,
            _ => Outcome::Failed,
        }
    }

    /// Holder details when the lock was already taken.
    pub fn lock_holder_info(&self) -> Option<(&str, u32, &DateTime<Utc>)> {
        match self {
            DeployError::LockHeld {
                holder,
                pid,
                started_at,
            } => Some((holder.as_str(), *pid, started_at)),
            _ => None,
        }
    }

    /// Captured log tail of the failing instance.
    pub fn logs(&self) -> Option<&str> {
        match self {
            DeployError::HealthCheckFailed { logs, .. } => logs.as_deref(),
            _ => None,
        }
    }

    /// Redacted configuration of an instance that could not be restored.
    pub fn last_known_config(&self) -> Option<&str> {
        match self {
            DeployError::ManualIntervention {
                last_known_config, ..
            } => Some(last_known_config),
            _ => None,
        }
    }

    /// Name of the instance the failure concerns, if any.
    pub fn instance(&self) -> Option<&str> {
        match self {
            DeployError::StagingFailed { instance, .. }
            | DeployError::HealthCheckFailed { instance, .. }
            | DeployError::PromotionFailed { instance, .. }
            | DeployError::PromotionRolledBack { instance, .. } => Some(instance),
            DeployError::ManualIntervention { old_instance, .. } => Some(old_instance),
            _ => None,
        }
    }
}

/// Attach an instance name to container errors raised while staging.
pub(crate) trait ContainerErrorExt<T> {
    fn staging_context(self, instance: &str) -> Result<T, DeployError>;
}

impl<T> ContainerErrorExt<T> for Result<T, ContainerError> {
    fn staging_context(self, instance: &str) -> Result<T, DeployError> {
        self.map_err(|e| DeployError::StagingFailed {
            instance: instance.to_string(),
            message: e.to_string(),
        })
    }
}

impl From<RuntimeInfoError> for DeployError {
    fn from(err: RuntimeInfoError) -> Self {
        DeployError::Preflight(format!("container runtime {}", err))
    }
}

impl From<ContainerError> for DeployError {
    fn from(err: ContainerError) -> Self {
        DeployError::Runtime(err.to_string())
    }
}

impl From<ImageError> for DeployError {
    fn from(err: ImageError) -> Self {
        DeployError::Runtime(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_intervention_exits_with_three() {
        let err = DeployError::ManualIntervention {
            old_instance: "web-20260301120000000".to_string(),
            message: "start failed".to_string(),
            recreated: false,
            last_known_config: r#"{"image":"nginx:1.27"}"#.to_string(),
        };
        assert_eq!(err.exit_code(), 3);
        assert_eq!(err.outcome(), Outcome::Failed);
        assert_eq!(err.kind(), DeployErrorKind::ManualIntervention);
        assert!(err.to_string().contains("emergency re-creation failed"));
        assert_eq!(err.last_known_config(), Some(r#"{"image":"nginx:1.27"}"#));
    }

    #[test]
    fn restored_promotion_is_rolled_back() {
        let err = DeployError::PromotionRolledBack {
            instance: "web-20260301120000000".to_string(),
            message: "verification timed out".to_string(),
        };
        assert_eq!(err.exit_code(), 1);
        assert_eq!(err.outcome(), Outcome::RolledBack);
        assert_eq!(err.instance(), Some("web-20260301120000000"));
    }

    #[test]
    fn health_failure_carries_logs() {
        let err = DeployError::HealthCheckFailed {
            instance: "web-20260301120000000-staging".to_string(),
            verdict: HealthVerdict::Unhealthy,
            attempts: 2,
            logs: Some("panic: boom\n".to_string()),
        };
        assert_eq!(err.logs(), Some("panic: boom\n"));
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().contains("unhealthy after 2 poll(s)"));
    }

    #[test]
    fn lock_holder_info_only_for_lock_held() {
        let now = Utc::now();
        let err = DeployError::LockHeld {
            holder: "ci-runner".to_string(),
            pid: 42,
            started_at: now,
        };
        assert_eq!(err.lock_holder_info(), Some(("ci-runner", 42, &now)));
        assert!(DeployError::Preflight("x".to_string()).lock_holder_info().is_none());
    }

    #[test]
    fn staging_context_names_instance() {
        let result: Result<(), ContainerError> =
            Err(ContainerError::ImageNotFound("nginx".to_string()));
        let err = result.staging_context("web-1-staging").unwrap_err();
        assert_eq!(err.kind(), DeployErrorKind::Staging);
        assert_eq!(err.instance(), Some("web-1-staging"));
    }
}
