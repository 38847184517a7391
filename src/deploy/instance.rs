// ABOUTME: Container instances of a service and their discovery from the runtime.
// ABOUTME: Roles only advance staging -> production -> retiring; regressions are rejected.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::runtime::{
    ContainerError, ContainerFilters, ContainerInfo, ContainerOps, ContainerState,
    ContainerSummary, HealthState,
};
use crate::types::{ContainerId, InstanceName, ReleaseVersion, Role, RoleError, ServiceName};

pub const LABEL_SERVICE: &str = "hotswap.service";
pub const LABEL_MANAGED: &str = "hotswap.managed";
pub const LABEL_VERSION: &str = "hotswap.version";
pub const LABEL_IMAGE: &str = "hotswap.image";

/// One container of a service.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerInstance {
    pub id: ContainerId,
    pub name: InstanceName,
    pub port: u16,
    pub created_at: DateTime<Utc>,
    pub health: HealthState,
}

impl ContainerInstance {
    pub fn new(id: ContainerId, name: InstanceName, port: u16) -> Self {
        Self {
            id,
            name,
            port,
            created_at: Utc::now(),
            health: HealthState::Unknown,
        }
    }

    pub fn role(&self) -> Role {
        self.name.role()
    }

    pub fn version(&self) -> ReleaseVersion {
        self.name.version()
    }

    /// The release moved to a new container on another port under a new role.
    pub fn advance(
        &self,
        role: Role,
        id: ContainerId,
        port: u16,
    ) -> Result<ContainerInstance, RoleError> {
        let role = self.role().advance_to(role)?;
        Ok(ContainerInstance {
            id,
            name: self.name.with_role(role),
            port,
            created_at: Utc::now(),
            health: HealthState::Unknown,
        })
    }

    /// Same container, next role (production -> retiring).
    pub fn retire(&self) -> Result<ContainerInstance, RoleError> {
        let role = self.role().advance_to(Role::Retiring)?;
        Ok(ContainerInstance {
            name: self.name.with_role(role),
            ..self.clone()
        })
    }
}

/// A former production instance, stopped and renamed, with the configuration it ran with.
#[derive(Debug, Clone)]
pub struct RetiringInstance {
    pub instance: ContainerInstance,
    /// Original production name, restored on rollback.
    pub production_name: InstanceName,
    pub snapshot: ContainerInfo,
}

/// A managed container as listed by the runtime.
#[derive(Debug, Clone)]
pub struct ListedInstance {
    pub name: InstanceName,
    pub summary: ContainerSummary,
}

impl ListedInstance {
    pub fn is_running(&self) -> bool {
        self.summary.state.is_running()
    }

    pub fn to_instance(&self, port: u16) -> ContainerInstance {
        ContainerInstance {
            id: self.summary.id.clone(),
            name: self.name.clone(),
            port,
            created_at: DateTime::from_timestamp(self.summary.created, 0)
                .unwrap_or_else(|| self.name.version().created_at()),
            health: if self.summary.state == ContainerState::Running {
                HealthState::Unknown
            } else {
                HealthState::Unhealthy
            },
        }
    }
}

/// Filters matching every container this tool created for `service`.
pub fn service_filters(service: &ServiceName) -> ContainerFilters {
    ContainerFilters {
        labels: HashMap::from([
            (LABEL_SERVICE.to_string(), service.to_string()),
            (LABEL_MANAGED.to_string(), "true".to_string()),
        ]),
        name_prefix: Some(service.instance_prefix()),
        all: true,
    }
}

/// All managed instances of a service, newest version first. Foreign names are skipped.
pub async fn list_instances<R: ContainerOps + ?Sized>(
    runtime: &R,
    service: &ServiceName,
) -> Result<Vec<ListedInstance>, ContainerError> {
    let summaries = runtime.list_containers(&service_filters(service)).await?;
    let mut instances: Vec<ListedInstance> = summaries
        .into_iter()
        .filter_map(|summary| match InstanceName::parse(service, &summary.name) {
            Ok(name) => Some(ListedInstance { name, summary }),
            Err(e) => {
                tracing::debug!(name = %summary.name, error = %e, "skipping unrecognised container");
                None
            }
        })
        .collect();
    instances.sort_by(|a, b| b.name.version().cmp(&a.name.version()));
    Ok(instances)
}

/// The instance holding the production name, if any.
///
/// A running one is preferred; otherwise the newest production-role instance
/// is returned even if it has exited, so a crashed predecessor is still
/// retired by the next release.
pub fn current_production(instances: &[ListedInstance]) -> Option<&ListedInstance> {
    let production: Vec<&ListedInstance> = instances
        .iter()
        .filter(|i| i.name.role() == Role::Production)
        .collect();
    let chosen = production
        .iter()
        .find(|i| i.is_running())
        .or_else(|| production.first())
        .copied()?;

    for extra in production.iter().filter(|i| i.name != chosen.name) {
        tracing::warn!(
            kept = %chosen.name,
            extra = %extra.name,
            running = extra.is_running(),
            "more than one production instance"
        );
    }
    if !chosen.is_running() {
        tracing::warn!(container = %chosen.name, state = %chosen.summary.state, "production instance is not running");
    }
    Some(chosen)
}
