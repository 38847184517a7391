// ABOUTME: Resource reclaimer: removes superseded stopped containers and old dangling images.
// ABOUTME: Best effort; the serving production instance is never a removal candidate.

use std::time::Duration;

use crate::runtime::{ContainerOps, ImageOps};
use crate::types::{ContainerId, Role, ServiceName};

use super::error::DeployError;
use super::instance::{ListedInstance, list_instances};

/// What a reclaim pass removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReclaimReport {
    pub containers_removed: u64,
    pub images_pruned: u64,
    /// Removals that failed; each is retried on the next pass.
    pub failures: Vec<String>,
}

impl ReclaimReport {
    pub fn pruned_count(&self) -> u64 {
        self.containers_removed + self.images_pruned
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ResourceReclaimer {
    keep: usize,
    image_max_age: Duration,
}

impl ResourceReclaimer {
    pub fn new(keep: usize, image_max_age: Duration) -> Self {
        Self {
            keep,
            image_max_age,
        }
    }

    pub async fn reclaim<R: ContainerOps + ImageOps + ?Sized>(
        &self,
        runtime: &R,
        service: &ServiceName,
        protect: &[ContainerId],
    ) -> Result<ReclaimReport, DeployError> {
        let instances = list_instances(runtime, service).await?;
        let doomed = select_for_removal(&instances, self.keep, protect);
        let mut report = ReclaimReport::default();

        for instance in doomed {
            match runtime.remove_container(&instance.summary.id, true).await {
                Ok(()) => {
                    tracing::debug!(container = %instance.name, "removed superseded container");
                    report.containers_removed += 1;
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    tracing::warn!(container = %instance.name, error = %e, "failed to remove container");
                    report
                        .failures
                        .push(format!("remove {}: {}", instance.name, e));
                }
            }
        }

        match runtime.prune_images(self.image_max_age).await {
            Ok(count) => report.images_pruned = count,
            Err(e) => {
                tracing::warn!(error = %e, "image prune failed");
                report.failures.push(format!("prune images: {}", e));
            }
        }

        tracing::info!(
            service = %service,
            containers = report.containers_removed,
            images = report.images_pruned,
            "reclaimed resources"
        );
        Ok(report)
    }
}

/// Stopped instances beyond the newest `keep`, oldest last.
///
/// Never selects a running instance, an id in `protect`, or the newest
/// production-role instance (the one serving, or the one an operator would restart).
pub fn select_for_removal<'a>(
    instances: &'a [ListedInstance],
    keep: usize,
    protect: &[ContainerId],
) -> Vec<&'a ListedInstance> {
    let current_production = instances
        .iter()
        .filter(|i| i.name.role() == Role::Production)
        .max_by_key(|i| i.name.version())
        .map(|i| &i.summary.id);

    let mut stopped: Vec<&ListedInstance> = instances
        .iter()
        .filter(|i| !i.is_running())
        .filter(|i| !protect.contains(&i.summary.id))
        .filter(|i| Some(&i.summary.id) != current_production)
        .collect();
    stopped.sort_by(|a, b| b.name.version().cmp(&a.name.version()));
    stopped.into_iter().skip(keep).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{ContainerState, ContainerSummary};
    use crate::types::{InstanceName, ReleaseVersion};
    use chrono::{TimeDelta, TimeZone, Utc};
    use proptest::prelude::*;
    use std::collections::HashMap;

    fn service() -> ServiceName {
        ServiceName::new("web").unwrap()
    }

    fn listed(minute: i64, role: Role, state: ContainerState) -> ListedInstance {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap() + TimeDelta::minutes(minute);
        let name = InstanceName::new(service(), ReleaseVersion::at(at), role);
        ListedInstance {
            summary: ContainerSummary {
                id: ContainerId::new(format!("id-{}", name)),
                name: name.to_string(),
                image: "nginx".to_string(),
                state,
                status: String::new(),
                labels: HashMap::new(),
                created: at.timestamp(),
            },
            name,
        }
    }

    #[test]
    fn keeps_newest_stopped_instances() {
        let instances = vec![
            listed(5, Role::Production, ContainerState::Running),
            listed(4, Role::Retiring, ContainerState::Exited),
            listed(3, Role::Retiring, ContainerState::Exited),
            listed(2, Role::Retiring, ContainerState::Exited),
            listed(1, Role::Staging, ContainerState::Exited),
        ];
        let doomed = select_for_removal(&instances, 2, &[]);
        let names: Vec<String> = doomed.iter().map(|i| i.name.to_string()).collect();
        assert_eq!(names.len(), 2);
        assert!(names[0].ends_with("-retiring"));
        assert!(names[1].ends_with("-staging"));
    }

    #[test]
    fn stopped_production_survives_keep_zero() {
        let instances = vec![
            listed(5, Role::Production, ContainerState::Exited),
            listed(4, Role::Retiring, ContainerState::Exited),
        ];
        let doomed = select_for_removal(&instances, 0, &[]);
        assert_eq!(doomed.len(), 1);
        assert_eq!(doomed[0].name.role(), Role::Retiring);
    }

    #[test]
    fn protected_ids_are_skipped() {
        let instances = vec![listed(4, Role::Retiring, ContainerState::Exited)];
        let protect = vec![instances[0].summary.id.clone()];
        assert!(select_for_removal(&instances, 0, &protect).is_empty());
    }

    fn arb_instance() -> impl Strategy<Value = ListedInstance> {
        (
            0i64..500,
            prop_oneof![
                Just(Role::Staging),
                Just(Role::Production),
                Just(Role::Retiring)
            ],
            prop_oneof![
                Just(ContainerState::Running),
                Just(ContainerState::Exited),
                Just(ContainerState::Created),
                Just(ContainerState::Dead)
            ],
        )
            .prop_map(|(minute, role, state)| listed(minute, role, state))
    }

    proptest! {
        #[test]
        fn never_removes_production_or_running(
            instances in proptest::collection::vec(arb_instance(), 0..20),
            keep in 0usize..5,
        ) {
            let doomed = select_for_removal(&instances, keep, &[]);
            let running_production: Vec<&ContainerId> = instances
                .iter()
                .filter(|i| i.name.role() == Role::Production && i.is_running())
                .map(|i| &i.summary.id)
                .collect();

            for d in &doomed {
                prop_assert!(!d.is_running());
                prop_assert!(!running_production.contains(&&d.summary.id));
            }

            let stopped = instances.iter().filter(|i| !i.is_running()).count();
            prop_assert!(doomed.len() <= stopped.saturating_sub(keep));
        }
    }
}
