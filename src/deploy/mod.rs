// ABOUTME: Release orchestration using the type state pattern.
// ABOUTME: Stages, health monitoring, traffic switch, reclaimer, lock and journal.

mod cancel;
mod deployment;
mod error;
mod health;
mod instance;
mod journal;
mod lock;
mod orchestrator;
mod reclaim;
mod record;
mod registry;
mod request;
mod rollback;
mod state;
mod switch;
mod transitions;

pub use cancel::{CancelHandle, Cancellation};
pub use deployment::Deployment;
pub use error::{DeployError, DeployErrorKind};
pub use health::{HealthMonitor, HealthReport, HealthVerdict};
pub use instance::{
    ContainerInstance, LABEL_IMAGE, LABEL_MANAGED, LABEL_SERVICE, LABEL_VERSION, ListedInstance,
    RetiringInstance, current_production, list_instances, service_filters,
};
pub use journal::{Journal, JournalEntry};
pub use lock::{DeployLock, LockInfo};
pub use orchestrator::{DeployReport, DeploymentOrchestrator, ReleaseReporter};
pub use reclaim::{ReclaimReport, ResourceReclaimer, select_for_removal};
pub use record::{DeploymentRecord, FailureDetail, Outcome, TransitionStamp};
pub use registry::{PullPolicy, RegistryAuthenticator, pull_with_retry};
pub use request::ReleaseRequest;
pub use state::{Authenticated, Done, Idle, Promoted, Pulled, Retired, Stage, Staged, Verified};
pub use switch::{Promotion, RedactedSnapshot, TrafficSwitch};
pub use transitions::TransitionResult;
