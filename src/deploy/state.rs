// ABOUTME: Release stages and the state markers for the type state pattern.
// ABOUTME: Each marker carries the data that exists once its stage has completed.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::instance::{ContainerInstance, RetiringInstance};
use crate::runtime::RegistryAuth;

/// Stage of a release, in the order they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Authenticating,
    Pulling,
    Staging,
    HealthChecking,
    Promoting,
    RetiringOld,
    Cleaning,
    Done,
    RolledBack,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Authenticating => "authenticating",
            Stage::Pulling => "pulling",
            Stage::Staging => "staging",
            Stage::HealthChecking => "health_checking",
            Stage::Promoting => "promoting",
            Stage::RetiringOld => "retiring_old",
            Stage::Cleaning => "cleaning",
            Stage::Done => "done",
            Stage::RolledBack => "rolled_back",
        }
    }

    /// Interrupts are honoured up to (not including) promotion.
    pub fn is_cancellable(&self) -> bool {
        *self < Stage::Promoting
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Initial state: request accepted, nothing touched.
/// Available actions: `authenticate()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Idle;

/// Runtime reachable, registry credentials resolved.
/// Available actions: `pull()`
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub(crate) auth: Option<RegistryAuth>,
}

/// Image present locally.
/// Available actions: `stage()`
#[derive(Debug, Clone)]
pub struct Pulled {
    pub(crate) digest: String,
}

/// Candidate instance running on the staging port.
/// Available actions: `health_check()`, `rollback()`
#[derive(Debug, Clone)]
pub struct Staged {
    pub(crate) digest: String,
    pub(crate) staging: ContainerInstance,
}

/// Candidate instance reported healthy.
/// Available actions: `promote()`, `rollback()`
#[derive(Debug, Clone)]
pub struct Verified {
    pub(crate) digest: String,
    pub(crate) staging: ContainerInstance,
    pub(crate) health_attempts: u32,
}

/// New instance serving on the production port.
/// Available actions: `retire_old()`
#[derive(Debug, Clone)]
pub struct Promoted {
    pub(crate) digest: String,
    pub(crate) production: ContainerInstance,
    pub(crate) retiring: Option<RetiringInstance>,
}

/// Former production instance removed (or left for the reclaimer).
/// Available actions: `clean()`
#[derive(Debug, Clone)]
pub struct Retired {
    pub(crate) digest: String,
    pub(crate) production: ContainerInstance,
}

/// Release finished.
/// Available actions: `finish()`
#[derive(Debug, Clone)]
pub struct Done {
    pub(crate) digest: String,
    pub(crate) production: ContainerInstance,
    pub(crate) reclaimed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_ordered() {
        assert!(Stage::Authenticating < Stage::Pulling);
        assert!(Stage::HealthChecking < Stage::Promoting);
        assert!(Stage::Promoting < Stage::RetiringOld);
    }

    #[test]
    fn cancellation_window_ends_at_promotion() {
        assert!(Stage::HealthChecking.is_cancellable());
        assert!(!Stage::Promoting.is_cancellable());
        assert!(!Stage::Cleaning.is_cancellable());
    }
}
