// ABOUTME: Health monitor that polls the runtime's health signal for one instance.
// ABOUTME: Healthy succeeds at once, unhealthy fails fast, anything else waits for the next poll.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::runtime::{ContainerOps, HealthState};
use crate::types::ContainerId;

use super::cancel::Cancellation;

/// What the monitor concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthVerdict {
    Healthy,
    Unhealthy,
    /// Attempts exhausted while starting or unknown. Callers treat it like `Unhealthy`.
    TimedOut,
    /// An interrupt arrived while waiting.
    Cancelled,
}

impl HealthVerdict {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthVerdict::Healthy)
    }
}

impl fmt::Display for HealthVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthVerdict::Healthy => "healthy",
            HealthVerdict::Unhealthy => "unhealthy",
            HealthVerdict::TimedOut => "timed out",
            HealthVerdict::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Verdict plus the number of polls it took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthReport {
    pub verdict: HealthVerdict,
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct HealthMonitor {
    poll_interval: Duration,
    max_attempts: u32,
}

impl HealthMonitor {
    pub fn new(poll_interval: Duration, max_attempts: u32) -> Self {
        Self {
            poll_interval,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Poll `id` until it reports healthy or unhealthy, attempts run out, or `cancel` fires.
    ///
    /// A container that vanished counts as unhealthy. Other inspect errors are
    /// treated as an unknown signal and polled again.
    pub async fn await_healthy<R: ContainerOps + ?Sized>(
        &self,
        runtime: &R,
        id: &ContainerId,
        cancel: &Cancellation,
    ) -> HealthReport {
        for attempt in 1..=self.max_attempts {
            if cancel.is_cancelled() {
                return HealthReport {
                    verdict: HealthVerdict::Cancelled,
                    attempts: attempt - 1,
                };
            }

            let state = match runtime.inspect_health(id).await {
                Ok(state) => state,
                Err(e) if e.is_not_found() => HealthState::Unhealthy,
                Err(e) => {
                    tracing::debug!(container = %id.short(), error = %e, "health inspect failed");
                    HealthState::Unknown
                }
            };
            tracing::debug!(container = %id.short(), attempt, max = self.max_attempts, health = %state, "health poll");

            match state {
                HealthState::Healthy => {
                    return HealthReport {
                        verdict: HealthVerdict::Healthy,
                        attempts: attempt,
                    };
                }
                HealthState::Unhealthy => {
                    return HealthReport {
                        verdict: HealthVerdict::Unhealthy,
                        attempts: attempt,
                    };
                }
                HealthState::Starting | HealthState::Unknown => {}
            }

            if attempt < self.max_attempts {
                tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => {}
                    _ = cancel.cancelled() => {
                        return HealthReport {
                            verdict: HealthVerdict::Cancelled,
                            attempts: attempt,
                        };
                    }
                }
            }
        }

        HealthReport {
            verdict: HealthVerdict::TimedOut,
            attempts: self.max_attempts,
        }
    }
}
