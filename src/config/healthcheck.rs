// ABOUTME: Container health check configuration for staging and production.
// ABOUTME: One command, two timing profiles: a fast staging check and a patient production one.

use serde::Deserialize;
use std::time::Duration;

/// Health check baked into every container hotswap creates.
///
/// The runtime runs `cmd` inside the container and owns the resulting health
/// state; hotswap only observes it. Staging instances get aggressive timing so
/// a bad release is caught quickly, production instances get a longer interval
/// and more retries since they are no longer gated by the staging check.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthcheckConfig {
    /// Shell command run inside the container; exit status 0 means healthy.
    pub cmd: String,

    #[serde(default = "CheckTiming::staging")]
    pub staging: CheckTiming,

    #[serde(default = "CheckTiming::production")]
    pub production: CheckTiming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CheckTiming {
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default = "default_start_period", with = "humantime_serde")]
    pub start_period: Duration,
}

fn default_interval() -> Duration {
    Duration::from_secs(3)
}

fn default_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_retries() -> u32 {
    3
}

fn default_start_period() -> Duration {
    Duration::from_secs(5)
}

impl CheckTiming {
    pub fn staging() -> Self {
        Self {
            interval: default_interval(),
            timeout: default_timeout(),
            retries: default_retries(),
            start_period: default_start_period(),
        }
    }

    pub fn production() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
            retries: 5,
            start_period: Duration::from_secs(10),
        }
    }
}

impl HealthcheckConfig {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            staging: CheckTiming::staging(),
            production: CheckTiming::production(),
        }
    }
}
