// ABOUTME: Timing and retry policies for the release pipeline.
// ABOUTME: Health polling budget, pull retries, and retention of superseded resources.

use serde::Deserialize;
use std::time::Duration;

/// How long the orchestrator watches an instance's health signal.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Polls allowed for a staging instance before it is declared timed out.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Polls allowed when re-verifying an instance after it moved to the production port.
    #[serde(default = "default_max_attempts")]
    pub verify_attempts: u32,
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_max_attempts() -> u32 {
    30
}

impl MonitorConfig {
    /// How long `attempts` polls keep watching before giving up.
    pub fn budget(&self, attempts: u32) -> Duration {
        self.poll_interval.saturating_mul(attempts)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            max_attempts: default_max_attempts(),
            verify_attempts: default_max_attempts(),
        }
    }
}

/// Image pull retries: fixed delay between attempts.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PullConfig {
    #[serde(default = "default_pull_attempts")]
    pub attempts: u32,

    #[serde(default = "default_pull_delay", with = "humantime_serde")]
    pub delay: Duration,
}

fn default_pull_attempts() -> u32 {
    3
}

fn default_pull_delay() -> Duration {
    Duration::from_secs(5)
}

impl Default for PullConfig {
    fn default() -> Self {
        Self {
            attempts: default_pull_attempts(),
            delay: default_pull_delay(),
        }
    }
}

/// What the reclaimer keeps after a successful release.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RetentionConfig {
    /// Stopped containers of this service kept for inspection, newest first.
    #[serde(default = "default_keep")]
    pub keep: usize,

    /// Dangling images younger than this survive pruning.
    #[serde(default = "default_image_max_age", with = "humantime_serde")]
    pub image_max_age: Duration,
}

fn default_keep() -> usize {
    2
}

fn default_image_max_age() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            keep: default_keep(),
            image_max_age: default_image_max_age(),
        }
    }
}
