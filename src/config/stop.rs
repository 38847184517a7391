// ABOUTME: Graceful shutdown settings for instances leaving service.
// ABOUTME: Grace period before the runtime kills the process, and the signal sent first.

use serde::Deserialize;
use std::time::Duration;

/// Signals an application may reasonably be asked to drain on.
const STOP_SIGNALS: &[&str] = &[
    "SIGTERM", "SIGINT", "SIGQUIT", "SIGHUP", "SIGUSR1", "SIGUSR2", "SIGWINCH",
];

#[derive(Debug, Clone, Deserialize)]
pub struct StopConfig {
    /// Time between the stop signal and SIGKILL.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Overrides the image's STOPSIGNAL. Names only, e.g. `SIGQUIT` for nginx.
    #[serde(default)]
    pub signal: Option<String>,
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            signal: None,
        }
    }
}

impl StopConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout.is_zero() {
            return Err("stop.timeout must be greater than zero".to_string());
        }
        match self.signal.as_deref() {
            Some(signal) if !STOP_SIGNALS.contains(&signal) => Err(format!(
                "stop.signal {} is not one of {}",
                signal,
                STOP_SIGNALS.join(", ")
            )),
            _ => Ok(()),
        }
    }
}
