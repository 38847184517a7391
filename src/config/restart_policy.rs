// ABOUTME: Restart policy applied to the containers hotswap creates.
// ABOUTME: Parses no, always, unless-stopped and on-failure[:N] from YAML or flags.

use serde::de::{self, Deserialize, Deserializer};
use std::fmt;
use std::str::FromStr;

use crate::runtime::RestartPolicyConfig;

/// How the runtime should treat a crashed release container.
///
/// Staging containers are always created with `no`, whatever this says: a
/// staging instance that restarts itself could flap between unhealthy and
/// starting and never give the monitor a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestartPolicy {
    No,
    Always,
    #[default]
    UnlessStopped,
    OnFailure {
        max_retries: Option<u32>,
    },
}

impl RestartPolicy {
    pub fn to_runtime(self) -> RestartPolicyConfig {
        match self {
            RestartPolicy::No => RestartPolicyConfig::No,
            RestartPolicy::Always => RestartPolicyConfig::Always,
            RestartPolicy::UnlessStopped => RestartPolicyConfig::UnlessStopped,
            RestartPolicy::OnFailure { max_retries } => RestartPolicyConfig::OnFailure { max_retries },
        }
    }
}

impl FromStr for RestartPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            None => match s {
                "no" => Ok(RestartPolicy::No),
                "always" => Ok(RestartPolicy::Always),
                "unless-stopped" => Ok(RestartPolicy::UnlessStopped),
                "on-failure" => Ok(RestartPolicy::OnFailure { max_retries: None }),
                other => Err(format!("unknown restart policy: {}", other)),
            },
            Some(("on-failure", retries)) => retries
                .parse::<u32>()
                .map(|n| RestartPolicy::OnFailure {
                    max_retries: Some(n),
                })
                .map_err(|_| format!("invalid max retries: {}", retries)),
            Some(_) => Err(format!("unknown restart policy: {}", s)),
        }
    }
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestartPolicy::No => f.write_str("no"),
            RestartPolicy::Always => f.write_str("always"),
            RestartPolicy::UnlessStopped => f.write_str("unless-stopped"),
            RestartPolicy::OnFailure { max_retries: None } => f.write_str("on-failure"),
            RestartPolicy::OnFailure {
                max_retries: Some(n),
            } => write!(f, "on-failure:{}", n),
        }
    }
}

impl<'de> Deserialize<'de> for RestartPolicy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
