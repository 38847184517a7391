// ABOUTME: Container environment values, literal or taken from the deploying process.
// ABOUTME: Resolved once when a release request is built, never logged.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

/// A value for one container environment variable.
///
/// ```yaml
/// env:
///   LOG_LEVEL: info
///   DATABASE_URL: { env: APP_DATABASE_URL }
///   REGION: { env: APP_REGION, default: eu-west-1 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Literal(String),
    FromEnv {
        #[serde(rename = "env")]
        var: String,
        #[serde(default)]
        default: Option<String>,
    },
}

impl EnvValue {
    pub fn resolve(&self) -> Result<String> {
        match self {
            EnvValue::Literal(s) => Ok(s.clone()),
            EnvValue::FromEnv { var, default } => std::env::var(var)
                .ok()
                .or_else(|| default.clone())
                .ok_or_else(|| Error::MissingEnvVar(var.clone())),
        }
    }
}

/// Resolve every entry; the first missing variable fails the whole map.
///
/// Sorted so the container's env list is stable between releases.
pub fn resolve_env_map(map: &HashMap<String, EnvValue>) -> Result<BTreeMap<String, String>> {
    map.iter()
        .map(|(k, v)| v.resolve().map(|resolved| (k.clone(), resolved)))
        .collect()
}
