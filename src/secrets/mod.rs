// ABOUTME: Secrets store collaborator: resolves named credentials at deploy time.
// ABOUTME: Secrets directory (one file per secret) first, then prefixed environment variables.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::SecretsConfig;

/// A credential value. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("secret not found: {0}")]
    NotFound(String),

    #[error("invalid secret name: {0:?}")]
    InvalidName(String),

    #[error("failed to read secret {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Source of named credentials.
pub trait SecretStore: Send + Sync {
    fn get_credential(&self, name: &str) -> Result<Secret, SecretError>;
}

/// Names are flat identifiers; anything path-like is rejected before a lookup.
fn validate_name(name: &str) -> Result<(), SecretError> {
    let ok = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(SecretError::InvalidName(name.to_string()))
    }
}

/// Secret `registry-token` with prefix `HOTSWAP_SECRET_` is read from `HOTSWAP_SECRET_REGISTRY_TOKEN`.
#[derive(Debug, Clone)]
pub struct EnvSecrets {
    prefix: String,
}

impl EnvSecrets {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn var_name(&self, name: &str) -> String {
        let suffix: String = name
            .chars()
            .map(|c| match c {
                '-' | '.' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect();
        format!("{}{}", self.prefix, suffix)
    }
}

impl SecretStore for EnvSecrets {
    fn get_credential(&self, name: &str) -> Result<Secret, SecretError> {
        validate_name(name)?;
        std::env::var(self.var_name(name))
            .ok()
            .filter(|v| !v.is_empty())
            .map(Secret::new)
            .ok_or_else(|| SecretError::NotFound(name.to_string()))
    }
}

/// One file per secret, as mounted by orchestrators under `/run/secrets`.
#[derive(Debug, Clone)]
pub struct FileSecrets {
    dir: PathBuf,
}

impl FileSecrets {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

impl SecretStore for FileSecrets {
    fn get_credential(&self, name: &str) -> Result<Secret, SecretError> {
        validate_name(name)?;
        match std::fs::read_to_string(self.dir.join(name)) {
            Ok(content) => {
                let value = content.trim_end_matches(['\n', '\r']);
                if value.is_empty() {
                    Err(SecretError::NotFound(name.to_string()))
                } else {
                    Ok(Secret::new(value))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SecretError::NotFound(name.to_string()))
            }
            Err(source) => Err(SecretError::Io {
                name: name.to_string(),
                source,
            }),
        }
    }
}

/// Tries each store in order; the first hit wins.
pub struct ChainedSecrets {
    stores: Vec<Box<dyn SecretStore>>,
}

impl ChainedSecrets {
    pub fn new(stores: Vec<Box<dyn SecretStore>>) -> Self {
        Self { stores }
    }

    pub fn from_config(config: &SecretsConfig) -> Self {
        let mut stores: Vec<Box<dyn SecretStore>> = Vec::new();
        if let Some(dir) = &config.dir {
            stores.push(Box::new(FileSecrets::new(dir)));
        }
        stores.push(Box::new(EnvSecrets::new(config.env_prefix.clone())));
        Self::new(stores)
    }
}

impl SecretStore for ChainedSecrets {
    fn get_credential(&self, name: &str) -> Result<Secret, SecretError> {
        for store in &self.stores {
            match store.get_credential(name) {
                Err(SecretError::NotFound(_)) => continue,
                other => return other,
            }
        }
        Err(SecretError::NotFound(name.to_string()))
    }
}
