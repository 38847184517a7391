// ABOUTME: Instance roles and the container naming scheme derived from them.
// ABOUTME: Names are <service>-<version>[-staging|-retiring]; roles only move forward.

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::{ReleaseVersion, ServiceName};

/// The part a container plays in the blue-green swap.
///
/// Declaration order is lifecycle order: a role may only advance to a later
/// variant, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Bound to the staging port, awaiting its health verdict.
    Staging,
    /// Bound to the production port and receiving live traffic.
    Production,
    /// Former production instance, stopped and waiting for removal.
    Retiring,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("role cannot move from {from} to {to}")]
pub struct RoleError {
    pub from: Role,
    pub to: Role,
}

impl Role {
    /// Value stored in the `hotswap.role` label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Staging => "staging",
            Role::Production => "production",
            Role::Retiring => "retiring",
        }
    }

    fn suffix(&self) -> Option<&'static str> {
        match self {
            Role::Production => None,
            other => Some(other.as_str()),
        }
    }

    /// Check a forward transition.
    pub fn advance_to(self, next: Role) -> Result<Role, RoleError> {
        if next > self {
            Ok(next)
        } else {
            Err(RoleError {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "staging" => Ok(Role::Staging),
            "production" => Ok(Role::Production),
            "retiring" => Ok(Role::Retiring),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseInstanceNameError {
    #[error("{name} does not belong to service {service}")]
    ForeignService { service: String, name: String },

    #[error("{0} has no valid release version")]
    BadVersion(String),

    #[error("{0} has an unknown role suffix")]
    BadSuffix(String),
}

/// Container name of one release in one role.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceName {
    service: ServiceName,
    version: ReleaseVersion,
    role: Role,
}

impl InstanceName {
    pub fn new(service: ServiceName, version: ReleaseVersion, role: Role) -> Self {
        Self {
            service,
            version,
            role,
        }
    }

    /// Parse a runtime container name (leading `/` tolerated) for `service`.
    pub fn parse(service: &ServiceName, name: &str) -> Result<Self, ParseInstanceNameError> {
        let name = name.trim_start_matches('/');
        let rest = name
            .strip_prefix(&service.instance_prefix())
            .ok_or_else(|| ParseInstanceNameError::ForeignService {
                service: service.to_string(),
                name: name.to_string(),
            })?;

        let (version, role) = match rest.split_once('-') {
            Some((version, "staging")) => (version, Role::Staging),
            Some((version, "retiring")) => (version, Role::Retiring),
            Some(_) => return Err(ParseInstanceNameError::BadSuffix(name.to_string())),
            None => (rest, Role::Production),
        };

        let version = version
            .parse()
            .map_err(|_| ParseInstanceNameError::BadVersion(name.to_string()))?;

        Ok(Self {
            service: service.clone(),
            version,
            role,
        })
    }

    pub fn service(&self) -> &ServiceName {
        &self.service
    }

    pub fn version(&self) -> ReleaseVersion {
        self.version
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// The same release under another role.
    pub fn with_role(&self, role: Role) -> Self {
        Self {
            role,
            ..self.clone()
        }
    }
}

impl fmt::Display for InstanceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.service, self.version)?;
        if let Some(suffix) = self.role.suffix() {
            write!(f, "-{}", suffix)?;
        }
        Ok(())
    }
}

impl Serialize for InstanceName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
