// ABOUTME: DNS-compatible service name validation.
// ABOUTME: The service name is the base of every container name hotswap creates.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServiceNameError {
    #[error("service name cannot be empty")]
    Empty,

    #[error("service name exceeds maximum length of {max} characters")]
    TooLong { max: usize },

    #[error("service name cannot start or end with a hyphen")]
    EdgeHyphen,

    #[error("service name must be lowercase")]
    NotLowercase,

    #[error("invalid character in service name: '{0}'")]
    InvalidChar(char),
}

/// A validated RFC 1123 label used as the container base name.
///
/// Container names append `-<version>[-<role>]`, so the label is capped well
/// below the 63 character DNS limit to keep full names under it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceName(String);

impl ServiceName {
    pub const MAX_LEN: usize = 32;

    pub fn new(value: &str) -> Result<Self, ServiceNameError> {
        if value.is_empty() {
            return Err(ServiceNameError::Empty);
        }
        if value.len() > Self::MAX_LEN {
            return Err(ServiceNameError::TooLong { max: Self::MAX_LEN });
        }
        if value.starts_with('-') || value.ends_with('-') {
            return Err(ServiceNameError::EdgeHyphen);
        }
        for c in value.chars() {
            if c.is_ascii_uppercase() {
                return Err(ServiceNameError::NotLowercase);
            }
            if !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
                return Err(ServiceNameError::InvalidChar(c));
            }
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix shared by every container of this service.
    pub fn instance_prefix(&self) -> String {
        format!("{}-", self.0)
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for ServiceName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ServiceName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ServiceName::new(&s).map_err(serde::de::Error::custom)
    }
}
