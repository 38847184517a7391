// ABOUTME: Which engine serves the API socket and where that socket lives.
// ABOUTME: RuntimeConfig is the optional `runtime:` block of hotswap.yml.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Engine behind the Docker-compatible API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeType {
    Docker,
    Podman,
}

impl RuntimeType {
    pub fn as_str(self) -> &'static str {
        match self {
            RuntimeType::Docker => "docker",
            RuntimeType::Podman => "podman",
        }
    }

    /// Socket of a system-wide (rootful) installation.
    pub fn system_socket(self) -> &'static str {
        match self {
            RuntimeType::Docker => "/var/run/docker.sock",
            RuntimeType::Podman => "/run/podman/podman.sock",
        }
    }

    /// Guess the engine from a socket path. Podman sockets carry the name.
    pub fn from_socket(path: &str) -> Self {
        if path.contains("podman") {
            RuntimeType::Podman
        } else {
            RuntimeType::Docker
        }
    }
}

impl fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved runtime socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeEndpoint {
    pub kind: RuntimeType,
    pub socket: String,
}

impl RuntimeEndpoint {
    pub fn new(kind: RuntimeType, socket: impl Into<String>) -> Self {
        Self {
            kind,
            socket: socket.into(),
        }
    }

    /// Endpoint for a socket path whose engine is not stated.
    pub fn guessed(socket: impl Into<String>) -> Self {
        let socket = socket.into();
        Self {
            kind: RuntimeType::from_socket(&socket),
            socket,
        }
    }
}

/// `runtime:` section. Anything left out is filled in by detection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuntimeConfig {
    #[serde(rename = "type")]
    pub kind: Option<RuntimeType>,
    pub socket: Option<String>,
}
