// ABOUTME: Locates the container runtime socket on this host.
// ABOUTME: Explicit config wins, then DOCKER_HOST, then the first socket file that exists.

use super::types::{RuntimeConfig, RuntimeEndpoint, RuntimeType};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("no runtime socket found (tried {})", .tried.join(", "))]
    NoRuntimeFound { tried: Vec<String> },

    #[error("DOCKER_HOST must be a unix:// socket on this host, got {0}")]
    UnsupportedHost(String),
}

/// Resolve the runtime endpoint.
///
/// Without configuration the order is `DOCKER_HOST`, rootless Podman,
/// rootful Podman, then Docker. A configured `type` without a `socket`
/// uses that engine's system socket.
pub fn detect_runtime(config: &RuntimeConfig) -> Result<RuntimeEndpoint, DetectionError> {
    match (config.kind, &config.socket) {
        (Some(kind), Some(socket)) => return Ok(RuntimeEndpoint::new(kind, socket.clone())),
        (Some(kind), None) => return Ok(RuntimeEndpoint::new(kind, kind.system_socket())),
        (None, Some(socket)) => return Ok(RuntimeEndpoint::guessed(socket.clone())),
        (None, None) => {}
    }

    if let Some(host) = std::env::var("DOCKER_HOST").ok().filter(|h| !h.is_empty()) {
        return match host.strip_prefix("unix://") {
            Some(socket) => Ok(RuntimeEndpoint::guessed(socket)),
            None => Err(DetectionError::UnsupportedHost(host)),
        };
    }

    let candidates = socket_candidates();
    candidates
        .iter()
        .find(|candidate| Path::new(&candidate.socket).exists())
        .cloned()
        .ok_or_else(|| DetectionError::NoRuntimeFound {
            tried: candidates.into_iter().map(|c| c.socket).collect(),
        })
}

fn socket_candidates() -> Vec<RuntimeEndpoint> {
    let mut candidates = Vec::with_capacity(3);
    if let Some(uid) = current_uid() {
        candidates.push(RuntimeEndpoint::new(
            RuntimeType::Podman,
            format!("/run/user/{uid}/podman/podman.sock"),
        ));
    }
    candidates.push(RuntimeEndpoint::new(
        RuntimeType::Podman,
        RuntimeType::Podman.system_socket(),
    ));
    candidates.push(RuntimeEndpoint::new(
        RuntimeType::Docker,
        RuntimeType::Docker.system_socket(),
    ));
    candidates
}

fn current_uid() -> Option<String> {
    if let Ok(uid) = std::env::var("UID") {
        return Some(uid);
    }
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    status
        .lines()
        .find_map(|line| line.strip_prefix("Uid:"))
        .and_then(|ids| ids.split_whitespace().next())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_type_uses_system_socket() {
        let config = RuntimeConfig {
            kind: Some(RuntimeType::Docker),
            socket: None,
        };
        let endpoint = detect_runtime(&config).unwrap();
        assert_eq!(endpoint.socket, "/var/run/docker.sock");
    }

    #[test]
    fn configured_socket_guesses_type() {
        let config = RuntimeConfig {
            kind: None,
            socket: Some("/run/user/1000/podman/podman.sock".to_string()),
        };
        let endpoint = detect_runtime(&config).unwrap();
        assert_eq!(endpoint.kind, RuntimeType::Podman);
    }

    #[test]
    fn docker_host_unix_socket() {
        temp_env::with_var("DOCKER_HOST", Some("unix:///tmp/test-docker.sock"), || {
            let endpoint = detect_runtime(&RuntimeConfig::default()).unwrap();
            assert_eq!(
                endpoint,
                RuntimeEndpoint::new(RuntimeType::Docker, "/tmp/test-docker.sock")
            );
        });
    }

    #[test]
    fn docker_host_tcp_is_rejected() {
        temp_env::with_var("DOCKER_HOST", Some("tcp://10.0.0.1:2375"), || {
            let err = detect_runtime(&RuntimeConfig::default()).unwrap_err();
            assert!(matches!(err, DetectionError::UnsupportedHost(_)));
        });
    }

    #[test]
    fn candidates_end_with_docker() {
        let candidates = socket_candidates();
        assert_eq!(
            candidates.last().map(|c| c.kind),
            Some(RuntimeType::Docker)
        );
    }
}
