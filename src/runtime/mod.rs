// ABOUTME: Container runtime layer: capability traits, detection and the bollard client.
// ABOUTME: Auto-detects the local Docker or Podman socket or uses explicit config.

mod bollard;
mod detection;
mod error;
mod traits;
mod types;

use snafu::ResultExt;

pub use self::bollard::BollardRuntime;
pub use detection::{DetectionError, detect_runtime};
pub use error::RuntimeError;
pub use traits::*;
pub use types::{RuntimeConfig, RuntimeEndpoint, RuntimeType};

/// Detect the local runtime and open a client for it without sending anything.
///
/// A release pings the runtime itself so that an unreachable socket is
/// journaled as a failed release.
pub fn open(config: &RuntimeConfig) -> Result<(BollardRuntime, RuntimeEndpoint), RuntimeError> {
    let endpoint = detect_runtime(config).context(error::DetectionSnafu)?;
    tracing::debug!(runtime = %endpoint.kind, socket = %endpoint.socket, "opening runtime client");

    let runtime = BollardRuntime::connect(&endpoint).context(error::ConnectSnafu {
        socket: endpoint.socket.as_str(),
    })?;
    Ok((runtime, endpoint))
}

/// Detect the local runtime, connect, and confirm it answers.
pub async fn connect(config: &RuntimeConfig) -> Result<BollardRuntime, RuntimeError> {
    let (runtime, endpoint) = open(config)?;
    runtime.ping().await.context(error::UnresponsiveSnafu {
        socket: endpoint.socket.as_str(),
    })?;
    Ok(runtime)
}
