// ABOUTME: Reachability and version check for the container engine.
// ABOUTME: A release pings before touching anything; the CLI reports the engine version.

use super::shared_types::EngineVersion;
use async_trait::async_trait;

#[async_trait]
pub trait RuntimeInfo: Send + Sync {
    /// Round trip to the engine. An unreachable runtime aborts a release up front.
    async fn ping(&self) -> Result<(), RuntimeInfoError>;

    async fn version(&self) -> Result<EngineVersion, RuntimeInfoError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeInfoError {
    #[error("unreachable: {0}")]
    Unreachable(String),

    #[error("engine returned an error: {0}")]
    Api(String),
}
