// ABOUTME: Shared helper for connecting to the local container runtime.
// ABOUTME: Status and reclaim connect eagerly; deploy opens lazily and lets the release ping.

use hotswap::config::Config;
use hotswap::error::Result;
use hotswap::output::Output;
use hotswap::runtime::{self, BollardRuntime, RuntimeInfo};

/// Detect the Docker or Podman socket, connect and ping it.
pub async fn connect_to_runtime(config: &Config, output: &Output) -> Result<BollardRuntime> {
    output.progress("  → Connecting to container runtime...");
    let runtime = runtime::connect(&config.runtime).await?;

    match runtime.version().await {
        Ok(engine) => output.progress(&format!(
            "  → Found {} {} (API {}, {}/{})",
            runtime.runtime_type(),
            engine.version,
            engine.api_version,
            engine.os,
            engine.arch
        )),
        Err(e) => {
            tracing::debug!(error = %e, "engine version unavailable");
            output.progress(&format!("  → Found {}", runtime.runtime_type()));
        }
    }
    Ok(runtime)
}

/// Open the runtime client without pinging. Reachability is checked by the
/// release itself so an unreachable socket still produces a journaled record.
pub fn open_runtime(config: &Config, output: &Output) -> Result<BollardRuntime> {
    let (runtime, endpoint) = runtime::open(&config.runtime)?;
    output.progress(&format!("  → Using {} at {}", endpoint.kind, endpoint.socket));
    Ok(runtime)
}
