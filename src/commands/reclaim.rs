// ABOUTME: Reclaim command implementation.
// ABOUTME: Runs the resource reclaimer outside a release, under the deploy lock.

use super::Loaded;
use super::runtime_connection::connect_to_runtime;
use hotswap::deploy::{DeployLock, ResourceReclaimer};
use hotswap::diagnostics::{Diagnostics, Warning};
use hotswap::error::Result;
use hotswap::output::Output;
use serde::Serialize;
use std::time::Duration;

#[derive(Serialize)]
struct ReclaimSummary {
    containers_removed: u64,
    images_pruned: u64,
    failures: Vec<String>,
}

pub async fn reclaim(
    loaded: Loaded,
    retain: Option<usize>,
    max_age: Option<Duration>,
    mut output: Output,
) -> Result<()> {
    let config = loaded.config;
    output.start_timer();

    let state_dir = config.state_dir()?;
    let runtime = connect_to_runtime(&config, &output).await?;
    let mut diag = Diagnostics::default();

    // Shares the release lock so a concurrent release never loses its previous instance.
    let lock = DeployLock::acquire(&state_dir, &config.service, false)?;
    let reclaimer = ResourceReclaimer::new(
        retain.unwrap_or(config.retention.keep),
        max_age.unwrap_or(config.retention.image_max_age),
    );
    output.progress(&format!("  → Reclaiming resources for {}...", config.service));
    let result = reclaimer.reclaim(&runtime, &config.service, &[]).await;
    if let Err(e) = lock.release() {
        diag.warn(Warning::lock_release(e.to_string()));
    }
    let report = result?;

    for failure in &report.failures {
        diag.warn(Warning::cleanup(failure.clone()));
    }
    for warning in diag.warnings() {
        output.warning(&warning.message);
    }

    output.json(&ReclaimSummary {
        containers_removed: report.containers_removed,
        images_pruned: report.images_pruned,
        failures: report.failures.clone(),
    });
    output.success(&format!(
        "Removed {} container(s) and {} image(s)",
        report.containers_removed, report.images_pruned
    ));
    Ok(())
}
