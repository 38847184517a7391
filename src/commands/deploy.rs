// ABOUTME: Deploy command implementation.
// ABOUTME: Wires runtime, secrets, notifiers, hooks and signals into the release orchestrator.

use super::Loaded;
use super::runtime_connection::open_runtime;
use hotswap::deploy::{
    CancelHandle, Cancellation, DeployError, DeployReport, DeploymentOrchestrator, ReleaseReporter,
};
use hotswap::error::Result;
use hotswap::hooks::HookRunner;
use hotswap::notify::{LogNotifier, WebhookNotifier};
use hotswap::output::Output;
use hotswap::secrets::ChainedSecrets;

/// Run one release and return the process exit code.
pub async fn deploy(loaded: Loaded, force: bool, mut output: Output) -> Result<i32> {
    let Loaded {
        config,
        project_dir,
    } = loaded;

    output.start_timer();
    output.progress(&format!("Releasing {} ({})", config.service, config.image));

    let state_dir = config.state_dir()?;
    let secrets = ChainedSecrets::from_config(&config.secrets);

    let mut reporter = ReleaseReporter::new(&config, state_dir)
        .with_notifier(Box::new(LogNotifier))
        .with_hooks(HookRunner::new(&project_dir));
    if let Some(notify) = &config.notify {
        match WebhookNotifier::from_config(notify) {
            Ok(webhook) => reporter = reporter.with_notifier(Box::new(webhook)),
            Err(e) => output.warning(&format!("webhook notifications disabled: {}", e)),
        }
    }

    // A runtime that cannot be found is still a failed release for the journal.
    let runtime = match open_runtime(&config, &output) {
        Ok(runtime) => runtime,
        Err(e) => {
            let report = reporter
                .preflight_failed(DeployError::Preflight(e.to_string()))
                .await;
            print_report(&report, &output);
            return Ok(report.exit_code());
        }
    };

    let (handle, cancel) = Cancellation::pair();
    forward_signals(handle);

    output.progress("  → Running release...");
    let report = DeploymentOrchestrator::with_reporter(&runtime, &secrets, reporter)
        .with_cancellation(cancel)
        .force(force)
        .run()
        .await;
    print_report(&report, &output);
    Ok(report.exit_code())
}

fn print_report(report: &DeployReport, output: &Output) {
    for warning in &report.warnings {
        output.warning(&warning.message);
    }
    output.json(&report.record);

    let record = &report.record;
    match &report.error {
        None => output.success(&format!(
            "Released {} version {} ({})",
            record.service, record.version, record.image
        )),
        Some(e) => {
            output.error(&format!("release {} {}: {}", record.version, record.outcome, e));
            if let Some(logs) = e.logs() {
                output.line("Last log lines:");
                for line in logs.lines() {
                    output.line(&format!("  {line}"));
                }
            }
        }
    }
}

/// Trip the cancellation flag on SIGINT or SIGTERM.
fn forward_signals(handle: CancelHandle) {
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::warn!("interrupt received, cancelling release");
        handle.cancel();
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::debug!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::debug!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
