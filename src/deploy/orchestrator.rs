// ABOUTME: Release orchestrator driving one release through every stage in order.
// ABOUTME: Owns the lock, journal, hooks and notifications around the typestate transitions.

use chrono::{DateTime, Utc};
use std::path::PathBuf;

use crate::config::Config;
use crate::diagnostics::{Diagnostics, Warning};
use crate::error::EXIT_SUCCESS;
use crate::hooks::{HookContext, HookPoint, HookRunner};
use crate::notify::{DeployEvent, EventKind, Notifier};
use crate::runtime::FullRuntime;
use crate::secrets::SecretStore;
use crate::types::ReleaseVersion;

use super::Deployment;
use super::cancel::Cancellation;
use super::error::{DeployError, DeployErrorKind};
use super::health::HealthMonitor;
use super::journal::{Journal, JournalEntry};
use super::lock::DeployLock;
use super::reclaim::ResourceReclaimer;
use super::record::{DeploymentRecord, FailureDetail, Outcome, TransitionStamp};
use super::registry::{PullPolicy, RegistryAuthenticator};
use super::request::ReleaseRequest;
use super::state::{Done, Stage};

/// Everything a finished release produced.
#[derive(Debug)]
pub struct DeployReport {
    pub record: DeploymentRecord,
    pub warnings: Vec<Warning>,
    pub error: Option<DeployError>,
}

impl DeployReport {
    pub fn outcome(&self) -> Outcome {
        self.record.outcome
    }

    pub fn exit_code(&self) -> i32 {
        self.error
            .as_ref()
            .map(DeployError::exit_code)
            .unwrap_or(EXIT_SUCCESS)
    }
}

/// Where a release is, as far as the journal is concerned.
#[derive(Debug)]
struct Progress {
    version: ReleaseVersion,
    previous_version: Option<ReleaseVersion>,
    stage: Stage,
    stamps: Vec<TransitionStamp>,
    digest: Option<String>,
}

impl Progress {
    fn new() -> Self {
        Self {
            version: ReleaseVersion::next(None),
            previous_version: None,
            stage: Stage::Idle,
            stamps: Vec::new(),
            digest: None,
        }
    }
}

/// The journal, hooks and notifications around a release.
///
/// Usable without a runtime, so a release that cannot even reach the runtime
/// is still recorded.
pub struct ReleaseReporter<'a> {
    config: &'a Config,
    state_dir: PathBuf,
    notifiers: Vec<Box<dyn Notifier>>,
    hooks: Option<HookRunner>,
}

impl<'a> ReleaseReporter<'a> {
    pub fn new(config: &'a Config, state_dir: PathBuf) -> Self {
        Self {
            config,
            state_dir,
            notifiers: Vec::new(),
            hooks: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn with_hooks(mut self, hooks: HookRunner) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Record a release that failed before the orchestrator could start.
    pub async fn preflight_failed(&self, error: DeployError) -> DeployReport {
        let started_at = Utc::now();
        let journal = self.journal();
        let mut diagnostics = Diagnostics::default();
        let mut progress = Progress::new();
        self.enter(&journal, &mut progress, &mut diagnostics, Stage::Idle);
        self.finish(&journal, progress, diagnostics, started_at, Some(error))
            .await
    }

    fn journal(&self) -> Journal {
        Journal::open(&self.state_dir, &self.config.service)
    }

    /// Run the failure hook, append the record and notify.
    async fn finish(
        &self,
        journal: &Journal,
        mut progress: Progress,
        mut diagnostics: Diagnostics,
        started_at: DateTime<Utc>,
        error: Option<DeployError>,
    ) -> DeployReport {
        let outcome = error.as_ref().map(DeployError::outcome).unwrap_or(Outcome::Success);
        if let Some(e) = &error {
            self.enter(journal, &mut progress, &mut diagnostics, Stage::RolledBack);
            if e.kind() == DeployErrorKind::ManualIntervention {
                tracing::error!(service = %self.config.service, error = %e, "release needs manual intervention");
            } else {
                tracing::warn!(service = %self.config.service, error = %e, "release failed");
            }
            // Lock contention is not this release's failure to report to hooks.
            if e.kind() != DeployErrorKind::LockHeld {
                self.run_hook(HookPoint::OnFailure, &progress, Some(outcome), &mut diagnostics)
                    .await;
            }
        }

        let record = DeploymentRecord {
            version: progress.version.to_string(),
            service: self.config.service.to_string(),
            image: self.config.image.to_string(),
            digest: progress.digest.clone(),
            outcome,
            transitions: progress.stamps.clone(),
            failure: error.as_ref().map(|e| FailureDetail {
                stage: failed_stage(&progress),
                message: e.to_string(),
                instance: e.instance().map(str::to_string),
                logs: e.logs().map(str::to_string),
                last_known_config: e.last_known_config().map(str::to_string),
            }),
            started_at,
            finished_at: Utc::now(),
        };
        if let Err(e) = journal.append(&JournalEntry::Completed(record.clone())) {
            diagnostics.warn(Warning::journal(format!(
                "failed to write {}: {}",
                journal.path().display(),
                e
            )));
        }

        let kind = match (&error, outcome) {
            (None, _) => EventKind::Succeeded,
            (Some(e), _) if e.kind() == DeployErrorKind::ManualIntervention => {
                EventKind::ManualIntervention
            }
            (Some(_), Outcome::RolledBack) => EventKind::RolledBack,
            (Some(_), _) => EventKind::Failed,
        };
        let mut event = DeployEvent::new(
            kind,
            &self.config.service,
            progress.version,
            &self.config.image,
        );
        if let Some(e) = &error {
            event = event.with_detail(e.to_string());
        }
        self.notify(&event, &mut diagnostics).await;

        DeployReport {
            record,
            warnings: diagnostics.into_warnings(),
            error,
        }
    }

    fn enter(
        &self,
        journal: &Journal,
        progress: &mut Progress,
        diagnostics: &mut Diagnostics,
        stage: Stage,
    ) {
        let at = Utc::now();
        progress.stage = stage;
        progress.stamps.push(TransitionStamp { stage, at });
        tracing::info!(service = %self.config.service, version = %progress.version, stage = %stage, "entering stage");

        let entry = JournalEntry::Transition {
            version: progress.version.to_string(),
            stage,
            at,
        };
        if let Err(e) = journal.append(&entry) {
            diagnostics.warn(Warning::journal(format!("failed to record {}: {}", stage, e)));
        }
    }

    /// Run a hook if present. `Some(success)` when it ran; non-fatal failures become warnings.
    async fn run_hook(
        &self,
        point: HookPoint,
        progress: &Progress,
        outcome: Option<Outcome>,
        diagnostics: &mut Diagnostics,
    ) -> Option<bool> {
        let hooks = self.hooks.as_ref()?;
        let context = HookContext {
            service: self.config.service.clone(),
            image: self.config.image.clone(),
            version: progress.version,
            production_port: self.config.ports.production,
            previous_version: progress.previous_version,
            outcome: outcome.map(|o| o.to_string()),
        };
        let result = hooks.run(point, &context).await?;
        if !result.success && !point.is_fatal() {
            diagnostics.warn(Warning::hook(format!(
                "{} hook failed (exit {:?}): {}",
                point.filename(),
                result.exit_code,
                result.stderr.trim()
            )));
        }
        Some(result.success)
    }

    async fn notify(&self, event: &DeployEvent, diagnostics: &mut Diagnostics) {
        for notifier in &self.notifiers {
            if let Err(e) = notifier.notify(event).await {
                diagnostics.warn(Warning::notification(format!(
                    "{} notifier: {}",
                    notifier.name(),
                    e
                )));
            }
        }
    }
}

pub struct DeploymentOrchestrator<'a, R: ?Sized> {
    runtime: &'a R,
    config: &'a Config,
    secrets: &'a dyn SecretStore,
    reporter: ReleaseReporter<'a>,
    cancel: Cancellation,
    force: bool,
}

impl<'a, R: FullRuntime + ?Sized> DeploymentOrchestrator<'a, R> {
    pub fn new(
        runtime: &'a R,
        config: &'a Config,
        secrets: &'a dyn SecretStore,
        state_dir: PathBuf,
    ) -> Self {
        Self::with_reporter(runtime, secrets, ReleaseReporter::new(config, state_dir))
    }

    pub fn with_reporter(
        runtime: &'a R,
        secrets: &'a dyn SecretStore,
        reporter: ReleaseReporter<'a>,
    ) -> Self {
        Self {
            runtime,
            config: reporter.config,
            secrets,
            reporter,
            cancel: Cancellation::never(),
            force: false,
        }
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.reporter = self.reporter.with_notifier(notifier);
        self
    }

    pub fn with_hooks(mut self, hooks: HookRunner) -> Self {
        self.reporter = self.reporter.with_hooks(hooks);
        self
    }

    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    /// Break a live deploy lock.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Run one release to completion. Never panics on release failure; the
    /// report carries the outcome, warnings and error.
    pub async fn run(&self) -> DeployReport {
        let started_at = Utc::now();
        let journal = self.reporter.journal();
        let mut diagnostics = Diagnostics::default();
        let mut progress = Progress::new();
        self.reporter
            .enter(&journal, &mut progress, &mut diagnostics, Stage::Idle);

        let state_dir = &self.reporter.state_dir;
        let result = match DeployLock::acquire(state_dir, &self.config.service, self.force) {
            Ok(lock) => {
                let result = self.guarded(&journal, &mut progress, &mut diagnostics).await;
                if let Err(e) = lock.release() {
                    diagnostics.warn(Warning::lock_release(e.to_string()));
                }
                result
            }
            Err(e) => Err(e),
        };

        let error = match result {
            Ok(done) => {
                tracing::info!(
                    service = %self.config.service,
                    version = %progress.version,
                    container = %done.production().name,
                    "release succeeded"
                );
                None
            }
            Err(e) => Some(e),
        };
        self.reporter
            .finish(&journal, progress, diagnostics, started_at, error)
            .await
    }

    /// The release proper, run while the lock is held.
    async fn guarded(
        &self,
        journal: &Journal,
        progress: &mut Progress,
        diagnostics: &mut Diagnostics,
    ) -> Result<Deployment<Done>, DeployError> {
        let request = ReleaseRequest::from_config(self.config)
            .map_err(|e| DeployError::Preflight(e.to_string()))?;

        let after = journal
            .records()
            .ok()
            .and_then(|records| records.last().and_then(|r| r.version.parse().ok()));
        let mut deployment = Deployment::new(request);
        deployment.version = ReleaseVersion::next(after.as_ref()).max(deployment.version);
        progress.version = deployment.version;

        let started = DeployEvent::new(
            EventKind::Started,
            &self.config.service,
            progress.version,
            &self.config.image,
        );
        self.reporter.notify(&started, diagnostics).await;

        // Authenticating
        self.reporter
            .enter(journal, progress, diagnostics, Stage::Authenticating);
        self.check_cancel(progress)?;
        let authenticator = RegistryAuthenticator::new(self.config.registry.as_ref(), self.secrets);
        let deployment = deployment
            .authenticate(self.runtime, &authenticator)
            .await
            .map_err(|(_, e)| e)?;
        progress.version = deployment.version();
        progress.previous_version = deployment.previous().map(|p| p.version());

        if let Some(result) = self
            .reporter
            .run_hook(HookPoint::PreDeploy, progress, None, diagnostics)
            .await
            && !result
        {
            return Err(DeployError::Hook(
                "pre-deploy hook exited unsuccessfully".to_string(),
            ));
        }

        // Pulling
        self.reporter.enter(journal, progress, diagnostics, Stage::Pulling);
        self.check_cancel(progress)?;
        let policy = PullPolicy {
            attempts: self.config.pull.attempts,
            delay: self.config.pull.delay,
        };
        let deployment = deployment
            .pull(self.runtime, policy, &self.cancel)
            .await
            .map_err(|(_, e)| e)?;

        // Staging
        self.reporter.enter(journal, progress, diagnostics, Stage::Staging);
        let deployment = deployment
            .stage(self.runtime, &self.cancel)
            .await
            .map_err(|(_, e)| e)?;
        progress.digest = Some(deployment.digest().to_string());

        // HealthChecking
        self.reporter
            .enter(journal, progress, diagnostics, Stage::HealthChecking);
        let monitor = HealthMonitor::new(
            self.config.monitor.poll_interval,
            self.config.monitor.max_attempts,
        );
        let deployment = match deployment
            .health_check(self.runtime, &monitor, &self.cancel)
            .await
        {
            Ok(verified) => verified,
            Err((staged, e)) => {
                if let Err(cleanup) = staged.rollback(self.runtime).await {
                    diagnostics.warn(Warning::cleanup(cleanup.to_string()));
                }
                return Err(e);
            }
        };

        // Last chance to honour an interrupt.
        if self.cancel.is_cancelled() {
            if let Err(cleanup) = deployment.rollback(self.runtime).await {
                diagnostics.warn(Warning::cleanup(cleanup.to_string()));
            }
            return Err(DeployError::Cancelled {
                stage: Stage::HealthChecking,
            });
        }

        // Promoting
        self.reporter.enter(journal, progress, diagnostics, Stage::Promoting);
        let verify = HealthMonitor::new(
            self.config.monitor.poll_interval,
            self.config.monitor.verify_attempts,
        );
        let deployment = deployment
            .promote(self.runtime, verify, diagnostics)
            .await?;
        self.reporter
            .run_hook(HookPoint::PostPromote, progress, None, diagnostics)
            .await;

        // RetiringOld
        self.reporter.enter(journal, progress, diagnostics, Stage::RetiringOld);
        let deployment = deployment.retire_old(self.runtime, diagnostics).await;

        // Cleaning
        self.reporter.enter(journal, progress, diagnostics, Stage::Cleaning);
        let reclaimer = ResourceReclaimer::new(
            self.config.retention.keep,
            self.config.retention.image_max_age,
        );
        let deployment = deployment
            .clean(self.runtime, &reclaimer, diagnostics)
            .await;

        self.reporter.enter(journal, progress, diagnostics, Stage::Done);
        Ok(deployment)
    }

    fn check_cancel(&self, progress: &Progress) -> Result<(), DeployError> {
        if progress.stage.is_cancellable() && self.cancel.is_cancelled() {
            return Err(DeployError::Cancelled {
                stage: progress.stage,
            });
        }
        Ok(())
    }
}

/// The stage that was active when the release failed.
fn failed_stage(progress: &Progress) -> Stage {
    progress
        .stamps
        .iter()
        .rev()
        .map(|s| s.stage)
        .find(|s| *s != Stage::RolledBack)
        .unwrap_or(Stage::Idle)
}
