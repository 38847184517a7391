// ABOUTME: Hooks system for release lifecycle events.
// ABOUTME: Discovers and executes scripts at pre-deploy, post-promote, and on-failure points.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::types::{ImageRef, ReleaseVersion, ServiceName};

/// Hook execution points in the release lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPoint {
    /// Before any resource is touched. Failure aborts the release.
    PreDeploy,
    /// After the new instance serves on the production port (e.g. reload a reverse proxy).
    /// Failure logs a warning.
    PostPromote,
    /// When the release does not succeed. Failure logs a warning.
    OnFailure,
}

impl HookPoint {
    /// Get the hook filename for this point.
    pub fn filename(&self) -> &'static str {
        match self {
            HookPoint::PreDeploy => "pre-deploy",
            HookPoint::PostPromote => "post-promote",
            HookPoint::OnFailure => "on-failure",
        }
    }

    /// Whether failure at this hook point should abort the release.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HookPoint::PreDeploy)
    }
}

/// Context passed to hooks via environment variables.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub service: ServiceName,
    pub image: ImageRef,
    pub version: ReleaseVersion,
    pub production_port: u16,
    pub previous_version: Option<ReleaseVersion>,
    /// Final outcome, set for `on-failure`.
    pub outcome: Option<String>,
}

impl HookContext {
    /// Convert context to environment variables.
    pub fn to_env(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert("HOTSWAP_SERVICE".to_string(), self.service.to_string());
        env.insert("HOTSWAP_IMAGE".to_string(), self.image.to_string());
        env.insert("HOTSWAP_VERSION".to_string(), self.version.to_string());
        env.insert(
            "HOTSWAP_PRODUCTION_PORT".to_string(),
            self.production_port.to_string(),
        );
        if let Some(ref prev) = self.previous_version {
            env.insert("HOTSWAP_PREVIOUS_VERSION".to_string(), prev.to_string());
        }
        if let Some(ref outcome) = self.outcome {
            env.insert("HOTSWAP_OUTCOME".to_string(), outcome.clone());
        }
        env
    }
}

/// Result of running a hook.
#[derive(Debug)]
pub struct HookResult {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl HookResult {
    fn failed(message: String) -> Self {
        Self {
            success: false,
            exit_code: None,
            stdout: String::new(),
            stderr: message,
        }
    }
}

const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(300);

/// Runs executables found in `<project_dir>/.hotswap/hooks`, one per [`HookPoint`].
pub struct HookRunner {
    hooks_dir: PathBuf,
    timeout: Duration,
}

impl HookRunner {
    pub fn new(project_dir: &Path) -> Self {
        Self {
            hooks_dir: project_dir.join(".hotswap").join("hooks"),
            timeout: DEFAULT_HOOK_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn hook_exists(&self, point: HookPoint) -> bool {
        self.hook_path(point).is_file()
    }

    fn hook_path(&self, point: HookPoint) -> PathBuf {
        self.hooks_dir.join(point.filename())
    }

    /// Run the hook for `point` with the release context in its environment.
    ///
    /// `None` when no executable file exists for the point. A hook that
    /// cannot be spawned or outlives the timeout counts as failed.
    pub async fn run(&self, point: HookPoint, context: &HookContext) -> Option<HookResult> {
        let path = self.hook_path(point);
        if !path.is_file() {
            return None;
        }

        let name = point.filename();
        tracing::info!(hook = name, path = %path.display(), "running hook");
        let result = self.execute(&path, context).await;

        if result.success {
            tracing::info!(hook = name, "hook succeeded");
        } else {
            tracing::warn!(
                hook = name,
                exit_code = ?result.exit_code,
                stderr = %result.stderr.trim(),
                "hook failed"
            );
        }
        Some(result)
    }

    async fn execute(&self, path: &Path, context: &HookContext) -> HookResult {
        let child = Command::new(path)
            .envs(context.to_env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => HookResult {
                success: output.status.success(),
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            },
            Ok(Err(e)) => HookResult::failed(format!("could not execute: {}", e)),
            Err(_) => HookResult::failed(format!("timed out after {:?}", self.timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> HookContext {
        HookContext {
            service: ServiceName::new("myapp").unwrap(),
            image: ImageRef::parse("ghcr.io/org/myapp:v1.2.3").unwrap(),
            version: "20260301120000000".parse().unwrap(),
            production_port: 8080,
            previous_version: Some("20260228090000000".parse().unwrap()),
            outcome: None,
        }
    }

    #[test]
    fn hook_point_filenames() {
        assert_eq!(HookPoint::PreDeploy.filename(), "pre-deploy");
        assert_eq!(HookPoint::PostPromote.filename(), "post-promote");
        assert_eq!(HookPoint::OnFailure.filename(), "on-failure");
    }

    #[test]
    fn pre_deploy_is_fatal() {
        assert!(HookPoint::PreDeploy.is_fatal());
        assert!(!HookPoint::PostPromote.is_fatal());
        assert!(!HookPoint::OnFailure.is_fatal());
    }

    #[test]
    fn hook_context_to_env() {
        let env = context().to_env();
        assert_eq!(env.get("HOTSWAP_SERVICE"), Some(&"myapp".to_string()));
        assert_eq!(
            env.get("HOTSWAP_IMAGE"),
            Some(&"ghcr.io/org/myapp:v1.2.3".to_string())
        );
        assert_eq!(env.get("HOTSWAP_PRODUCTION_PORT"), Some(&"8080".to_string()));
        assert_eq!(
            env.get("HOTSWAP_PREVIOUS_VERSION"),
            Some(&"20260228090000000".to_string())
        );
        assert!(!env.contains_key("HOTSWAP_OUTCOME"));
    }

    #[test]
    fn hook_runner_checks_hooks_dir() {
        let runner = HookRunner::new(Path::new("/nonexistent"));
        assert!(!runner.hook_exists(HookPoint::PreDeploy));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_script_with_context() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let hooks = dir.path().join(".hotswap").join("hooks");
        std::fs::create_dir_all(&hooks).unwrap();
        let script = hooks.join("post-promote");
        std::fs::write(&script, "#!/bin/sh\necho \"$HOTSWAP_SERVICE@$HOTSWAP_VERSION\"\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let runner = HookRunner::new(dir.path());
        let result = runner.run(HookPoint::PostPromote, &context()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.stdout.trim(), "myapp@20260301120000000");

        assert!(runner.run(HookPoint::OnFailure, &context()).await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_script_reports_exit_code() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let hooks = dir.path().join(".hotswap").join("hooks");
        std::fs::create_dir_all(&hooks).unwrap();
        let script = hooks.join("pre-deploy");
        std::fs::write(&script, "#!/bin/sh\nexit 7\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let result = HookRunner::new(dir.path())
            .run(HookPoint::PreDeploy, &context())
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.exit_code, Some(7));
    }
}
