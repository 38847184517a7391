// ABOUTME: Diagnostics accumulator for non-fatal warnings during a release.
// ABOUTME: Collects warnings that shouldn't change the outcome but should be shown to users.

use serde::Serialize;

/// Collects non-fatal warnings during release operations.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!(kind = ?warning.kind, "{}", warning.message);
        self.warnings.push(warning);
    }

    /// Get all collected warnings.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Check if any warnings were collected.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}

/// A non-fatal warning collected during a release.
#[derive(Debug, Clone, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Superseded resources could not be removed; the reclaimer retries next run.
    pub fn cleanup(message: impl Into<String>) -> Self {
        Self::new(WarningKind::Cleanup, message)
    }

    /// The lock file may be left behind; the next run treats it as stale after an hour.
    pub fn lock_release(message: impl Into<String>) -> Self {
        Self::new(WarningKind::LockRelease, message)
    }

    pub fn notification(message: impl Into<String>) -> Self {
        Self::new(WarningKind::Notification, message)
    }

    pub fn hook(message: impl Into<String>) -> Self {
        Self::new(WarningKind::Hook, message)
    }

    pub fn journal(message: impl Into<String>) -> Self {
        Self::new(WarningKind::Journal, message)
    }
}

/// Categories of warnings that can occur during a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Retiring or reclaiming old resources failed.
    Cleanup,
    /// Failed to release deploy lock (lock file may remain).
    LockRelease,
    /// A notification sink rejected an event.
    Notification,
    /// A non-fatal hook failed.
    Hook,
    /// The audit journal could not be written.
    Journal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_starts_empty() {
        let diag = Diagnostics::default();
        assert!(!diag.has_warnings());
        assert!(diag.warnings().is_empty());
    }

    #[test]
    fn diagnostics_collects_warnings() {
        let mut diag = Diagnostics::default();

        diag.warn(Warning::lock_release("failed to remove lock file"));
        diag.warn(Warning::cleanup("image prune failed"));

        assert!(diag.has_warnings());
        assert_eq!(diag.warnings().len(), 2);
        assert_eq!(diag.into_warnings()[1].kind, WarningKind::Cleanup);
    }

    #[test]
    fn warning_constructors_set_correct_kind() {
        assert_eq!(Warning::lock_release("x").kind, WarningKind::LockRelease);
        assert_eq!(Warning::notification("x").kind, WarningKind::Notification);
        assert_eq!(Warning::hook("x").kind, WarningKind::Hook);
        assert_eq!(Warning::journal("x").kind, WarningKind::Journal);
    }
}
