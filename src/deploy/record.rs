// ABOUTME: Audit record of one attempted release.
// ABOUTME: Captures outcome, digest, stage timestamps and failure detail for the journal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::state::Stage;

/// How a release ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    Success,
    /// Promotion failed and the previous instance serves again.
    RolledBack,
    Failed,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Success => "success",
            Outcome::RolledBack => "rolled-back",
            Outcome::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionStamp {
    pub stage: Stage,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureDetail {
    pub stage: Stage,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    /// Last log lines of the failing instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<String>,
    /// Redacted configuration of a previous instance that was lost.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_known_config: Option<String>,
}

/// One entry per attempted release. Versions and services are kept as strings
/// so old journals stay readable if naming rules tighten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub version: String,
    pub service: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    pub outcome: Outcome,
    pub transitions: Vec<TransitionStamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureDetail>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DeploymentRecord {
    pub fn succeeded(&self) -> bool {
        self.outcome == Outcome::Success
    }

    /// Last stage the release entered.
    pub fn last_stage(&self) -> Option<Stage> {
        self.transitions.last().map(|t| t.stage)
    }

    pub fn duration(&self) -> chrono::TimeDelta {
        self.finished_at - self.started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&Outcome::RolledBack).unwrap(),
            "\"rolled-back\""
        );
        assert_eq!(Outcome::RolledBack.to_string(), "rolled-back");
    }

    #[test]
    fn record_reports_last_stage() {
        let now = Utc::now();
        let record = DeploymentRecord {
            version: "20260301120000000".to_string(),
            service: "web".to_string(),
            image: "nginx:1.27".to_string(),
            digest: None,
            outcome: Outcome::Failed,
            transitions: vec![
                TransitionStamp {
                    stage: Stage::Authenticating,
                    at: now,
                },
                TransitionStamp {
                    stage: Stage::RolledBack,
                    at: now,
                },
            ],
            failure: None,
            started_at: now,
            finished_at: now,
        };
        assert_eq!(record.last_stage(), Some(Stage::RolledBack));
        assert!(!record.succeeded());

        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("digest"));
        assert!(json.contains("\"stage\":\"rolled_back\""));
    }
}
