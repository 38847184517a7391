// ABOUTME: Append-only JSON-lines journal of stage transitions and finished releases.
// ABOUTME: One file per service in the state directory; `history` reads it back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::types::ServiceName;

use super::record::DeploymentRecord;
use super::state::Stage;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JournalEntry {
    /// A release entered `stage`.
    Transition {
        version: String,
        stage: Stage,
        at: DateTime<Utc>,
    },
    /// A release ended.
    Completed(DeploymentRecord),
}

#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    /// Journal for `service` under `state_dir`. Nothing is created until the first append.
    pub fn open(state_dir: &Path, service: &ServiceName) -> Self {
        Self {
            path: state_dir.join(format!("{}.journal", service)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &JournalEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Finished releases, oldest first. Unparseable lines are skipped.
    pub fn records(&self) -> Result<Vec<DeploymentRecord>> {
        let file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalEntry>(&line) {
                Ok(JournalEntry::Completed(record)) => records.push(record),
                Ok(JournalEntry::Transition { .. }) => {}
                Err(e) => {
                    tracing::warn!(line = index + 1, error = %e, "skipping corrupt journal line");
                }
            }
        }
        Ok(records)
    }

    /// The most recent `limit` records, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<DeploymentRecord>> {
        let mut records = self.records()?;
        records.reverse();
        records.truncate(limit);
        Ok(records)
    }
}
