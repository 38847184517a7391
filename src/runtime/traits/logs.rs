// ABOUTME: Log access for container runtimes.
// ABOUTME: Reads the tail of an instance's output so failure reports can show it.

use crate::types::ContainerId;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;

pub type LogLineStream = Pin<Box<dyn Stream<Item = Result<LogLine, LogError>> + Send>>;

#[async_trait]
pub trait LogOps: Send + Sync {
    /// The last `tail` lines of stdout and stderr, oldest first, without following.
    async fn container_logs(&self, id: &ContainerId, tail: usize)
    -> Result<LogLineStream, LogError>;

    /// Same lines joined into one newline-terminated block.
    async fn tail_logs(&self, id: &ContainerId, tail: usize) -> Result<String, LogError> {
        let mut stream = self.container_logs(id, tail).await?;
        let mut out = String::new();
        while let Some(line) = stream.next().await {
            let line = line?;
            out.push_str(line.text.trim_end_matches('\n'));
            out.push('\n');
        }
        Ok(out)
    }
}

#[derive(Debug, Clone)]
pub struct LogLine {
    pub stream: LogStream,
    pub text: String,
}

/// Which output the line was written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("no logs for missing container {0}")]
    ContainerNotFound(String),

    #[error("log stream broke: {0}")]
    Stream(String),
}
