// ABOUTME: Notification collaborator for release lifecycle events.
// ABOUTME: Tracing-backed notifier and an HTTP webhook notifier posting JSON via hyper.

mod webhook;

pub use webhook::WebhookNotifier;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{ImageRef, ReleaseVersion, ServiceName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Started,
    Succeeded,
    RolledBack,
    Failed,
    ManualIntervention,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventKind::Started => "started",
            EventKind::Succeeded => "succeeded",
            EventKind::RolledBack => "rolled_back",
            EventKind::Failed => "failed",
            EventKind::ManualIntervention => "manual_intervention",
        };
        f.write_str(s)
    }
}

/// One release lifecycle event as delivered to a sink.
#[derive(Debug, Clone, Serialize)]
pub struct DeployEvent {
    pub kind: EventKind,
    pub service: ServiceName,
    pub version: ReleaseVersion,
    pub image: ImageRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

impl DeployEvent {
    pub fn new(
        kind: EventKind,
        service: &ServiceName,
        version: ReleaseVersion,
        image: &ImageRef,
    ) -> Self {
        Self {
            kind,
            service: service.clone(),
            version,
            image: image.clone(),
            detail: None,
            at: Utc::now(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("invalid webhook URL {0:?}: only http://host[:port]/path is supported")]
    InvalidUrl(String),

    #[error("webhook connection failed: {0}")]
    Connect(String),

    #[error("webhook request failed: {0}")]
    Http(String),

    #[error("webhook answered with status {0}")]
    Status(u16),

    #[error("webhook timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// A sink for release events. Failures never change a release outcome.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, event: &DeployEvent) -> Result<(), NotifyError>;
}

/// Writes events to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, event: &DeployEvent) -> Result<(), NotifyError> {
        match event.kind {
            EventKind::ManualIntervention => tracing::error!(
                service = %event.service,
                version = %event.version,
                detail = event.detail.as_deref().unwrap_or(""),
                "release needs manual intervention"
            ),
            EventKind::Failed | EventKind::RolledBack => tracing::warn!(
                service = %event.service,
                version = %event.version,
                kind = %event.kind,
                detail = event.detail.as_deref().unwrap_or(""),
                "release did not complete"
            ),
            _ => tracing::info!(
                service = %event.service,
                version = %event.version,
                image = %event.image,
                kind = %event.kind,
                "release event"
            ),
        }
        Ok(())
    }
}
