// ABOUTME: Terminal feedback for the CLI in normal, quiet (CI) and JSON-lines modes.
// ABOUTME: Results go to stdout; warnings and errors go to stderr in every mode.

use serde::Serialize;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Progress lines, tables and a timed final result.
    Normal,
    /// Final result, warnings and errors only.
    Quiet,
    /// One JSON object per line.
    Json,
}

pub struct Output {
    mode: OutputMode,
    started: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            started: None,
        }
    }

    /// Time from here is appended to the success line and JSON events.
    pub fn start_timer(&mut self) {
        self.started = Some(Instant::now());
    }

    fn elapsed(&self) -> Option<Duration> {
        self.started.map(|t| t.elapsed())
    }

    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    /// Table rows and other plain results. JSON mode emits [`Output::json`] instead.
    pub fn line(&self, message: &str) {
        if self.mode != OutputMode::Json {
            println!("{message}");
        }
    }

    pub fn success(&self, message: &str) {
        match (self.mode, self.elapsed()) {
            (OutputMode::Json, _) => self.event("success", message, false),
            (OutputMode::Normal, Some(elapsed)) => {
                println!("{message} ({:.1}s)", elapsed.as_secs_f64())
            }
            _ => println!("{message}"),
        }
    }

    pub fn warning(&self, message: &str) {
        self.problem("warning", "Warning", message);
    }

    pub fn error(&self, message: &str) {
        self.problem("error", "Error", message);
    }

    /// One JSON line for `value`; nothing outside JSON mode.
    pub fn json<T: Serialize>(&self, value: &T) {
        if self.mode == OutputMode::Json
            && let Ok(json) = serde_json::to_string(value)
        {
            println!("{json}");
        }
    }

    fn problem(&self, event: &str, prefix: &str, message: &str) {
        if self.mode == OutputMode::Json {
            self.event(event, message, true);
        } else {
            eprintln!("{prefix}: {message}");
        }
    }

    fn event(&self, event: &str, message: &str, to_stderr: bool) {
        let line = serde_json::to_string(&JsonEvent {
            event,
            message,
            duration_secs: self.elapsed().map(|d| d.as_secs_f64()),
        });
        match line {
            Ok(line) if to_stderr => eprintln!("{line}"),
            Ok(line) => println!("{line}"),
            Err(e) => tracing::debug!(error = %e, "failed to encode output event"),
        }
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}
