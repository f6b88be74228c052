//! Log and status sink for the orchestration core.
//!
//! Presentation layers implement [`Reporter`] to receive timestamped log
//! lines and coarse status changes. The core never prints directly.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
    Output,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Output => "output",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Idle,
    Working,
    Stopped,
}

impl Status {
    pub fn label(&self) -> &'static str {
        match self {
            Status::Idle => "Ready",
            Status::Working => "Working...",
            Status::Stopped => "Stopped",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogLine {
    pub timestamp: DateTime<Local>,
    pub severity: Severity,
    pub message: String,
}

impl LogLine {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            severity,
            message: message.into(),
        }
    }

    pub fn render(&self) -> String {
        format!(
            "[{}] [{}] {}",
            self.timestamp.format("%H:%M:%S"),
            self.severity.as_str(),
            self.message
        )
    }
}

pub trait Reporter: Send + Sync {
    fn log(&self, severity: Severity, message: &str);
    fn status(&self, status: Status);

    fn info(&self, message: &str) {
        self.log(Severity::Info, message);
    }

    fn success(&self, message: &str) {
        self.log(Severity::Success, message);
    }

    fn warning(&self, message: &str) {
        self.log(Severity::Warning, message);
    }

    fn error(&self, message: &str) {
        self.log(Severity::Error, message);
    }
}

/// Writes log lines to stderr so stdout stays free for the JSON envelope.
#[derive(Debug, Default)]
pub struct TerminalReporter {
    quiet: bool,
}

impl TerminalReporter {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl Reporter for TerminalReporter {
    fn log(&self, severity: Severity, message: &str) {
        if message.trim().is_empty() {
            return;
        }
        if self.quiet && severity == Severity::Output {
            return;
        }
        let line = LogLine::new(severity, message.trim_end());
        let stderr = io::stderr();
        let mut handle = stderr.lock();
        let _ = writeln!(handle, "{}", line.render());
    }

    fn status(&self, status: Status) {
        log_status!("status", "{}", status.label());
    }
}

/// Append-only in-memory log, shared by clones.
#[derive(Debug, Clone, Default)]
pub struct MemoryReporter {
    lines: Arc<Mutex<Vec<LogLine>>>,
    statuses: Arc<Mutex<Vec<Status>>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<LogLine> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn messages(&self, severity: Severity) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|l| l.severity == severity)
            .map(|l| l.message)
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.message.contains(needle))
    }

    pub fn statuses(&self) -> Vec<Status> {
        self.statuses.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn last_status(&self) -> Option<Status> {
        self.statuses().last().copied()
    }

    pub fn clear(&self) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.clear();
        }
    }
}

impl Reporter for MemoryReporter {
    fn log(&self, severity: Severity, message: &str) {
        if message.trim().is_empty() {
            return;
        }
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(LogLine::new(severity, message));
        }
    }

    fn status(&self, status: Status) {
        if let Ok(mut statuses) = self.statuses.lock() {
            statuses.push(status);
        }
    }
}
