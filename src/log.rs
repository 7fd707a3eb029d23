//! The console side channel: one human-readable line per executed node plus terminal lines.

use std::fmt;
use std::sync::Mutex;
use tracing::{error, info};

/// A typed console line. `Display` gives the exact text shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogLine {
    /// `{label}: {output}`
    Output { label: String, output: String },
    /// `[ERROR]{label}: {message}`
    Error { label: String, message: String },
    /// `[System: Done]`
    Done,
    /// `[System: Stopped]`
    Stopped,
    /// `[System: Already initialized]`
    AlreadyInitialized,
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLine::Output { label, output } => write!(f, "{}: {}", label, output),
            LogLine::Error { label, message } => write!(f, "[ERROR]{}: {}", label, message),
            LogLine::Done => write!(f, "[System: Done]"),
            LogLine::Stopped => write!(f, "[System: Stopped]"),
            LogLine::AlreadyInitialized => write!(f, "[System: Already initialized]"),
        }
    }
}

/// Receives console lines as the traversal produces them.
pub trait LogSink: Send + Sync {
    fn append(&self, line: &LogLine);
}

/// Forwards console lines to `tracing`. The default sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn append(&self, line: &LogLine) {
        match line {
            LogLine::Error { label, message } => error!(node = %label, %message, "{}", line),
            _ => info!(target: "nagare::console", "{}", line),
        }
    }
}

/// Collects lines in memory. Hosts that poll for output and tests use this.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Removes and returns everything collected so far.
    pub fn drain(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|mut l| std::mem::take(&mut *l))
            .unwrap_or_default()
    }
}

impl LogSink for MemorySink {
    fn append(&self, line: &LogLine) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }
}
