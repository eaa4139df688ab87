//! Logging sink.
//!
//! A [`Session`](crate::Session) reports what it does through a [`LogSink`].
//! The sink decides destination and formatting; the session only supplies
//! a level and a message. Sessions without an explicit sink use
//! [`TracingSink`].

use std::fmt;
use std::io::Write;

/// Message severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

/// Receives diagnostic messages from a session.
pub trait LogSink: Send + Sync + fmt::Debug {
    fn log(&self, level: Level, message: &str);
}

/// Forwards messages to `tracing` under the `dali_client` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: Level, message: &str) {
        match level {
            Level::Debug => tracing::debug!(target: "dali_client", "{message}"),
            Level::Info => tracing::info!(target: "dali_client", "{message}"),
            Level::Warn => tracing::warn!(target: "dali_client", "{message}"),
            Level::Error => tracing::error!(target: "dali_client", "{message}"),
        }
    }
}

/// Writes informational messages to stdout and diagnostics to stderr.
#[derive(Debug, Clone)]
pub struct StdioSink {
    /// Lowest level written.
    pub min_level: Level,
    /// Prepended to error messages.
    pub error_prefix: String,
}

impl StdioSink {
    pub fn new(min_level: Level) -> Self {
        Self {
            min_level,
            ..Self::default()
        }
    }

    /// Sets the prefix written before error messages.
    pub fn with_error_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.error_prefix = prefix.into();
        self
    }

    /// The line that would be written for a message.
    fn render(&self, level: Level, message: &str) -> String {
        match level {
            Level::Error => format!("{}{message}", self.error_prefix),
            _ => message.to_string(),
        }
    }
}

impl Default for StdioSink {
    fn default() -> Self {
        Self {
            min_level: Level::Info,
            error_prefix: "error: ".to_string(),
        }
    }
}

impl LogSink for StdioSink {
    fn log(&self, level: Level, message: &str) {
        if level < self.min_level {
            return;
        }

        let line = self.render(level, message);
        // Nowhere to report a failed log write.
        let _ = match level {
            Level::Debug | Level::Info => writeln!(std::io::stdout().lock(), "{line}"),
            Level::Warn | Level::Error => writeln!(std::io::stderr().lock(), "{line}"),
        };
    }
}

#[cfg(test)]
mod sink_tests {
    use super::*;

    #[test]
    fn test_error_prefix() {
        let sink = StdioSink::default();
        assert_eq!(sink.render(Level::Error, "boom"), "error: boom");
        assert_eq!(sink.render(Level::Warn, "careful"), "careful");

        let sink = sink.with_error_prefix("dali: ");
        assert_eq!(sink.render(Level::Error, "boom"), "dali: boom");
    }

    #[test]
    fn test_levels_are_ordered() {
        assert!(Level::Debug < Level::Info);
        assert!(Level::Warn < Level::Error);
    }
}
