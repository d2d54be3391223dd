//! User-facing message collaborator.

use std::sync::Mutex;

use log::warn;

/// Receives messages meant for the user, such as rejected weight edits.
pub trait MessageSink: Send + Sync {
    /// Show `message` to the user.
    fn show_message(&self, message: &str);
}

/// Writes messages to the log at warn level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMessageSink;

impl MessageSink for LogMessageSink {
    fn show_message(&self, message: &str) {
        warn!("{message}");
    }
}

/// Keeps every message, for tests and headless runs.
#[derive(Debug, Default)]
pub struct RecordingMessageSink {
    messages: Mutex<Vec<String>>,
}

impl RecordingMessageSink {
    /// Empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages shown so far.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

impl MessageSink for RecordingMessageSink {
    fn show_message(&self, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.to_string());
        }
    }
}
