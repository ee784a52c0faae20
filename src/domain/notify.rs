//! User-facing notification seam.
//!
//! Connect/disconnect/listening/error events are surfaced to the user through
//! an external notification collaborator.  The trait keeps that collaborator
//! out of the bridge's functional contract: production wires in the
//! tracing-backed implementation, tests wire in a recording double.

use std::sync::Mutex;

/// Destination for user-facing notifications raised by the bridge.
pub trait Notifier: Send + Sync {
    /// An informational notice (e.g. "serial port available on ws://…").
    fn info(&self, message: &str);
    /// A warning (e.g. a client disconnected, the hub closed).
    fn warn(&self, message: &str);
    /// An error notification (e.g. the serial socket faulted).
    fn error(&self, message: &str);
}

/// Default notifier that forwards everything to the `tracing` log output.
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn info(&self, message: &str) {
        tracing::info!(target: "notify", "{message}");
    }

    fn warn(&self, message: &str) {
        tracing::warn!(target: "notify", "{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "notify", "{message}");
    }
}

/// Notifier that records every notification, for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(Level, String)>>,
}

/// Severity of a recorded notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl RecordingNotifier {
    /// Returns a snapshot of all notifications recorded so far.
    pub fn recorded(&self) -> Vec<(Level, String)> {
        self.messages.lock().unwrap().clone()
    }

    /// True if any recorded message contains `needle`.
    pub fn saw(&self, needle: &str) -> bool {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .any(|(_, m)| m.contains(needle))
    }
}

impl Notifier for RecordingNotifier {
    fn info(&self, message: &str) {
        self.messages
            .lock()
            .unwrap()
            .push((Level::Info, message.to_string()));
    }

    fn warn(&self, message: &str) {
        self.messages
            .lock()
            .unwrap()
            .push((Level::Warn, message.to_string()));
    }

    fn error(&self, message: &str) {
        self.messages
            .lock()
            .unwrap()
            .push((Level::Error, message.to_string()));
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_notifier_captures_messages_in_order() {
        // Arrange
        let notifier = RecordingNotifier::default();

        // Act
        notifier.info("listening");
        notifier.warn("client gone");
        notifier.error("socket fault");

        // Assert
        let recorded = notifier.recorded();
        assert_eq!(recorded.len(), 3);
        assert_eq!(recorded[0], (Level::Info, "listening".to_string()));
        assert_eq!(recorded[1], (Level::Warn, "client gone".to_string()));
        assert_eq!(recorded[2], (Level::Error, "socket fault".to_string()));
    }

    #[test]
    fn test_recording_notifier_saw_matches_substring() {
        let notifier = RecordingNotifier::default();
        notifier.info("Serial port available on ws://localhost:9500");
        assert!(notifier.saw("ws://localhost:9500"));
        assert!(!notifier.saw("ws://localhost:4000"));
    }

    #[test]
    fn test_tracing_notifier_does_not_panic() {
        // The tracing notifier has no observable state; this just exercises
        // the code path with no subscriber installed.
        let notifier = TracingNotifier;
        notifier.info("hello");
        notifier.warn("hello");
        notifier.error("hello");
    }
}
