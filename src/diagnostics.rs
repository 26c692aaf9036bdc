// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Diagnostic message sink.
//!
//! # Overview
//!
//! Usage errors (binding a resource in a state it can't be in, drawing without a pipeline,
//! writing past the end of a buffer, ...) are programmer errors.  They are not returned as
//! `Result`s; instead they are reported through a [`MessageSink`] installed on the device and
//! the offending call usually becomes a no-op.
//!
//! The default sink, [`LogSink`], logs every message and panics on [`MessageSeverity::Error`]
//! and [`MessageSeverity::Fatal`].  Applications that prefer to log and continue install their
//! own sink, or a [`RecordingSink`] which keeps every message for later inspection.

use std::fmt::{Debug, Display, Formatter};
use std::sync::{Arc, Mutex};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageSeverity {
    Info,
    Warning,
    Error,
    Fatal,
}

impl Display for MessageSeverity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MessageSeverity::Info => "info",
            MessageSeverity::Warning => "warning",
            MessageSeverity::Error => "error",
            MessageSeverity::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// Receives diagnostics from a device and everything created from it.
pub trait MessageSink: Send + Sync + Debug {
    fn message(&self, severity: MessageSeverity, text: &str);
}

/// Logs messages through the `log` facade.  Errors and fatal messages abort via panic.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl MessageSink for LogSink {
    fn message(&self, severity: MessageSeverity, text: &str) {
        match severity {
            MessageSeverity::Info => {
                logwise::info_sync!("{text}", text = logwise::privacy::LogIt(text))
            }
            MessageSeverity::Warning => {
                logwise::warn_sync!("{text}", text = logwise::privacy::LogIt(text))
            }
            MessageSeverity::Error | MessageSeverity::Fatal => {
                logwise::error_sync!("{text}", text = logwise::privacy::LogIt(text));
                panic!("{severity}: {text}");
            }
        }
    }
}

/// Keeps every message.  Never panics.
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<(MessageSeverity, String)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(RecordingSink::default())
    }

    pub fn messages(&self) -> Vec<(MessageSeverity, String)> {
        self.lock().clone()
    }

    /// Number of messages of exactly `severity`.
    pub fn count(&self, severity: MessageSeverity) -> usize {
        self.lock().iter().filter(|(s, _)| *s == severity).count()
    }

    /// Number of messages at `Error` or above.
    pub fn error_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|(s, _)| *s >= MessageSeverity::Error)
            .count()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(MessageSeverity, String)>> {
        //a panic while holding this lock leaves only a message list behind
        self.messages.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl MessageSink for RecordingSink {
    fn message(&self, severity: MessageSeverity, text: &str) {
        logwise::debuginternal_sync!(
            "recorded {severity}: {text}",
            severity = logwise::privacy::LogIt(severity),
            text = logwise::privacy::LogIt(text)
        );
        self.lock().push((severity, text.to_owned()));
    }
}

/// Cheap cloneable front end over the installed sink.
#[derive(Debug, Clone)]
pub(crate) struct Diagnostics {
    sink: Arc<dyn MessageSink>,
}

impl Diagnostics {
    pub(crate) fn new(sink: Arc<dyn MessageSink>) -> Self {
        Diagnostics { sink }
    }

    pub(crate) fn report(&self, severity: MessageSeverity, message: impl Display) {
        self.sink.message(severity, &message.to_string());
    }

    pub(crate) fn error(&self, message: impl Display) {
        self.report(MessageSeverity::Error, message);
    }

    pub(crate) fn warning(&self, message: impl Display) {
        self.report(MessageSeverity::Warning, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_counts() {
        let sink = RecordingSink::new();
        let diagnostics = Diagnostics::new(sink.clone());
        diagnostics.error("bad");
        diagnostics.warning("meh");
        diagnostics.report(MessageSeverity::Fatal, "worse");
        assert_eq!(sink.count(MessageSeverity::Error), 1);
        assert_eq!(sink.error_count(), 2);
        assert_eq!(sink.messages()[1], (MessageSeverity::Warning, "meh".to_string()));
        sink.clear();
        assert!(sink.messages().is_empty());
    }

    #[test]
    #[should_panic(expected = "error: boom")]
    fn log_sink_panics_on_error() {
        LogSink.message(MessageSeverity::Error, "boom");
    }

    #[test]
    fn log_sink_continues_on_warning() {
        LogSink.message(MessageSeverity::Warning, "just a warning");
    }
}
