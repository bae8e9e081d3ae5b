//! Reporter trait for dependency injection
//!
//! Core operations report status lines through this trait so that the
//! engine is not coupled to a terminal. The CLI renders them with colors,
//! tests collect them in memory.

use std::sync::Mutex;

/// Sink for user-facing status lines.
pub trait Reporter: Send + Sync {
    /// Print a plain line.
    fn say(&self, msg: &str);

    /// Start a status line (`msg ... `) completed by `succeed` or `fail`.
    fn check(&self, msg: &str);

    /// Complete the pending status line with `[OK]`.
    fn succeed(&self);

    /// Complete the pending status line with `[FAILED]`.
    fn fail(&self);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);

    /// Log an error message.
    fn error(&self, msg: &str);

    /// Verbose-only detail line.
    fn comment(&self, msg: &str);

    /// Ask a yes/no question; `true` only on an explicit yes.
    fn confirm(&self, question: &str) -> bool;
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn say(&self, msg: &str) {
        (**self).say(msg)
    }
    fn check(&self, msg: &str) {
        (**self).check(msg)
    }
    fn succeed(&self) {
        (**self).succeed()
    }
    fn fail(&self) {
        (**self).fail()
    }
    fn info(&self, msg: &str) {
        (**self).info(msg)
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg)
    }
    fn error(&self, msg: &str) {
        (**self).error(msg)
    }
    fn comment(&self, msg: &str) {
        (**self).comment(msg)
    }
    fn confirm(&self, question: &str) -> bool {
        (**self).confirm(question)
    }
}

/// A no-op reporter for silent operations (batch mode, testing).
///
/// Every question is answered with no.
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn say(&self, _: &str) {}
    fn check(&self, _: &str) {}
    fn succeed(&self) {}
    fn fail(&self) {}
    fn info(&self, _: &str) {}
    fn warning(&self, _: &str) {}
    fn error(&self, _: &str) {}
    fn comment(&self, _: &str) {}
    fn confirm(&self, _: &str) -> bool {
        false
    }
}

/// Reporter keeping every line in memory, with a fixed answer to questions.
///
/// Lines are prefixed by their kind (`say:`, `check:`, `ok`, `failed`,
/// `info:`, `warning:`, `error:`, `comment:`, `confirm:`).
#[derive(Debug, Default)]
pub struct RecordingReporter {
    lines: Mutex<Vec<String>>,
    answer: bool,
}

impl RecordingReporter {
    /// Reporter declining every confirmation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reporter answering every confirmation with `answer`.
    pub fn answering(answer: bool) -> Self {
        Self {
            lines: Mutex::default(),
            answer,
        }
    }

    /// Snapshot of the recorded lines.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Whether any recorded line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.contains(needle))
    }

    fn push(&self, kind: &str, msg: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(format!("{kind}{msg}"));
        }
    }
}

impl Reporter for RecordingReporter {
    fn say(&self, msg: &str) {
        self.push("say: ", msg);
    }
    fn check(&self, msg: &str) {
        self.push("check: ", msg);
    }
    fn succeed(&self) {
        self.push("ok", "");
    }
    fn fail(&self) {
        self.push("failed", "");
    }
    fn info(&self, msg: &str) {
        self.push("info: ", msg);
    }
    fn warning(&self, msg: &str) {
        self.push("warning: ", msg);
    }
    fn error(&self, msg: &str) {
        self.push("error: ", msg);
    }
    fn comment(&self, msg: &str) {
        self.push("comment: ", msg);
    }
    fn confirm(&self, question: &str) -> bool {
        self.push("confirm: ", question);
        self.answer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_recording_through_arc() {
        let rec = Arc::new(RecordingReporter::answering(true));
        let dynrep: Arc<dyn Reporter> = rec.clone();
        dynrep.check("testing command git");
        dynrep.succeed();
        assert!(dynrep.confirm("remove?"));
        assert_eq!(
            rec.lines(),
            vec!["check: testing command git", "ok", "confirm: remove?"]
        );
    }

    #[test]
    fn test_null_reporter_declines() {
        assert!(!NullReporter.confirm("really?"));
    }
}
