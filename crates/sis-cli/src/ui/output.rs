//! Colored terminal reporter.
//!
//! Status lines are written in two halves: [`Reporter::check`] prints the
//! message without a newline and [`Reporter::succeed`] or [`Reporter::fail`]
//! closes it. Colors are only emitted when stdout is a terminal.

use std::io::{self, BufRead, IsTerminal, Write};

use crossterm::QueueableCommand;
use crossterm::style::{Color, ResetColor, SetForegroundColor};
use sis_core::Reporter;

use super::theme::Theme;

/// Reporter printing to the terminal.
#[derive(Debug)]
pub struct Output {
    theme: Theme,
    color: bool,
}

impl Output {
    /// Reporter coloring its output when stdout is a terminal.
    pub fn new() -> Self {
        Self {
            theme: Theme::default(),
            color: io::stdout().is_terminal(),
        }
    }

    fn write(&self, text: &str, color: Option<Color>, newline: bool) {
        let mut out = io::stdout().lock();
        if let (true, Some(color)) = (self.color, color) {
            let _ = out.queue(SetForegroundColor(color));
            let _ = write!(out, "{text}");
            let _ = out.queue(ResetColor);
        } else {
            let _ = write!(out, "{text}");
        }
        if newline {
            let _ = writeln!(out);
        }
        let _ = out.flush();
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for Output {
    fn say(&self, msg: &str) {
        self.write(msg, None, true);
    }

    fn check(&self, msg: &str) {
        self.write(&format!("{msg} ... "), None, false);
    }

    fn succeed(&self) {
        self.write("[OK]", Some(self.theme.success), true);
    }

    fn fail(&self) {
        self.write("[FAILED]", Some(self.theme.error), true);
    }

    fn info(&self, msg: &str) {
        self.write(&format!("INFO: {msg}"), Some(self.theme.info), true);
    }

    fn warning(&self, msg: &str) {
        self.write(&format!("WARNING: {msg}"), Some(self.theme.warning), true);
    }

    fn error(&self, msg: &str) {
        self.write(&format!("ERROR: {msg}"), Some(self.theme.error), true);
    }

    fn comment(&self, msg: &str) {
        self.write(&format!("# {msg}"), Some(self.theme.secondary), true);
    }

    fn confirm(&self, question: &str) -> bool {
        self.write(&format!("{question} [y/N] "), None, false);
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        is_yes(&answer)
    }
}

/// Whether a typed answer means yes.
fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes("\n"));
        assert!(!is_yes("no"));
        assert!(!is_yes("yep"));
    }
}
