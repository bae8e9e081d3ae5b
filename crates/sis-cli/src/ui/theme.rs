//! UI Theme - colors of the status lines

use crossterm::style::Color;

/// Colors used by [`super::Output`].
#[derive(Debug, Clone)]
pub struct Theme {
    /// `[OK]` marker
    pub success: Color,
    /// `[FAILED]` marker and error lines
    pub error: Color,
    /// Warning lines
    pub warning: Color,
    /// Informational lines
    pub info: Color,
    /// Verbose details
    pub secondary: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            success: Color::Green,
            error: Color::Red,
            warning: Color::Yellow,
            info: Color::Cyan,
            secondary: Color::DarkGrey,
        }
    }
}
