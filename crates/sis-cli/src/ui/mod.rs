//! Terminal rendering of engine reports.

pub mod output;
pub mod theme;

pub use output::Output;
pub use theme::Theme;
