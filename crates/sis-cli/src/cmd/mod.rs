//! Command implementations, one per run mode.

pub mod info;
pub mod install;
pub mod list;
pub mod remove;
pub mod source;
