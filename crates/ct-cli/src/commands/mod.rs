//! CLI subcommand implementations.

pub mod analyze;
pub mod input;
pub mod timeline;
