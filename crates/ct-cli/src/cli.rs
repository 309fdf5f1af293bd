//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::analyze::AnalyzeArgs;
use crate::commands::timeline::TimelineArgs;

/// Camera capture timeline reconstruction.
///
/// Reads normalized device log events and reports camera sessions and the
/// captures detected inside them.
#[derive(Debug, Parser)]
#[command(name = "ct", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Detect sessions and captures and print a summary.
    Analyze(AnalyzeArgs),

    /// Print sessions and captures as one chronological timeline.
    Timeline(TimelineArgs),
}
