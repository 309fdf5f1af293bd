//! Analyze command: sessions and captures with a run summary.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use ct_core::{AnalysisProgress, AnalysisResult, Analyzer, NormalizedLogEvent};

use crate::Config;

const TIME: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Normalized events (JSON array or JSON lines).
    pub file: PathBuf,

    /// Print the full result as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run(writer: &mut impl Write, args: &AnalyzeArgs, config: &Config) -> Result<()> {
    let events = super::input::load_events(&args.file)?;
    let result = analyze(&events, config)?;
    if args.json {
        serde_json::to_writer_pretty(&mut *writer, &result).context("failed to encode result")?;
        writeln!(writer)?;
    } else {
        write_summary(writer, &result)?;
    }
    Ok(())
}

/// Runs the engine with progress forwarded to the log.
pub fn analyze(events: &[NormalizedLogEvent], config: &Config) -> Result<AnalysisResult> {
    let analyzer = Analyzer::new(config.analysis.clone()).context("invalid analysis options")?;
    let result = analyzer.analyze_with_progress(events, |p: AnalysisProgress| {
        tracing::info!(stage = ?p.stage, completed = p.completed, total = p.total, "progress");
    });
    for warning in &result.warnings {
        tracing::warn!("{warning}");
    }
    Ok(result)
}

fn write_summary(writer: &mut impl Write, result: &AnalysisResult) -> Result<()> {
    let stats = &result.statistics;
    writeln!(
        writer,
        "Events:     {} ({} unrecognized)",
        stats.total_events, stats.unrecognized_events
    )?;
    writeln!(
        writer,
        "Sessions:   {} ({} incomplete)",
        stats.session_count, stats.incomplete_session_count
    )?;
    writeln!(
        writer,
        "Captures:   {} ({} estimated)",
        stats.capture_count, stats.estimated_capture_count
    )?;
    writeln!(writer, "Duplicates: {} removed", stats.duplicates_removed)?;

    for session in &result.sessions {
        let end = session
            .end_time
            .map_or_else(|| "open".to_string(), |t| t.format(TIME).to_string());
        writeln!(writer)?;
        write!(
            writer,
            "{}  {}  {} -> {}  confidence {}",
            session.id,
            session.package_name,
            session.start_time.format(TIME),
            end,
            session.confidence
        )?;
        if let Some(reason) = session.incomplete_reason {
            write!(writer, "  ({reason})")?;
        }
        writeln!(writer)?;

        for capture in result.captures_for(session) {
            write!(
                writer,
                "  {}  {}  confidence {}",
                capture.id,
                capture.capture_time.format(TIME),
                capture.confidence
            )?;
            if capture.is_estimated {
                write!(writer, "  estimated")?;
            }
            if let Some(path) = &capture.file_path {
                write!(writer, "  {path}")?;
            }
            writeln!(writer)?;
        }
    }

    if !result.warnings.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "Warnings:")?;
        for warning in &result.warnings {
            writeln!(writer, "  - {warning}")?;
        }
    }
    Ok(())
}
