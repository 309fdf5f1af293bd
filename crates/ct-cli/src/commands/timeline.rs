//! Timeline command: one chronological line per session and capture.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use ct_core::build_timeline;

use crate::Config;

#[derive(Debug, Args)]
pub struct TimelineArgs {
    /// Normalized events (JSON array or JSON lines).
    pub file: PathBuf,

    /// Print timeline items as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run(writer: &mut impl Write, args: &TimelineArgs, config: &Config) -> Result<()> {
    let events = super::input::load_events(&args.file)?;
    let result = super::analyze::analyze(&events, config)?;
    let items = build_timeline(&result);

    if args.json {
        serde_json::to_writer_pretty(&mut *writer, &items).context("failed to encode timeline")?;
        writeln!(writer)?;
        return Ok(());
    }

    if items.is_empty() {
        writeln!(writer, "No camera activity found.")?;
        return Ok(());
    }
    for item in &items {
        writeln!(writer, "{item}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;

    #[test]
    fn renders_open_session_with_estimated_capture() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("events.json");
        std::fs::write(
            &file,
            r#"[
  {"id":"c","timestamp":"2024-05-01T10:00:00Z","event_type":"CAMERA_CONNECT","package_name":"com.android.camera2"},
  {"id":"s","timestamp":"2024-05-01T10:00:10Z","event_type":"SHUTTER_SOUND","package_name":"com.android.camera2"},
  {"id":"g","timestamp":"2024-05-01T10:00:11Z","event_type":"URI_PERMISSION_GRANT","package_name":"com.android.camera2"}
]"#,
        )
        .unwrap();
        let args = TimelineArgs { file, json: false };

        let mut output = Vec::new();
        run(&mut output, &args, &Config::default()).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @r"
        2024-05-01 10:00:00 -> open                 yellow  Session 1: com.android.camera2 (incomplete)
        2024-05-01 10:00:10                         yellow  Capture 1: com.android.camera2 (estimated)
        ");
    }

    #[test]
    fn empty_input_says_so() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("events.jsonl");
        std::fs::write(&file, "").unwrap();
        let args = TimelineArgs { file, json: false };

        let mut output = Vec::new();
        run(&mut output, &args, &Config::default()).unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "No camera activity found.\n");
    }

    #[test]
    fn json_items_carry_open_end() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("events.jsonl");
        std::fs::write(
            &file,
            r#"{"id":"c","timestamp":"2024-05-01T10:00:00Z","event_type":"CAMERA_CONNECT","package_name":"com.android.camera2"}"#,
        )
        .unwrap();
        let args = TimelineArgs { file, json: true };

        let mut output = Vec::new();
        run(&mut output, &args, &Config::default()).unwrap();

        let items: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(items[0]["kind"], "session");
        assert!(items[0]["end"].is_null());
        assert_eq!(items[0]["color"], "yellow");
    }
}
