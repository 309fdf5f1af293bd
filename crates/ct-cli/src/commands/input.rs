//! Reading normalized events from disk.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use ct_core::NormalizedLogEvent;

/// Loads events from a JSON array file or a JSON-lines file.
pub fn load_events(path: &Path) -> Result<Vec<NormalizedLogEvent>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let events = parse_events(BufReader::new(file))
        .with_context(|| format!("failed to read events from {}", path.display()))?;
    tracing::debug!(path = %path.display(), events = events.len(), "loaded events");
    Ok(events)
}

/// Parses either a single JSON array or one JSON object per line.
pub fn parse_events<R: BufRead>(mut reader: R) -> Result<Vec<NormalizedLogEvent>> {
    // Newlines consumed while looking for the first token
    let mut skipped_lines = 0;
    let starts_with_array = loop {
        let buf = reader.fill_buf().context("failed to read input")?;
        let Some(pos) = buf.iter().position(|b| !b.is_ascii_whitespace()) else {
            if buf.is_empty() {
                return Ok(Vec::new());
            }
            let len = buf.len();
            skipped_lines += count_newlines(buf);
            reader.consume(len);
            continue;
        };
        let first = buf[pos];
        skipped_lines += count_newlines(&buf[..pos]);
        reader.consume(pos);
        break first == b'[';
    };

    if starts_with_array {
        let mut content = String::new();
        reader
            .read_to_string(&mut content)
            .context("failed to read input")?;
        return serde_json::from_str(&content).context("invalid JSON array of events");
    }

    let mut events = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line_no = skipped_lines + idx + 1;
        let line = line.with_context(|| format!("failed to read line {line_no}"))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let event: NormalizedLogEvent = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid event on line {line_no}"))?;
        events.push(event);
    }
    Ok(events)
}

fn count_newlines(bytes: &[u8]) -> usize {
    bytes.iter().filter(|&&b| b == b'\n').count()
}
