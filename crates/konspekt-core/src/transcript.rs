use std::path::Path;

use tokio::fs;

use crate::error::{KonspektError, Result};

/// Read a raw transcript file. Unreadable input is fatal for both
/// pipelines.
pub async fn load_transcript(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .await
        .map_err(|e| KonspektError::TranscriptFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Strip subtitle plumbing from a transcript: time-range lines
/// (`HH:MM:SS --> HH:MM:SS`), pure-index lines, and blank lines.
/// Remaining lines keep their order, trimmed, joined by newlines.
pub fn normalize(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| {
            !line.contains("-->")
                && !line.is_empty()
                && !line.chars().all(|c| c.is_ascii_digit())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse `HH:MM:SS` into an absolute second offset.
pub fn timestamp_to_seconds(timestamp: &str) -> Result<u64> {
    let parts: Vec<&str> = timestamp.split(':').collect();
    let [h, m, s] = parts.as_slice() else {
        return Err(KonspektError::BadTimestamp(timestamp.to_string()));
    };
    let parse = |v: &str| {
        v.parse::<u64>()
            .map_err(|_| KonspektError::BadTimestamp(timestamp.to_string()))
    };
    Ok(parse(h)? * 3600 + parse(m)? * 60 + parse(s)?)
}
