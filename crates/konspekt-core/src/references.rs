use crate::client::CompletionClient;
use crate::error::Result;
use crate::transcript::timestamp_to_seconds;
use crate::types::{DiagramReference, Fallback};
use crate::usage::UsageAccumulator;

const EXTRACTION_PROMPT: &str = "Analyze the transcript to identify all mentions of relevant \
educational diagrams or visual aids. Identify mentions of diagrams or visual aids with their \
timestamps in the transcript. Respond with a JSON list: \
[{\"timestamp\": \"HH:MM:SS\", \"context\": \"text near mention\"}]";

/// Ask the model for every diagram mention in the raw transcript, then
/// merge mentions that fall within five seconds of each other. Any
/// capability or parse failure degrades to an empty list; downstream
/// stages simply see no diagrams.
pub async fn extract_diagram_references(
    client: &dyn CompletionClient,
    raw_transcript: &str,
    usage: &mut UsageAccumulator,
) -> Fallback<Vec<DiagramReference>> {
    let completion = match client.complete_text(EXTRACTION_PROMPT, raw_transcript).await {
        Ok(completion) => completion,
        Err(err) => {
            tracing::warn!(error = %err, "diagram reference extraction failed");
            return Fallback::degraded(Vec::new(), err.to_string());
        }
    };

    usage.record("diagram_references", completion.usage);

    let Some(references) = parse_reference_list(&completion.text) else {
        tracing::warn!("diagram reference response was not a JSON list");
        return Fallback::degraded(Vec::new(), "unparseable reference list".to_string());
    };
    tracing::info!(count = references.len(), "found diagram references");

    match group_references(references) {
        Ok(grouped) => Fallback::Full(grouped),
        Err(err) => {
            tracing::warn!(error = %err, "diagram reference grouping failed");
            Fallback::degraded(Vec::new(), err.to_string())
        }
    }
}

/// Extract the substring between the first `[` and the last `]` and
/// parse it as a reference list.
fn parse_reference_list(text: &str) -> Option<Vec<DiagramReference>> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// Single left-to-right pass with one accumulator: a reference within
/// five seconds of the accumulator joins it (contexts space-joined in
/// encounter order); anything further flushes the accumulator and
/// starts a new one. Not a pairwise clustering. A timestamp that does
/// not parse fails the whole pass; the caller degrades the entire
/// extraction to an empty list.
pub fn group_references(references: Vec<DiagramReference>) -> Result<Vec<DiagramReference>> {
    let mut grouped: Vec<DiagramReference> = Vec::new();
    let mut current: Option<DiagramReference> = None;

    for reference in references {
        let seconds = timestamp_to_seconds(&reference.timestamp)?;

        let Some(prev) = current.as_mut() else {
            current = Some(reference);
            continue;
        };

        let prev_seconds = timestamp_to_seconds(&prev.timestamp)?;
        if prev_seconds.abs_diff(seconds) <= 5 {
            prev.context.push(' ');
            prev.context.push_str(&reference.context);
        } else {
            grouped.push(current.take().unwrap());
            current = Some(reference);
        }
    }

    if let Some(last) = current {
        grouped.push(last);
    }
    Ok(grouped)
}
