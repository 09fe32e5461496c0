use crate::client::CompletionClient;
use crate::types::{Fallback, RelevanceResult};
use crate::usage::UsageAccumulator;

const RELEVANCE_PROMPT: &str = "Is this frame a relevant and complete diagram, graph, \
illustration or plot for educational notes? Respond with JSON: \
{\"relevant\": true/false, \"score\": 0-1, \"reason\": \"...\"}";

/// Judge one candidate frame with the vision capability. Never fails:
/// a capability or parse error degrades to the not-relevant default and
/// the frame is simply dropped by the acceptance filter.
pub async fn analyze_frame_relevance(
    client: &dyn CompletionClient,
    jpeg: &[u8],
    usage: &mut UsageAccumulator,
) -> Fallback<RelevanceResult> {
    let completion = match client.complete_vision(RELEVANCE_PROMPT, jpeg).await {
        Ok(completion) => completion,
        Err(err) => {
            tracing::warn!(error = %err, "frame relevance call failed");
            return Fallback::degraded(RelevanceResult::not_relevant(), err.to_string());
        }
    };

    usage.record("frame_analysis", completion.usage);

    match parse_relevance(&completion.text) {
        Some(result) => {
            tracing::info!(
                relevant = result.relevant,
                score = result.score,
                "frame relevance judged"
            );
            Fallback::Full(result)
        }
        None => {
            tracing::warn!("frame relevance response was not a JSON object");
            Fallback::degraded(
                RelevanceResult::not_relevant(),
                "unparseable relevance verdict".to_string(),
            )
        }
    }
}

/// Extract the substring between the first `{` and the last `}` and
/// parse it as a relevance verdict.
fn parse_relevance(text: &str) -> Option<RelevanceResult> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// Acceptance filter: relevant and strictly above the 0.6 threshold.
pub fn retains_diagram(analysis: &RelevanceResult) -> bool {
    analysis.relevant && analysis.score > 0.6
}
