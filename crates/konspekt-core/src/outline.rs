use crate::client::CompletionClient;
use crate::types::{Diagram, Fallback};
use crate::usage::UsageAccumulator;

const OUTLINE_PROMPT: &str = "\
Analyze the provided transcript and create a detailed educational outline of the content.
Using the Transcript, identify the core main topics, subtopics, and technical concepts.
Your analysis should focus on:
1. Main themes and concepts
2. Indepth explanation and examples
3. Logical flow of information
4. Key points and supporting details
5. Any references to diagrams or visual aids
6. Contextual information that enhances understanding
7. Any other relevant details that can aid in creating educational notes
8. Formulas and Technical Knowledge";

/// Generate the first-pass outline from the raw transcript. Failure
/// degrades to an empty outline; enrichment tolerates that.
pub async fn generate_outline(
    client: &dyn CompletionClient,
    raw_transcript: &str,
    usage: &mut UsageAccumulator,
) -> Fallback<String> {
    match client.complete_text(OUTLINE_PROMPT, raw_transcript).await {
        Ok(completion) => {
            usage.record("outline_generation", completion.usage);
            tracing::info!("outline generated");
            Fallback::Full(completion.text)
        }
        Err(err) => {
            tracing::warn!(error = %err, "outline generation failed");
            Fallback::degraded(String::new(), err.to_string())
        }
    }
}

const ENRICHMENT_SYSTEM_PROMPT: &str = "You are an expert in educational content creation \
with a focus on clarity, structure, and effective use of visual aids.";

fn enrichment_prompt(outline: &str, diagrams: &[Diagram]) -> String {
    let diagram_descriptions = diagrams
        .iter()
        .map(|d| format!("Timestamp: {}, Description: {}", d.timestamp, d.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are given:
1. A detailed lecture outline extracted from an academic transcript.
2. A list of relevant diagrams, each with a timestamp and a description generated from a vision-language model.

Your task is to convert the outline into **detailed, natural, and highly readable lecture notes** designed for students.

Here's what you must do:

- **Elaborate on each outline point** using full sentences, explanations, and examples. Ensure the tone is approachable but academically precise.
- **Integrate diagrams meaningfully** by:
- Inserting a placeholder like `See Figure: <timestamp>` exactly where each diagram logically fits in the explanation.
- Writing a **caption** for each diagram using its description, tailored to reinforce the explanation above.
- If a diagram relates to a technical concept or formula, **expand on that concept** using your understanding of the visual content.
- Where appropriate, include **LaTeX-formatted equations** to make mathematical parts clearer.
- Ensure the final output is in well-structured **Markdown format**, with:
- Headings and subheadings preserved and improved
- Bullet points or numbered lists where helpful
- Clear and informative image references

Your goal is to create polished lecture notes that:
- **Read naturally** like what a top-tier educator would hand out
- **Explain concepts clearly**
- **Integrate visuals in context**, not as afterthoughts

Outline -
{outline}

Diagrams-
{diagram_descriptions}"#
    )
}

/// Rewrite the outline into full lecture notes with `See Figure:`
/// placeholders. Failure degrades to the original, un-enriched outline.
pub async fn enrich_outline(
    client: &dyn CompletionClient,
    outline: &str,
    diagrams: &[Diagram],
    usage: &mut UsageAccumulator,
) -> Fallback<String> {
    let prompt = enrichment_prompt(outline, diagrams);
    match client.complete_text(ENRICHMENT_SYSTEM_PROMPT, &prompt).await {
        Ok(completion) => {
            usage.record("content_enrichment", completion.usage);
            tracing::info!("outline enriched with diagrams");
            Fallback::Full(strip_markdown_fence(&completion.text))
        }
        Err(err) => {
            tracing::warn!(error = %err, "outline enrichment failed, keeping plain outline");
            Fallback::degraded(outline.to_string(), err.to_string())
        }
    }
}

/// Drop a wrapping ```markdown fence when the model added one.
fn strip_markdown_fence(content: &str) -> String {
    let mut content = content.trim();
    if let Some(stripped) = content.strip_prefix("```markdown") {
        content = stripped.trim();
    }
    if let Some(stripped) = content.strip_suffix("```") {
        content = stripped.trim();
    }
    content.to_string()
}
