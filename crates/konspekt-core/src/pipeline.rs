use std::path::{Path, PathBuf};

use tokio::fs;

use crate::client::CompletionClient;
use crate::error::Result;
use crate::frames::extract_diagrams;
use crate::markdown::assemble_markdown;
use crate::outline::{enrich_outline, generate_outline};
use crate::quiz::generate_quiz;
use crate::references::extract_diagram_references;
use crate::transcript::{load_transcript, normalize};
use crate::types::{Fallback, Quiz};
use crate::usage::{UsageAccumulator, UsageSummary};

/// Result of a notes run: the written artifact, the run's token
/// accounting, and the causes of any stages that degraded instead of
/// producing their full output.
#[derive(Debug)]
pub struct NotesOutcome {
    pub output_path: PathBuf,
    pub usage: UsageSummary,
    pub degradations: Vec<String>,
}

#[derive(Debug)]
pub struct QuizOutcome {
    pub output_path: PathBuf,
    pub quiz: Quiz,
    pub usage: UsageSummary,
}

fn note_degradation<T>(degradations: &mut Vec<String>, step: &str, result: &Fallback<T>) {
    if let Some(cause) = result.cause() {
        degradations.push(format!("{step}: {cause}"));
    }
}

/// Notes pipeline: transcript + video in, markdown notes with embedded
/// diagrams out. Generation stages degrade and continue; an unreadable
/// transcript, an unopenable video, or a write failure is fatal.
/// Diagram frames land under `Frames/` next to the output file.
pub async fn generate_notes(
    client: &dyn CompletionClient,
    transcript_path: &Path,
    video_path: &Path,
    output_md: &Path,
) -> Result<NotesOutcome> {
    tracing::info!(
        transcript = %transcript_path.display(),
        video = %video_path.display(),
        "running notes pipeline"
    );

    let mut usage = UsageAccumulator::new();
    let mut degradations = Vec::new();

    let raw_transcript = load_transcript(transcript_path).await?;
    let normalized = normalize(&raw_transcript);
    tracing::debug!(lines = normalized.lines().count(), "transcript normalized");

    // The generation prompts consume the raw transcript: the reference
    // extractor needs the timestamp lines normalization strips.
    let outline = generate_outline(client, &raw_transcript, &mut usage).await;
    note_degradation(&mut degradations, "outline_generation", &outline);

    let references = extract_diagram_references(client, &raw_transcript, &mut usage).await;
    note_degradation(&mut degradations, "diagram_references", &references);

    let frames_dir = output_md.parent().unwrap_or(Path::new(".")).join("Frames");
    let diagrams = extract_diagrams(
        client,
        video_path,
        references.value(),
        &frames_dir,
        &mut usage,
    )
    .await?;

    let enriched = enrich_outline(client, outline.value(), &diagrams, &mut usage).await;
    note_degradation(&mut degradations, "content_enrichment", &enriched);

    let output_path = assemble_markdown(enriched.value(), &diagrams, output_md).await?;

    let summary = usage.summary();
    tracing::info!(
        total_input = summary.total_input_tokens,
        total_output = summary.total_output_tokens,
        "notes pipeline completed"
    );

    Ok(NotesOutcome {
        output_path,
        usage: summary,
        degradations,
    })
}

/// Quiz pipeline: transcript in, `{"questions": [...]}` JSON out. The
/// quiz has no safe degraded form, so generation and parse failures are
/// fatal after the retry budget is spent.
pub async fn generate_quiz_file(
    client: &dyn CompletionClient,
    transcript_path: &Path,
    output_json: &Path,
) -> Result<QuizOutcome> {
    tracing::info!(transcript = %transcript_path.display(), "running quiz pipeline");

    let mut usage = UsageAccumulator::new();

    let raw_transcript = load_transcript(transcript_path).await?;
    let normalized = normalize(&raw_transcript);

    let quiz = generate_quiz(client, &normalized, &mut usage).await?;

    if let Some(parent) = output_json.parent() {
        fs::create_dir_all(parent).await?;
    }
    let pretty_json = serde_json::to_string_pretty(&quiz)?;
    fs::write(output_json, &pretty_json).await?;

    let summary = usage.summary();
    tracing::info!(
        questions = quiz.questions.len(),
        total_input = summary.total_input_tokens,
        total_output = summary.total_output_tokens,
        "quiz pipeline completed"
    );

    Ok(QuizOutcome {
        output_path: output_json.to_path_buf(),
        quiz,
        usage: summary,
    })
}
