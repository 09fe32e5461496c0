//! End-to-end pipeline tests against a canned-response completion
//! client, so nothing here touches the network.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use serde_json::json;

use konspekt_core::usage::UsageAccumulator;
use konspekt_core::{
    Completion, CompletionClient, KonspektError, Quiz, Result, TokenUsage, generate_notes,
    generate_quiz_file,
};

/// Test double: hands out scripted responses in order, one queue per
/// capability, and remembers the prompts it was called with.
#[derive(Default)]
struct StubClient {
    text_responses: Mutex<VecDeque<Result<Completion>>>,
    structured_responses: Mutex<VecDeque<Result<Completion>>>,
    structured_calls: AtomicU32,
    seen_user_prompts: Mutex<Vec<String>>,
}

impl StubClient {
    fn push_text(&self, text: &str) {
        self.text_responses
            .lock()
            .unwrap()
            .push_back(Ok(Completion {
                text: text.to_string(),
                usage: TokenUsage::new(100, 50),
            }));
    }

    fn push_structured(&self, response: Result<Completion>) {
        self.structured_responses
            .lock()
            .unwrap()
            .push_back(response);
    }
}

#[async_trait]
impl CompletionClient for StubClient {
    async fn complete_text(&self, _system: &str, user: &str) -> Result<Completion> {
        self.seen_user_prompts
            .lock()
            .unwrap()
            .push(user.to_string());
        self.text_responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected text completion call")
    }

    async fn complete_vision(&self, _prompt: &str, _jpeg: &[u8]) -> Result<Completion> {
        panic!("no vision calls expected in these scenarios");
    }

    async fn complete_structured(
        &self,
        _system: &str,
        user: &str,
        _schema: serde_json::Value,
    ) -> Result<Completion> {
        self.structured_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_user_prompts
            .lock()
            .unwrap()
            .push(user.to_string());
        self.structured_responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected structured completion call")
    }
}

fn ten_question_payload() -> String {
    let question = json!({
        "question": "What process does the diagram describe?",
        "options": ["Mitosis", "Meiosis", "Osmosis", "Diffusion"],
        "correct_option": "Mitosis",
        "explanation": "The transcript introduces a diagram on mitosis.",
        "bloom_level": "Remember",
        "time_stamp": "00:00:01"
    });
    json!({ "questions": vec![question; 10] }).to_string()
}

fn rate_limited() -> KonspektError {
    KonspektError::CompletionFailed {
        status: Some(429),
        message: "too many requests".to_string(),
        retry_after: None,
    }
}

const SUBTITLE_TRANSCRIPT: &str = "1\n00:00:01 --> 00:00:02\nSee the diagram on mitosis\n";

#[tokio::test]
async fn quiz_pipeline_writes_ten_question_json() {
    let dir = tempfile::tempdir().unwrap();
    let transcript_path = dir.path().join("lecture.txt");
    std::fs::write(&transcript_path, SUBTITLE_TRANSCRIPT).unwrap();
    let output_path = dir.path().join("quiz").join("lecture_quiz.json");

    let client = StubClient::default();
    client.push_structured(Ok(Completion {
        text: ten_question_payload(),
        usage: TokenUsage::new(800, 600),
    }));

    let outcome = generate_quiz_file(&client, &transcript_path, &output_path)
        .await
        .unwrap();

    // The generator saw the normalized transcript, not the subtitles.
    let prompts = client.seen_user_prompts.lock().unwrap();
    assert_eq!(prompts.as_slice(), ["See the diagram on mitosis"]);

    let written: Quiz =
        serde_json::from_str(&std::fs::read_to_string(&outcome.output_path).unwrap()).unwrap();
    assert_eq!(written.questions.len(), 10);
    assert_eq!(written.questions[0].options.len(), 4);
    assert_eq!(outcome.usage.steps["quiz_generation"], TokenUsage::new(800, 600));
}

#[tokio::test]
async fn malformed_quiz_response_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let transcript_path = dir.path().join("lecture.txt");
    std::fs::write(&transcript_path, SUBTITLE_TRANSCRIPT).unwrap();

    let client = StubClient::default();
    client.push_structured(Ok(Completion {
        text: "this is prose, not a quiz".to_string(),
        usage: TokenUsage::new(10, 10),
    }));

    let err = generate_quiz_file(&client, &transcript_path, &dir.path().join("quiz.json"))
        .await
        .unwrap_err();
    assert!(matches!(err, KonspektError::QuizFailed { .. }));
}

#[tokio::test(start_paused = true)]
async fn quiz_generation_retries_through_rate_limits() {
    let client = StubClient::default();
    client.push_structured(Err(rate_limited()));
    client.push_structured(Err(rate_limited()));
    client.push_structured(Ok(Completion {
        text: ten_question_payload(),
        usage: TokenUsage::new(800, 600),
    }));

    let mut usage = UsageAccumulator::new();
    let quiz = konspekt_core::quiz::generate_quiz(&client, "See the diagram on mitosis", &mut usage)
        .await
        .unwrap();

    assert_eq!(quiz.questions.len(), 10);
    assert_eq!(client.structured_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn missing_transcript_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let client = StubClient::default();
    let err = generate_quiz_file(
        &client,
        &dir.path().join("missing.txt"),
        &dir.path().join("quiz.json"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, KonspektError::TranscriptFailed { .. }));
}

#[tokio::test]
async fn notes_pipeline_degrades_without_diagrams() {
    let dir = tempfile::tempdir().unwrap();
    let transcript_path = dir.path().join("lecture.txt");
    std::fs::write(&transcript_path, SUBTITLE_TRANSCRIPT).unwrap();
    let output_path = dir.path().join("notes").join("lecture.md");

    let client = StubClient::default();
    // Outline call succeeds.
    client.push_text("## Mitosis\nAn overview of cell division.");
    // Reference extraction returns prose with no JSON list -> degrades
    // to no references, so the video is never opened.
    client.push_text("I could not find any diagram mentions.");
    // Enrichment succeeds, with a placeholder no diagram backs.
    client.push_text(
        "```markdown\n## Mitosis\nCells divide in phases. See Figure: 00:00:01\n### Phases\nProphase first.\n```",
    );

    let outcome = generate_notes(
        &client,
        &transcript_path,
        &dir.path().join("nonexistent.mp4"),
        &output_path,
    )
    .await
    .unwrap();

    let written = std::fs::read_to_string(&outcome.output_path).unwrap();
    assert!(written.starts_with("# Table of Contents"));
    assert!(written.contains("- [Mitosis](#mitosis)"));
    assert!(written.contains("  - [Phases](#phases)"));
    // Unbacked placeholder survives untouched; the fence is stripped.
    assert!(written.contains("See Figure: 00:00:01"));
    assert!(!written.contains("```"));

    assert_eq!(outcome.degradations.len(), 1);
    assert!(outcome.degradations[0].starts_with("diagram_references:"));

    // Outline, references, and enrichment each reported usage.
    assert_eq!(outcome.usage.total_input_tokens, 300);
    assert_eq!(outcome.usage.total_output_tokens, 150);
}

#[tokio::test]
async fn bad_reference_timestamp_degrades_extraction_to_no_diagrams() {
    let dir = tempfile::tempdir().unwrap();
    let transcript_path = dir.path().join("lecture.txt");
    std::fs::write(&transcript_path, SUBTITLE_TRANSCRIPT).unwrap();
    let output_path = dir.path().join("lecture.md");

    let client = StubClient::default();
    client.push_text("## Mitosis\nOutline.");
    // A single malformed timestamp poisons the whole reference list,
    // so no diagrams are attempted and the video stays unopened.
    client.push_text(
        r#"[{"timestamp": "00:00:01", "context": "a"}, {"timestamp": "near the end", "context": "b"}]"#,
    );
    client.push_text("## Mitosis\nNotes without figures.");

    let outcome = generate_notes(
        &client,
        &transcript_path,
        &dir.path().join("nonexistent.mp4"),
        &output_path,
    )
    .await
    .unwrap();

    assert_eq!(outcome.degradations.len(), 1);
    assert!(outcome.degradations[0].starts_with("diagram_references:"));
    assert!(outcome.output_path.exists());
}

#[tokio::test]
async fn notes_pipeline_fails_on_unopenable_video_when_references_exist() {
    let dir = tempfile::tempdir().unwrap();
    let transcript_path = dir.path().join("lecture.txt");
    std::fs::write(&transcript_path, SUBTITLE_TRANSCRIPT).unwrap();

    let client = StubClient::default();
    client.push_text("## Mitosis\nOutline.");
    client.push_text(r#"[{"timestamp": "00:00:01", "context": "diagram on mitosis"}]"#);

    let err = generate_notes(
        &client,
        &transcript_path,
        &dir.path().join("nonexistent.mp4"),
        &dir.path().join("lecture.md"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, KonspektError::VideoOpenFailed { .. }));
}
