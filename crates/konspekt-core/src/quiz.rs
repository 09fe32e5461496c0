use serde_json::{Value, json};

use crate::client::CompletionClient;
use crate::error::{KonspektError, Result};
use crate::retry::RetryPolicy;
use crate::types::Quiz;
use crate::usage::UsageAccumulator;

const QUIZ_SYSTEM_PROMPT: &str = "\
You are an educational assessment designer. Generate a multiple-choice quiz from the lecture transcript you are given.

Requirements:
- Exactly 10 questions.
- Questions must span Bloom's Taxonomy levels, from recall up to analysis and evaluation.
- Each question has exactly 4 plausible options, one correct_option that is copied verbatim from the options list, a brief explanation, a bloom_level, and a time_stamp (HH:MM:SS) pointing to where the transcript discusses the answer.
- Every question must be answerable from the transcript content alone. Do NOT fabricate facts or ask about anything not present in the transcript.
- Do NOT reference the professor, assignments, or recorded sessions in any question.";

fn quiz_schema() -> Value {
    json!({
        "name": "quiz",
        "strict": true,
        "schema": {
            "type": "object",
            "properties": {
                "questions": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "question": { "type": "string" },
                            "options": {
                                "type": "array",
                                "items": { "type": "string" }
                            },
                            "correct_option": { "type": "string" },
                            "explanation": { "type": "string" },
                            "bloom_level": { "type": "string" },
                            "time_stamp": { "type": "string" }
                        },
                        "required": [
                            "question",
                            "options",
                            "correct_option",
                            "explanation",
                            "bloom_level",
                            "time_stamp"
                        ],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["questions"],
            "additionalProperties": false
        }
    })
}

/// Generate the quiz through the retry policy. Unlike the notes
/// pipeline there is no degraded form here: a quiz that does not parse
/// or violates the shape contract is fatal.
pub async fn generate_quiz(
    client: &dyn CompletionClient,
    normalized_transcript: &str,
    usage: &mut UsageAccumulator,
) -> Result<Quiz> {
    let policy = RetryPolicy::default();
    let completion = policy
        .run(
            || client.complete_structured(QUIZ_SYSTEM_PROMPT, normalized_transcript, quiz_schema()),
            KonspektError::is_rate_limit,
        )
        .await?;

    usage.record("quiz_generation", completion.usage);

    let quiz: Quiz =
        serde_json::from_str(&completion.text).map_err(|e| KonspektError::QuizFailed {
            reason: format!("quiz response did not parse: {e}"),
        })?;
    validate_quiz(&quiz)?;
    Ok(quiz)
}

/// Shape contract: exactly 10 questions, 4 options each, correct option
/// drawn from its own options list.
pub fn validate_quiz(quiz: &Quiz) -> Result<()> {
    if quiz.questions.len() != 10 {
        return Err(KonspektError::QuizFailed {
            reason: format!("expected 10 questions, got {}", quiz.questions.len()),
        });
    }
    for (i, question) in quiz.questions.iter().enumerate() {
        if question.options.len() != 4 {
            return Err(KonspektError::QuizFailed {
                reason: format!(
                    "question {} has {} options, expected 4",
                    i + 1,
                    question.options.len()
                ),
            });
        }
        if !question.options.contains(&question.correct_option) {
            return Err(KonspektError::QuizFailed {
                reason: format!("question {} correct_option is not among its options", i + 1),
            });
        }
    }
    Ok(())
}
