use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KonspektError {
    #[error("Transcript read failed for {path}: {reason}")]
    TranscriptFailed { path: PathBuf, reason: String },

    #[error("Could not open video {path}: {reason}")]
    VideoOpenFailed { path: PathBuf, reason: String },

    #[error("Completion request failed (status {status:?}): {message}")]
    CompletionFailed {
        status: Option<u16>,
        message: String,
        retry_after: Option<u64>,
    },

    #[error("Quiz generation failed: {reason}")]
    QuizFailed { reason: String },

    #[error("Invalid timestamp: {0}")]
    BadTimestamp(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("Missing API key: {env_var} environment variable is not set")]
    MissingApiKey { env_var: String },
}

impl KonspektError {
    /// Rate-limit detection used by the retry policy: an explicit 429
    /// status or a message that names the condition.
    pub fn is_rate_limit(&self) -> bool {
        match self {
            KonspektError::CompletionFailed {
                status, message, ..
            } => {
                if *status == Some(429) {
                    return true;
                }
                let msg = message.to_lowercase();
                msg.contains("429")
                    || msg.contains("too many requests")
                    || msg.contains("rate limit")
            }
            _ => false,
        }
    }

    /// Server-suggested wait in seconds, when the error payload carried one.
    pub fn retry_after_hint(&self) -> Option<u64> {
        match self {
            KonspektError::CompletionFailed { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, KonspektError>;
