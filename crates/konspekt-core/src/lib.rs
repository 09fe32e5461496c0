//! Konspekt Core Library
//!
//! Turns recorded lectures into study artifacts: enriched markdown
//! notes with diagrams pulled from the lecture video, or a structured
//! multiple-choice quiz, both generated through a pluggable
//! chat-completion capability.

pub mod client;
pub mod error;
pub mod frames;
pub mod markdown;
pub mod outline;
pub mod pipeline;
pub mod quiz;
pub mod references;
pub mod relevance;
pub mod retry;
pub mod transcript;
pub mod types;
pub mod usage;

// Re-export commonly used items at crate root
pub use client::{Completion, CompletionClient, HttpCompletionClient, Provider, ProviderConfig};
pub use error::{KonspektError, Result};
pub use pipeline::{NotesOutcome, QuizOutcome, generate_notes, generate_quiz_file};
pub use retry::RetryPolicy;
pub use types::{Diagram, DiagramReference, Fallback, Question, Quiz, RelevanceResult};
pub use usage::{TokenUsage, UsageAccumulator, UsageSummary};
