use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Token counts reported by one generation call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Per-invocation token accounting. Every generation-calling stage
/// reports here once per call; the accumulator is created fresh for
/// each pipeline run and threaded through by mutable reference, so
/// concurrent runs cannot contaminate each other's totals.
#[derive(Debug, Default)]
pub struct UsageAccumulator {
    total_input: u64,
    total_output: u64,
    steps: BTreeMap<String, TokenUsage>,
}

impl UsageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one call's usage. Totals accumulate across repeated calls
    /// to the same step; the per-step record keeps the last report.
    pub fn record(&mut self, step: &str, usage: TokenUsage) {
        self.total_input += usage.input_tokens;
        self.total_output += usage.output_tokens;
        self.steps.insert(step.to_string(), usage);
        tracing::info!(
            step,
            input = usage.input_tokens,
            output = usage.output_tokens,
            "token usage"
        );
    }

    pub fn summary(&self) -> UsageSummary {
        UsageSummary {
            total_input_tokens: self.total_input,
            total_output_tokens: self.total_output,
            steps: self.steps.clone(),
        }
    }
}

/// Read-only view of a run's accounting, returned with the artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageSummary {
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub steps: BTreeMap<String, TokenUsage>,
}
