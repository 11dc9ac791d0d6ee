//! Explanation generator: asks the LLM for a short rationale and never fails.

use std::sync::Arc;

use super::llm::{CompletionRequest, LlmClient};
use super::types::{Explanation, Label};

/// Below this many characters the subject is too noisy to explain.
pub const MIN_EXPLAIN_CHARS: usize = 50;
/// Subject text sent to the LLM is capped at this many characters.
pub const PROMPT_SUBJECT_CHARS: usize = 1000;

pub const TOO_SHORT_TEXT: &str = "Text too short for detailed analysis.";
pub const UNAVAILABLE_TEXT: &str = "Analysis unavailable at the moment.";

const SYSTEM_PROMPT: &str = "You are a helpful and concise fact-checking assistant.";

/// Sampling tuned for a short, two-sentence answer.
const TEMPERATURE: f32 = 0.5;
const MAX_OUTPUT_TOKENS: u32 = 100;

pub struct ExplanationGenerator {
    llm: Arc<dyn LlmClient>,
}

impl ExplanationGenerator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Explain a verdict. Internal failures come back as a degraded explanation.
    pub async fn explain(&self, subject_text: &str, label: Label, confidence: f64) -> Explanation {
        if subject_text.chars().count() < MIN_EXPLAIN_CHARS {
            return Explanation::fallback(TOO_SHORT_TEXT);
        }

        let prompt = build_prompt(subject_text, label, confidence);
        let request = CompletionRequest {
            system: SYSTEM_PROMPT,
            prompt: &prompt,
            temperature: TEMPERATURE,
            max_tokens: MAX_OUTPUT_TOKENS,
        };

        match self.llm.complete(&request).await {
            Ok(text) if !text.trim().is_empty() => Explanation::generated(text.trim().to_string()),
            Ok(_) => {
                tracing::warn!("LLM returned an empty explanation; using fallback");
                Explanation::fallback(UNAVAILABLE_TEXT)
            }
            Err(e) => {
                tracing::warn!(error = %e, "LLM explanation failed; using fallback");
                Explanation::fallback(UNAVAILABLE_TEXT)
            }
        }
    }
}

/// Build the fact-checker prompt from a bounded slice of the subject.
pub fn build_prompt(subject_text: &str, label: Label, confidence: f64) -> String {
    let snippet: String = subject_text.chars().take(PROMPT_SUBJECT_CHARS).collect();
    format!(
        "Analyze this news snippet: \"{snippet}\"\n\n\
         Our automated system flagged this as {label} with {confidence:.2}% confidence.\n\n\
         Provide a 2-sentence explanation of why this might be {label}.\n\
         - If Real: mention why it sounds credible (neutral tone, specific details).\n\
         - If Fake: point out sensationalism, lack of sources, or logical errors.\n\
         - Do not mention being an AI. Just give the analysis."
    )
}
