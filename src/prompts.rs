//! Prompt metadata contract between the pipeline and the prompt manager.
//!
//! The pipeline consumes `(system text, user text, token budget, stop
//! sequences)` tuples per feature; the embedding application owns the
//! actual wording. [`StaticPromptSource`] ships minimal wording so the
//! crate works in tests and without a dedicated prompt manager.

use crate::pipeline::gateway::{FeatureKind, PromptRequest};

/// Per-feature invocation metadata: token budget and stop sequences.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptProfile {
    pub feature: FeatureKind,
    pub max_tokens: u32,
    pub stop_sequences: Vec<String>,
}

impl PromptProfile {
    /// Fixed metadata table per feature kind.
    pub fn for_feature(feature: FeatureKind) -> Self {
        let max_tokens = match feature {
            FeatureKind::Explain => 1024,
            FeatureKind::Roadmap => 1536,
            FeatureKind::Rewrite => 2048,
            FeatureKind::DocumentChunk => 512,
            FeatureKind::DocumentFinal => 1024,
        };
        Self {
            feature,
            max_tokens,
            stop_sequences: Vec::new(),
        }
    }
}

/// Supplies `PromptRequest`-shaped data per feature kind.
///
/// Implemented by the embedding application's prompt manager; the
/// pipeline never constructs wording on its own beyond the built-in
/// default below.
pub trait PromptSource: Send + Sync {
    /// Build the request for one feature over the given input payload.
    fn request(&self, feature: FeatureKind, input: &str) -> PromptRequest;

    /// Build a corrective re-prompt after unparseable model output.
    fn corrective(&self, feature: FeatureKind, previous_reply: &str) -> PromptRequest;
}

/// Minimal built-in prompt source.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticPromptSource;

impl StaticPromptSource {
    pub fn new() -> Self {
        Self
    }

    fn system_text(feature: FeatureKind) -> &'static str {
        match feature {
            FeatureKind::Explain => {
                "Explain the given topic. Respond with one JSON object with keys \
                 explanation (string), examples (array of exactly 3 strings) and \
                 confidence (0 to 1)."
            }
            FeatureKind::Roadmap => {
                "Produce a learning roadmap for the given material. Respond with one \
                 JSON object with keys title (string), weeks (array of objects with \
                 week, focus, tasks) and confidence (0 to 1)."
            }
            FeatureKind::Rewrite => {
                "Rewrite the given text clearly. Respond with one JSON object with \
                 keys rewritten (string), notes (array of strings) and confidence \
                 (0 to 1)."
            }
            FeatureKind::DocumentChunk => {
                "Summarize this section of a larger document. Respond with one JSON \
                 object with keys chunk_summary (string), chunk_action_items (array \
                 of strings) and chunk_keywords (array of strings)."
            }
            FeatureKind::DocumentFinal => {
                "Synthesize a final document summary. Respond with one JSON object \
                 with keys summary (string), highlights (array of strings), \
                 action_items (array of strings), keywords (array of strings) and \
                 confidence (0 to 1)."
            }
        }
    }
}

/// Cap on how much of a failed reply is echoed back in a corrective
/// re-prompt.
const CORRECTIVE_ECHO_CHARS: usize = 2000;

impl PromptSource for StaticPromptSource {
    fn request(&self, feature: FeatureKind, input: &str) -> PromptRequest {
        let profile = PromptProfile::for_feature(feature);
        PromptRequest {
            feature,
            system_text: Self::system_text(feature).to_string(),
            user_text: input.to_string(),
            max_tokens: profile.max_tokens,
            stop_sequences: profile.stop_sequences,
        }
    }

    fn corrective(&self, feature: FeatureKind, previous_reply: &str) -> PromptRequest {
        let profile = PromptProfile::for_feature(feature);
        let echo: String = previous_reply.chars().take(CORRECTIVE_ECHO_CHARS).collect();
        PromptRequest {
            feature,
            system_text: "Your previous reply was not valid JSON. Respond again with \
                          exactly one valid JSON object and nothing else."
                .to_string(),
            user_text: echo,
            max_tokens: profile.max_tokens,
            stop_sequences: profile.stop_sequences,
        }
    }
}
