//! Summarization strategies: one-call direct for small documents,
//! chunked map-reduce for everything else.
//!
//! Map failures are absorbed into well-formed placeholders so one bad
//! chunk cannot fail a document; a failed reduce falls back to synthesis
//! from chunk-level data. Only a document that yields nothing at all
//! fails the operation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::pipeline::gateway::{approx_token_count, Completion, FeatureKind, Gateway};
use crate::pipeline::recovery::{
    self, ChunkDigest, DocumentSummary, FeatureOutput, DEFAULT_CONFIDENCE,
};
use crate::prompts::PromptSource;

use super::chunker::{chunk_text, Chunk};
use super::SummarizeError;

/// Strategy tuning, normally built from `PipelineConfig`.
#[derive(Debug, Clone)]
pub struct SummarizeOptions {
    pub direct_threshold_tokens: usize,
    pub chunk_max_tokens: usize,
    pub chunk_overlap_tokens: usize,
    pub inter_chunk_delay: Duration,
    pub max_parse_retries: u32,
    pub max_input_chars: usize,
    /// Reduce-prep cap on deduplicated action items.
    pub action_item_cap: usize,
    /// Reduce-prep cap on deduplicated keywords.
    pub keyword_cap: usize,
    /// Chunk summaries promoted to highlights by fallback synthesis.
    pub fallback_highlights: usize,
}

impl Default for SummarizeOptions {
    fn default() -> Self {
        Self {
            direct_threshold_tokens: 2000,
            chunk_max_tokens: 2000,
            chunk_overlap_tokens: 100,
            inter_chunk_delay: Duration::from_millis(500),
            max_parse_retries: 2,
            max_input_chars: 400_000,
            action_item_cap: 10,
            keyword_cap: 15,
            fallback_highlights: 3,
        }
    }
}

/// Aggregated token accounting across every gateway call of one
/// operation. `estimated` is true when any contributing call was
/// estimated rather than provider-reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageTotals {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub estimated: bool,
    pub calls: u32,
}

impl UsageTotals {
    fn absorb(&mut self, completion: &Completion) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(completion.usage.prompt_tokens);
        self.completion_tokens = self
            .completion_tokens
            .saturating_add(completion.usage.completion_tokens);
        self.total_tokens = self.total_tokens.saturating_add(completion.usage.total_tokens);
        self.estimated |= completion.usage.estimated;
        self.calls += 1;
    }
}

/// Result of one summarize operation.
#[derive(Debug, Clone)]
pub struct SummarizeOutcome {
    pub document: DocumentSummary,
    pub warnings: Vec<String>,
    pub usage: UsageTotals,
    /// Chunk map calls absorbed into empty placeholders.
    pub chunk_failures: u32,
}

/// Drives the gateway and recovery engine for document summarization
/// and single-call features.
pub struct DocumentSummarizer {
    gateway: Gateway,
    prompts: Arc<dyn PromptSource>,
    options: SummarizeOptions,
}

impl DocumentSummarizer {
    pub fn new(gateway: Gateway, prompts: Arc<dyn PromptSource>, options: SummarizeOptions) -> Self {
        Self {
            gateway,
            prompts,
            options,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.gateway.provider_name()
    }

    /// Summarize a document, optionally deriving a roadmap from the
    /// final result. The returned document is already sanitized.
    pub async fn summarize(
        &self,
        text: &str,
        derive_roadmap: bool,
    ) -> Result<SummarizeOutcome, SummarizeError> {
        let input = recovery::sanitize_model_input(text, self.options.max_input_chars);
        if input.is_empty() {
            return Err(SummarizeError::NoUsableContent);
        }

        let estimated_tokens = approx_token_count(&input) as usize;
        let mut outcome = if estimated_tokens < self.options.direct_threshold_tokens {
            tracing::info!(tokens = estimated_tokens, "summarize: direct strategy");
            self.summarize_direct(&input).await?
        } else {
            tracing::info!(tokens = estimated_tokens, "summarize: chunked map-reduce strategy");
            self.summarize_chunked(&input).await?
        };

        if derive_roadmap {
            self.attach_roadmap(&mut outcome).await;
        }

        outcome.document = recovery::sanitize_output(&outcome.document);
        Ok(outcome)
    }

    /// One-shot feature execution: explain, roadmap or rewrite over a
    /// single input.
    pub async fn run_feature(
        &self,
        kind: FeatureKind,
        input: &str,
    ) -> Result<(FeatureOutput, Vec<String>), SummarizeError> {
        let cleaned = recovery::sanitize_model_input(input, self.options.max_input_chars);
        let request = self.prompts.request(kind, &cleaned);
        let completion = self.gateway.invoke(&request).await?;
        let mut usage = UsageTotals::default();
        usage.absorb(&completion);

        let Some(mut map) = self.recover_object(kind, &completion.content, &mut usage).await else {
            return Err(SummarizeError::Unrecoverable {
                attempts: self.options.max_parse_retries,
            });
        };
        recovery::normalize_confidence(&mut map);
        let (output, warnings) = recovery::validate_feature(map, kind);
        Ok((recovery::sanitize_output(&output), warnings))
    }

    // ── Direct strategy ─────────────────────────────────────────────

    async fn summarize_direct(&self, input: &str) -> Result<SummarizeOutcome, SummarizeError> {
        let mut usage = UsageTotals::default();
        let mut warnings = Vec::new();

        let request = self.prompts.request(FeatureKind::DocumentFinal, input);
        let completion = self.gateway.invoke(&request).await?;
        usage.absorb(&completion);

        let document = match self
            .recover_object(FeatureKind::DocumentFinal, &completion.content, &mut usage)
            .await
        {
            Some(mut map) => {
                recovery::normalize_confidence(&mut map);
                let (document, validation_warnings) = recovery::validate_document(&map);
                warnings.extend(validation_warnings);
                document
            }
            None => {
                warnings.push(
                    "model output unrecoverable, synthesized minimal summary from raw reply"
                        .to_string(),
                );
                fallback_from_text(&completion.content).ok_or(SummarizeError::NoUsableContent)?
            }
        };

        Ok(SummarizeOutcome {
            document,
            warnings,
            usage,
            chunk_failures: 0,
        })
    }

    // ── Chunked strategy ────────────────────────────────────────────

    async fn summarize_chunked(&self, input: &str) -> Result<SummarizeOutcome, SummarizeError> {
        let chunks = chunk_text(
            input,
            self.options.chunk_max_tokens,
            self.options.chunk_overlap_tokens,
        );
        tracing::info!(chunks = chunks.len(), "map stage starting");

        let mut usage = UsageTotals::default();
        let mut warnings = Vec::new();
        let mut digests: Vec<ChunkDigest> = Vec::with_capacity(chunks.len());
        let mut chunk_failures = 0u32;

        for chunk in &chunks {
            if chunk.index > 0 && !self.options.inter_chunk_delay.is_zero() {
                tokio::time::sleep(self.options.inter_chunk_delay).await;
            }
            match self.map_chunk(chunk, &mut usage, &mut warnings).await {
                Some(digest) => digests.push(digest),
                None => {
                    chunk_failures += 1;
                    warnings.push(format!(
                        "chunk {} produced no usable output, substituted empty digest",
                        chunk.index
                    ));
                    digests.push(ChunkDigest::empty());
                }
            }
        }

        let summaries: Vec<&str> = digests
            .iter()
            .map(|d| d.chunk_summary.as_str())
            .filter(|s| !s.trim().is_empty())
            .collect();
        let action_items = dedupe_cap(
            digests.iter().flat_map(|d| d.chunk_action_items.iter()),
            self.options.action_item_cap,
        );
        let keywords = dedupe_cap(
            digests.iter().flat_map(|d| d.chunk_keywords.iter()),
            self.options.keyword_cap,
        );

        if summaries.is_empty() && action_items.is_empty() && keywords.is_empty() {
            tracing::error!(
                chunks = chunks.len(),
                chunk_failures,
                "no chunk-level data survived the map stage"
            );
            return Err(SummarizeError::NoUsableContent);
        }

        let payload = reduce_payload(&summaries, &action_items, &keywords);
        let document = match self.reduce(&payload, &mut usage, &mut warnings).await {
            Some(document) => document,
            None => {
                warnings.push(
                    "reduce stage failed, synthesized summary from chunk-level data".to_string(),
                );
                fallback_from_chunks(
                    &summaries,
                    action_items.clone(),
                    keywords.clone(),
                    self.options.fallback_highlights,
                )
                .ok_or(SummarizeError::NoUsableContent)?
            }
        };

        Ok(SummarizeOutcome {
            document,
            warnings,
            usage,
            chunk_failures,
        })
    }

    /// Map one chunk; `None` absorbs the failure upstream.
    async fn map_chunk(
        &self,
        chunk: &Chunk,
        usage: &mut UsageTotals,
        warnings: &mut Vec<String>,
    ) -> Option<ChunkDigest> {
        let request = self.prompts.request(FeatureKind::DocumentChunk, &chunk.text);
        let completion = match self.gateway.invoke(&request).await {
            Ok(completion) => completion,
            Err(err) => {
                tracing::warn!(chunk = chunk.index, error = %err, "chunk map call failed");
                return None;
            }
        };
        usage.absorb(&completion);

        let mut map = self
            .recover_object(FeatureKind::DocumentChunk, &completion.content, usage)
            .await?;
        recovery::normalize_confidence(&mut map);
        let (digest, validation_warnings) = recovery::validate_chunk(&map);
        warnings.extend(
            validation_warnings
                .into_iter()
                .map(|w| format!("chunk {}: {w}", chunk.index)),
        );
        Some(digest)
    }

    async fn reduce(
        &self,
        payload: &str,
        usage: &mut UsageTotals,
        warnings: &mut Vec<String>,
    ) -> Option<DocumentSummary> {
        let request = self.prompts.request(FeatureKind::DocumentFinal, payload);
        let completion = match self.gateway.invoke(&request).await {
            Ok(completion) => completion,
            Err(err) => {
                tracing::warn!(error = %err, "reduce call failed");
                return None;
            }
        };
        usage.absorb(&completion);

        let mut map = self
            .recover_object(FeatureKind::DocumentFinal, &completion.content, usage)
            .await?;
        recovery::normalize_confidence(&mut map);
        let (document, validation_warnings) = recovery::validate_document(&map);
        warnings.extend(validation_warnings);
        Some(document)
    }

    /// Derive a roadmap from the final summary. Failure is logged and
    /// the document result is returned without one.
    async fn attach_roadmap(&self, outcome: &mut SummarizeOutcome) {
        let seed = format!(
            "{}\nKeywords: {}",
            outcome.document.summary,
            outcome.document.keywords.join(", ")
        );
        let request = self.prompts.request(FeatureKind::Roadmap, &seed);
        let completion = match self.gateway.invoke(&request).await {
            Ok(completion) => completion,
            Err(err) => {
                tracing::warn!(error = %err, "roadmap derivation failed, returning document without roadmap");
                return;
            }
        };
        outcome.usage.absorb(&completion);

        let Some(mut map) = self
            .recover_object(FeatureKind::Roadmap, &completion.content, &mut outcome.usage)
            .await
        else {
            tracing::warn!("roadmap output unrecoverable, returning document without roadmap");
            return;
        };
        recovery::normalize_confidence(&mut map);
        let (roadmap, validation_warnings) = recovery::validate_roadmap(&map);
        outcome.warnings.extend(validation_warnings);
        outcome.document.roadmap = Some(roadmap);
    }

    /// Recover an object from a reply, issuing bounded corrective
    /// re-prompts when the cascade fails.
    async fn recover_object(
        &self,
        feature: FeatureKind,
        first_reply: &str,
        usage: &mut UsageTotals,
    ) -> Option<Map<String, Value>> {
        match recovery::recover(first_reply) {
            Ok(map) => return Some(map),
            Err(err) => {
                tracing::warn!(feature = %feature, error = %err, "recovery failed on first reply");
            }
        }

        let mut last_reply = first_reply.to_string();
        for attempt in 1..=self.options.max_parse_retries {
            let request = self.prompts.corrective(feature, &last_reply);
            let completion = match self.gateway.invoke(&request).await {
                Ok(completion) => completion,
                Err(err) => {
                    tracing::warn!(feature = %feature, attempt, error = %err, "corrective re-prompt call failed");
                    return None;
                }
            };
            usage.absorb(&completion);
            match recovery::recover(&completion.content) {
                Ok(map) => {
                    tracing::info!(feature = %feature, attempt, "corrective re-prompt recovered valid JSON");
                    return Some(map);
                }
                Err(err) => {
                    tracing::warn!(feature = %feature, attempt, error = %err, "corrective re-prompt still unrecoverable");
                    last_reply = completion.content;
                }
            }
        }
        None
    }
}

// ──────────────────────────────────────────────
// Reduce-prep and fallback synthesis
// ──────────────────────────────────────────────

/// Case- and whitespace-insensitive dedup, bounded to `cap` entries,
/// first occurrence wins.
fn dedupe_cap<'a>(items: impl Iterator<Item = &'a String>, cap: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        let key = item.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        if key.is_empty() || !seen.insert(key) {
            continue;
        }
        out.push(item.trim().to_string());
        if out.len() == cap {
            break;
        }
    }
    out
}

/// Data payload for the reduce call: ordered chunk summaries followed by
/// the deduplicated lists.
fn reduce_payload(summaries: &[&str], action_items: &[String], keywords: &[String]) -> String {
    let mut payload = summaries.join("\n\n");
    if !action_items.is_empty() {
        payload.push_str("\n\nAction items:\n");
        for item in action_items {
            payload.push_str("- ");
            payload.push_str(item);
            payload.push('\n');
        }
    }
    if !keywords.is_empty() {
        payload.push_str("\nKeywords: ");
        payload.push_str(&keywords.join(", "));
    }
    payload
}

/// Cap on the synthesized summary length in chars.
const FALLBACK_SUMMARY_CHARS: usize = 1200;

/// Last-resort document built from chunk-level data when the reduce
/// stage fails entirely.
fn fallback_from_chunks(
    summaries: &[&str],
    action_items: Vec<String>,
    keywords: Vec<String>,
    highlight_cap: usize,
) -> Option<DocumentSummary> {
    if summaries.is_empty() && action_items.is_empty() && keywords.is_empty() {
        return None;
    }
    let highlights: Vec<String> = summaries
        .iter()
        .take(highlight_cap)
        .map(|s| s.to_string())
        .collect();
    let summary = truncate_chars(&summaries.join(" "), FALLBACK_SUMMARY_CHARS);
    Some(DocumentSummary {
        summary,
        highlights,
        action_items,
        keywords,
        confidence: DEFAULT_CONFIDENCE,
        fallback: true,
        roadmap: None,
    })
}

/// Minimal document built from a raw, unparseable model reply on the
/// direct path.
fn fallback_from_text(raw: &str) -> Option<DocumentSummary> {
    let lines: Vec<&str> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    if lines.is_empty() {
        return None;
    }
    let highlights: Vec<String> = lines
        .iter()
        .take(3)
        .map(|line| truncate_chars(line, 200))
        .collect();
    Some(DocumentSummary {
        summary: truncate_chars(&lines.join(" "), FALLBACK_SUMMARY_CHARS),
        highlights,
        action_items: Vec::new(),
        keywords: Vec::new(),
        confidence: DEFAULT_CONFIDENCE,
        fallback: true,
        roadmap: None,
    })
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(max_chars).collect();
        out.push('…');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::gateway::{GatewayError, MockProvider, RetryPolicy};
    use crate::prompts::StaticPromptSource;

    fn fast_options() -> SummarizeOptions {
        SummarizeOptions {
            inter_chunk_delay: Duration::ZERO,
            ..SummarizeOptions::default()
        }
    }

    fn summarizer_with(mock: &MockProvider, options: SummarizeOptions) -> DocumentSummarizer {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            rate_limit_base_delay: Duration::from_millis(1),
        };
        DocumentSummarizer::new(
            Gateway::new(Box::new(mock.clone()), policy),
            Arc::new(StaticPromptSource::new()),
            options,
        )
    }

    fn chunk_reply(index: usize) -> String {
        format!(
            "{{\"chunk_summary\": \"part {index}\", \
              \"chunk_action_items\": [\"follow up {index}\"], \
              \"chunk_keywords\": [\"kw{index}\", \"shared\"]}}"
        )
    }

    const FINAL_REPLY: &str = r#"{"summary": "The whole document.",
        "highlights": ["h1"], "action_items": ["do x"],
        "keywords": ["alpha"], "confidence": 0.9}"#;

    fn long_text() -> String {
        // ~21600 chars → 3 chunks; pre-trimmed so input hygiene is a no-op.
        "lorem ipsum dolor sit amet ".repeat(800).trim().to_string()
    }

    // ── Strategy decision ───────────────────────────────────────────

    #[tokio::test]
    async fn small_document_uses_direct_path() {
        let mock = MockProvider::new(FINAL_REPLY);
        let summarizer = summarizer_with(&mock, fast_options());

        let outcome = summarizer.summarize("a short note", false).await.unwrap();
        assert_eq!(mock.call_count(), 1);
        assert_eq!(outcome.document.summary, "The whole document.");
        assert!(!outcome.document.fallback);
        assert_eq!(outcome.usage.calls, 1);
    }

    #[tokio::test]
    async fn large_document_uses_chunked_path() {
        let mock = MockProvider::new(FINAL_REPLY);
        let text = long_text();
        let expected_chunks = chunk_text(&text, 2000, 100).len();
        for index in 0..expected_chunks {
            mock.enqueue_ok(&chunk_reply(index));
        }
        let summarizer = summarizer_with(&mock, fast_options());

        let outcome = summarizer.summarize(&text, false).await.unwrap();
        // One call per chunk plus one reduce call.
        assert_eq!(mock.call_count(), expected_chunks + 1);
        assert_eq!(outcome.chunk_failures, 0);
        assert_eq!(outcome.document.summary, "The whole document.");

        let requests = mock.requests();
        for request in &requests[..expected_chunks] {
            assert_eq!(request.feature, FeatureKind::DocumentChunk);
        }
        assert_eq!(requests[expected_chunks].feature, FeatureKind::DocumentFinal);
    }

    #[tokio::test]
    async fn text_at_threshold_selects_chunked_path() {
        // 8000 chars estimate to exactly 2000 tokens, which is not below
        // the threshold; the chunker yields a single window, so the run
        // is one map call plus one reduce call.
        let mock = MockProvider::new(FINAL_REPLY);
        mock.enqueue_ok(&chunk_reply(0));
        let summarizer = summarizer_with(&mock, fast_options());

        let text = "x".repeat(8000);
        summarizer.summarize(&text, false).await.unwrap();

        assert_eq!(mock.call_count(), chunk_text(&text, 2000, 100).len() + 1);
        assert_eq!(mock.requests()[0].feature, FeatureKind::DocumentChunk);
    }

    #[tokio::test]
    async fn chunk_calls_run_in_index_order() {
        let mock = MockProvider::new(FINAL_REPLY);
        let text = long_text();
        let chunks = chunk_text(&text, 2000, 100);
        for index in 0..chunks.len() {
            mock.enqueue_ok(&chunk_reply(index));
        }
        let summarizer = summarizer_with(&mock, fast_options());
        summarizer.summarize(&text, false).await.unwrap();

        let requests = mock.requests();
        for (request, chunk) in requests.iter().zip(&chunks) {
            assert_eq!(request.user_text, chunk.text);
        }
    }

    // ── Map-failure absorption ──────────────────────────────────────

    #[tokio::test]
    async fn failed_chunk_becomes_placeholder_not_job_failure() {
        let mock = MockProvider::new(FINAL_REPLY);
        let text = long_text();
        let expected_chunks = chunk_text(&text, 2000, 100).len();
        mock.enqueue_err(GatewayError::Auth { status: 401 }); // chunk 0 dies
        for index in 1..expected_chunks {
            mock.enqueue_ok(&chunk_reply(index));
        }
        let summarizer = summarizer_with(&mock, fast_options());

        let outcome = summarizer.summarize(&text, false).await.unwrap();
        assert_eq!(outcome.chunk_failures, 1);
        assert!(outcome
            .warnings
            .iter()
            .any(|w| w.contains("chunk 0") && w.contains("empty digest")));
        assert_eq!(outcome.document.summary, "The whole document.");
    }

    #[tokio::test]
    async fn all_chunks_failing_with_no_content_errors() {
        let mock = MockProvider::new("unused");
        let text = long_text();
        let expected_chunks = chunk_text(&text, 2000, 100).len();
        for _ in 0..expected_chunks {
            mock.enqueue_err(GatewayError::Auth { status: 401 });
        }
        let summarizer = summarizer_with(&mock, fast_options());

        let err = summarizer.summarize(&text, false).await.unwrap_err();
        assert!(matches!(err, SummarizeError::NoUsableContent));
    }

    // ── Reduce fallback ─────────────────────────────────────────────

    #[tokio::test]
    async fn reduce_failure_synthesizes_fallback() {
        let mock = MockProvider::new("complete prose, not json at all");
        let text = long_text();
        let expected_chunks = chunk_text(&text, 2000, 100).len();
        for index in 0..expected_chunks {
            mock.enqueue_ok(&chunk_reply(index));
        }
        // Reduce call and its two corrective retries return prose via the
        // default reply, so the reduce stage fails outright.
        let summarizer = summarizer_with(&mock, fast_options());

        let outcome = summarizer.summarize(&text, false).await.unwrap();
        assert!(outcome.document.fallback);
        assert!(outcome.document.summary.contains("part 0"));
        assert!(outcome
            .document
            .action_items
            .iter()
            .any(|item| item == "follow up 0"));
        // "shared" keyword deduplicated across chunks.
        let shared = outcome
            .document
            .keywords
            .iter()
            .filter(|k| k.as_str() == "shared")
            .count();
        assert_eq!(shared, 1);
        assert!(outcome
            .warnings
            .iter()
            .any(|w| w.contains("reduce stage failed")));
    }

    // ── Corrective re-prompts ───────────────────────────────────────

    #[tokio::test]
    async fn corrective_reprompt_rescues_direct_path() {
        let mock = MockProvider::new("unused");
        mock.enqueue_ok("total garbage with no braces");
        mock.enqueue_ok(FINAL_REPLY);
        let summarizer = summarizer_with(&mock, fast_options());

        let outcome = summarizer.summarize("tiny doc", false).await.unwrap();
        assert_eq!(outcome.document.summary, "The whole document.");
        assert_eq!(mock.call_count(), 2);
        // The second request was the corrective re-prompt.
        let requests = mock.requests();
        assert!(requests[1].system_text.contains("valid JSON"));
    }

    #[tokio::test]
    async fn corrective_reprompts_are_bounded() {
        let mock = MockProvider::new("still not json");
        mock.enqueue_ok("not json either");
        let summarizer = summarizer_with(&mock, fast_options());

        let outcome = summarizer.summarize("tiny doc", false).await.unwrap();
        // Initial call plus exactly two corrective attempts.
        assert_eq!(mock.call_count(), 3);
        // Unparseable output falls back to raw-reply synthesis.
        assert!(outcome.document.fallback);
        assert!(outcome.document.summary.contains("not json"));
    }

    // ── Roadmap derivation ──────────────────────────────────────────

    #[tokio::test]
    async fn roadmap_attached_on_request() {
        let mock = MockProvider::new("unused");
        mock.enqueue_ok(FINAL_REPLY);
        mock.enqueue_ok(
            r#"{"title": "Plan", "weeks": [{"week": 1, "focus": "read", "tasks": ["t"]}],
                "confidence": "high"}"#,
        );
        let summarizer = summarizer_with(&mock, fast_options());

        let outcome = summarizer.summarize("tiny doc", true).await.unwrap();
        let roadmap = outcome.document.roadmap.expect("roadmap attached");
        assert_eq!(roadmap.title, "Plan");
        assert_eq!(roadmap.confidence, 0.9);
        assert_eq!(mock.requests()[0].feature, FeatureKind::DocumentFinal);
        assert_eq!(mock.requests().last().unwrap().feature, FeatureKind::Roadmap);
    }

    #[tokio::test]
    async fn roadmap_failure_does_not_fail_document() {
        let mock = MockProvider::new("unused");
        mock.enqueue_ok(FINAL_REPLY);
        mock.enqueue_err(GatewayError::Auth { status: 401 });
        let summarizer = summarizer_with(&mock, fast_options());

        let outcome = summarizer.summarize("tiny doc", true).await.unwrap();
        assert!(outcome.document.roadmap.is_none());
        assert_eq!(outcome.document.summary, "The whole document.");
    }

    // ── Single-call features ────────────────────────────────────────

    #[tokio::test]
    async fn run_feature_explain_round_trips() {
        let mock = MockProvider::new(
            r#"{"explanation": "Borrowing lends access without moving.",
                "examples": ["&T", "&mut T", "as_ref()"], "confidence": "high"}"#,
        );
        let summarizer = summarizer_with(&mock, fast_options());

        let (output, warnings) = summarizer
            .run_feature(FeatureKind::Explain, "explain borrowing")
            .await
            .unwrap();
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
        match output {
            FeatureOutput::Explain(explain) => {
                assert_eq!(explain.examples.len(), 3);
                assert_eq!(explain.confidence, 0.9);
            }
            other => panic!("expected Explain, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn run_feature_gateway_error_escalates() {
        let mock = MockProvider::new("unused");
        mock.enqueue_err(GatewayError::ModelNotFound("llama3".into()));
        let summarizer = summarizer_with(&mock, fast_options());

        let err = summarizer
            .run_feature(FeatureKind::Rewrite, "rewrite this")
            .await
            .unwrap_err();
        assert!(matches!(err, SummarizeError::Gateway(_)));
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let mock = MockProvider::new("unused");
        let summarizer = summarizer_with(&mock, fast_options());
        let err = summarizer.summarize("   \n  ", false).await.unwrap_err();
        assert!(matches!(err, SummarizeError::NoUsableContent));
        assert_eq!(mock.call_count(), 0);
    }

    // ── Helpers ─────────────────────────────────────────────────────

    #[test]
    fn dedupe_is_case_and_whitespace_insensitive() {
        let items = vec![
            "Review the budget".to_string(),
            "review   the budget".to_string(),
            "REVIEW THE BUDGET".to_string(),
            "Ship the release".to_string(),
        ];
        let deduped = dedupe_cap(items.iter(), 10);
        assert_eq!(deduped, vec!["Review the budget", "Ship the release"]);
    }

    #[test]
    fn dedupe_respects_cap() {
        let items: Vec<String> = (0..30).map(|i| format!("item {i}")).collect();
        assert_eq!(dedupe_cap(items.iter(), 10).len(), 10);
    }

    #[test]
    fn fallback_from_chunks_requires_content() {
        assert!(fallback_from_chunks(&[], Vec::new(), Vec::new(), 3).is_none());
        let doc = fallback_from_chunks(&["s1", "s2", "s3", "s4"], vec![], vec![], 3).unwrap();
        assert!(doc.fallback);
        assert_eq!(doc.highlights.len(), 3);
    }

    #[test]
    fn fallback_from_text_requires_content() {
        assert!(fallback_from_text("  \n \n").is_none());
        let doc = fallback_from_text("line one\n\nline two").unwrap();
        assert!(doc.fallback);
        assert_eq!(doc.highlights, vec!["line one", "line two"]);
        assert_eq!(doc.summary, "line one line two");
    }

    #[test]
    fn reduce_payload_contains_lists() {
        let payload = reduce_payload(
            &["first", "second"],
            &["do x".to_string()],
            &["alpha".to_string(), "beta".to_string()],
        );
        assert!(payload.starts_with("first\n\nsecond"));
        assert!(payload.contains("- do x"));
        assert!(payload.contains("Keywords: alpha, beta"));
    }
}
