//! Per-feature schema validation.
//!
//! Validation never fails: missing fields get safe defaults, shape
//! violations are coerced, and every coercion is recorded as a warning
//! string for the caller.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::pipeline::gateway::FeatureKind;

use super::confidence::DEFAULT_CONFIDENCE;

/// Expected length of the `examples` array in explain outputs.
pub const EXPECTED_EXAMPLES: usize = 3;

// ──────────────────────────────────────────────
// Feature schemas
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExplainOutput {
    pub explanation: String,
    pub examples: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoadmapWeek {
    pub week: u32,
    pub focus: String,
    pub tasks: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoadmapOutput {
    pub title: String,
    pub weeks: Vec<RoadmapWeek>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RewriteOutput {
    pub rewritten: String,
    pub notes: Vec<String>,
    pub confidence: f64,
}

/// Map-stage output for one chunk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChunkDigest {
    pub chunk_summary: String,
    pub chunk_action_items: Vec<String>,
    pub chunk_keywords: Vec<String>,
}

impl ChunkDigest {
    /// Well-formed placeholder substituted for a failed chunk.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.chunk_summary.trim().is_empty()
            && self.chunk_action_items.is_empty()
            && self.chunk_keywords.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentSummary {
    pub summary: String,
    pub highlights: Vec<String>,
    pub action_items: Vec<String>,
    pub keywords: Vec<String>,
    pub confidence: f64,
    /// True when the result came from fallback synthesis rather than a
    /// successful reduce call.
    pub fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roadmap: Option<RoadmapOutput>,
}

/// Job-facing result: one variant per feature schema plus a generic
/// escape hatch, so consumers pattern-match instead of duck-typing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FeatureOutput {
    Explain(ExplainOutput),
    Roadmap(RoadmapOutput),
    Rewrite(RewriteOutput),
    Document(DocumentSummary),
    Generic { value: Value },
}

// ──────────────────────────────────────────────
// Validation entry points
// ──────────────────────────────────────────────

/// Validate a recovered object against the schema for `kind`.
pub fn validate_feature(value: Map<String, Value>, kind: FeatureKind) -> (FeatureOutput, Vec<String>) {
    let mut warnings = Vec::new();
    let output = match kind {
        FeatureKind::Explain => FeatureOutput::Explain(explain_fields(&value, &mut warnings)),
        FeatureKind::Roadmap => FeatureOutput::Roadmap(roadmap_fields(&value, &mut warnings)),
        FeatureKind::Rewrite => FeatureOutput::Rewrite(rewrite_fields(&value, &mut warnings)),
        FeatureKind::DocumentFinal => {
            FeatureOutput::Document(document_fields(&value, &mut warnings))
        }
        FeatureKind::DocumentChunk => {
            let digest = chunk_fields(&value, &mut warnings);
            FeatureOutput::Generic {
                value: serde_json::json!({
                    "chunk_summary": digest.chunk_summary,
                    "chunk_action_items": digest.chunk_action_items,
                    "chunk_keywords": digest.chunk_keywords,
                }),
            }
        }
    };
    (output, warnings)
}

/// Validate a map-stage chunk reply.
pub fn validate_chunk(value: &Map<String, Value>) -> (ChunkDigest, Vec<String>) {
    let mut warnings = Vec::new();
    let digest = chunk_fields(value, &mut warnings);
    (digest, warnings)
}

/// Validate a reduce-stage or direct document reply.
pub fn validate_document(value: &Map<String, Value>) -> (DocumentSummary, Vec<String>) {
    let mut warnings = Vec::new();
    let document = document_fields(value, &mut warnings);
    (document, warnings)
}

/// Validate a roadmap reply.
pub fn validate_roadmap(value: &Map<String, Value>) -> (RoadmapOutput, Vec<String>) {
    let mut warnings = Vec::new();
    let roadmap = roadmap_fields(value, &mut warnings);
    (roadmap, warnings)
}

// ──────────────────────────────────────────────
// Per-feature field extraction
// ──────────────────────────────────────────────

fn explain_fields(map: &Map<String, Value>, warnings: &mut Vec<String>) -> ExplainOutput {
    let explanation = string_field(map, "explanation", warnings);
    let mut examples = string_array(map, "examples", warnings);
    if examples.len() > EXPECTED_EXAMPLES {
        warnings.push(format!(
            "`examples` had {} entries, truncated to {EXPECTED_EXAMPLES}",
            examples.len()
        ));
        examples.truncate(EXPECTED_EXAMPLES);
    } else if examples.len() < EXPECTED_EXAMPLES {
        warnings.push(format!(
            "`examples` has {} of {EXPECTED_EXAMPLES} expected entries",
            examples.len()
        ));
    }
    ExplainOutput {
        explanation,
        examples,
        confidence: confidence_field(map, warnings),
    }
}

fn roadmap_fields(map: &Map<String, Value>, warnings: &mut Vec<String>) -> RoadmapOutput {
    let title = string_field(map, "title", warnings);
    let weeks = match map.get("weeks") {
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| match item {
                Value::Object(week) => Some(RoadmapWeek {
                    week: week
                        .get("week")
                        .and_then(Value::as_u64)
                        .map(|w| w as u32)
                        .unwrap_or((index + 1) as u32),
                    focus: week
                        .get("focus")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .trim()
                        .to_string(),
                    tasks: quiet_string_array(week.get("tasks")),
                }),
                _ => {
                    warnings.push("non-object entry in `weeks` dropped".to_string());
                    None
                }
            })
            .collect(),
        Some(_) => {
            warnings.push("`weeks` is not an array, defaulted to empty".to_string());
            Vec::new()
        }
        None => {
            warnings.push("`weeks` missing, defaulted to empty".to_string());
            Vec::new()
        }
    };
    RoadmapOutput {
        title,
        weeks,
        confidence: confidence_field(map, warnings),
    }
}

fn rewrite_fields(map: &Map<String, Value>, warnings: &mut Vec<String>) -> RewriteOutput {
    RewriteOutput {
        rewritten: string_field(map, "rewritten", warnings),
        notes: quiet_string_array(map.get("notes")),
        confidence: confidence_field(map, warnings),
    }
}

fn chunk_fields(map: &Map<String, Value>, warnings: &mut Vec<String>) -> ChunkDigest {
    ChunkDigest {
        chunk_summary: string_field(map, "chunk_summary", warnings),
        chunk_action_items: string_array(map, "chunk_action_items", warnings),
        chunk_keywords: string_array(map, "chunk_keywords", warnings),
    }
}

fn document_fields(map: &Map<String, Value>, warnings: &mut Vec<String>) -> DocumentSummary {
    DocumentSummary {
        summary: string_field(map, "summary", warnings),
        highlights: string_array(map, "highlights", warnings),
        action_items: string_array(map, "action_items", warnings),
        keywords: string_array(map, "keywords", warnings),
        confidence: confidence_field(map, warnings),
        fallback: map
            .get("fallback")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        roadmap: None,
    }
}

// ──────────────────────────────────────────────
// Field helpers
// ──────────────────────────────────────────────

fn string_field(map: &Map<String, Value>, key: &str, warnings: &mut Vec<String>) -> String {
    match map.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => {
            warnings.push(format!("`{key}` was numeric, coerced to string"));
            n.to_string()
        }
        Some(_) => {
            warnings.push(format!("`{key}` had an unexpected shape, defaulted"));
            String::new()
        }
        None => {
            warnings.push(format!("`{key}` missing, defaulted"));
            String::new()
        }
    }
}

fn string_array(map: &Map<String, Value>, key: &str, warnings: &mut Vec<String>) -> Vec<String> {
    match map.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => {
                    let trimmed = s.trim();
                    (!trimmed.is_empty()).then(|| trimmed.to_string())
                }
                Value::Number(n) => Some(n.to_string()),
                _ => {
                    warnings.push(format!("non-string entry in `{key}` dropped"));
                    None
                }
            })
            .collect(),
        Some(Value::String(s)) => {
            warnings.push(format!("`{key}` was a single string, wrapped into an array"));
            vec![s.trim().to_string()]
        }
        Some(_) => {
            warnings.push(format!("`{key}` had an unexpected shape, defaulted to empty"));
            Vec::new()
        }
        None => {
            warnings.push(format!("`{key}` missing, defaulted to empty"));
            Vec::new()
        }
    }
}

/// Array reading for optional fields; absence is not worth a warning.
fn quiet_string_array(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn confidence_field(map: &Map<String, Value>, warnings: &mut Vec<String>) -> f64 {
    match map.get("confidence").and_then(Value::as_f64) {
        Some(v) if (0.0..=1.0).contains(&v) => v,
        Some(_) => {
            warnings.push("confidence out of range, reset to default".to_string());
            DEFAULT_CONFIDENCE
        }
        None => {
            warnings.push("confidence missing or non-numeric, reset to default".to_string());
            DEFAULT_CONFIDENCE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(raw: &str) -> Map<String, Value> {
        serde_json::from_str(raw).unwrap()
    }

    // ── Explain ─────────────────────────────────────────────────────

    #[test]
    fn explain_well_formed_no_warnings() {
        let map = object(
            r#"{"explanation": "Ownership moves values.",
                "examples": ["let a = b;", "fn take(v: Vec<u8>)", "drop(v)"],
                "confidence": 0.9}"#,
        );
        let (output, warnings) = validate_feature(map, FeatureKind::Explain);
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
        match output {
            FeatureOutput::Explain(e) => {
                assert_eq!(e.examples.len(), 3);
                assert_eq!(e.confidence, 0.9);
            }
            other => panic!("expected Explain, got {other:?}"),
        }
    }

    #[test]
    fn explain_extra_examples_truncated() {
        let map = object(
            r#"{"explanation": "x", "examples": ["1","2","3","4","5"], "confidence": 0.8}"#,
        );
        let (output, warnings) = validate_feature(map, FeatureKind::Explain);
        match output {
            FeatureOutput::Explain(e) => assert_eq!(e.examples, vec!["1", "2", "3"]),
            other => panic!("expected Explain, got {other:?}"),
        }
        assert!(warnings.iter().any(|w| w.contains("truncated")));
    }

    #[test]
    fn explain_shortfall_warned_not_padded() {
        let map = object(r#"{"explanation": "x", "examples": ["only one"], "confidence": 0.8}"#);
        let (output, warnings) = validate_feature(map, FeatureKind::Explain);
        match output {
            FeatureOutput::Explain(e) => assert_eq!(e.examples.len(), 1),
            other => panic!("expected Explain, got {other:?}"),
        }
        assert!(warnings.iter().any(|w| w.contains("of 3 expected")));
    }

    #[test]
    fn empty_object_fully_defaulted_with_warnings() {
        let (output, warnings) = validate_feature(Map::new(), FeatureKind::Explain);
        match output {
            FeatureOutput::Explain(e) => {
                assert_eq!(e.explanation, "");
                assert!(e.examples.is_empty());
                assert_eq!(e.confidence, DEFAULT_CONFIDENCE);
            }
            other => panic!("expected Explain, got {other:?}"),
        }
        // explanation, examples, examples-count, confidence
        assert_eq!(warnings.len(), 4);
    }

    // ── Roadmap ─────────────────────────────────────────────────────

    #[test]
    fn roadmap_weeks_parsed_leniently() {
        let map = object(
            r#"{"title": "Rust in 3 weeks",
                "weeks": [
                    {"week": 1, "focus": "basics", "tasks": ["read ch. 1"]},
                    "not an object",
                    {"focus": "ownership"}
                ],
                "confidence": "high"}"#,
        );
        let (roadmap, warnings) = validate_roadmap(&map);
        assert_eq!(roadmap.weeks.len(), 2);
        assert_eq!(roadmap.weeks[0].week, 1);
        // Missing week number defaults to its position.
        assert_eq!(roadmap.weeks[1].week, 3);
        assert_eq!(roadmap.weeks[1].focus, "ownership");
        assert!(warnings.iter().any(|w| w.contains("non-object entry")));
    }

    #[test]
    fn roadmap_weeks_must_be_an_array() {
        let map = object(r#"{"title": "t", "weeks": "monday", "confidence": 0.5}"#);
        let (roadmap, warnings) = validate_roadmap(&map);
        assert!(roadmap.weeks.is_empty());
        assert!(warnings.iter().any(|w| w.contains("not an array")));
    }

    // ── Rewrite ─────────────────────────────────────────────────────

    #[test]
    fn rewrite_notes_optional() {
        let map = object(r#"{"rewritten": "Cleaner text.", "confidence": 0.7}"#);
        let (output, warnings) = validate_feature(map, FeatureKind::Rewrite);
        match output {
            FeatureOutput::Rewrite(r) => {
                assert_eq!(r.rewritten, "Cleaner text.");
                assert!(r.notes.is_empty());
            }
            other => panic!("expected Rewrite, got {other:?}"),
        }
        assert!(warnings.is_empty());
    }

    // ── Chunk ───────────────────────────────────────────────────────

    #[test]
    fn chunk_well_formed() {
        let map = object(
            r#"{"chunk_summary": "Covers setup.",
                "chunk_action_items": ["install toolchain"],
                "chunk_keywords": ["setup", "install"]}"#,
        );
        let (digest, warnings) = validate_chunk(&map);
        assert!(warnings.is_empty());
        assert!(!digest.is_empty());
        assert_eq!(digest.chunk_keywords.len(), 2);
    }

    #[test]
    fn chunk_missing_arrays_default_empty() {
        let map = object(r#"{"chunk_summary": "only a summary"}"#);
        let (digest, warnings) = validate_chunk(&map);
        assert_eq!(digest.chunk_summary, "only a summary");
        assert!(digest.chunk_action_items.is_empty());
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn chunk_empty_placeholder_is_empty() {
        assert!(ChunkDigest::empty().is_empty());
    }

    #[test]
    fn chunk_single_string_wrapped() {
        let map = object(
            r#"{"chunk_summary": "s", "chunk_action_items": "just one", "chunk_keywords": []}"#,
        );
        let (digest, warnings) = validate_chunk(&map);
        assert_eq!(digest.chunk_action_items, vec!["just one"]);
        assert!(warnings.iter().any(|w| w.contains("wrapped")));
    }

    // ── Document ────────────────────────────────────────────────────

    #[test]
    fn document_well_formed() {
        let map = object(
            r#"{"summary": "A report.",
                "highlights": ["h1", "h2"],
                "action_items": ["a1"],
                "keywords": ["k1", "k2", "k3"],
                "confidence": 0.85}"#,
        );
        let (document, warnings) = validate_document(&map);
        assert!(warnings.is_empty());
        assert!(!document.fallback);
        assert!(document.roadmap.is_none());
        assert_eq!(document.keywords.len(), 3);
    }

    #[test]
    fn document_numeric_entries_coerced() {
        let map = object(
            r#"{"summary": "s", "highlights": [1, "two"], "action_items": [],
                "keywords": [], "confidence": 0.5}"#,
        );
        let (document, _) = validate_document(&map);
        assert_eq!(document.highlights, vec!["1", "two"]);
    }

    #[test]
    fn out_of_range_confidence_reset() {
        // Validators see pre-normalized values in the pipeline, but must
        // still guard on their own.
        let map = object(r#"{"summary": "s", "highlights": [], "action_items": [], "keywords": [], "confidence": 7.0}"#);
        let (document, warnings) = validate_document(&map);
        assert_eq!(document.confidence, DEFAULT_CONFIDENCE);
        assert!(warnings.iter().any(|w| w.contains("out of range")));
    }

    // ── FeatureOutput serde ─────────────────────────────────────────

    #[test]
    fn feature_output_tagged_serialization() {
        let output = FeatureOutput::Explain(ExplainOutput {
            explanation: "e".into(),
            examples: vec!["a".into()],
            confidence: 0.9,
        });
        let json = serde_json::to_string(&output).unwrap();
        assert!(json.contains("\"kind\":\"explain\""));
        let back: FeatureOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(back, output);
    }

    #[test]
    fn document_output_roundtrip_with_roadmap() {
        let output = FeatureOutput::Document(DocumentSummary {
            summary: "s".into(),
            highlights: vec![],
            action_items: vec![],
            keywords: vec!["k".into()],
            confidence: 0.6,
            fallback: true,
            roadmap: Some(RoadmapOutput {
                title: "t".into(),
                weeks: vec![RoadmapWeek {
                    week: 1,
                    focus: "f".into(),
                    tasks: vec!["t1".into()],
                }],
                confidence: 0.7,
            }),
        });
        let json = serde_json::to_string(&output).unwrap();
        assert!(json.contains("\"kind\":\"document\""));
        let back: FeatureOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(back, output);
    }

    #[test]
    fn generic_variant_roundtrip() {
        let output = FeatureOutput::Generic {
            value: json!({"anything": [1, 2, 3]}),
        };
        let json = serde_json::to_string(&output).unwrap();
        assert!(json.contains("\"kind\":\"generic\""));
        let back: FeatureOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(back, output);
    }
}
