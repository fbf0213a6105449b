//! Precise single-fact extraction over fine chunks.
//!
//! The needle agent never guesses: it extracts a value stated verbatim in
//! the retrieved chunks, or reports that no such fact exists. Elapsed-time
//! questions are delegated to the deterministic date tool rather than
//! answered by the model.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{NeedleConfig, TimeoutConfig};
use crate::error::PipelineError;
use crate::llm::{chat_with_timeout, ChatMessage, ChatResponse, GenerationConfig, LLMClient, ToolCall};
use crate::retrieval::{search_with_timeout, Retriever};
use crate::structured::extract_json_object;
use crate::tools::{run_tool_round, ToolRegistry};
use crate::types::{AnswerResult, ChunkLink, ScoredChunk};

const NEEDLE_SYSTEM_PROMPT: &str = r#"You are a precise fact extractor for insurance claim documents.

RULES:
1. Extract ONLY facts explicitly stated in the provided chunks.
2. NEVER guess, infer, or use outside knowledge.
3. If the fact is not in the chunks, the answer is null.
4. Copy values EXACTLY as written (numbers, names, dates, phone formats).

For elapsed-time questions ("how many days between X and Y"): find both
dates in the chunks, convert them to YYYY-MM-DD, and call the days_between
tool. Never compute date differences yourself.

Respond with a JSON object, nothing else:

{"answer":"<extracted value>" or null,"sources":["<id of each chunk the answer came from>"],"rationale":"one sentence"}"#;

/// Extracts one atomic fact, or states that it is absent.
pub struct NeedleAgent {
    llm: Arc<dyn LLMClient>,
    tools: Arc<ToolRegistry>,
    config: NeedleConfig,
    llm_timeout: Duration,
    retrieval_timeout: Duration,
    tool_timeout_secs: u64,
}

impl NeedleAgent {
    pub fn new(
        llm: Arc<dyn LLMClient>,
        tools: Arc<ToolRegistry>,
        config: NeedleConfig,
        timeouts: &TimeoutConfig,
    ) -> Self {
        Self {
            llm,
            tools,
            config,
            llm_timeout: Duration::from_secs(timeouts.llm_secs),
            retrieval_timeout: Duration::from_secs(timeouts.retrieval_secs),
            tool_timeout_secs: timeouts.tool_secs,
        }
    }

    pub async fn answer(
        &self,
        question: &str,
        retriever: &dyn Retriever,
    ) -> Result<AnswerResult, PipelineError> {
        let retrieved = search_with_timeout(
            retriever,
            question,
            self.config.top_k,
            self.retrieval_timeout,
        )
        .await
        .map_err(PipelineError::Retrieval)?;

        if retrieved.is_empty() {
            tracing::info!("Needle short-circuit: no chunks retrieved");
            return Ok(AnswerResult::not_found("no chunks were retrieved for this question"));
        }

        let surviving: Vec<ScoredChunk> = retrieved
            .into_iter()
            .filter(|sc| sc.score >= self.config.similarity_threshold)
            .collect();

        // No grounding context: the model is not consulted at all.
        if surviving.is_empty() {
            tracing::info!(threshold = self.config.similarity_threshold, "Needle short-circuit");
            return Ok(AnswerResult::not_found("no chunk met similarity threshold"));
        }

        tracing::debug!(chunks = surviving.len(), "Needle extraction context assembled");

        let mut messages = vec![
            ChatMessage::system(NEEDLE_SYSTEM_PROMPT),
            ChatMessage::user(build_user_prompt(question, &surviving)),
        ];
        let gen = GenerationConfig {
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            ..Default::default()
        };
        let schemas = self.tools.schemas();

        // Malformed output gets one retry, then the query degrades to a
        // null answer whose rationale discloses the failure.
        for attempt in 0..2 {
            let response =
                chat_with_timeout(self.llm.as_ref(), &messages, &schemas, &gen, self.llm_timeout)
                    .await;

            match response {
                Ok(ChatResponse::ToolCalls(calls)) => {
                    return Ok(self.tool_path(messages, calls, &surviving, &gen).await);
                }
                Ok(ChatResponse::Content(text)) => match parse_extraction(&text) {
                    Ok(extraction) => {
                        return Ok(finalize_extraction(extraction, &surviving));
                    }
                    Err(e) => {
                        tracing::warn!(attempt, error = %e, "Needle output unparseable");
                    }
                },
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Needle extraction call failed");
                }
            }
        }

        Ok(AnswerResult {
            rationale: "extraction failed to produce valid structured output".into(),
            hierarchy: hierarchy_of(&surviving),
            ..AnswerResult::not_found("")
        }
        .with_retrieved(&surviving))
    }

    /// Execute the model's date-tool request and let it phrase the final
    /// answer around the exact result. One round trip only.
    async fn tool_path(
        &self,
        mut messages: Vec<ChatMessage>,
        calls: Vec<ToolCall>,
        surviving: &[ScoredChunk],
        gen: &GenerationConfig,
    ) -> AnswerResult {
        let round = run_tool_round(
            self.llm.as_ref(),
            &self.tools,
            &mut messages,
            calls,
            gen,
            self.llm_timeout,
            self.tool_timeout_secs,
        )
        .await;

        let tool_name = round
            .invocations
            .first()
            .map(|inv| inv.name.clone())
            .unwrap_or_default();

        // A failed tool means the fact cannot be computed; a guessed number
        // is never an acceptable substitute.
        if !round.any_success() {
            let detail = round
                .invocations
                .first()
                .map(|inv| inv.output.clone())
                .unwrap_or_else(|| "no tool call was executed".into());
            return AnswerResult {
                rationale: format!("could not compute: {}", detail),
                tool_used: Some(tool_name),
                hierarchy: hierarchy_of(surviving),
                ..AnswerResult::not_found("")
            }
            .with_retrieved(surviving);
        }

        let exact = round
            .invocations
            .iter()
            .find(|inv| inv.success)
            .map(|inv| inv.output.clone())
            .unwrap_or_default();

        // Prefer the model's phrasing of the result; fall back to the raw
        // tool output when the finalizing call fails. Either way the number
        // itself came from the tool.
        let answer = match round.final_text {
            Ok(text) => match parse_extraction(&text) {
                Ok(extraction) => extraction.answer.unwrap_or_else(|| exact.clone()),
                Err(_) => text.trim().to_string(),
            },
            Err(e) => {
                tracing::warn!(error = %e, "Tool-result phrasing failed, using raw tool output");
                exact.clone()
            }
        };

        AnswerResult {
            answer: Some(answer),
            confidence: 1.0,
            sources: surviving.iter().map(|sc| sc.chunk.id.clone()).collect(),
            rationale: format!("computed by the {} tool: {}", tool_name, exact),
            tool_used: Some(tool_name),
            hierarchy: hierarchy_of(surviving),
            ..AnswerResult::not_found("")
        }
        .with_retrieved(surviving)
    }
}

#[derive(Debug, Deserialize)]
struct RawExtraction {
    answer: Option<String>,
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default)]
    rationale: String,
}

fn parse_extraction(raw: &str) -> Result<RawExtraction> {
    let json_str = extract_json_object(raw);
    serde_json::from_str::<RawExtraction>(json_str)
        .map_err(|e| anyhow!("malformed extraction output: {} in {}", e, raw))
}

/// Apply the binary confidence policy and restrict cited sources to chunks
/// that were actually retrieved, preserving retrieval order.
fn finalize_extraction(extraction: RawExtraction, surviving: &[ScoredChunk]) -> AnswerResult {
    let answer = extraction.answer.and_then(normalize_answer);

    let cited: Vec<String> = surviving
        .iter()
        .map(|sc| sc.chunk.id.clone())
        .filter(|id| extraction.sources.iter().any(|s| s == id))
        .collect();

    let sources = match (&answer, cited.is_empty()) {
        (Some(_), true) => surviving.iter().map(|sc| sc.chunk.id.clone()).collect(),
        (Some(_), false) => cited,
        (None, _) => Vec::new(),
    };

    let confidence = if answer.is_some() { 1.0 } else { 0.0 };
    let rationale = if extraction.rationale.trim().is_empty() {
        match &answer {
            Some(_) => "extracted verbatim from retrieved chunks".to_string(),
            None => "the retrieved chunks do not contain this fact".to_string(),
        }
    } else {
        extraction.rationale
    };

    AnswerResult {
        answer,
        confidence,
        sources,
        rationale,
        hierarchy: hierarchy_of(surviving),
        ..AnswerResult::not_found("")
    }
    .with_retrieved(surviving)
}

/// Treat explicit null-equivalents the model may emit as absence.
fn normalize_answer(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.to_lowercase().as_str() {
        "null" | "none" | "n/a" | "not found" => None,
        _ => Some(trimmed.to_string()),
    }
}

fn build_user_prompt(question: &str, chunks: &[ScoredChunk]) -> String {
    let context = chunks
        .iter()
        .map(|sc| format!("[{}]\n{}", sc.chunk.id, sc.chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Question: {}\n\nRetrieved chunks:\n{}\n\nExtract the fact. Respond with valid JSON only.",
        question, context
    )
}

fn hierarchy_of(chunks: &[ScoredChunk]) -> Vec<ChunkLink> {
    chunks
        .iter()
        .map(|sc| ChunkLink {
            chunk_id: sc.chunk.id.clone(),
            parent_id: sc.chunk.parent_id.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Chunk, Granularity};

    fn scored(id: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                id: id.to_string(),
                text: format!("text {}", id),
                granularity: Granularity::Fine,
                entity_id: Some("1".into()),
                entity_name: None,
                position: 0,
                parent_id: Some(format!("parent-{}", id)),
            },
            score,
        }
    }

    #[test]
    fn test_parse_extraction_with_null_answer() {
        let raw = r#"{"answer":null,"sources":[],"rationale":"blood type is not mentioned"}"#;
        let extraction = parse_extraction(raw).unwrap();
        assert!(extraction.answer.is_none());
    }

    #[test]
    fn test_finalize_binary_confidence() {
        let surviving = vec![scored("c1", 0.9)];

        let found = finalize_extraction(
            RawExtraction {
                answer: Some("555-1234".into()),
                sources: vec!["c1".into()],
                rationale: "found".into(),
            },
            &surviving,
        );
        assert_eq!(found.confidence, 1.0);

        let missing = finalize_extraction(
            RawExtraction {
                answer: None,
                sources: vec![],
                rationale: "absent".into(),
            },
            &surviving,
        );
        assert_eq!(missing.confidence, 0.0);
        assert!(missing.sources.is_empty());
    }

    #[test]
    fn test_finalize_drops_uncited_unknown_sources() {
        let surviving = vec![scored("c1", 0.9), scored("c2", 0.8)];
        let result = finalize_extraction(
            RawExtraction {
                answer: Some("x".into()),
                sources: vec!["c2".into(), "made-up-id".into()],
                rationale: "r".into(),
            },
            &surviving,
        );
        assert_eq!(result.sources, vec!["c2"]);
    }

    #[test]
    fn test_finalize_falls_back_to_all_chunks_when_citation_missing() {
        let surviving = vec![scored("c1", 0.9), scored("c2", 0.8)];
        let result = finalize_extraction(
            RawExtraction {
                answer: Some("x".into()),
                sources: vec![],
                rationale: "r".into(),
            },
            &surviving,
        );
        assert_eq!(result.sources, vec!["c1", "c2"]);
    }

    #[test]
    fn test_normalize_answer_null_equivalents() {
        assert_eq!(normalize_answer("  555-1234 ".into()).as_deref(), Some("555-1234"));
        assert!(normalize_answer("null".into()).is_none());
        assert!(normalize_answer("None".into()).is_none());
        assert!(normalize_answer("  ".into()).is_none());
    }

    #[test]
    fn test_hierarchy_links_fine_chunks_to_parents() {
        let links = hierarchy_of(&[scored("c1", 0.9)]);
        assert_eq!(links[0].chunk_id, "c1");
        assert_eq!(links[0].parent_id.as_deref(), Some("parent-c1"));
    }
}
