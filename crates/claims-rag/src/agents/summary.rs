//! Map-reduce synthesis over coarse chunks.
//!
//! Broad questions are answered in two phases: every retrieved chunk is
//! summarized independently against the question (map, fanned out
//! concurrently), then the non-empty mini-summaries are combined into one
//! coherent answer (reduce). Recall is favored at retrieval time; the
//! reduce step filters the noise.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{SummaryConfig, TimeoutConfig};
use crate::error::PipelineError;
use crate::llm::{chat_with_timeout, ChatMessage, ChatResponse, GenerationConfig, LLMClient};
use crate::retrieval::{search_with_timeout, Retriever};
use crate::tools::{run_tool_round, ToolRegistry};
use crate::types::{AnswerResult, MapReduceTrace, ScoredChunk};

/// Sentinel the map prompt asks the model to emit for unrelated chunks.
const IRRELEVANT_SENTINEL: &str = "IRRELEVANT";

const MAP_SYSTEM_PROMPT: &str = r#"You summarize one excerpt of an insurance claim document with respect to a question.

Write a short summary (2-4 sentences) of ONLY the information in the excerpt that is relevant to the question. Keep exact values (names, dates, amounts) as written. Do not add outside knowledge.

If the excerpt contains nothing relevant to the question, respond with exactly: IRRELEVANT"#;

const REDUCE_SYSTEM_PROMPT: &str = r#"You are a context synthesizer for insurance claim documents.

You receive a question and several mini-summaries extracted from retrieved document chunks. Combine them into ONE coherent, comprehensive answer.

RULES:
1. Use information from ALL relevant mini-summaries; stay grounded in them and add no outside knowledge.
2. When mini-summaries appear to conflict, prefer the more specific or quantitative statement over the vaguer one.
3. Organize the answer logically; you need not follow the source order.
4. Be transparent about gaps: if something is missing, say so.
5. For elapsed-time questions, call the days_between tool with both dates in YYYY-MM-DD format; never compute date differences yourself.

Respond with the final answer as plain prose."#;

/// Synthesizes a comprehensive answer across many chunks.
pub struct SummaryAgent {
    llm: Arc<dyn LLMClient>,
    tools: Arc<ToolRegistry>,
    config: SummaryConfig,
    llm_timeout: Duration,
    retrieval_timeout: Duration,
    tool_timeout_secs: u64,
}

impl SummaryAgent {
    pub fn new(
        llm: Arc<dyn LLMClient>,
        tools: Arc<ToolRegistry>,
        config: SummaryConfig,
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
            tracing::info!("Summary short-circuit: no chunks retrieved");
            return Ok(AnswerResult::not_found("no chunks were retrieved for this question"));
        }

        // Map phase: per-chunk calls are independent, so they run
        // concurrently and join before the reduce step.
        let minis = futures::future::join_all(
            retrieved.iter().map(|sc| self.map_chunk(question, sc)),
        )
        .await;

        let mapped: Vec<(&ScoredChunk, String)> = retrieved
            .iter()
            .zip(minis)
            .filter_map(|(sc, mini)| mini.map(|m| (sc, m)))
            .collect();

        let trace = MapReduceTrace {
            total_chunks: retrieved.len(),
            mapped: mapped.len(),
            skipped: retrieved.len() - mapped.len(),
            reduce_description: format!(
                "combined {} mini-summaries into one answer",
                mapped.len()
            ),
        };
        tracing::info!(
            total = trace.total_chunks,
            mapped = trace.mapped,
            skipped = trace.skipped,
            "Map phase complete"
        );

        if mapped.is_empty() {
            return Ok(AnswerResult {
                rationale: "no retrieved content was relevant to the question".into(),
                map_trace: Some(trace),
                ..AnswerResult::not_found("")
            }
            .with_retrieved(&retrieved));
        }

        let sources: Vec<String> = mapped.iter().map(|(sc, _)| sc.chunk.id.clone()).collect();
        self.reduce(question, &retrieved, &mapped, sources, trace).await
    }

    /// Summarize one chunk against the question. Any failure (timeout,
    /// provider error, unexpected tool request) degrades to an empty
    /// mini-summary for that chunk instead of failing the whole query.
    async fn map_chunk(&self, question: &str, sc: &ScoredChunk) -> Option<String> {
        let messages = [
            ChatMessage::system(MAP_SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Question: {}\n\nExcerpt [{}]:\n{}",
                question, sc.chunk.id, sc.chunk.text
            )),
        ];
        let gen = GenerationConfig {
            max_tokens: self.config.map_max_tokens,
            temperature: self.config.temperature,
            ..Default::default()
        };

        match chat_with_timeout(self.llm.as_ref(), &messages, &[], &gen, self.llm_timeout).await {
            Ok(ChatResponse::Content(text)) => {
                let trimmed = text.trim();
                if trimmed.is_empty() || trimmed.starts_with(IRRELEVANT_SENTINEL) {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            Ok(ChatResponse::ToolCalls(_)) => {
                tracing::warn!(chunk = %sc.chunk.id, "Map call requested a tool; skipping chunk");
                None
            }
            Err(e) => {
                tracing::warn!(chunk = %sc.chunk.id, error = %e, "Map call failed; skipping chunk");
                None
            }
        }
    }

    async fn reduce(
        &self,
        question: &str,
        retrieved: &[ScoredChunk],
        mapped: &[(&ScoredChunk, String)],
        sources: Vec<String>,
        trace: MapReduceTrace,
    ) -> Result<AnswerResult, PipelineError> {
        let context = mapped
            .iter()
            .enumerate()
            .map(|(i, (sc, mini))| format!("[Summary {} | chunk {}]\n{}", i + 1, sc.chunk.id, mini))
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut messages = vec![
            ChatMessage::system(REDUCE_SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Question: {}\n\nMini-summaries (from {} chunks):\n{}\n\nSynthesize the final answer.",
                question,
                mapped.len(),
                context
            )),
        ];
        let gen = GenerationConfig {
            max_tokens: self.config.reduce_max_tokens,
            temperature: self.config.temperature,
            ..Default::default()
        };
        let schemas = self.tools.schemas();

        let (answer_text, tool_used) = match chat_with_timeout(
            self.llm.as_ref(),
            &messages,
            &schemas,
            &gen,
            self.llm_timeout,
        )
        .await
        {
            Ok(ChatResponse::Content(text)) => (Some(text.trim().to_string()), None),
            Ok(ChatResponse::ToolCalls(calls)) => {
                let round = run_tool_round(
                    self.llm.as_ref(),
                    &self.tools,
                    &mut messages,
                    calls,
                    &gen,
                    self.llm_timeout,
                    self.tool_timeout_secs,
                )
                .await;
                let tool_name = round.invocations.first().map(|inv| inv.name.clone());
                match round.final_text {
                    Ok(text) => (Some(text.trim().to_string()), tool_name),
                    Err(e) => {
                        tracing::warn!(error = %e, "Reduce finalization failed after tool round");
                        (None, tool_name)
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Reduce call failed");
                (None, None)
            }
        };

        let result = match answer_text.filter(|t| !t.is_empty()) {
            Some(text) => AnswerResult {
                answer: Some(text),
                // Synthesized answers never report full confidence.
                confidence: self.config.synthesis_confidence,
                sources,
                rationale: format!(
                    "map-reduce synthesis over {} of {} retrieved chunks",
                    trace.mapped, trace.total_chunks
                ),
                tool_used,
                map_trace: Some(trace),
                ..AnswerResult::not_found("")
            }
            .with_retrieved(retrieved),
            None => AnswerResult {
                rationale: "synthesis failed to produce an answer from the mini-summaries".into(),
                tool_used,
                map_trace: Some(trace),
                ..AnswerResult::not_found("")
            }
            .with_retrieved(retrieved),
        };

        Ok(result)
    }
}
