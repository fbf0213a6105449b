//! Needle/summary query classification.
//!
//! A single short completion maps a question onto one of the two retrieval
//! strategies before any retrieval happens. The decision is never guessed on
//! the model's behalf: output that stays unparseable after one retry is a
//! routing failure surfaced to the caller.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{RouterConfig, TimeoutConfig};
use crate::error::PipelineError;
use crate::llm::{chat_with_timeout, ChatMessage, ChatResponse, GenerationConfig, LLMClient};
use crate::structured::{extract_json_object, extract_number_field, extract_string_field};
use crate::types::{RouteDecision, Strategy};

const ROUTER_SYSTEM_PROMPT: &str = r#"You are a routing classifier for a claims question-answering system. Classify the question into ONE of two strategies and output a JSON object with exactly these fields:

{"strategy":"needle|summary","confidence":0.0-1.0,"rationale":"..."}

STRATEGY "needle": the question asks for one specific value
- a single fact (name, number, date, phone, VIN, amount, email, address)
- one attribute of one claim
- elapsed-time arithmetic ("how many days between X and Y")

STRATEGY "summary": the question needs synthesis across facts
- overviews, explanations, narratives ("what happened", "describe")
- multi-fact enumerations or comparisons
- document-level aggregates ("how many claims are in the document")

RULES:
- One specific value = "needle". Multiple facts or an explanation = "summary".
- Date arithmetic = "needle".
- confidence is YOUR OWN certainty in this classification, between 0.0 and 1.0.
- rationale is one sentence.

Output ONLY the JSON object, nothing else."#;

/// Classifies questions before retrieval.
pub struct RouterAgent {
    llm: Arc<dyn LLMClient>,
    config: RouterConfig,
    llm_timeout: Duration,
}

impl RouterAgent {
    pub fn new(llm: Arc<dyn LLMClient>, config: RouterConfig, timeouts: &TimeoutConfig) -> Self {
        Self {
            llm,
            config,
            llm_timeout: Duration::from_secs(timeouts.llm_secs),
        }
    }

    /// Classify a question. A provider error or persistently malformed
    /// output is fatal for the query; the caller must not fall back to a
    /// default route.
    pub async fn route(&self, question: &str) -> Result<RouteDecision, PipelineError> {
        let messages = [
            ChatMessage::system(ROUTER_SYSTEM_PROMPT),
            ChatMessage::user(format!("Question: {}", question)),
        ];
        let gen = GenerationConfig {
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            ..Default::default()
        };

        // One retry on malformed output; a second failure propagates.
        let mut last_err = None;
        for attempt in 0..2 {
            let raw = self.complete(&messages, &gen).await.map_err(PipelineError::Routing)?;
            match parse_route_response(&raw) {
                Ok(decision) => {
                    tracing::info!(
                        strategy = decision.strategy.as_str(),
                        confidence = decision.confidence,
                        rationale = %decision.rationale,
                        "Router decision"
                    );
                    return Ok(decision);
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Router output unparseable");
                    last_err = Some(e);
                }
            }
        }

        Err(PipelineError::Routing(
            last_err.unwrap_or_else(|| anyhow!("router produced no output")),
        ))
    }

    async fn complete(&self, messages: &[ChatMessage], gen: &GenerationConfig) -> Result<String> {
        let response =
            chat_with_timeout(self.llm.as_ref(), messages, &[], gen, self.llm_timeout)
                .await
                .context("classification call failed")?;
        match response {
            ChatResponse::Content(text) => Ok(text),
            ChatResponse::ToolCalls(_) => {
                Err(anyhow!("classifier requested a tool call with no tools offered"))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawRouteDecision {
    strategy: String,
    confidence: f32,
    #[serde(default)]
    rationale: String,
}

/// Parse the model's JSON into a [`RouteDecision`]. Markdown fences and
/// surrounding prose are tolerated; an unknown strategy value or a missing
/// confidence is not.
fn parse_route_response(raw: &str) -> Result<RouteDecision> {
    let json_str = extract_json_object(raw);

    let (strategy_str, confidence, rationale) =
        match serde_json::from_str::<RawRouteDecision>(json_str) {
            Ok(parsed) => (parsed.strategy, parsed.confidence, parsed.rationale),
            Err(_) => {
                // Field-level scan for partially malformed JSON. Strategy and
                // confidence must both be present; defaulting either would
                // disguise a routing failure as a decision.
                let strategy = extract_string_field(json_str, "strategy")
                    .ok_or_else(|| anyhow!("no strategy field in router output: {}", raw))?;
                let confidence = extract_number_field(json_str, "confidence")
                    .ok_or_else(|| anyhow!("no confidence field in router output: {}", raw))?;
                let rationale = extract_string_field(json_str, "rationale").unwrap_or_default();
                (strategy, confidence, rationale)
            }
        };

    let strategy = match strategy_str.trim().to_lowercase().as_str() {
        "needle" => Strategy::Needle,
        "summary" => Strategy::Summary,
        other => return Err(anyhow!("unrecognized strategy '{}' in router output", other)),
    };

    Ok(RouteDecision {
        strategy,
        confidence: confidence.clamp(0.0, 1.0),
        rationale,
    })
}
