//! Deterministic tools the model can invoke.
//!
//! The model decides *whether* a tool is needed; the pipeline only executes
//! a call once the model requests it, then feeds the exact result back for
//! final phrasing. One round trip: propose → tool result → finalize. Tools
//! never talk to the model themselves.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::llm::{
    chat_with_timeout, ChatMessage, ChatResponse, GenerationConfig, LLMClient, ToolCall,
    ToolSchema,
};

pub mod date;

pub use date::DateDifferenceTool;

/// Result of one tool execution. Invalid input produces a failed outcome,
/// not an `Err`: a broken tool argument is the model's mistake, and the
/// calling strategy decides how to degrade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,
    /// Output message fed back to the model verbatim.
    pub output: String,
    /// Structured data result.
    pub data: JsonValue,
    /// Error message if failed.
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn failure(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            output: message.clone(),
            data: JsonValue::Null,
            error: Some(message),
        }
    }
}

/// Trait for deterministic tools exposed to the model.
#[async_trait]
pub trait PipelineTool: Send + Sync {
    /// Name the model uses to invoke this tool.
    fn name(&self) -> &str;

    /// Natural-language purpose, shown to the model in the tool catalog.
    fn description(&self) -> &str;

    /// Parameter schema (JSON Schema format).
    fn parameters_schema(&self) -> JsonValue;

    /// Execute with the model-supplied arguments.
    async fn execute(&self, arguments: JsonValue) -> Result<ToolOutcome>;
}

/// Registry of available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn PipelineTool>>,
}

impl ToolRegistry {
    /// Registry with the built-in date tool.
    pub fn new() -> Self {
        let mut registry = Self {
            tools: HashMap::new(),
        };
        registry.register(Arc::new(DateDifferenceTool));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn PipelineTool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn PipelineTool>> {
        self.tools.get(name).cloned()
    }

    /// Model-facing catalog of every registered tool.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .values()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    /// Execute one model-requested call, bounded by a timeout. An unknown
    /// tool name or a timeout yields a failed outcome rather than an error.
    pub async fn execute_call(&self, call: &ToolCall, timeout_secs: u64) -> ToolOutcome {
        let Some(tool) = self.get(&call.name) else {
            tracing::warn!(tool = %call.name, "Model requested unknown tool");
            return ToolOutcome::failure(format!("unknown tool: {}", call.name));
        };

        let arguments: JsonValue =
            serde_json::from_str(&call.arguments).unwrap_or(JsonValue::Null);

        let start = std::time::Instant::now();
        let result = tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            tool.execute(arguments),
        )
        .await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let outcome = match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => ToolOutcome::failure(format!("tool execution error: {}", e)),
            Err(_) => ToolOutcome::failure(format!(
                "tool '{}' timed out after {}s",
                call.name, timeout_secs
            )),
        };

        tracing::info!(
            tool = %call.name,
            success = outcome.success,
            elapsed_ms,
            "Tool call executed"
        );
        outcome
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A single tool invocation record for observability.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: JsonValue,
    pub output: String,
    pub success: bool,
}

/// Result of running the model's requested calls plus the follow-up
/// completion that phrases the final answer.
pub struct ToolRound {
    pub invocations: Vec<ToolInvocation>,
    /// Text of the follow-up completion; `Err` if it failed or requested
    /// further tool calls.
    pub final_text: Result<String>,
}

impl ToolRound {
    pub fn any_success(&self) -> bool {
        self.invocations.iter().any(|inv| inv.success)
    }
}

/// Execute the model's requested tool calls, append the results to the
/// conversation, and run one follow-up completion so the model can phrase
/// the final answer around the exact numeric results. Exactly one round:
/// the follow-up presents an empty catalog, so the model cannot chain
/// further calls.
pub async fn run_tool_round(
    llm: &dyn LLMClient,
    registry: &ToolRegistry,
    messages: &mut Vec<ChatMessage>,
    calls: Vec<ToolCall>,
    gen: &GenerationConfig,
    llm_timeout: Duration,
    tool_timeout_secs: u64,
) -> ToolRound {
    messages.push(ChatMessage::assistant_tool_calls(calls.clone()));

    let mut invocations = Vec::with_capacity(calls.len());
    for call in &calls {
        let outcome = registry.execute_call(call, tool_timeout_secs).await;
        messages.push(ChatMessage::tool_result(&call.id, &call.name, &outcome.output));
        invocations.push(ToolInvocation {
            name: call.name.clone(),
            arguments: serde_json::from_str(&call.arguments).unwrap_or(JsonValue::Null),
            output: outcome.output,
            success: outcome.success,
        });
    }

    // With every call failed there is no exact result to phrase; the
    // follow-up completion is skipped and the caller decides how to degrade.
    let final_text = if invocations.iter().all(|inv| !inv.success) {
        Err(anyhow::anyhow!("no tool call succeeded"))
    } else {
        match chat_with_timeout(llm, messages, &[], gen, llm_timeout).await {
            Ok(ChatResponse::Content(text)) => Ok(text),
            Ok(ChatResponse::ToolCalls(_)) => Err(anyhow::anyhow!(
                "model requested further tool calls after the tool round"
            )),
            Err(e) => Err(e),
        }
    };

    ToolRound {
        invocations,
        final_text,
    }
}
