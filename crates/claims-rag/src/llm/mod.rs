//! Language-model client boundary.
//!
//! The pipeline talks to its model through [`LLMClient`], a single chat
//! completion call that either returns text or requests a tool invocation.
//! Providers live behind the trait; [`external`] ships an OpenAI-compatible
//! HTTP implementation.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;

pub mod external;

pub use external::{ApiProvider, ExternalClient};

/// Core trait for language-model providers.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Chat completion over full message history with an optional tool
    /// catalog. Returns [`ChatResponse::Content`] or
    /// [`ChatResponse::ToolCalls`].
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSchema],
        config: &GenerationConfig,
    ) -> Result<ChatResponse>;
}

/// Per-call generation parameters. Each pipeline step builds its own so
/// temperature differentiation stays explicit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    pub stop_sequences: Vec<String>,
    pub seed: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.0,
            top_p: 0.95,
            stop_sequences: vec![],
            seed: None,
        }
    }
}

/// A chat message with role, content, and optional tool call metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: Option<String>,
    /// Tool calls requested by the assistant (only present when role=Assistant)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// ID of the tool call this message is responding to (only present when role=Tool)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Name of the tool (only present when role=Tool)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: None,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: ChatRole::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool call emitted by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique ID for this tool call (used to correlate with the tool result)
    pub id: String,
    /// Name of the tool to invoke
    pub name: String,
    /// JSON arguments string
    pub arguments: String,
}

/// Schema describing a tool the model can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Tool name (must match what the model will emit)
    pub name: String,
    /// Human-readable description for the model
    pub description: String,
    /// JSON Schema for the tool's parameters
    pub parameters: JsonValue,
}

/// The result of a chat completion: text content or tool call requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChatResponse {
    /// Model produced text content (final answer)
    Content(String),
    /// Model wants to call tools before answering
    ToolCalls(Vec<ToolCall>),
}

/// Await a chat completion under an upper bound. A timeout is an error of
/// the call, never an indefinite wait.
pub async fn chat_with_timeout(
    client: &dyn LLMClient,
    messages: &[ChatMessage],
    tools: &[ToolSchema],
    config: &GenerationConfig,
    timeout: Duration,
) -> Result<ChatResponse> {
    match tokio::time::timeout(timeout, client.chat(messages, tools, config)).await {
        Ok(result) => result,
        Err(_) => Err(anyhow!(
            "LLM call timed out after {}s",
            timeout.as_secs()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors_set_roles() {
        assert_eq!(ChatMessage::system("s").role, ChatRole::System);
        assert_eq!(ChatMessage::user("u").role, ChatRole::User);

        let tool_msg = ChatMessage::tool_result("call_1", "days_between", "25");
        assert_eq!(tool_msg.role, ChatRole::Tool);
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(tool_msg.name.as_deref(), Some("days_between"));
    }

    #[test]
    fn test_assistant_tool_calls_carries_no_content() {
        let msg = ChatMessage::assistant_tool_calls(vec![ToolCall {
            id: "call_1".into(),
            name: "days_between".into(),
            arguments: "{}".into(),
        }]);
        assert!(msg.content.is_none());
        assert_eq!(msg.tool_calls.as_ref().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_chat_with_timeout_expires() {
        struct SlowClient;

        #[async_trait]
        impl LLMClient for SlowClient {
            async fn chat(
                &self,
                _messages: &[ChatMessage],
                _tools: &[ToolSchema],
                _config: &GenerationConfig,
            ) -> Result<ChatResponse> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(ChatResponse::Content("late".into()))
            }
        }

        let result = chat_with_timeout(
            &SlowClient,
            &[ChatMessage::user("q")],
            &[],
            &GenerationConfig::default(),
            Duration::from_millis(10),
        )
        .await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("timed out"));
    }
}
