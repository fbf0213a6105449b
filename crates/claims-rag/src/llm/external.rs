//! OpenAI-compatible external API provider.
//!
//! One HTTP implementation covers every endpoint that speaks the
//! chat-completions dialect (OpenAI, OpenRouter, a local Ollama, or any
//! custom gateway). Tool schemas go out in the `tools` field; tool call
//! requests come back parsed into [`ChatResponse::ToolCalls`].

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use super::{ChatMessage, ChatResponse, ChatRole, GenerationConfig, LLMClient, ToolCall, ToolSchema};

/// Supported API endpoints.
#[derive(Debug, Clone)]
pub enum ApiProvider {
    OpenAI,
    OpenRouter,
    Ollama,
    Custom { endpoint: String },
}

/// HTTP client for an OpenAI-compatible chat-completions endpoint.
pub struct ExternalClient {
    provider: ApiProvider,
    api_key: String,
    model: String,
    client: Client,
}

impl ExternalClient {
    pub fn new(provider: ApiProvider, api_key: String, model: String) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(15))
            .timeout(std::time::Duration::from_secs(300))
            .tcp_nodelay(true)
            .build()?;

        tracing::info!(provider = ?provider, model = %model, "Creating external LLM client");

        Ok(Self {
            provider,
            api_key,
            model,
            client,
        })
    }

    fn endpoint(&self) -> String {
        match &self.provider {
            ApiProvider::OpenAI => "https://api.openai.com/v1/chat/completions".to_string(),
            ApiProvider::OpenRouter => "https://openrouter.ai/api/v1/chat/completions".to_string(),
            ApiProvider::Ollama => "http://localhost:11434/v1/chat/completions".to_string(),
            ApiProvider::Custom { endpoint } => endpoint.clone(),
        }
    }

    /// Parse a response body as JSON, returning a clear error if the server
    /// returned HTML (e.g. a gateway error page) instead of valid JSON.
    async fn parse_json_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        endpoint: &str,
    ) -> Result<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read response body from {}: {}", endpoint, e))?;

        let trimmed = body.trim_start();
        if trimmed.starts_with('<') || trimmed.starts_with("<!") {
            let preview: String = trimmed.chars().take(200).collect();
            return Err(anyhow!(
                "Endpoint {} returned HTML instead of JSON (HTTP {}): {}",
                endpoint,
                status,
                preview
            ));
        }

        serde_json::from_str::<T>(&body).map_err(|e| {
            let preview: String = body.chars().take(300).collect();
            anyhow!(
                "Failed to parse JSON from {} (HTTP {}): {}. Response body: {}",
                endpoint,
                status,
                e,
                preview
            )
        })
    }

    fn serialize_messages(messages: &[ChatMessage]) -> Vec<JsonValue> {
        messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    ChatRole::System => "system",
                    ChatRole::User => "user",
                    ChatRole::Assistant => "assistant",
                    ChatRole::Tool => "tool",
                };
                let mut obj = json!({ "role": role });
                if let Some(content) = &m.content {
                    obj["content"] = json!(content);
                }
                if let Some(tool_calls) = &m.tool_calls {
                    obj["tool_calls"] = json!(tool_calls
                        .iter()
                        .map(|tc| json!({
                            "id": tc.id,
                            "type": "function",
                            "function": { "name": tc.name, "arguments": tc.arguments },
                        }))
                        .collect::<Vec<_>>());
                }
                if let Some(id) = &m.tool_call_id {
                    obj["tool_call_id"] = json!(id);
                }
                obj
            })
            .collect()
    }

    fn serialize_tools(tools: &[ToolSchema]) -> Vec<JsonValue> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    },
                })
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ResponseToolCall>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    id: String,
    function: ResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ResponseFunction {
    name: String,
    arguments: String,
}

#[async_trait]
impl LLMClient for ExternalClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSchema],
        config: &GenerationConfig,
    ) -> Result<ChatResponse> {
        let endpoint = self.endpoint();

        let mut body = json!({
            "model": self.model,
            "messages": Self::serialize_messages(messages),
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
            "top_p": config.top_p,
        });
        if !tools.is_empty() {
            body["tools"] = json!(Self::serialize_tools(tools));
        }
        if !config.stop_sequences.is_empty() {
            body["stop"] = json!(config.stop_sequences);
        }
        if let Some(seed) = config.seed {
            body["seed"] = json!(seed);
        }

        tracing::debug!(
            endpoint = %endpoint,
            messages = messages.len(),
            tools = tools.len(),
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(&endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow!("Request to {} failed: {}", endpoint, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(300).collect();
            return Err(anyhow!("Endpoint {} returned HTTP {}: {}", endpoint, status, preview));
        }

        let parsed: ChatCompletionResponse =
            Self::parse_json_response(response, &endpoint).await?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Endpoint {} returned no choices", endpoint))?;

        if !choice.message.tool_calls.is_empty() {
            let calls = choice
                .message
                .tool_calls
                .into_iter()
                .map(|tc| ToolCall {
                    id: tc.id,
                    name: tc.function.name,
                    arguments: tc.function.arguments,
                })
                .collect();
            return Ok(ChatResponse::ToolCalls(calls));
        }

        match choice.message.content {
            Some(content) => Ok(ChatResponse::Content(content)),
            None => Err(anyhow!(
                "Endpoint {} returned a message with neither content nor tool calls",
                endpoint
            )),
        }
    }
}
