//! OpenAI chat-completions provider (GPT-4o, o3, etc.)
//!
//! The same wire format serves Azure OpenAI deployments; only the URL and the
//! auth header differ, see [`Endpoint`].

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::records::mask_secret;
use crate::tools::ToolDefinition;

use super::types::{
    ChatBlock, ChatMessage, ChatMessageContent, ChatResponse, ChatResponseBlock, ChatRole,
    ChatUsage, LlmProvider, StopReason,
};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Where chat requests go and how they authenticate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    OpenAi {
        base_url: String,
    },
    Azure {
        endpoint: String,
        deployment: String,
        api_version: String,
    },
}

impl Endpoint {
    pub fn chat_url(&self) -> String {
        match self {
            Self::OpenAi { base_url } => {
                format!("{}/v1/chat/completions", base_url.trim_end_matches('/'))
            }
            Self::Azure {
                endpoint,
                deployment,
                api_version,
            } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint.trim_end_matches('/'),
                deployment,
                api_version
            ),
        }
    }

    fn auth_header(&self, api_key: &str) -> (&'static str, String) {
        match self {
            Self::OpenAi { .. } => ("Authorization", format!("Bearer {}", api_key)),
            Self::Azure { .. } => ("api-key", api_key.to_string()),
        }
    }
}

/// Build the shared HTTP client; falls back to reqwest defaults if the builder fails
pub(crate) fn http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("Failed to build HTTP client with timeout, using defaults: {}", e);
            Client::new()
        })
}

/// OpenAI provider
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    endpoint: Endpoint,
    model: String,
    max_tokens: u32,
    temperature: Option<f32>,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("api_key", &mask_secret(&self.api_key))
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String, base_url: String, max_tokens: u32) -> Self {
        Self::with_endpoint(api_key, model, Endpoint::OpenAi { base_url }, max_tokens)
    }

    pub fn with_endpoint(
        api_key: String,
        model: String,
        endpoint: Endpoint,
        max_tokens: u32,
    ) -> Self {
        Self {
            client: http_client(Duration::from_secs(120)),
            api_key,
            endpoint,
            model,
            max_tokens,
            temperature: None,
        }
    }

    /// Set the sampling temperature sent with every request
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn temperature(&self) -> Option<f32> {
        self.temperature
    }

    /// Convert provider-agnostic messages to OpenAI wire format
    fn to_openai_messages(messages: &[ChatMessage], system: &str) -> Vec<OpenAiMessage> {
        let mut result = vec![OpenAiMessage {
            role: "system".to_string(),
            content: Some(system.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }];

        for msg in messages {
            match (&msg.role, &msg.content) {
                (ChatRole::System, _) => {
                    // Already handled above
                }
                (role, ChatMessageContent::Text(text)) => {
                    result.push(OpenAiMessage {
                        role: role.to_string(),
                        content: Some(text.clone()),
                        tool_calls: None,
                        tool_call_id: None,
                    });
                }
                (ChatRole::Assistant, ChatMessageContent::Blocks(blocks)) => {
                    let mut text_parts = Vec::new();
                    let mut tool_calls = Vec::new();

                    for block in blocks {
                        match block {
                            ChatBlock::Text { text } => text_parts.push(text.clone()),
                            ChatBlock::ToolCall { id, name, input } => {
                                tool_calls.push(OpenAiToolCall {
                                    id: id.clone(),
                                    r#type: "function".to_string(),
                                    function: OpenAiFunction {
                                        name: name.clone(),
                                        arguments: serde_json::to_string(input)
                                            .unwrap_or_default(),
                                    },
                                });
                            }
                            ChatBlock::ToolResult { .. } => {}
                        }
                    }

                    let content = if text_parts.is_empty() {
                        None
                    } else {
                        Some(text_parts.join("\n"))
                    };

                    result.push(OpenAiMessage {
                        role: "assistant".to_string(),
                        content,
                        tool_calls: if tool_calls.is_empty() {
                            None
                        } else {
                            Some(tool_calls)
                        },
                        tool_call_id: None,
                    });
                }
                (ChatRole::User, ChatMessageContent::Blocks(blocks)) => {
                    // Tool results come as separate "tool" role messages in OpenAI
                    let mut text_parts = Vec::new();

                    for block in blocks {
                        match block {
                            ChatBlock::Text { text } => text_parts.push(text.clone()),
                            ChatBlock::ToolResult {
                                tool_call_id,
                                content,
                            } => {
                                result.push(OpenAiMessage {
                                    role: "tool".to_string(),
                                    content: Some(content.clone()),
                                    tool_calls: None,
                                    tool_call_id: Some(tool_call_id.clone()),
                                });
                            }
                            ChatBlock::ToolCall { .. } => {}
                        }
                    }

                    if !text_parts.is_empty() {
                        result.push(OpenAiMessage {
                            role: "user".to_string(),
                            content: Some(text_parts.join("\n")),
                            tool_calls: None,
                            tool_call_id: None,
                        });
                    }
                }
            }
        }

        result
    }

    /// Convert tool definitions to OpenAI function format
    fn to_openai_tools(tools: &[ToolDefinition]) -> Vec<OpenAiToolDef> {
        tools
            .iter()
            .map(|t| OpenAiToolDef {
                r#type: "function".to_string(),
                function: OpenAiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.input_schema.clone(),
                },
            })
            .collect()
    }

    /// Convert OpenAI response to provider-agnostic format
    fn from_openai_response(resp: OpenAiApiResponse) -> Result<ChatResponse> {
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("OpenAI response had no choices"))?;

        let mut blocks = Vec::new();

        if let Some(content) = choice.message.content {
            if !content.is_empty() {
                blocks.push(ChatResponseBlock::Text { text: content });
            }
        }

        if let Some(tool_calls) = choice.message.tool_calls {
            for tc in tool_calls {
                let input: Value = serde_json::from_str(&tc.function.arguments)
                    .unwrap_or(Value::Object(serde_json::Map::new()));
                blocks.push(ChatResponseBlock::ToolCall {
                    id: tc.id,
                    name: tc.function.name,
                    input,
                });
            }
        }

        let stop_reason = match choice.finish_reason.as_deref() {
            Some("tool_calls") => StopReason::ToolUse,
            Some("stop") => StopReason::EndTurn,
            Some("length") => StopReason::MaxTokens,
            _ => StopReason::Unknown,
        };

        let usage = resp.usage.map_or(ChatUsage::default(), |u| ChatUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        });

        Ok(ChatResponse {
            blocks,
            stop_reason,
            usage,
        })
    }

    fn request_body(&self, messages: &[OpenAiMessage], tools: &[ToolDefinition]) -> Result<Value> {
        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": messages,
        });

        if let Some(temperature) = self.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }

        if !tools.is_empty() {
            body["tools"] = serde_json::to_value(Self::to_openai_tools(tools))?;
        }

        Ok(body)
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn provider_name(&self) -> &str {
        match self.endpoint {
            Endpoint::OpenAi { .. } => "openai",
            Endpoint::Azure { .. } => "azure",
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        system: &str,
    ) -> Result<ChatResponse> {
        let url = self.endpoint.chat_url();
        let openai_messages = Self::to_openai_messages(messages, system);
        let body = self.request_body(&openai_messages, tools)?;
        let (header, value) = self.endpoint.auth_header(&self.api_key);

        debug!(
            "{} request: model={}, messages={}",
            self.provider_name(),
            self.model,
            openai_messages.len()
        );

        let response = self
            .client
            .post(&url)
            .header(header, value)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {} API", self.provider_name()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "{} API request failed with status {}: {}",
                self.provider_name(),
                status,
                error_text
            ));
        }

        let api_response: OpenAiApiResponse = response
            .json()
            .await
            .context("Failed to parse chat completions response")?;

        debug!(
            "{} response: choices={}, finish_reason={:?}",
            self.provider_name(),
            api_response.choices.len(),
            api_response.choices.first().map(|c| &c.finish_reason)
        );

        Self::from_openai_response(api_response)
    }
}

// ── OpenAI wire types ──

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAiToolCall {
    id: String,
    r#type: String,
    function: OpenAiFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAiToolDef {
    r#type: String,
    function: OpenAiToolFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAiToolFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiApiResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiChoiceMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
