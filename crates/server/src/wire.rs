//! OpenAI-compatible request/response shapes around `core::UnifiedRequest`/`ProviderResult` (§3.1).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;

/// `POST /v1/chat/completions` request body.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<OpenAiMessage>,
    #[serde(default)]
    pub tools: Option<Vec<OpenAiTool>>,
    #[serde(default)]
    pub tool_choice: Option<Value>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
pub struct OpenAiMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<OpenAiContent>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tool_call_id: Option<String>,
}

/// Content is either a bare string or an array of `{type: "text", text}` parts.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OpenAiContent {
    Text(String),
    Parts(Vec<OpenAiContentPart>),
}

#[derive(Debug, Deserialize)]
pub struct OpenAiContentPart {
    #[serde(rename = "type")]
    pub part_type: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl OpenAiContent {
    /// Flatten to plain text, concatenating `text`-typed parts and ignoring the rest,
    /// per §3's note that the wire adapter extracts text from multimodal content.
    fn flatten(self) -> String {
        match self {
            OpenAiContent::Text(text) => text,
            OpenAiContent::Parts(parts) => parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OpenAiTool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: OpenAiFunctionDefinition,
}

#[derive(Debug, Deserialize)]
pub struct OpenAiFunctionDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Option<Value>,
}

impl ChatCompletionRequest {
    /// Translate to the core's protocol-agnostic request. `request_id` is
    /// minted by the caller; `model`/`provider_model` are filled in by the dispatcher.
    pub fn into_unified(self, request_id: String) -> Result<core::UnifiedRequest, ApiError> {
        if self.stream {
            return Err(ApiError::StreamingNotSupported);
        }

        let messages = self
            .messages
            .into_iter()
            .map(|message| {
                let role = match message.role.as_str() {
                    "system" => core::Role::System,
                    "user" => core::Role::User,
                    "assistant" => core::Role::Assistant,
                    "tool" => core::Role::Tool,
                    other => return Err(ApiError::BadRequest(format!("unknown message role: {other}"))),
                };

                let content = message.content.map(OpenAiContent::flatten).unwrap_or_default();

                Ok(core::ChatMessage {
                    role,
                    content,
                    name: message.name,
                    tool_call_id: message.tool_call_id,
                })
            })
            .collect::<Result<Vec<_>, ApiError>>()?;

        let tools = core::dedup_tool_definitions(
            self.tools
                .unwrap_or_default()
                .into_iter()
                .map(|tool| core::ToolDefinition {
                    name: tool.function.name,
                    description: tool.function.description,
                    parameters: tool.function.parameters,
                })
                .collect(),
        );

        let mut metadata = std::collections::HashMap::new();
        if let Some(Value::Object(map)) = self.metadata {
            metadata.extend(map);
        }

        Ok(core::UnifiedRequest {
            request_id,
            model: self.model,
            provider_model: String::new(),
            messages,
            tools,
            metadata,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatCompletionChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionChoice {
    pub index: u32,
    pub message: ChatCompletionResponseMessage,
    pub finish_reason: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionResponseMessage {
    pub role: &'static str,
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ResponseToolCall>>,
}

#[derive(Debug, Serialize)]
pub struct ResponseToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub tool_type: &'static str,
    pub function: ResponseFunctionCall,
}

#[derive(Debug, Serialize)]
pub struct ResponseFunctionCall {
    pub name: String,
    pub arguments: String,
}

impl ChatCompletionResponse {
    pub fn from_result(id: String, created: i64, model: String, result: core::ProviderResult) -> Self {
        let finish_reason = match result.finish_reason {
            core::FinishReason::Stop => "stop",
            core::FinishReason::ToolCalls => "tool_calls",
            core::FinishReason::Length => "length",
            core::FinishReason::Error => "error",
        };

        let tool_calls = if result.tool_calls.is_empty() {
            None
        } else {
            Some(
                result
                    .tool_calls
                    .into_iter()
                    .map(|call| ResponseToolCall {
                        id: call.id,
                        tool_type: "function",
                        function: ResponseFunctionCall { name: call.name, arguments: call.arguments },
                    })
                    .collect(),
            )
        };

        let content = if result.output_text.is_empty() && tool_calls.is_some() { None } else { Some(result.output_text) };

        Self {
            id,
            object: "chat.completion",
            created,
            model,
            choices: vec![ChatCompletionChoice {
                index: 0,
                message: ChatCompletionResponseMessage { role: "assistant", content, tool_calls },
                finish_reason,
            }],
            usage: None,
        }
    }
}

/// `GET /v1/models` response.
#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub object: &'static str,
    pub data: Vec<ModelCard>,
}

#[derive(Debug, Serialize)]
pub struct ModelCard {
    pub id: String,
    pub object: &'static str,
    pub owned_by: String,
}
