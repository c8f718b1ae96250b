//! Protocol-agnostic request/response types the five core subsystems operate on.
//!
//! These are deliberately smaller than a full chat-completions object: the
//! wire adapter owns everything about HTTP framing and multimodal content,
//! and hands the core only what it needs to pick a provider and run a command.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sender of a [`ChatMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    /// Upper-cased label used when flattening messages into a prompt (§4.4 step 2).
    pub fn as_prompt_label(self) -> &'static str {
        match self {
            Role::System => "SYSTEM",
            Role::User => "USER",
            Role::Assistant => "ASSISTANT",
            Role::Tool => "TOOL",
        }
    }
}

/// One message in a conversation. `content` is already flattened to plain text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    /// Build a message, enforcing that `tool_call_id` is present for `role = Tool`.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            tool_call_id: None,
        }
    }
}

/// A tool/function the model may call. `parameters` is an opaque JSON schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Option<Value>,
}

/// Drop duplicate tool definitions by case-insensitive name, keeping the first occurrence.
pub fn dedup_tool_definitions(tools: Vec<ToolDefinition>) -> Vec<ToolDefinition> {
    let mut seen = std::collections::HashSet::new();
    tools
        .into_iter()
        .filter(|tool| seen.insert(tool.name.to_lowercase()))
        .collect()
}

/// One model invocation. Immutable once handed to the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedRequest {
    /// Opaque string, unique per request; used for diagnostics and the `request_id` template var.
    pub request_id: String,
    /// Logical model id as requested by the client. Mutated by the dispatcher across a fallback chain.
    pub model: String,
    /// Upstream model id understood by the bound provider.
    pub provider_model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
    pub metadata: HashMap<String, Value>,
}

impl UnifiedRequest {
    /// Render messages as `"<ROLE>:\n<content>"` blocks joined by a blank line (§4.4 step 2).
    pub fn flatten_prompt(&self) -> String {
        self.messages
            .iter()
            .map(|message| format!("{}:\n{}", message.role.as_prompt_label(), message.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Why a model invocation stopped producing output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    Error,
}

/// A structured call the model wants made. `arguments` is always a JSON-encoded
/// string so the exact provider encoding survives to the wire layer untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// Synthesize a `call_<n>` id, 1-indexed by position in the tool-call list.
pub fn synthesize_tool_call_id(index: usize) -> String {
    format!("call_{}", index + 1)
}

/// The normalized result of a single successful provider invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResult {
    pub output_text: String,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
    /// Raw provider stdout, kept for diagnostics; never interpreted further.
    #[serde(default)]
    pub raw: Option<String>,
}

/// A resolved (post-template-substitution) external-process invocation.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub executable: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub cwd: Option<String>,
    pub timeout_ms: u64,
}
