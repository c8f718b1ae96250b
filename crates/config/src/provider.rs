//! Provider binding configuration — the `providers:` section of the gateway config.
//!
//! Field names here are camelCase to stay bit-exact with the documented
//! configuration contract, even though the rest of this crate's structs
//! follow serde's default snake_case.

use indexmap::IndexMap;
use serde::Deserialize;

/// One upstream CLI binding: a set of models, the command that answers them,
/// and optional auxiliary commands for auth/status/rate-limit checks.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProviderConfig {
    /// Unique provider identifier.
    pub id: String,
    /// Provider kind. Only `"cli"` is currently supported.
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    /// Human-readable description surfaced on admin endpoints.
    #[serde(default)]
    pub description: Option<String>,
    /// Models this provider exposes.
    pub models: Vec<ModelConfig>,
    /// The command invoked for every chat completion.
    pub response_command: ResponseCommandConfig,
    /// Optional auth-adjacent commands (login / status / rate limits).
    #[serde(default)]
    pub auth: Option<AuthCommandsConfig>,
}

/// The only provider kind the gateway currently binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Cli,
}

/// One model exposed by a provider.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ModelConfig {
    /// Logical model id clients request.
    pub id: String,
    /// Upstream model id passed to the CLI. Defaults to `id`.
    #[serde(default)]
    pub provider_model: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Ordered alternate model ids attempted if this one fails.
    #[serde(default)]
    pub fallback_models: Vec<String>,
}

/// How the gateway feeds input to the response command's child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    PromptStdin,
    RequestJsonStdin,
}

impl Default for InputMode {
    fn default() -> Self {
        Self::PromptStdin
    }
}

/// How the gateway parses the response command's stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    Text,
    TextPlain,
    TextContractFinalLine,
    JsonContract,
}

fn default_timeout_ms() -> u64 {
    180_000
}

/// A templated external-process invocation, shared by response/login/status/rate-limit commands.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CommandSpecConfig {
    pub executable: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Option<IndexMap<String, String>>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// The response command: a [`CommandSpecConfig`] augmented with the input/output contract.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ResponseCommandConfig {
    #[serde(flatten)]
    pub command: CommandSpecConfig,
    #[serde(default)]
    pub input: InputMode,
    pub output: OutputMode,
}

/// Optional commands that back the admin auth endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AuthCommandsConfig {
    #[serde(default)]
    pub login_command: Option<CommandSpecConfig>,
    #[serde(default)]
    pub status_command: Option<CommandSpecConfig>,
    #[serde(default)]
    pub rate_limit_command: Option<CommandSpecConfig>,
}
