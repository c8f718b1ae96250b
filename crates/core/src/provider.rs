//! One upstream CLI, bound to a set of models (§4.4).

use std::collections::HashMap;

use config::{InputMode, ProviderConfig};

use crate::error::{Error, Result};
use crate::executor::{self, ExecutionOutput};
use crate::job::{ExecutableGate, JobManager, JobSummary};
use crate::model::{CommandSpec, ProviderResult, ToolDefinition, UnifiedRequest};
use crate::template::Engine;

/// Truncation applied to stderr/stdout bundled into a [`Error::ProviderExit`] message.
const FAILURE_DETAIL_MAX_CHARS: usize = 2000;

/// Resolved model metadata as registered under a provider.
#[derive(Debug, Clone)]
pub struct BoundModel {
    pub provider_model: String,
    pub description: Option<String>,
    pub fallback_models: Vec<String>,
}

/// The result of running a trusted probe command (login status, rate limits).
#[derive(Debug, Clone)]
pub struct CommandProbe {
    pub ok: bool,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandProbe {
    fn unconfigured() -> Self {
        Self {
            ok: false,
            exit_code: None,
            signal: None,
            stdout: String::new(),
            stderr: "not configured".to_string(),
        }
    }

    fn from_outcome(outcome: std::result::Result<ExecutionOutput, Error>) -> Self {
        match outcome {
            Ok(output) => Self {
                ok: output.exit_code == Some(0),
                exit_code: output.exit_code,
                signal: output.signal,
                stdout: output.stdout,
                stderr: output.stderr,
            },
            Err(Error::Timeout { .. }) => Self {
                ok: false,
                exit_code: None,
                signal: None,
                stdout: String::new(),
                stderr: "command timed out".to_string(),
            },
            Err(err) => Self {
                ok: false,
                exit_code: None,
                signal: None,
                stdout: String::new(),
                stderr: err.to_string(),
            },
        }
    }
}

/// One provider binding: a CLI tool, the models it serves, and its auxiliary commands.
pub struct Provider {
    id: String,
    models: HashMap<String, BoundModel>,
    response_command: config::ResponseCommandConfig,
    auth: Option<config::AuthCommandsConfig>,
    template_engine: Engine,
}

impl Provider {
    pub fn from_config(config: ProviderConfig, template_engine: Engine) -> Self {
        let models = config
            .models
            .into_iter()
            .map(|model| {
                let provider_model = model.provider_model.unwrap_or_else(|| model.id.clone());
                (
                    model.id,
                    BoundModel {
                        provider_model,
                        description: model.description,
                        fallback_models: model.fallback_models,
                    },
                )
            })
            .collect();

        Self {
            id: config.id,
            models,
            response_command: config.response_command,
            auth: config.auth,
            template_engine,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn model(&self, model_id: &str) -> Option<&BoundModel> {
        self.models.get(model_id)
    }

    pub fn model_ids(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    /// Run one request against this provider. `request.model`/`request.provider_model`
    /// are expected to already be resolved to this provider's binding by the dispatcher.
    pub async fn run(&self, request: &UnifiedRequest) -> Result<ProviderResult> {
        if !self.models.contains_key(&request.model) {
            return Err(Error::InvalidModel(request.model.clone()));
        }

        let mut prompt = request.flatten_prompt();
        if matches!(self.response_command.input, InputMode::PromptStdin) && !request.tools.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(&tool_advertisement_block(&request.tools));
        }

        let temp_dir =
            tempfile::tempdir().map_err(|err| Error::ConfigError(format!("failed to create temp directory: {err}")))?;
        let prompt_path = temp_dir.path().join("prompt.txt");
        let request_path = temp_dir.path().join("request.json");

        tokio::fs::write(&prompt_path, &prompt)
            .await
            .map_err(|err| Error::ConfigError(format!("failed to write prompt file: {err}")))?;

        let request_json = serde_json::to_vec(request).map_err(|err| Error::ConfigError(err.to_string()))?;
        tokio::fs::write(&request_path, &request_json)
            .await
            .map_err(|err| Error::ConfigError(format!("failed to write request file: {err}")))?;

        let mut vars = HashMap::new();
        vars.insert("request_id".to_string(), request.request_id.clone());
        vars.insert("provider_id".to_string(), self.id.clone());
        vars.insert("model".to_string(), request.model.clone());
        vars.insert("provider_model".to_string(), request.provider_model.clone());
        vars.insert("prompt".to_string(), prompt.clone());
        vars.insert("prompt_file".to_string(), prompt_path.display().to_string());
        vars.insert("request_file".to_string(), request_path.display().to_string());

        let spec = self.template_engine.apply_command(&self.response_command.command, &vars);

        let stdin_payload = match self.response_command.input {
            InputMode::RequestJsonStdin => String::from_utf8_lossy(&request_json).into_owned(),
            InputMode::PromptStdin => prompt,
        };

        let result = self.run_and_parse(&spec, &stdin_payload, &request.tools).await;

        // `temp_dir` is removed here regardless of which branch above returned,
        // satisfying "remove the temporary directory on every exit path".
        drop(temp_dir);

        result
    }

    async fn run_and_parse(&self, spec: &CommandSpec, stdin_payload: &str, tools: &[ToolDefinition]) -> Result<ProviderResult> {
        let output = executor::execute(spec, Some(stdin_payload)).await?;

        if output.exit_code != Some(0) {
            let detail = format!("{}\n{}", output.stdout, output.stderr);
            let detail: String = detail.chars().take(FAILURE_DETAIL_MAX_CHARS).collect();
            return Err(Error::ProviderExit { exit_code: output.exit_code, signal: output.signal, detail });
        }

        crate::parser::parse(self.response_command.output, &output.stdout, tools)
    }

    /// Hand the configured login command to the job manager. Fails if unconfigured.
    pub async fn start_login_job(&self, jobs: &JobManager) -> Result<JobSummary> {
        let login_command = self
            .auth
            .as_ref()
            .and_then(|auth| auth.login_command.as_ref())
            .ok_or_else(|| Error::ConfigError(format!("provider '{}' has no login command configured", self.id)))?;

        let vars = HashMap::from([("provider_id".to_string(), self.id.clone())]);
        let spec = self.template_engine.apply_command(login_command, &vars);

        jobs.start_command(&format!("login:{}", self.id), spec, ExecutableGate::Trusted).await
    }

    pub async fn check_auth_status(&self) -> CommandProbe {
        self.run_probe_command(self.auth.as_ref().and_then(|auth| auth.status_command.as_ref())).await
    }

    pub async fn check_rate_limits(&self) -> CommandProbe {
        self.run_probe_command(self.auth.as_ref().and_then(|auth| auth.rate_limit_command.as_ref())).await
    }

    async fn run_probe_command(&self, command: Option<&config::CommandSpecConfig>) -> CommandProbe {
        let Some(command) = command else { return CommandProbe::unconfigured() };

        let vars = HashMap::from([("provider_id".to_string(), self.id.clone())]);
        let spec = self.template_engine.apply_command(command, &vars);

        CommandProbe::from_outcome(executor::execute(&spec, None).await)
    }
}

/// The fixed instruction block appended to the prompt so a text-only CLI knows
/// to emit the §4.3 JSON contract when it wants to call a tool.
fn tool_advertisement_block(tools: &[ToolDefinition]) -> String {
    let tool_json = serde_json::to_string_pretty(tools).unwrap_or_else(|_| "[]".to_string());
    format!(
        "You have access to the following tools:\n{tool_json}\n\n\
         If you need to call a tool, respond with ONLY a JSON object of the form:\n\
         {{\"tool_calls\": [{{\"id\": \"call_1\", \"name\": \"<tool name>\", \"arguments\": {{...}}}}], \"finish_reason\": \"tool_calls\"}}\n\
         Otherwise respond with ONLY a JSON object of the form:\n\
         {{\"output_text\": \"<your reply>\", \"finish_reason\": \"stop\"}}"
    )
}

/// Identifies a job's provider origin in admin listings, distinct from a job's
/// own auto-generated id.
pub type ProviderId = String;

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::model::{ChatMessage, Role};

    fn provider_config(input: InputMode, output: config::OutputMode) -> ProviderConfig {
        ProviderConfig {
            id: "local".to_string(),
            provider_type: config::ProviderType::Cli,
            description: None,
            models: vec![config::ModelConfig {
                id: "m1".to_string(),
                provider_model: None,
                description: None,
                fallback_models: Vec::new(),
            }],
            response_command: config::ResponseCommandConfig {
                command: config::CommandSpecConfig {
                    executable: "/bin/echo".to_string(),
                    args: vec!["{{prompt}}".to_string()],
                    env: None,
                    cwd: None,
                    timeout_ms: 5_000,
                },
                input,
                output,
            },
            auth: None,
        }
    }

    fn request(model: &str) -> UnifiedRequest {
        UnifiedRequest {
            request_id: Uuid::new_v4().to_string(),
            model: model.to_string(),
            provider_model: model.to_string(),
            messages: vec![ChatMessage::new(Role::User, "hello")],
            tools: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn rejects_unbound_model_without_running_anything() {
        let provider = Provider::from_config(provider_config(InputMode::PromptStdin, config::OutputMode::TextPlain), Engine::new());
        let result = provider.run(&request("missing")).await;
        assert!(matches!(result, Err(Error::InvalidModel(_))));
    }

    #[tokio::test]
    async fn runs_prompt_stdin_text_plain_round_trip() {
        let provider = Provider::from_config(provider_config(InputMode::PromptStdin, config::OutputMode::TextPlain), Engine::new());
        let result = provider.run(&request("m1")).await.unwrap();
        assert!(result.output_text.contains("USER:\nhello"));
    }

    #[tokio::test]
    async fn auth_probe_reports_unconfigured_when_no_status_command() {
        let provider = Provider::from_config(provider_config(InputMode::PromptStdin, config::OutputMode::TextPlain), Engine::new());
        let probe = provider.check_auth_status().await;
        assert!(!probe.ok);
        assert_eq!(probe.stderr, "not configured");
    }
}
